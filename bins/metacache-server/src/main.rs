use std::sync::Arc;

use clap::Parser;

use metacache_broker_kafka::{KafkaBroker, KafkaSettings};
use metacache_config_hcl::HclParser;
use metacache_engine::config::{ConfigParser, KafkaConfig, MetacacheConfig, TomlParser};
use metacache_engine::{Coordinator, EngineError, Ingestion, MetadataStore, QueryService};

#[derive(Parser)]
#[command(name = "metacache-server", about = "User metadata cache fed from a Kafka topic")]
struct Cli {
    /// Path to a TOML or HCL configuration file. Built-in defaults apply without one.
    #[arg(long, env = "METACACHE_CONFIG")]
    config: Option<String>,

    /// Override the HTTP API port.
    #[arg(long, env = "METACACHE_API_PORT")]
    api_port: Option<u16>,

    /// Override the bootstrap brokers (comma separated).
    #[arg(long, env = "METACACHE_BROKERS", value_delimiter = ',')]
    brokers: Option<Vec<String>>,
}

impl Cli {
    fn load_config(&self) -> Result<MetacacheConfig, EngineError> {
        let mut config = match &self.config {
            Some(path) => {
                let parsers: [&dyn ConfigParser; 2] = [&TomlParser, &HclParser];
                MetacacheConfig::load_with(path, &parsers)?
            }
            None => MetacacheConfig::default(),
        };
        if let Some(port) = self.api_port {
            config.api_port = port;
        }
        if let Some(brokers) = &self.brokers {
            config.kafka.brokers = brokers.clone();
        }
        Ok(config)
    }
}

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info".into()),
        )
        .init();

    let cli = Cli::parse();

    let config = match cli.load_config() {
        Ok(c) => c,
        Err(e) => {
            tracing::error!(error = %e, "failed to load config");
            std::process::exit(1);
        }
    };
    tracing::info!(
        api_port = config.api_port,
        brokers = ?config.kafka.brokers,
        topic = %config.kafka.topic,
        "configuration loaded"
    );

    let store = Arc::new(MetadataStore::new());

    // Ingestion connects in the background; the API serves from the start.
    let mut ingestion_task = ingestion_coordinator(config.kafka.clone(), store.clone()).spawn();
    let mut api_task = tokio::spawn(metacache_api_server::run(
        config.api_port,
        QueryService::new(store.clone()),
    ));

    let mut ingestion: Option<Ingestion> = None;
    loop {
        tokio::select! {
            result = &mut ingestion_task, if ingestion.is_none() => match result {
                Ok(Ok(running)) => {
                    tracing::info!(topic = %running.topic(), partitions = ?running.partitions(), "ingestion running");
                    ingestion = Some(running);
                }
                Ok(Err(e)) => {
                    tracing::error!(error = %e, "ingestion failed to start");
                    std::process::exit(1);
                }
                Err(e) => {
                    tracing::error!(error = %e, "ingestion task failed");
                    std::process::exit(1);
                }
            },
            result = &mut api_task => {
                match result {
                    Ok(Ok(())) => tracing::error!("api server stopped"),
                    Ok(Err(e)) => tracing::error!(error = %e, "api server error"),
                    Err(e) => tracing::error!(error = %e, "api server task failed"),
                }
                std::process::exit(1);
            }
            _ = tokio::signal::ctrl_c() => {
                tracing::info!("shutting down...");
                break;
            }
        }
    }

    // No drain: consumer tasks and in-flight requests go down with the runtime.
    tracing::info!(
        cached_users = store.len(),
        applied = ingestion.as_ref().map_or(0, Ingestion::applied),
        "stopped"
    );
}

fn ingestion_coordinator(kafka: KafkaConfig, store: Arc<MetadataStore>) -> Coordinator {
    let settings = KafkaSettings {
        connect_timeout: kafka.connect_timeout(),
        brokers: kafka.brokers,
        max_wait_ms: kafka.max_wait_ms,
    };
    Coordinator::new(Arc::new(KafkaBroker::new(settings)), store, kafka.topic)
}
