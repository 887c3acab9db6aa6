use anyhow::{Context, bail, ensure};
use busline::commands::{self, RecordKind, SendKind, Target};
use busline::config::{
    AppConfig, ConfigError, DEFAULT_CONFIG_FILE, limits::MAX_SEND_COUNT, load_config,
};
use busline::logger;
use clap::{Parser, Subcommand};
use server::connection::{
    AzureConnector, CachingConnectionFactory, ConnectionFactory, SasTokenGenerator,
    ServiceBusConnectionFactory, ServiceBusConnectionString,
};
use server::listener::{ListenerReport, ServiceBusSourceFactory};
use server::memory::MemoryBroker;
use server::publisher::ServiceBusSink;
use std::path::{Path, PathBuf};
use std::sync::Arc;

#[derive(Debug, Parser)]
#[command(name = "busline", version, about = "Publish and receive records on Azure Service Bus")]
struct Cli {
    /// Configuration file (default: config.toml, optional)
    #[arg(long, global = true, value_name = "PATH")]
    config: Option<PathBuf>,

    /// Use an in-process broker instead of Service Bus
    #[arg(long, global = true)]
    in_memory: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Send the sample records
    Send {
        #[arg(long, value_enum, default_value_t = Target::Queue)]
        to: Target,
        /// Defaults to email for the queue and employee for the topic
        #[arg(long, value_enum)]
        kind: Option<SendKind>,
        /// How many of each record to send
        #[arg(long, default_value_t = 1)]
        count: usize,
    },
    /// Print received records until Ctrl-C
    Listen {
        #[arg(long, value_enum, default_value_t = Target::Queue)]
        from: Target,
        /// Defaults to email for the queue and employee for the topic
        #[arg(long, value_enum)]
        kind: Option<RecordKind>,
    },
    /// Listen on the queue and topic, send the sample records, wait for Ctrl-C
    Run {
        #[arg(long, default_value_t = 1)]
        count: usize,
    },
    /// Print the AMQP transport URI derived from the connection string
    Uri,
    /// Print a SAS token for the namespace
    Token {
        #[arg(long, default_value_t = 24)]
        ttl_hours: i64,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let config = match &cli.config {
        Some(path) => load_config(path, true)?,
        None => load_config(Path::new(DEFAULT_CONFIG_FILE), false)?,
    };
    logger::setup_logger(config.logging()).context("Failed to initialize logger")?;

    match cli.command {
        Command::Send { to, kind, count } => {
            ensure!(
                (1..=MAX_SEND_COUNT).contains(&count),
                "--count must be between 1 and {MAX_SEND_COUNT}"
            );
            let kind = kind.unwrap_or_else(|| to.default_record().into());
            let sent = if cli.in_memory {
                commands::send(MemoryBroker::new(), &config, to, kind, count).await?
            } else {
                let connections = connect(&config)?;
                let result = commands::send(
                    ServiceBusSink::new(Arc::clone(&connections)),
                    &config,
                    to,
                    kind,
                    count,
                )
                .await;
                close(&connections).await;
                result?
            };
            println!("Sent {sent} message(s).");
        }
        Command::Listen { from, kind } => {
            let kind = kind.unwrap_or_else(|| from.default_record());
            let reports = if cli.in_memory {
                let factory = Arc::new(MemoryBroker::new());
                commands::listen(factory, &config, from, kind, ctrl_c()).await?
            } else {
                let connections = connect(&config)?;
                let factory = Arc::new(ServiceBusSourceFactory::new(Arc::clone(&connections)));
                let result = commands::listen(factory, &config, from, kind, ctrl_c()).await;
                close(&connections).await;
                result?
            };
            print_reports(&reports);
        }
        Command::Run { count } => {
            ensure!(
                (1..=MAX_SEND_COUNT).contains(&count),
                "--count must be between 1 and {MAX_SEND_COUNT}"
            );
            let reports = if cli.in_memory {
                let broker = MemoryBroker::new();
                let factory = Arc::new(broker.clone());
                commands::run(broker, factory, &config, count, ctrl_c()).await?
            } else {
                let connections = connect(&config)?;
                let sink = ServiceBusSink::new(Arc::clone(&connections));
                let factory = Arc::new(ServiceBusSourceFactory::new(Arc::clone(&connections)));
                let result = commands::run(sink, factory, &config, count, ctrl_c()).await;
                close(&connections).await;
                result?
            };
            print_reports(&reports);
        }
        Command::Uri => {
            let factory = connection_factory(&config)?;
            println!("{}", factory.remote_uri());
        }
        Command::Token { ttl_hours } => {
            let ttl = commands::token_ttl(ttl_hours)?;
            println!("{}", sas_token(&config, ttl)?);
        }
    }

    Ok(())
}

fn connection_string(config: &AppConfig) -> Result<String, ConfigError> {
    config
        .servicebus()
        .connection_string()
        .ok_or(ConfigError::MissingConnectionString)
}

fn connection_factory(config: &AppConfig) -> anyhow::Result<ConnectionFactory> {
    let servicebus = config.servicebus();
    let factory = ConnectionFactory::new(
        &connection_string(config)?,
        servicebus.client_id(),
        servicebus.uri_options(),
    )
    .context("Invalid Service Bus configuration")?;
    Ok(factory)
}

fn connect(config: &AppConfig) -> anyhow::Result<Arc<ServiceBusConnectionFactory>> {
    let factory = connection_factory(config)?;
    log::info!(
        "Using {} (namespace {}, client id {})",
        factory.remote_uri(),
        factory.namespace(),
        factory.client_id()
    );
    Ok(Arc::new(CachingConnectionFactory::new(factory, AzureConnector)))
}

async fn close(connections: &ServiceBusConnectionFactory) {
    if let Err(e) = connections.dispose().await {
        log::warn!("Failed to close Service Bus connection: {e}");
    }
}

fn sas_token(config: &AppConfig, ttl: chrono::Duration) -> anyhow::Result<String> {
    let parsed = ServiceBusConnectionString::parse(&connection_string(config)?)
        .context("Invalid Service Bus connection string")?;
    let (Some(key_name), Some(key)) = (parsed.key_name(), parsed.key()) else {
        bail!("The connection string has no shared access key to sign with");
    };

    let generator = SasTokenGenerator::new(parsed.host());
    let token = generator.generate(key_name, key.expose(), ttl)?;
    Ok(token)
}

async fn ctrl_c() {
    println!("Listening, press Ctrl-C to stop.");
    if let Err(e) = tokio::signal::ctrl_c().await {
        log::error!("Failed to wait for Ctrl-C: {e}");
    }
}

fn print_reports(reports: &[ListenerReport]) {
    for report in reports {
        println!(
            "{} ({}): {} received, {} completed, {} abandoned",
            report.destination,
            report.record_type,
            report.stats.received,
            report.stats.completed,
            report.stats.abandoned
        );
    }
}
