// # dd-dnsd - container DNS daemon
//
// Thin integration layer: all mapping and reconciliation logic lives in
// dd-dns-core. The daemon is responsible for:
// 1. Reading configuration from environment variables
// 2. Initializing logging and the runtime
// 3. Wiring the Docker event source, DNS publisher and mapping store
// 4. Running the sync engine until SIGTERM/SIGINT
//
// ## Configuration
//
// All configuration is done via environment variables. Values are trimmed;
// everything except the account name, secret and zone ID is lower-cased.
//
// - `DD_DNS_PROVIDER`: DNS publisher (`cloudflare` (default), `dryrun`)
// - `DD_DNS_ACCOUNT_NAME`: account email (Cloudflare global API key auth)
// - `DD_DNS_ACCOUNT_SECRET`: API key, or API token when no account name is set
// - `DD_DNS_ZONE_ID`: Cloudflare zone ID (optional)
// - `DD_DNS_DNS_CONTENT`: `container` (default) or a fixed IPv4 address
// - `DD_DNS_DOCKER_LABEL`: label holding the DNS name (default `dd-dns.hostname`)
// - `DD_DNS_STORE`: `memory` (default) or `file` (`boltdb` is accepted too)
// - `DD_DNS_DATA_DIRECTORY`: directory of the file store (default: cwd)
// - `DD_DNS_RESYNC_INTERVAL_SECS`: periodic full resync, 0 disables (default 0)
// - `DD_DNS_LOG_LEVEL`: trace, debug, info (default), warn, error
//
// ## Example
//
// ```bash
// export DD_DNS_PROVIDER=cloudflare
// export DD_DNS_ACCOUNT_SECRET=your_token
// export DD_DNS_STORE=file
// export DD_DNS_DATA_DIRECTORY=/var/lib/dd-dns
//
// dd-dnsd
// ```

use anyhow::{Context, Result};
use dd_dns_core::config::DEFAULT_DOCKER_LABEL;
use dd_dns_core::{
    AddressMode, DdDnsConfig, EngineConfig, PublisherConfig, PublisherRegistry, StoreConfig,
    SyncEngine,
};
use dd_dns_docker::DockerEventSource;
use std::env;
use std::path::PathBuf;
use std::process::ExitCode;
use tokio::sync::oneshot;
use tracing::{Level, error, info};
use tracing_subscriber::FmtSubscriber;

#[cfg(unix)]
use tokio::signal::unix::{SignalKind, signal};

/// Exit codes for different termination scenarios
///
/// These codes follow systemd conventions:
/// - 0: Clean shutdown
/// - 1: Configuration or startup error
/// - 2: Runtime error (unexpected)
#[derive(Debug, Clone, Copy)]
enum DdDnsExitCode {
    /// Clean shutdown (normal exit)
    CleanShutdown = 0,
    /// Configuration error or startup failure
    ConfigError = 1,
    /// Runtime error (unexpected failure)
    RuntimeError = 2,
}

impl From<DdDnsExitCode> for ExitCode {
    fn from(code: DdDnsExitCode) -> Self {
        ExitCode::from(code as u8)
    }
}

/// Raw settings as read from the environment
#[derive(Clone, Default)]
struct Settings {
    provider: String,
    account_name: String,
    account_secret: String,
    zone_id: String,
    dns_content: String,
    docker_label: String,
    store: String,
    data_directory: String,
    resync_interval_secs: String,
    log_level: String,
}

// Custom Debug implementation that hides the account secret
impl std::fmt::Debug for Settings {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Settings")
            .field("provider", &self.provider)
            .field("account_name", &self.account_name)
            .field("account_secret", &"****")
            .field("zone_id", &self.zone_id)
            .field("dns_content", &self.dns_content)
            .field("docker_label", &self.docker_label)
            .field("store", &self.store)
            .field("data_directory", &self.data_directory)
            .field("resync_interval_secs", &self.resync_interval_secs)
            .field("log_level", &self.log_level)
            .finish()
    }
}

impl Settings {
    /// Load settings from environment variables
    fn from_env() -> Self {
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Load settings through a variable lookup
    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let get = |key: &str| lookup(key).unwrap_or_default().trim().to_string();
        Self {
            provider: get("DD_DNS_PROVIDER").to_lowercase(),
            account_name: get("DD_DNS_ACCOUNT_NAME"),
            account_secret: get("DD_DNS_ACCOUNT_SECRET"),
            zone_id: get("DD_DNS_ZONE_ID"),
            dns_content: get("DD_DNS_DNS_CONTENT").to_lowercase(),
            docker_label: get("DD_DNS_DOCKER_LABEL").to_lowercase(),
            store: get("DD_DNS_STORE").to_lowercase(),
            data_directory: get("DD_DNS_DATA_DIRECTORY"),
            resync_interval_secs: get("DD_DNS_RESYNC_INTERVAL_SECS"),
            log_level: get("DD_DNS_LOG_LEVEL").to_lowercase(),
        }
    }

    /// Validate the settings and build the core configuration
    ///
    /// Every invalid value is reported, not just the first one.
    fn into_config(self) -> Result<DdDnsConfig> {
        let mut problems = Vec::new();

        let publisher = match self.provider.as_str() {
            "" | "cloudflare" => {
                if self.account_secret.is_empty() {
                    problems.push(
                        "DD_DNS_ACCOUNT_SECRET is required for the cloudflare provider. \
                        Set it via: export DD_DNS_ACCOUNT_SECRET=your_token"
                            .to_string(),
                    );
                }
                Some(PublisherConfig::Cloudflare {
                    account_name: non_empty(self.account_name),
                    account_secret: self.account_secret,
                    zone_id: non_empty(self.zone_id),
                })
            }
            "dryrun" => Some(PublisherConfig::DryRun),
            other => {
                problems.push(format!(
                    "Invalid provider `{}` specified. Available providers: [`cloudflare`, `dryrun`]",
                    other
                ));
                None
            }
        };

        let address_mode = match self.dns_content.parse::<AddressMode>() {
            Ok(mode) => mode,
            Err(e) => {
                problems.push(e.to_string());
                AddressMode::default()
            }
        };

        let docker_label = if self.docker_label.is_empty() {
            DEFAULT_DOCKER_LABEL.to_string()
        } else {
            self.docker_label
        };

        let data_directory = if self.data_directory.is_empty() {
            env::current_dir().context("Failed to determine the current directory")?
        } else {
            PathBuf::from(self.data_directory)
        };

        let store = match self.store.as_str() {
            "" | "memory" => StoreConfig::Memory,
            "file" | "boltdb" => StoreConfig::file_in(&data_directory),
            other => {
                problems.push(format!(
                    "Invalid store `{}` provided. Available store implementations: [`memory`, `file`]",
                    other
                ));
                StoreConfig::Memory
            }
        };

        let resync_interval_secs = if self.resync_interval_secs.is_empty() {
            0
        } else {
            match self.resync_interval_secs.parse::<u64>() {
                Ok(secs) => secs,
                Err(_) => {
                    problems.push(format!(
                        "DD_DNS_RESYNC_INTERVAL_SECS must be a number of seconds. Got: {}",
                        self.resync_interval_secs
                    ));
                    0
                }
            }
        };

        if parse_log_level(&self.log_level).is_none() {
            problems.push(format!(
                "DD_DNS_LOG_LEVEL '{}' is not valid. \
                Valid levels: trace, debug, info, warn, error",
                self.log_level
            ));
        }

        let Some(publisher) = publisher.filter(|_| problems.is_empty()) else {
            anyhow::bail!("{}", problems.join("; "));
        };

        let config = DdDnsConfig {
            publisher,
            store,
            docker_label,
            address_mode,
            engine: EngineConfig {
                resync_interval_secs,
                ..EngineConfig::default()
            },
        };
        config.validate()?;
        Ok(config)
    }
}

fn non_empty(value: String) -> Option<String> {
    (!value.is_empty()).then_some(value)
}

fn parse_log_level(level: &str) -> Option<Level> {
    match level {
        "trace" => Some(Level::TRACE),
        "debug" => Some(Level::DEBUG),
        "" | "info" => Some(Level::INFO),
        "warn" => Some(Level::WARN),
        "error" => Some(Level::ERROR),
        _ => None,
    }
}

fn main() -> ExitCode {
    let settings = Settings::from_env();
    let log_level = parse_log_level(&settings.log_level).unwrap_or(Level::INFO);

    // Validate configuration
    let config = match settings.into_config() {
        Ok(config) => config,
        Err(e) => {
            eprintln!("Configuration validation error: {}", e);
            return DdDnsExitCode::ConfigError.into();
        }
    };

    // Initialize tracing
    let subscriber = FmtSubscriber::builder().with_max_level(log_level).finish();

    if let Err(e) = tracing::subscriber::set_global_default(subscriber) {
        eprintln!("Failed to set tracing subscriber: {}", e);
        return DdDnsExitCode::ConfigError.into();
    }

    info!("Starting dd-dnsd daemon");
    info!("Using configuration: {:?}", config);

    // Enter tokio runtime
    let rt = match tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
    {
        Ok(runtime) => runtime,
        Err(e) => {
            error!("Failed to create tokio runtime: {}", e);
            return DdDnsExitCode::RuntimeError.into();
        }
    };

    rt.block_on(async {
        match run_daemon(config).await {
            Ok(()) => DdDnsExitCode::CleanShutdown,
            Err(DaemonError::Startup(e)) => {
                error!("Startup error: {:#}", e);
                DdDnsExitCode::ConfigError
            }
            Err(DaemonError::Runtime(e)) => {
                error!("Daemon error: {:#}", e);
                DdDnsExitCode::RuntimeError
            }
        }
    })
    .into()
}

/// Where the daemon failed
enum DaemonError {
    Startup(anyhow::Error),
    Runtime(anyhow::Error),
}

/// Run the daemon
async fn run_daemon(config: DdDnsConfig) -> std::result::Result<(), DaemonError> {
    let registry = PublisherRegistry::with_builtins();
    dd_dns_provider_cloudflare::register(&registry);

    let (engine, mut engine_events) = build_engine(&registry, &config)
        .await
        .map_err(DaemonError::Startup)?;

    let (shutdown_tx, shutdown_rx) = oneshot::channel();
    tokio::spawn(async move {
        match wait_for_shutdown().await {
            Ok(signal) => info!("Received shutdown signal: {}", signal),
            Err(e) => error!("Signal handling failed, shutting down: {}", e),
        }
        let _ = shutdown_tx.send(());
    });

    tokio::spawn(async move {
        while let Some(event) = engine_events.recv().await {
            tracing::debug!("Engine event: {:?}", event);
        }
    });

    info!("Starting sync engine");
    engine
        .run_with_shutdown(Some(shutdown_rx))
        .await
        .map_err(|e| DaemonError::Runtime(e.into()))?;

    info!("Shutting down daemon");
    Ok(())
}

async fn build_engine(
    registry: &PublisherRegistry,
    config: &DdDnsConfig,
) -> Result<(SyncEngine, tokio::sync::mpsc::Receiver<dd_dns_core::EngineEvent>)> {
    info!("Connecting to docker");
    let event_source = DockerEventSource::connect(&config.docker_label, config.address_mode)?;
    event_source.ping().await?;
    info!("Connected to docker");

    info!("Connecting to DNS publisher: {}", config.publisher.type_name());
    let publisher = registry.create_publisher(&config.publisher)?;

    info!("Opening mapping store: {}", config.store.type_name());
    let store = registry.create_store(&config.store).await?;

    let engine = SyncEngine::new(
        Box::new(event_source),
        publisher,
        store,
        &config.engine,
    )?;
    Ok(engine)
}

/// Wait for shutdown signals (SIGTERM, SIGINT)
///
/// # Returns
///
/// Returns the name of the signal received.
#[cfg(unix)]
async fn wait_for_shutdown() -> Result<&'static str> {
    let mut sigterm = signal(SignalKind::terminate())
        .map_err(|e| anyhow::anyhow!("Failed to setup SIGTERM handler: {}", e))?;
    let mut sigint = signal(SignalKind::interrupt())
        .map_err(|e| anyhow::anyhow!("Failed to setup SIGINT handler: {}", e))?;

    Ok(tokio::select! {
        _ = sigterm.recv() => "SIGTERM",
        _ = sigint.recv() => "SIGINT",
    })
}

/// Wait for shutdown signals (SIGINT only)
///
/// Fallback implementation for non-Unix platforms.
#[cfg(not(unix))]
async fn wait_for_shutdown() -> Result<&'static str> {
    tokio::signal::ctrl_c()
        .await
        .map_err(|e| anyhow::anyhow!("Failed to wait for CTRL-C: {}", e))?;
    Ok("SIGINT")
}
