// # greydnsd - greydns controller daemon
//
// The greydnsd daemon is a thin integration layer. It is responsible for:
// 1. Reading bootstrap settings from environment variables
// 2. Initializing logging and the runtime
// 3. Loading the controller ConfigMap and provider Secret
// 4. Registering providers and connecting the configured one
// 5. Feeding Service events into the greydns sync engine
//
// All DNS decisions live in greydns-core.
//
// ## Configuration
//
// Bootstrap settings come from environment variables:
//
// - `GREYDNS_NAMESPACE`: Namespace holding the ConfigMap and Secret (default: `default`)
// - `GREYDNS_CONFIGMAP`: ConfigMap name (default: `greydns-config`)
// - `GREYDNS_SECRET`: Secret name (default: `greydns-secret`)
// - `GREYDNS_MODE`: `dry-run` to log mutations instead of sending them
// - `GREYDNS_LOG_LEVEL`: Log level when `RUST_LOG` is unset (default: `info`)
// - `RUST_LOG_FORMAT`: `json` or `text` (default: `text`)
// - `POD_NAME`: Reported as the instance on published Events
//
// Record settings (`record-ttl`, `record-type`, `proxy-enabled`,
// `cache-refresh-seconds`, `ingress-destination`, `provider`) come from the
// ConfigMap and are reloaded while running.
//
// ## Example
//
// ```bash
// export GREYDNS_NAMESPACE=greydns
// export RUST_LOG_FORMAT=json
//
// greydnsd
// ```

mod config;
mod notifier;
mod watch;

use anyhow::{Context, Result};
use greydns_core::{DnsProvider, EngineEvent, ProviderRegistry, RecordCache, SyncEngine};
use kube::Client;
use std::env;
use std::process::ExitCode;
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::{debug, error, info, warn};

/// Capacity of the engine's monitoring channel
const EVENT_CHANNEL_CAPACITY: usize = 1024;

/// Exit codes for different termination scenarios
///
/// These codes follow systemd conventions:
/// - 0: Clean shutdown
/// - 1: Configuration or startup error
/// - 2: Runtime error (unexpected)
#[derive(Debug, Clone, Copy)]
enum GreydnsExitCode {
    /// Clean shutdown (normal exit)
    CleanShutdown = 0,
    /// Configuration error or startup failure
    ConfigError = 1,
    /// Runtime error (unexpected failure)
    RuntimeError = 2,
}

impl From<GreydnsExitCode> for ExitCode {
    fn from(code: GreydnsExitCode) -> Self {
        ExitCode::from(code as u8)
    }
}

/// Bootstrap settings
#[derive(Debug, Clone)]
struct Settings {
    namespace: String,
    configmap: String,
    secret: String,
    log_level: String,
    log_format: String,
    pod_name: Option<String>,
}

impl Settings {
    /// Load settings from environment variables
    fn from_env() -> Self {
        let var = |key: &str, default: &str| {
            env::var(key)
                .ok()
                .map(|v| v.trim().to_string())
                .filter(|v| !v.is_empty())
                .unwrap_or_else(|| default.to_string())
        };

        Self {
            namespace: var("GREYDNS_NAMESPACE", "default"),
            configmap: var("GREYDNS_CONFIGMAP", "greydns-config"),
            secret: var("GREYDNS_SECRET", "greydns-secret"),
            log_level: var("GREYDNS_LOG_LEVEL", "info"),
            log_format: var("RUST_LOG_FORMAT", "text"),
            pod_name: env::var("POD_NAME").ok().filter(|v| !v.is_empty()),
        }
    }

    /// Validate the settings
    fn validate(&self) -> Result<()> {
        match self.log_level.to_lowercase().as_str() {
            "trace" | "debug" | "info" | "warn" | "error" => {}
            _ => anyhow::bail!(
                "GREYDNS_LOG_LEVEL '{}' is not valid. \
                Valid levels: trace, debug, info, warn, error",
                self.log_level
            ),
        }

        match self.log_format.to_lowercase().as_str() {
            "text" | "json" => {}
            _ => anyhow::bail!(
                "RUST_LOG_FORMAT '{}' is not valid. Valid formats: text, json",
                self.log_format
            ),
        }

        Ok(())
    }
}

/// Install the global tracing subscriber
///
/// `RUST_LOG` wins over `GREYDNS_LOG_LEVEL` when set.
fn init_tracing(settings: &Settings) -> Result<()> {
    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(settings.log_level.to_lowercase()));

    let result = match settings.log_format.to_lowercase().as_str() {
        "json" => tracing_subscriber::fmt()
            .with_env_filter(env_filter)
            .with_file(true)
            .with_line_number(true)
            .with_target(false)
            .json()
            .try_init(),
        _ => tracing_subscriber::fmt()
            .with_env_filter(env_filter)
            .with_target(false)
            .with_ansi(true)
            .compact()
            .try_init(),
    };

    result.map_err(|e| anyhow::anyhow!("Failed to set tracing subscriber: {}", e))
}

fn main() -> ExitCode {
    let settings = Settings::from_env();

    if let Err(e) = settings.validate() {
        eprintln!("Configuration validation error: {}", e);
        return GreydnsExitCode::ConfigError.into();
    }

    if let Err(e) = init_tracing(&settings) {
        eprintln!("{}", e);
        return GreydnsExitCode::ConfigError.into();
    }

    info!("Starting greydnsd");

    let rt = match tokio::runtime::Builder::new_multi_thread()
        .thread_name("greydns-controller")
        .enable_all()
        .build()
    {
        Ok(runtime) => runtime,
        Err(e) => {
            error!("Failed to create tokio runtime: {}", e);
            return GreydnsExitCode::RuntimeError.into();
        }
    };

    let result = rt.block_on(async {
        let daemon = match Daemon::start(settings).await {
            Ok(daemon) => daemon,
            Err(e) => {
                error!("Startup failed: {:#}", e);
                return GreydnsExitCode::ConfigError;
            }
        };

        match daemon.run().await {
            Ok(()) => GreydnsExitCode::CleanShutdown,
            Err(e) => {
                error!("Daemon error: {:#}", e);
                GreydnsExitCode::RuntimeError
            }
        }
    });

    result.into()
}

/// Build the provider registry with every compiled-in provider
fn provider_registry() -> ProviderRegistry {
    let registry = ProviderRegistry::new();

    #[cfg(feature = "cloudflare")]
    {
        debug!("Registering Cloudflare provider");
        greydns_provider_cloudflare::register(&registry);
    }

    registry
}

/// A started controller, ready to run
struct Daemon {
    client: Client,
    settings: Settings,
    engine: SyncEngine,
    engine_events: mpsc::Receiver<EngineEvent>,
    config_tx: tokio::sync::watch::Sender<greydns_core::ControllerConfig>,
}

impl Daemon {
    /// Connect everything and prime the cache
    ///
    /// Any failure here is fatal: the controller never starts with an
    /// unknown zone table or an empty cache.
    async fn start(settings: Settings) -> Result<Self> {
        debug!("Initializing Kubernetes client");
        let client = Client::try_default()
            .await
            .context("Failed to initialize Kubernetes client")?;

        let controller_config = config::load_config(&client, &settings.namespace, &settings.configmap).await?;
        info!(
            "Loaded configuration from {}/{} (provider: {})",
            settings.namespace, settings.configmap, controller_config.provider
        );

        let credentials = config::load_credentials(&client, &settings.namespace, &settings.secret).await?;

        let registry = provider_registry();
        let provider: Arc<dyn DnsProvider> = Arc::from(
            registry
                .connect(&controller_config.provider, &credentials)
                .with_context(|| format!("Failed to connect provider {}", controller_config.provider))?,
        );
        info!("Connected to provider {}", provider.provider_name());

        let (config_tx, config_rx) = tokio::sync::watch::channel(controller_config);
        let notifier = Arc::new(notifier::KubeEventNotifier::new(
            client.clone(),
            settings.pod_name.clone(),
        ));

        let (engine, engine_events) = SyncEngine::new(
            provider,
            RecordCache::new(),
            notifier,
            config_rx,
            EVENT_CHANNEL_CAPACITY,
        )?;

        let records = engine
            .refresh_now()
            .await
            .context("Initial record refresh failed")?;
        info!("Initial refresh found {} managed records", records);

        Ok(Self {
            client,
            settings,
            engine,
            engine_events,
            config_tx,
        })
    }

    /// Run until SIGINT/SIGTERM
    async fn run(self) -> Result<()> {
        let Daemon {
            client,
            settings,
            engine,
            engine_events,
            config_tx,
        } = self;

        let config_task = config::spawn_config_watch(
            client.clone(),
            settings.namespace.clone(),
            settings.configmap.clone(),
            config_tx,
        );
        let monitor_task = tokio::spawn(log_engine_events(engine_events));
        let (events, watch_task) = watch::spawn_service_watch(client);

        let result = engine.run(events).await;

        watch_task.abort();
        config_task.abort();
        drop(engine);
        if let Err(e) = monitor_task.await {
            warn!("Engine event logger ended abnormally: {}", e);
        }

        info!("Shutting down greydnsd");
        result.map_err(Into::into)
    }
}

/// Log engine outcomes that operators care about
async fn log_engine_events(mut rx: mpsc::Receiver<EngineEvent>) {
    while let Some(event) = rx.recv().await {
        match event {
            EngineEvent::ReconcileFailed { resource, error } => {
                warn!("[{}] Reconciliation failed: {}", resource, error);
            }
            EngineEvent::CacheRefreshFailed { error } => {
                warn!("Cache refresh failed, serving previous records: {}", error);
            }
            EngineEvent::Stopped { reason } => {
                info!("Engine stopped: {}", reason);
            }
            other => debug!("Engine event: {:?}", other),
        }
    }
}
