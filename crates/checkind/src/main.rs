// # checkind - Check-in Daemon
//
// This daemon is a THIN integration layer:
// - DO NOT add scheduling, storage or encryption logic here
// - All check-in logic lives in checkin-core
// - Configuration is via environment variables ONLY (a `.env` file in the
//   working directory is loaded first if present)
//
// The checkind daemon is responsible for:
// 1. Reading configuration from environment variables
// 2. Initializing logging and the runtime
// 3. Building the record store, cipher and notifier
// 4. Running the daily sweep until SIGTERM/SIGINT
//
// ## Configuration
//
// ### Encryption
// - `CHECKIN_ENCRYPTION_KEY`: Master secret for contact encryption (required)
//
// ### Record Store
// - `CHECKIN_STORE_TYPE`: Type of record store (file, memory)
// - `CHECKIN_STORE_PATH`: Path to the subscriber file (default: users.json)
//
// ### Scheduler
// - `CHECKIN_SWEEP_HOUR`: Hour of day (UTC) of the daily sweep (default: 10)
// - `CHECKIN_RUN_ON_STARTUP`: Catch-up sweep at startup (default: true)
// - `CHECKIN_DELIVERY_TIMEOUT_SECS`: Bound on one delivery (default: 30)
// - `CHECKIN_FAILURE_POLICY`: advance or defer (default: advance)
//
// ### Notifier
// - `CHECKIN_NOTIFIER_TYPE`: smtp or log (default: smtp)
// - `CHECKIN_SMTP_HOST`, `CHECKIN_SMTP_PORT`, `CHECKIN_SMTP_SECURE`
// - `CHECKIN_SENDER_EMAIL`, `CHECKIN_SENDER_PASS`, `CHECKIN_SENDER_NAME`
// - `CHECKIN_MODE`: set to `dry-run` to build messages without sending
//
// ## Example
//
// ```bash
// export CHECKIN_ENCRYPTION_KEY=$(openssl rand -hex 32)
// export CHECKIN_STORE_PATH=/var/lib/checkin/users.json
// export CHECKIN_SMTP_HOST=smtp.example.org
// export CHECKIN_SMTP_PORT=465
// export CHECKIN_SMTP_SECURE=true
// export CHECKIN_SENDER_EMAIL=checkin@example.org
// export CHECKIN_SENDER_PASS=app_password
//
// checkind
// ```

use anyhow::{Context, Result};
use checkin_core::traits::Notifier;
use checkin_core::{
    CheckInConfig, Cipher, FailurePolicy, FileRecordStore, LogNotifier,
    MasterKey, MemoryRecordStore, NotifierConfig, RecordStore, Scheduler, SchedulerConfig,
    StoreConfig, SubscriberStore, SystemClock,
};
use std::env;
use std::process::ExitCode;
use std::str::FromStr;
use std::sync::Arc;
use tracing::{Level, debug, error, info, warn};
use tracing_subscriber::FmtSubscriber;

#[cfg(unix)]
use tokio::signal::unix::{Signal, SignalKind, signal};

/// Exit codes for different termination scenarios
///
/// These codes follow systemd conventions:
/// - 0: Clean shutdown
/// - 1: Configuration or startup error
/// - 2: Runtime error (unexpected)
#[derive(Debug, Clone, Copy)]
enum CheckinExitCode {
    /// Clean shutdown (normal exit)
    CleanShutdown = 0,
    /// Configuration error or startup failure
    ConfigError = 1,
    /// Runtime error (unexpected failure)
    RuntimeError = 2,
}

impl From<CheckinExitCode> for ExitCode {
    fn from(code: CheckinExitCode) -> Self {
        ExitCode::from(code as u8)
    }
}

/// Application configuration, as read from the environment
struct Config {
    encryption_key: String,
    store_type: String,
    store_path: String,
    sweep_hour: Option<u32>,
    run_on_startup: Option<bool>,
    delivery_timeout_secs: Option<u64>,
    failure_policy: String,
    notifier_type: String,
    smtp_host: String,
    smtp_port: Option<u16>,
    smtp_secure: bool,
    sender_email: String,
    sender_pass: String,
    sender_name: Option<String>,
    dry_run: bool,
    log_level: String,
}

impl Config {
    /// Load configuration from environment variables
    fn from_env() -> Result<Self> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Load configuration through a variable lookup
    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let var = |key: &str| lookup(key).map(|v| v.trim().to_string()).filter(|v| !v.is_empty());

        Ok(Self {
            encryption_key: lookup("CHECKIN_ENCRYPTION_KEY").unwrap_or_default(),
            store_type: var("CHECKIN_STORE_TYPE").unwrap_or_else(|| "file".to_string()),
            store_path: var("CHECKIN_STORE_PATH")
                .unwrap_or_else(|| checkin_core::config::DEFAULT_STORE_PATH.to_string()),
            sweep_hour: parse_var("CHECKIN_SWEEP_HOUR", var("CHECKIN_SWEEP_HOUR"))?,
            run_on_startup: var("CHECKIN_RUN_ON_STARTUP")
                .map(|v| parse_bool("CHECKIN_RUN_ON_STARTUP", &v))
                .transpose()?,
            delivery_timeout_secs: parse_var(
                "CHECKIN_DELIVERY_TIMEOUT_SECS",
                var("CHECKIN_DELIVERY_TIMEOUT_SECS"),
            )?,
            failure_policy: var("CHECKIN_FAILURE_POLICY").unwrap_or_else(|| "advance".to_string()),
            notifier_type: var("CHECKIN_NOTIFIER_TYPE").unwrap_or_else(|| "smtp".to_string()),
            smtp_host: var("CHECKIN_SMTP_HOST").unwrap_or_default(),
            smtp_port: parse_var("CHECKIN_SMTP_PORT", var("CHECKIN_SMTP_PORT"))?,
            smtp_secure: var("CHECKIN_SMTP_SECURE")
                .map(|v| parse_bool("CHECKIN_SMTP_SECURE", &v))
                .transpose()?
                .unwrap_or(false),
            sender_email: var("CHECKIN_SENDER_EMAIL").unwrap_or_default(),
            sender_pass: lookup("CHECKIN_SENDER_PASS").unwrap_or_default(),
            sender_name: var("CHECKIN_SENDER_NAME"),
            dry_run: var("CHECKIN_MODE").is_some_and(|m| m.eq_ignore_ascii_case("dry-run")),
            log_level: var("CHECKIN_LOG_LEVEL").unwrap_or_else(|| "info".to_string()),
        })
    }

    /// Validate the daemon-level settings
    ///
    /// Component settings are validated by [`CheckInConfig::validate`] once
    /// the core configuration is built.
    fn validate(&self) -> Result<()> {
        if self.encryption_key.is_empty() {
            anyhow::bail!(
                "CHECKIN_ENCRYPTION_KEY is required. \
                Set it via: export CHECKIN_ENCRYPTION_KEY=$(openssl rand -hex 32)"
            );
        }

        // Check for obvious placeholder secrets (common mistake)
        let key_lower = self.encryption_key.to_lowercase();
        if key_lower.contains("your_key")
            || key_lower.contains("replace_me")
            || key_lower.contains("changeme")
        {
            anyhow::bail!(
                "CHECKIN_ENCRYPTION_KEY appears to be a placeholder. \
                Use a long random secret."
            );
        }

        if self.encryption_key.len() < 16 {
            eprintln!(
                "WARNING: CHECKIN_ENCRYPTION_KEY is short ({} chars). \
                Use at least 32 random characters.",
                self.encryption_key.len()
            );
        }

        match self.store_type.as_str() {
            "file" | "memory" => {}
            _ => anyhow::bail!(
                "CHECKIN_STORE_TYPE '{}' is not supported. \
                Supported types: file, memory",
                self.store_type
            ),
        }

        match self.notifier_type.as_str() {
            "smtp" | "log" => {}
            _ => anyhow::bail!(
                "CHECKIN_NOTIFIER_TYPE '{}' is not supported. \
                Supported types: smtp, log",
                self.notifier_type
            ),
        }

        if self.notifier_type == "smtp" && self.smtp_port.is_none() {
            anyhow::bail!(
                "CHECKIN_SMTP_PORT is required when CHECKIN_NOTIFIER_TYPE=smtp \
                (usually 465 with CHECKIN_SMTP_SECURE=true, 587 otherwise)"
            );
        }

        match self.failure_policy.to_lowercase().as_str() {
            "advance" | "defer" => {}
            _ => anyhow::bail!(
                "CHECKIN_FAILURE_POLICY '{}' is not valid. \
                Valid policies: advance, defer",
                self.failure_policy
            ),
        }

        match self.log_level.to_lowercase().as_str() {
            "trace" | "debug" | "info" | "warn" | "error" => {}
            _ => anyhow::bail!(
                "CHECKIN_LOG_LEVEL '{}' is not valid. \
                Valid levels: trace, debug, info, warn, error",
                self.log_level
            ),
        }

        Ok(())
    }

    /// Build and validate the core configuration
    fn to_checkin_config(&self) -> Result<CheckInConfig> {
        let store = match self.store_type.as_str() {
            "memory" => StoreConfig::Memory,
            _ => StoreConfig::File {
                path: self.store_path.clone(),
            },
        };

        let notifier = match self.notifier_type.as_str() {
            "log" => NotifierConfig::Log,
            _ => NotifierConfig::Smtp {
                host: self.smtp_host.clone(),
                port: self.smtp_port.unwrap_or_default(),
                secure: self.smtp_secure,
                sender_email: self.sender_email.clone(),
                sender_password: self.sender_pass.clone(),
                sender_name: self.sender_name.clone(),
            },
        };

        let defaults = SchedulerConfig::default();
        let scheduler = SchedulerConfig {
            sweep_hour: self.sweep_hour.unwrap_or(defaults.sweep_hour),
            run_on_startup: self.run_on_startup.unwrap_or(defaults.run_on_startup),
            delivery_timeout_secs: self
                .delivery_timeout_secs
                .unwrap_or(defaults.delivery_timeout_secs),
            failure_policy: match self.failure_policy.to_lowercase().as_str() {
                "defer" => FailurePolicy::Defer,
                _ => FailurePolicy::Advance,
            },
            ..defaults
        };

        let config = CheckInConfig {
            store,
            notifier,
            scheduler,
        };
        config.validate()?;
        Ok(config)
    }

    fn log_level(&self) -> Level {
        match self.log_level.to_lowercase().as_str() {
            "trace" => Level::TRACE,
            "debug" => Level::DEBUG,
            "warn" => Level::WARN,
            "error" => Level::ERROR,
            _ => Level::INFO,
        }
    }
}

fn parse_var<T>(key: &str, value: Option<String>) -> Result<Option<T>>
where
    T: FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    value
        .map(|v| {
            v.parse::<T>()
                .with_context(|| format!("{} has an invalid value: '{}'", key, v))
        })
        .transpose()
}

fn parse_bool(key: &str, value: &str) -> Result<bool> {
    match value.to_lowercase().as_str() {
        "true" | "1" | "yes" => Ok(true),
        "false" | "0" | "no" => Ok(false),
        _ => anyhow::bail!("{} must be true or false. Got: '{}'", key, value),
    }
}

fn main() -> ExitCode {
    // Seed the environment from .env when present
    dotenvy::dotenv().ok();

    // Load configuration from environment
    let config = match Config::from_env() {
        Ok(cfg) => cfg,
        Err(e) => {
            eprintln!("Configuration error: {:#}", e);
            return CheckinExitCode::ConfigError.into();
        }
    };

    // Validate configuration
    if let Err(e) = config.validate() {
        eprintln!("Configuration validation error: {:#}", e);
        return CheckinExitCode::ConfigError.into();
    }

    let checkin_config = match config.to_checkin_config() {
        Ok(cfg) => cfg,
        Err(e) => {
            eprintln!("Configuration validation error: {:#}", e);
            return CheckinExitCode::ConfigError.into();
        }
    };

    // Initialize tracing
    let subscriber = FmtSubscriber::builder()
        .with_max_level(config.log_level())
        .finish();

    if let Err(e) = tracing::subscriber::set_global_default(subscriber) {
        eprintln!("Failed to set tracing subscriber: {}", e);
        return CheckinExitCode::ConfigError.into();
    }

    info!("Starting checkind daemon");
    info!(
        "Configuration loaded: store={}, notifier={}, sweep at {:02}:00 UTC",
        config.store_type,
        checkin_config.notifier.type_name(),
        checkin_config.scheduler.sweep_hour
    );

    // Enter tokio runtime
    let rt = match tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
    {
        Ok(runtime) => runtime,
        Err(e) => {
            error!("Failed to create tokio runtime: {}", e);
            return CheckinExitCode::RuntimeError.into();
        }
    };

    let result = rt.block_on(async {
        match run_daemon(&config, checkin_config).await {
            Ok(()) => CheckinExitCode::CleanShutdown,
            Err(DaemonError::Startup(e)) => {
                error!("Startup error: {:#}", e);
                CheckinExitCode::ConfigError
            }
            Err(DaemonError::Runtime(e)) => {
                error!("Daemon error: {:#}", e);
                CheckinExitCode::RuntimeError
            }
        }
    });

    result.into()
}

/// Daemon failure, split by phase for the exit code
enum DaemonError {
    Startup(anyhow::Error),
    Runtime(anyhow::Error),
}

/// Run the daemon
async fn run_daemon(config: &Config, checkin_config: CheckInConfig) -> Result<(), DaemonError> {
    let master_key = MasterKey::derive(&config.encryption_key)
        .context("Failed to derive encryption key")
        .map_err(DaemonError::Startup)?;
    let cipher = Cipher::new(&master_key);
    drop(master_key);

    let backend = build_record_store(&checkin_config.store)
        .await
        .map_err(DaemonError::Startup)?;
    let store = Arc::new(SubscriberStore::new(backend, cipher, Arc::new(SystemClock)));

    // Fail fast on an unreadable store rather than at the first sweep
    let subscribers = store
        .load()
        .await
        .context("Failed to load subscribers")
        .map_err(DaemonError::Startup)?;
    info!(
        "Record store '{}' ready: {} subscriber(s)",
        store.backend_name(),
        subscribers.len()
    );
    drop(subscribers);

    let notifier = build_notifier(&checkin_config.notifier, config.dry_run)
        .map_err(DaemonError::Startup)?;
    info!("Notifier: {}", notifier.notifier_name());

    let (scheduler, mut events) =
        Scheduler::new(store, notifier, checkin_config.scheduler)
            .context("Failed to create scheduler")
            .map_err(DaemonError::Startup)?;

    // Surface scheduler events in the log
    tokio::spawn(async move {
        while let Some(event) = events.recv().await {
            debug!("Scheduler event: {:?}", event);
        }
    });

    let signals = ShutdownSignals::install().map_err(DaemonError::Startup)?;
    let (shutdown_tx, shutdown_rx) = tokio::sync::oneshot::channel();
    tokio::spawn(async move {
        let signal = signals.recv().await;
        info!("Received shutdown signal: {}", signal);
        let _ = shutdown_tx.send(());
    });

    info!("{}", checkin_core::service::HEALTH_MESSAGE);

    scheduler
        .run_with_shutdown(Some(shutdown_rx))
        .await
        .context("Scheduler failed")
        .map_err(DaemonError::Runtime)?;

    info!("Shutting down daemon");
    Ok(())
}

async fn build_record_store(config: &StoreConfig) -> Result<Box<dyn RecordStore>> {
    match config {
        StoreConfig::File { path } => {
            let store = FileRecordStore::open(path)
                .await
                .with_context(|| format!("Failed to open record store at {}", path))?;
            Ok(Box::new(store))
        }
        StoreConfig::Memory => {
            warn!("Using in-memory record store: subscribers are lost on exit");
            Ok(Box::new(MemoryRecordStore::new()))
        }
    }
}

fn build_notifier(config: &NotifierConfig, dry_run: bool) -> Result<Box<dyn Notifier>> {
    match config {
        NotifierConfig::Log => Ok(Box::new(LogNotifier)),
        #[cfg(feature = "smtp")]
        NotifierConfig::Smtp { .. } => {
            let notifier = checkin_notifier_smtp::SmtpNotifier::from_config(config, dry_run)
                .context("Failed to create SMTP notifier")?;
            Ok(Box::new(notifier))
        }
        #[cfg(not(feature = "smtp"))]
        NotifierConfig::Smtp { .. } => {
            let _ = dry_run;
            anyhow::bail!(
                "checkind was built without the 'smtp' feature. \
                Set CHECKIN_NOTIFIER_TYPE=log or rebuild with --features smtp"
            )
        }
    }
}

/// Shutdown signal handlers (SIGTERM, SIGINT)
///
/// Installed before the scheduler starts so a failure to register them is a
/// startup error.
#[cfg(unix)]
struct ShutdownSignals {
    sigterm: Signal,
    sigint: Signal,
}

#[cfg(unix)]
impl ShutdownSignals {
    fn install() -> Result<Self> {
        let sigterm = signal(SignalKind::terminate())
            .map_err(|e| anyhow::anyhow!("Failed to setup SIGTERM handler: {}", e))?;
        let sigint = signal(SignalKind::interrupt())
            .map_err(|e| anyhow::anyhow!("Failed to setup SIGINT handler: {}", e))?;
        Ok(Self { sigterm, sigint })
    }

    /// Wait for either signal and return its name
    async fn recv(mut self) -> &'static str {
        tokio::select! {
            _ = self.sigterm.recv() => "SIGTERM",
            _ = self.sigint.recv() => "SIGINT",
        }
    }
}

/// Fallback for non-Unix platforms (Ctrl-C only)
#[cfg(not(unix))]
struct ShutdownSignals;

#[cfg(not(unix))]
impl ShutdownSignals {
    fn install() -> Result<Self> {
        Ok(Self)
    }

    async fn recv(self) -> &'static str {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!("Failed to wait for CTRL-C: {}", e);
            std::future::pending::<()>().await;
        }
        "SIGINT"
    }
}
