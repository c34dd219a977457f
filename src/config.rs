use std::{path::PathBuf, time::Duration};

use anyhow::{Result, anyhow};
use clap::{Parser, ValueEnum};

use crate::{
    probe::BasicAuth,
    rules::{CrossFieldMode, catalog::GAMES_PATH},
    runner::RunOptions,
};

/// CLI / env configuration parsed at process startup.
#[derive(Debug, Clone, Parser)]
#[command(
    name = "games-query-contract",
    about = "Query-parameter contract matrix for the games listing API",
    version,
    disable_help_subcommand = true
)]
struct CliConfig {
    /// Base URL of the service under test (e.g., http://localhost:8000)
    #[arg(long, env = "URL", default_value = "")]
    base_url: String,

    #[arg(long, env = "ADMIN_NAME", default_value = "")]
    admin_name: String,

    #[arg(long, env = "ADMIN_PASSWORD", default_value = "", hide_env_values = true)]
    admin_password: String,

    #[arg(long, env = "USER_NAME", default_value = "")]
    user_name: String,

    #[arg(long, env = "USER_PASS", default_value = "", hide_env_values = true)]
    user_password: String,

    /// Credentials attached to every probe
    #[arg(long, env = "GAMES_AUTH", value_enum, default_value_t = AuthProfile::None)]
    auth: AuthProfile,

    /// Listing endpoint path appended to the base URL
    #[arg(long, env = "GAMES_PATH", default_value = GAMES_PATH)]
    games_path: String,

    /// Per-request timeout in milliseconds
    #[arg(long, env = "GAMES_PROBE_TIMEOUT_MS", default_value_t = 10_000)]
    timeout_ms: u64,

    /// Number of parameters probed concurrently
    #[arg(long, env = "GAMES_CONCURRENCY", default_value_t = 4)]
    concurrency: usize,

    /// Read-only SQLite catalog used to cross-check result counts
    #[arg(long, env = "GAMES_DB_PATH")]
    db_path: Option<PathBuf>,

    /// Whether min_price == max_price is rejected (inclusive) or accepted (strict)
    #[arg(long, env = "GAMES_PRICE_MODE", value_enum, default_value_t = CrossFieldMode::Strict)]
    price_mode: CrossFieldMode,

    /// Also probe every pair of filter parameters
    #[arg(long, env = "GAMES_PAIRWISE", default_value_t = false)]
    pairwise: bool,

    /// Probe each case twice and require the same status
    #[arg(long, env = "GAMES_VERIFY_IDEMPOTENCE", default_value_t = false)]
    verify_idempotence: bool,

    /// Require a JSON body on cases expecting 200
    #[arg(long, env = "GAMES_ASSERT_JSON", default_value_t = false)]
    assert_json_body: bool,

    /// Optional OTLP endpoint (grpc) for OpenTelemetry export
    #[arg(long, env = "OTEL_EXPORTER_OTLP_ENDPOINT")]
    otel_endpoint: Option<String>,

    /// Logical service name for telemetry (resource attribute)
    #[arg(long, env = "OTEL_SERVICE_NAME", default_value = "games-query-contract")]
    otel_service_name: String,

    /// Deployment environment tag for telemetry (e.g., development, staging, prod)
    #[arg(long, env = "GAMES_ENV", default_value = "development")]
    environment: String,

    /// Default log filter when RUST_LOG is not provided
    #[arg(long, env = "LOG_LEVEL", default_value = "info")]
    log_level: String,
}

/// Which configured identity, if any, authenticates the probes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, ValueEnum)]
pub enum AuthProfile {
    #[default]
    None,
    Admin,
    User,
}

/// Named credentials; empty strings when unset.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Credentials {
    pub admin_name: String,
    pub admin_password: String,
    pub user_name: String,
    pub user_password: String,
}

/// Target service settings handed to the probe.
#[derive(Debug, Clone)]
pub struct TargetConfig {
    pub base_url: String,
    pub path: String,
    pub timeout: Duration,
    pub auth: AuthProfile,
    pub credentials: Credentials,
}

impl TargetConfig {
    /// Basic-auth pair for the selected profile.
    pub fn basic_auth(&self) -> Option<BasicAuth> {
        let (username, password) = match self.auth {
            AuthProfile::None => return None,
            AuthProfile::Admin => (&self.credentials.admin_name, &self.credentials.admin_password),
            AuthProfile::User => (&self.credentials.user_name, &self.credentials.user_password),
        };
        Some(BasicAuth {
            username: username.clone(),
            password: password.clone(),
        })
    }
}

/// Matrix shape and execution settings.
#[derive(Debug, Clone)]
pub struct MatrixConfig {
    pub concurrency: usize,
    pub price_mode: CrossFieldMode,
    pub pairwise: bool,
    pub verify_idempotence: bool,
    pub assert_json_body: bool,
    pub db_path: Option<PathBuf>,
}

/// OpenTelemetry exporter configuration.
#[derive(Debug, Clone)]
pub struct OtelConfig {
    pub endpoint: Option<String>,
    pub service_name: String,
}

/// Structured logging configuration.
#[derive(Debug, Clone)]
pub struct LogConfig {
    pub level: String,
}

/// Immutable process configuration, loaded once and passed explicitly.
#[derive(Debug, Clone)]
pub struct AppConfig {
    pub target: TargetConfig,
    pub matrix: MatrixConfig,
    pub otel: OtelConfig,
    pub log: LogConfig,
    pub environment: String,
}

impl AppConfig {
    /// Load `.env` if present, then parse CLI/env arguments into a validated configuration.
    pub fn load() -> Result<Self> {
        dotenv::dotenv().ok();
        let cli = CliConfig::parse();
        Self::try_from(cli)
    }

    pub fn run_options(&self) -> RunOptions {
        RunOptions {
            path: self.target.path.clone(),
            concurrency: self.matrix.concurrency,
            pairwise: self.matrix.pairwise,
            verify_idempotence: self.matrix.verify_idempotence,
            require_json_body: self.matrix.assert_json_body,
            ..RunOptions::default()
        }
    }
}

impl TryFrom<CliConfig> for AppConfig {
    type Error = anyhow::Error;

    // Empty base URL is accepted; each probe reports it as an invalid url.
    fn try_from(value: CliConfig) -> Result<Self> {
        if value.timeout_ms == 0 {
            return Err(anyhow!("probe timeout must be greater than zero"));
        }
        if value.concurrency == 0 {
            return Err(anyhow!("concurrency must be at least 1"));
        }
        if !value.games_path.starts_with('/') {
            return Err(anyhow!(
                "games path '{}' must start with '/'",
                value.games_path
            ));
        }

        Ok(Self {
            target: TargetConfig {
                base_url: value.base_url.trim().to_string(),
                path: value.games_path,
                timeout: Duration::from_millis(value.timeout_ms),
                auth: value.auth,
                credentials: Credentials {
                    admin_name: value.admin_name,
                    admin_password: value.admin_password,
                    user_name: value.user_name,
                    user_password: value.user_password,
                },
            },
            matrix: MatrixConfig {
                concurrency: value.concurrency,
                price_mode: value.price_mode,
                pairwise: value.pairwise,
                verify_idempotence: value.verify_idempotence,
                assert_json_body: value.assert_json_body,
                db_path: value.db_path,
            },
            otel: OtelConfig {
                endpoint: value.otel_endpoint,
                service_name: value.otel_service_name,
            },
            log: LogConfig {
                level: value.log_level,
            },
            environment: value.environment,
        })
    }
}
