//! Network and runtime configuration for the reference server.

use std::time::Duration;

use clap::{Parser, ValueEnum};

/// Log output format for the process-wide subscriber.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum LogFormat {
    /// One JSON object per line.
    Json,
    /// Human-readable multi-line output.
    Pretty,
}

/// Top-level configuration for the server.
#[derive(Debug, Clone)]
pub struct NetworkConfig {
    /// Bind address for the server.
    pub host: String,
    /// Port to listen on. 0 means OS-assigned.
    pub port: u16,
    /// Allowed CORS origins.
    pub cors_origins: Vec<String>,
    /// Deadline of each request's `RequestContext`. Stages that outlive it
    /// fail with `503`.
    pub request_timeout: Duration,
    /// Upper bound on request body size read by the JSON parse stage.
    pub max_body_bytes: usize,
    /// Bearer tokens allowed to call write endpoints. Empty denies all writes.
    pub api_tokens: Vec<String>,
    pub log_format: LogFormat,
    /// Expose `GET /metrics` in Prometheus text format.
    pub metrics_enabled: bool,
}

impl Default for NetworkConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 0,
            cors_origins: vec!["*".to_string()],
            request_timeout: Duration::from_secs(30),
            max_body_bytes: 1_048_576, // 1 MiB
            api_tokens: Vec::new(),
            log_format: LogFormat::Json,
            metrics_enabled: true,
        }
    }
}

/// Command-line arguments, each overridable from the environment.
#[derive(Debug, Parser)]
#[command(name = "handle-chain-server", version, about)]
pub struct ServerArgs {
    #[arg(long, env = "CHAIN_HOST", default_value = "0.0.0.0")]
    pub host: String,

    #[arg(long, env = "CHAIN_PORT", default_value_t = 8080)]
    pub port: u16,

    /// Comma-separated list of allowed CORS origins, `*` for any.
    #[arg(long, env = "CHAIN_CORS_ORIGINS", value_delimiter = ',', default_value = "*")]
    pub cors_origins: Vec<String>,

    #[arg(long, env = "CHAIN_REQUEST_TIMEOUT_SECS", default_value_t = 30)]
    pub request_timeout_secs: u64,

    #[arg(long, env = "CHAIN_MAX_BODY_BYTES", default_value_t = 1_048_576)]
    pub max_body_bytes: usize,

    /// Comma-separated bearer tokens accepted by write endpoints.
    #[arg(long, env = "CHAIN_API_TOKENS", value_delimiter = ',')]
    pub api_tokens: Vec<String>,

    #[arg(long, env = "CHAIN_LOG_FORMAT", value_enum, default_value_t = LogFormat::Json)]
    pub log_format: LogFormat,

    /// Disable the `/metrics` endpoint.
    #[arg(long, env = "CHAIN_NO_METRICS")]
    pub no_metrics: bool,
}

impl From<ServerArgs> for NetworkConfig {
    fn from(args: ServerArgs) -> Self {
        Self {
            host: args.host,
            port: args.port,
            cors_origins: args.cors_origins,
            request_timeout: Duration::from_secs(args.request_timeout_secs),
            max_body_bytes: args.max_body_bytes,
            api_tokens: args
                .api_tokens
                .into_iter()
                .map(|t| t.trim().to_string())
                .filter(|t| !t.is_empty())
                .collect(),
            log_format: args.log_format,
            metrics_enabled: !args.no_metrics,
        }
    }
}
