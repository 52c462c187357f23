/// Configuration management for the API server
///
/// This module loads configuration from environment variables and provides
/// a type-safe configuration struct.
///
/// # Environment Variables
///
/// - `API_HOST`: Host to bind to (default: 0.0.0.0)
/// - `API_PORT`: Port to bind to (default: 8080)
/// - `CORS_ORIGINS`: Comma-separated allowed origins (default: `*`)
/// - `STORAGE_BACKEND`: `local` or `postgres` (default: local)
/// - `DATABASE_URL`: PostgreSQL connection string (required for postgres)
/// - `DATABASE_MAX_CONNECTIONS`: Pool size (default: 10)
/// - `LOCAL_STORAGE_DIR`: Directory of the local JSON buckets (default: ./data)
/// - `LOCAL_TASKS_KEY`, `LOCAL_SUBTASKS_KEY`, `LOCAL_INTERRUPTIONS_KEY`: bucket names
/// - `AUTH_JWT_SECRET`: Enables bearer tokens and the auth routes (at least 32 characters)
/// - `TIMER_SAVE_INTERVAL_SECS`: Seconds between timer saves (default: 10)
///
/// # Example
///
/// ```no_run
/// use tasktimer_api::config::Config;
///
/// # fn example() -> anyhow::Result<()> {
/// let config = Config::from_env()?;
/// println!("Server will listen on {}", config.bind_address());
/// # Ok(())
/// # }
/// ```

use std::env;
use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;
use tasktimer_shared::auth::jwt::MIN_SECRET_LEN;
use tasktimer_shared::storage::local::BucketKeys;
use tasktimer_shared::timer::DEFAULT_SAVE_INTERVAL_SECS;

/// Complete application configuration
#[derive(Debug, Clone)]
pub struct Config {
    /// API server configuration
    pub api: ApiConfig,

    /// Storage backend configuration
    pub storage: StorageConfig,

    /// Auth configuration
    pub auth: AuthConfig,

    /// Seconds between periodic timer saves
    pub timer_save_interval_secs: u64,
}

/// API server configuration
#[derive(Debug, Clone)]
pub struct ApiConfig {
    /// Host to bind to
    pub host: String,

    /// Port to bind to
    pub port: u16,

    /// Allowed CORS origins; `*` allows any
    pub cors_origins: Vec<String>,
}

/// Which storage adapter to construct at start-up
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StorageBackend {
    Postgres,
    Local,
}

impl FromStr for StorageBackend {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "postgres" | "postgresql" => Ok(StorageBackend::Postgres),
            "local" => Ok(StorageBackend::Local),
            other => anyhow::bail!("STORAGE_BACKEND must be 'postgres' or 'local', got '{}'", other),
        }
    }
}

impl fmt::Display for StorageBackend {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StorageBackend::Postgres => write!(f, "postgres"),
            StorageBackend::Local => write!(f, "local"),
        }
    }
}

/// Storage configuration
#[derive(Debug, Clone)]
pub struct StorageConfig {
    /// Selected backend
    pub backend: StorageBackend,

    /// PostgreSQL settings, present when the backend is postgres
    pub database: Option<DatabaseConfig>,

    /// Local blob store settings
    pub local: LocalConfig,
}

/// Database configuration
#[derive(Debug, Clone)]
pub struct DatabaseConfig {
    /// PostgreSQL connection URL
    pub url: String,

    /// Maximum number of connections in pool
    pub max_connections: u32,
}

/// Local backend configuration
#[derive(Debug, Clone)]
pub struct LocalConfig {
    /// Directory holding one JSON file per bucket
    pub dir: PathBuf,

    /// Bucket names
    pub keys: BucketKeys,
}

/// Auth configuration
#[derive(Debug, Clone, Default)]
pub struct AuthConfig {
    /// HS256 secret for access tokens
    ///
    /// `None` disables bearer tokens: every request acts as "anonymous".
    pub jwt_secret: Option<String>,
}

impl Config {
    /// Loads configuration from `.env` and the process environment
    ///
    /// # Errors
    ///
    /// Returns an error if a value fails to parse, the postgres backend is selected
    /// without `DATABASE_URL`, or the auth secret is too short.
    pub fn from_env() -> anyhow::Result<Self> {
        // Load .env file if present (for development)
        dotenvy::dotenv().ok();

        Self::from_vars(|key| env::var(key).ok())
    }

    /// Loads configuration through a variable lookup
    pub fn from_vars<F>(lookup: F) -> anyhow::Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let var = |key: &str, default: &str| lookup(key).unwrap_or_else(|| default.to_string());

        let port = var("API_PORT", "8080")
            .parse::<u16>()
            .map_err(|e| anyhow::anyhow!("API_PORT is invalid: {}", e))?;

        let cors_origins = var("CORS_ORIGINS", "*")
            .split(',')
            .map(|origin| origin.trim().to_string())
            .filter(|origin| !origin.is_empty())
            .collect();

        let backend: StorageBackend = var("STORAGE_BACKEND", "local").parse()?;

        let database = match backend {
            StorageBackend::Postgres => {
                let url = lookup("DATABASE_URL").ok_or_else(|| {
                    anyhow::anyhow!("DATABASE_URL environment variable is required for the postgres backend")
                })?;
                let max_connections = var("DATABASE_MAX_CONNECTIONS", "10")
                    .parse::<u32>()
                    .map_err(|e| anyhow::anyhow!("DATABASE_MAX_CONNECTIONS is invalid: {}", e))?;

                Some(DatabaseConfig { url, max_connections })
            }
            StorageBackend::Local => None,
        };

        let defaults = BucketKeys::default();
        let local = LocalConfig {
            dir: PathBuf::from(var("LOCAL_STORAGE_DIR", "./data")),
            keys: BucketKeys {
                tasks: var("LOCAL_TASKS_KEY", &defaults.tasks),
                subtasks: var("LOCAL_SUBTASKS_KEY", &defaults.subtasks),
                interruptions: var("LOCAL_INTERRUPTIONS_KEY", &defaults.interruptions),
            },
        };

        let jwt_secret = lookup("AUTH_JWT_SECRET").filter(|s| !s.is_empty());
        if jwt_secret.as_ref().is_some_and(|s| s.len() < MIN_SECRET_LEN) {
            anyhow::bail!("AUTH_JWT_SECRET must be at least {} characters long", MIN_SECRET_LEN);
        }

        let timer_save_interval_secs = var("TIMER_SAVE_INTERVAL_SECS", &DEFAULT_SAVE_INTERVAL_SECS.to_string())
            .parse::<u64>()
            .map_err(|e| anyhow::anyhow!("TIMER_SAVE_INTERVAL_SECS is invalid: {}", e))?;
        if timer_save_interval_secs == 0 {
            anyhow::bail!("TIMER_SAVE_INTERVAL_SECS must be at least 1");
        }

        Ok(Self {
            api: ApiConfig {
                host: var("API_HOST", "0.0.0.0"),
                port,
                cors_origins,
            },
            storage: StorageConfig {
                backend,
                database,
                local,
            },
            auth: AuthConfig { jwt_secret },
            timer_save_interval_secs,
        })
    }

    /// Returns the server bind address
    pub fn bind_address(&self) -> String {
        format!("{}:{}", self.api.host, self.api.port)
    }
}
