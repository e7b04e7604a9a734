use dotenv::dotenv;
use std::env;
use std::fmt;
use std::str::FromStr;
use tracing::{info, warn};

const DEFAULT_JWT_SECRET: &str = "change-me-in-production";

#[derive(Debug, Clone)]
pub struct Config {
    pub database_url: String,
    pub jwt_secret: String,
    pub server_host: String,
    pub server_port: u16,
    pub max_connections: u32,
    /// When unset the hub runs single-process with the in-memory bus and presence store
    pub redis_url: Option<String>,
    pub redis_key_prefix: String,
    pub ws_idle_timeout_secs: u64,
    pub broadcast_capacity: usize,
    pub app_env: String,
}

impl Config {
    /// Read the hub settings from the process environment, after loading `.env` if present
    pub fn from_env() -> Result<Self, String> {
        dotenv().ok();

        let database_url = env::var("DATABASE_URL")
            .map_err(|_| "DATABASE_URL must be set in .env file".to_string())?;

        let jwt_secret = env::var("JWT_SECRET").unwrap_or_else(|_| {
            warn!("JWT_SECRET not set, using default (not secure for production!)");
            DEFAULT_JWT_SECRET.to_string()
        });

        let broadcast_capacity: usize = parsed("BROADCAST_CAPACITY", 256)?;
        if broadcast_capacity == 0 {
            return Err("Invalid BROADCAST_CAPACITY: must be greater than zero".to_string());
        }

        Ok(Config {
            database_url,
            jwt_secret,
            server_host: text("SERVER_HOST", "127.0.0.1"),
            server_port: parsed("SERVER_PORT", 3000)?,
            max_connections: parsed("MAX_DB_CONNECTIONS", 10)?,
            redis_url: env::var("REDIS_URL").ok().filter(|url| !url.trim().is_empty()),
            redis_key_prefix: text("REDIS_KEY_PREFIX", "hub"),
            ws_idle_timeout_secs: parsed("WS_IDLE_TIMEOUT_SECS", 300)?,
            broadcast_capacity,
            app_env: text("APP_ENV", "development"),
        })
    }

    pub fn is_development(&self) -> bool {
        self.app_env == "development"
    }

    /// Log the configuration (hiding the secrets)
    pub fn print_info(&self) {
        info!("Server configuration:");
        info!("  Environment: {}", self.app_env);
        info!("  Server address: {}:{}", self.server_host, self.server_port);
        info!("  Database: {}", Self::mask_url(&self.database_url));
        info!("  Max DB connections: {}", self.max_connections);
        match &self.redis_url {
            Some(url) => info!(
                "  Fanout/presence: redis at {} (prefix '{}')",
                Self::mask_url(url),
                self.redis_key_prefix
            ),
            None => info!("  Fanout/presence: in-process (single node only)"),
        }
        info!("  WebSocket idle timeout: {}s", self.ws_idle_timeout_secs);
        info!("  Broadcast capacity: {}", self.broadcast_capacity);
        if self.jwt_secret == DEFAULT_JWT_SECRET {
            warn!("  JWT secret: USING DEFAULT (INSECURE!)");
        } else {
            info!("  JWT secret: custom secret configured");
        }
    }

    /// Mask the credentials of a connection URL for logging
    fn mask_url(url: &str) -> String {
        if let Some(at_pos) = url.find('@') {
            if let Some(scheme_end) = url.find("://") {
                let scheme = &url[..scheme_end + 3];
                let after_at = &url[at_pos..];
                return format!("{}***{}", scheme, after_at);
            }
        }
        if url.starts_with("sqlite:") {
            return url.to_string();
        }
        "***".to_string()
    }
}

fn text(key: &str, default: &str) -> String {
    env::var(key).unwrap_or_else(|_| default.to_string())
}

/// Parse `key` as `T`, falling back to `default` when unset
fn parsed<T>(key: &str, default: T) -> Result<T, String>
where
    T: FromStr,
    T::Err: fmt::Display,
{
    match env::var(key) {
        Ok(raw) => raw
            .trim()
            .parse()
            .map_err(|e| format!("Invalid {}: '{}' ({})", key, raw, e)),
        Err(_) => Ok(default),
    }
}
