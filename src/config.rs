//! Configuration for Weblog
//!
//! CLI arguments and environment variable handling using clap.

use clap::Parser;
use std::net::SocketAddr;
use std::time::Duration;

use crate::auth::token::DEV_SECRET;

/// Weblog - multi-user blogging service with a JSON API
#[derive(Parser, Debug, Clone)]
#[command(name = "weblog")]
#[command(about = "Multi-user blogging service with follows, comments and moderation")]
pub struct Args {
    /// Address to listen on
    #[arg(long, env = "LISTEN", default_value = "0.0.0.0:5000")]
    pub listen: SocketAddr,

    /// SQLite database file (":memory:" for a throwaway database)
    #[arg(long, env = "DATABASE_PATH", default_value = "weblog.db")]
    pub database_path: String,

    /// Secret for token signing (required in production, at least 32 chars)
    #[arg(long, env = "SECRET_KEY")]
    pub secret_key: Option<String>,

    /// Lifetime of confirmation and password reset tokens in seconds
    #[arg(long, env = "TOKEN_TTL_SECONDS", default_value = "3600")]
    pub token_ttl_seconds: u64,

    /// Lifetime of API access tokens in seconds
    #[arg(long, env = "SESSION_TTL_SECONDS", default_value = "86400")]
    pub session_ttl_seconds: u64,

    #[arg(long, env = "BLOGS_PER_PAGE", default_value = "10")]
    pub blogs_per_page: u32,

    #[arg(long, env = "USERS_PER_PAGE", default_value = "10")]
    pub users_per_page: u32,

    #[arg(long, env = "COMMENTS_PER_PAGE", default_value = "10")]
    pub comments_per_page: u32,

    /// Minimum search query length after trimming
    #[arg(long, env = "SEARCH_MIN_LEN", default_value = "2")]
    pub search_min_len: usize,

    /// From address for outgoing mail
    #[arg(long, env = "MAIL_SENDER", default_value = "Weblog Admin <noreply@weblog.local>")]
    pub mail_sender: String,

    /// Bootstrap administrator email (created on startup if absent)
    #[arg(long, env = "ADMIN_EMAIL")]
    pub admin_email: Option<String>,

    #[arg(long, env = "ADMIN_NAME", default_value = "admin")]
    pub admin_name: String,

    #[arg(long, env = "ADMIN_PASSWORD")]
    pub admin_password: Option<String>,

    /// Enable development mode (insecure default secret)
    #[arg(long, env = "DEV_MODE", default_value = "false")]
    pub dev_mode: bool,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, env = "LOG_LEVEL", default_value = "info")]
    pub log_level: String,

    /// Log output format ("text" or "json")
    #[arg(long, env = "LOG_FORMAT", default_value = "text")]
    pub log_format: String,
}

impl Args {
    /// Get effective signing secret (uses default in dev mode)
    pub fn secret_key(&self) -> Option<String> {
        match (&self.secret_key, self.dev_mode) {
            (Some(secret), _) => Some(secret.clone()),
            (None, true) => Some(DEV_SECRET.to_string()),
            (None, false) => None,
        }
    }

    pub fn token_ttl(&self) -> Duration {
        Duration::from_secs(self.token_ttl_seconds)
    }

    pub fn session_ttl(&self) -> Duration {
        Duration::from_secs(self.session_ttl_seconds)
    }

    /// Bootstrap admin credentials, if both email and password are configured
    pub fn bootstrap_admin(&self) -> Option<(&str, &str, &str)> {
        match (&self.admin_email, &self.admin_password) {
            (Some(email), Some(password)) => Some((email, &self.admin_name, password)),
            _ => None,
        }
    }

    /// Validate configuration
    pub fn validate(&self) -> Result<(), String> {
        if !self.dev_mode {
            match &self.secret_key {
                None => return Err("SECRET_KEY is required in production mode".to_string()),
                Some(s) if s.len() < 32 => {
                    return Err("SECRET_KEY must be at least 32 characters".to_string())
                }
                _ => {}
            }
        }

        if self.token_ttl_seconds == 0 || self.session_ttl_seconds == 0 {
            return Err("token lifetimes must be greater than zero".to_string());
        }

        if self.blogs_per_page == 0 || self.users_per_page == 0 || self.comments_per_page == 0 {
            return Err("page sizes must be greater than zero".to_string());
        }

        if self.admin_email.is_some() != self.admin_password.is_some() {
            return Err("ADMIN_EMAIL and ADMIN_PASSWORD must be set together".to_string());
        }

        if !matches!(self.log_format.as_str(), "text" | "json") {
            return Err(format!("unknown LOG_FORMAT {:?}", self.log_format));
        }

        Ok(())
    }
}
