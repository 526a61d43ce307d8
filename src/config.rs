//! Configuration module for Focuslight.
//!
//! Loads configuration from environment variables with sensible defaults.

use std::env;

/// Server configuration loaded from environment variables.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// HTTP port for the web server (default: 5125)
    pub http_port: u16,
    /// Path to the SQLite database file (default: "focuslight.db")
    pub db_path: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            http_port: 5125,
            db_path: "focuslight.db".to_string(),
        }
    }
}

impl ServerConfig {
    /// Load configuration from environment variables.
    ///
    /// Environment variables:
    /// - `FOCUSLIGHT_HTTP_PORT`: HTTP port (default: 5125)
    /// - `FOCUSLIGHT_DB_PATH`: Database file path (default: "focuslight.db")
    pub fn load() -> Self {
        Self::from_lookup(|key| env::var(key).ok())
    }

    fn from_lookup<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut cfg = Self::default();

        if let Some(port_str) = lookup("FOCUSLIGHT_HTTP_PORT") {
            match port_str.parse() {
                Ok(port) => cfg.http_port = port,
                Err(_) => tracing::warn!("Ignoring invalid FOCUSLIGHT_HTTP_PORT={:?}", port_str),
            }
        }

        if let Some(db_path) = lookup("FOCUSLIGHT_DB_PATH") {
            cfg.db_path = db_path;
        }

        cfg
    }
}
