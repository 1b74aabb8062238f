// ============================
// crates/gateway-lib/src/config.rs
// ============================
//! Configuration management.
use std::net::SocketAddr;
use std::path::PathBuf;

use anyhow::Result;
use figment::{
    providers::{Env, Format, Serialized, Toml},
    Figment,
};
use serde::{Deserialize, Serialize};

/// Application settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Settings {
    /// Server bind address
    pub bind_addr: SocketAddr,
    /// Data directory path
    pub data_dir: PathBuf,
    /// Log level
    pub log_level: String,
    /// Delay before a whiteboard snapshot is pushed to a fresh
    /// whiteboard subscriber, giving the client time to mount its
    /// canvas before state arrives.
    pub whiteboard_sync_delay_ms: u64,
    /// Base endpoint baked into issued video conference tokens.
    pub conference_endpoint: String,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            bind_addr: "127.0.0.1:8080".parse().expect("valid literal addr"),
            data_dir: PathBuf::from("data"),
            log_level: "info".to_string(),
            whiteboard_sync_delay_ms: 500,
            conference_endpoint: "wss://conference.local".to_string(),
        }
    }
}

/// Load settings: built-in defaults, overridden by `config.toml`,
/// overridden by `STUDYROOM_`-prefixed environment variables.
pub fn load_settings() -> Result<Settings> {
    let settings = Figment::from(Serialized::defaults(Settings::default()))
        .merge(Toml::file("config.toml"))
        .merge(Env::prefixed("STUDYROOM_"))
        .extract()?;

    Ok(settings)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_sensible() {
        let settings = Settings::default();
        assert_eq!(settings.bind_addr.port(), 8080);
        assert_eq!(settings.data_dir, PathBuf::from("data"));
        assert_eq!(settings.whiteboard_sync_delay_ms, 500);
    }

    #[test]
    fn load_without_config_file_yields_defaults() {
        let settings = load_settings().unwrap();
        assert_eq!(settings.log_level, "info");
    }
}
