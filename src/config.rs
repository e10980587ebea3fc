use clap::{ArgAction, Parser};
use std::path::PathBuf;
use std::time::Duration;

use crate::aof::DEFAULT_SYNC_INTERVAL;
use crate::codec::DEFAULT_MAX_FRAME_SIZE;

pub const HOST: &str = "127.0.0.1";
pub const PORT: u16 = 6379;
pub const AOF_PATH: &str = "database.aof";

#[derive(Parser, Debug, Clone, PartialEq)]
#[command(version, about)]
pub struct Config {
    /// The address to listen on
    #[arg(long, env = "RUSTDIS_HOST", default_value = HOST)]
    pub host: String,

    /// The port to listen on
    #[arg(short, long, env = "RUSTDIS_PORT", default_value_t = PORT)]
    pub port: u16,

    /// Where write commands are logged and replayed from on start
    #[arg(long, env = "RUSTDIS_AOF_PATH", default_value = AOF_PATH)]
    pub aof_path: PathBuf,

    /// Persist write commands to the append-only file
    #[arg(long, env = "RUSTDIS_APPENDONLY", default_value_t = true, action = ArgAction::Set)]
    pub appendonly: bool,

    /// How often the append-only file is forced to disk, in milliseconds
    #[arg(long, env = "RUSTDIS_SYNC_INTERVAL_MS", default_value_t = DEFAULT_SYNC_INTERVAL.as_millis() as u64)]
    pub sync_interval_ms: u64,

    /// Largest frame a client may send, in bytes
    #[arg(long, env = "RUSTDIS_MAX_FRAME_SIZE", default_value_t = DEFAULT_MAX_FRAME_SIZE)]
    pub max_frame_size: usize,
}

impl Config {
    pub fn sync_interval(&self) -> Duration {
        Duration::from_millis(self.sync_interval_ms)
    }
}

impl Default for Config {
    fn default() -> Self {
        Config {
            host: HOST.to_string(),
            port: PORT,
            aof_path: PathBuf::from(AOF_PATH),
            appendonly: true,
            sync_interval_ms: DEFAULT_SYNC_INTERVAL.as_millis() as u64,
            max_frame_size: DEFAULT_MAX_FRAME_SIZE,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn flags() {
        let config = Config::try_parse_from([
            "rustdis",
            "--port",
            "7000",
            "--aof-path",
            "/tmp/x.aof",
            "--appendonly",
            "false",
            "--sync-interval-ms",
            "250",
        ])
        .unwrap();

        assert_eq!(config.port, 7000);
        assert_eq!(config.aof_path, PathBuf::from("/tmp/x.aof"));
        assert!(!config.appendonly);
        assert_eq!(config.sync_interval(), Duration::from_millis(250));
    }

    #[test]
    fn invalid_port() {
        assert!(Config::try_parse_from(["rustdis", "--port", "http"]).is_err());
    }

    #[test]
    fn default_interval_is_one_second() {
        assert_eq!(Config::default().sync_interval(), Duration::from_secs(1));
    }
}
