use std::net::{IpAddr, SocketAddr};
use std::path::PathBuf;
use std::time::Duration;

use clap::{Parser, ValueEnum};

/// What to do when writing to a client fails
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum WriteFailurePolicy {
    /// Stop the whole server
    Abort,
    /// Treat it as that client disconnecting
    Disconnect,
}

/// Turn-based duel server for line-mode and character-mode telnet clients
#[derive(Debug, Clone, Parser)]
#[command(name = "arena-server", version)]
pub struct Config {
    /// Port to listen on
    #[arg(long, default_value_t = 30100)]
    pub port: u16,

    /// Address to bind
    #[arg(long, default_value = "0.0.0.0")]
    pub bind: IpAddr,

    /// Pending-connection queue length
    #[arg(long, default_value_t = 5)]
    pub backlog: u32,

    /// Seconds without client activity before logging an idle notice
    #[arg(long, default_value_t = 10)]
    pub idle_timeout_secs: u64,

    /// Seed for hitpoints, turn order and damage rolls
    #[arg(long)]
    pub seed: Option<u64>,

    /// A failed or backed-up write to any client stops the server unless
    /// this is `disconnect`
    #[arg(long, value_enum, default_value_t = WriteFailurePolicy::Abort)]
    pub on_write_failure: WriteFailurePolicy,

    /// Default log filter, overridden by RUST_LOG
    #[arg(long, default_value = "info")]
    pub log_level: String,

    /// Also write a daily-rolling log file into this directory
    #[arg(long)]
    pub log_dir: Option<PathBuf>,
}

impl Config {
    pub fn addr(&self) -> SocketAddr {
        SocketAddr::new(self.bind, self.port)
    }

    pub fn idle_timeout(&self) -> Duration {
        Duration::from_secs(self.idle_timeout_secs)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults() {
        let config = Config::parse_from(["arena-server"]);
        assert_eq!(config.addr(), "0.0.0.0:30100".parse().unwrap());
        assert_eq!(config.backlog, 5);
        assert_eq!(config.idle_timeout(), Duration::from_secs(10));
        assert_eq!(config.on_write_failure, WriteFailurePolicy::Abort);
        assert_eq!(config.seed, None);
        assert!(config.log_dir.is_none());
    }

    #[test]
    fn overrides() {
        let config = Config::parse_from([
            "arena-server",
            "--port",
            "4000",
            "--bind",
            "127.0.0.1",
            "--seed",
            "9",
            "--on-write-failure",
            "disconnect",
        ]);
        assert_eq!(config.addr(), "127.0.0.1:4000".parse().unwrap());
        assert_eq!(config.seed, Some(9));
        assert_eq!(config.on_write_failure, WriteFailurePolicy::Disconnect);
    }

    #[test]
    fn rejects_unknown_policy() {
        assert!(Config::try_parse_from(["arena-server", "--on-write-failure", "retry"]).is_err());
    }
}
