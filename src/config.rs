use clap::{ArgAction, Parser};

use crate::codec::FrameCodec;

pub const DEFAULT_HOST: &str = "127.0.0.1";
pub const DEFAULT_PORT: u16 = 6379;

/// Server configuration. Every option can also be set through its environment variable.
#[derive(Parser, Debug, Clone, PartialEq)]
#[command(version, about)]
pub struct Config {
    /// The address to listen on
    #[arg(long, env = "STREAMDIS_HOST", default_value = DEFAULT_HOST)]
    pub host: String,

    /// The port to listen on
    #[arg(short, long, env = "STREAMDIS_PORT", default_value_t = DEFAULT_PORT)]
    pub port: u16,

    /// Largest request, in bytes, buffered while waiting for it to be complete
    #[arg(
        long,
        env = "STREAMDIS_MAX_FRAME_SIZE",
        default_value_t = FrameCodec::DEFAULT_MAX_FRAME_SIZE
    )]
    pub max_frame_size: usize,

    /// Evict expired keys in the background, instead of only when they are accessed
    #[arg(
        long,
        env = "STREAMDIS_ACTIVE_EXPIRY",
        default_value_t = true,
        action = ArgAction::Set
    )]
    pub active_expiry: bool,
}

impl Default for Config {
    fn default() -> Self {
        Config {
            host: DEFAULT_HOST.to_string(),
            port: DEFAULT_PORT,
            max_frame_size: FrameCodec::DEFAULT_MAX_FRAME_SIZE,
            active_expiry: true,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn verify_cli() {
        Config::command().debug_assert();
    }

    #[test]
    fn flags() {
        let config = Config::try_parse_from([
            "streamdis",
            "--host",
            "0.0.0.0",
            "-p",
            "7000",
            "--max-frame-size",
            "1024",
            "--active-expiry",
            "false",
        ])
        .unwrap();

        assert_eq!(
            config,
            Config {
                host: "0.0.0.0".to_string(),
                port: 7000,
                max_frame_size: 1024,
                active_expiry: false,
            }
        );
    }

    #[test]
    fn invalid_port() {
        assert!(Config::try_parse_from(["streamdis", "--port", "http"]).is_err());
    }
}
