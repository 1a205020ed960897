//! Command-line argument parsing
//!
//! Every option here wins over the matching `DF_PLUGIN_*` environment
//! variable, and both win over the configuration file.

use clap::Parser;
use std::path::PathBuf;

/// Command-line arguments for the greeter plugin
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
pub struct Args {
    /// Greeter settings file
    ///
    /// Missing files are written out with the greeter's defaults on first start.
    #[arg(short, long, default_value = "greeter.toml")]
    pub config: PathBuf,

    /// Host address
    ///
    /// `tcp://host:port`, `host:port`, `unix:///path` or an absolute socket path.
    #[arg(short, long)]
    pub address: Option<String>,

    /// Plugin identifier announced to the host
    #[arg(short, long)]
    pub plugin_id: Option<String>,

    /// Log level (trace, debug, info, warn, error)
    #[arg(short, long)]
    pub log_level: Option<String>,

    /// Output logs in JSON format
    #[arg(long)]
    pub json_logs: bool,
}

impl Default for Args {
    fn default() -> Self {
        Self {
            config: PathBuf::from("greeter.toml"),
            address: None,
            plugin_id: None,
            log_level: None,
            json_logs: false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_args_default() {
        let args = Args::default();
        assert_eq!(args.config, PathBuf::from("greeter.toml"));
        assert!(args.address.is_none());
        assert!(args.plugin_id.is_none());
        assert!(!args.json_logs);
    }

    #[test]
    fn test_args_parse_overrides() {
        let args = Args::parse_from([
            "plugin_greeter",
            "--config",
            "custom.toml",
            "--address",
            "tcp://127.0.0.1:50051",
            "--plugin-id",
            "greeter-2",
            "--json-logs",
        ]);
        assert_eq!(args.config, PathBuf::from("custom.toml"));
        assert_eq!(args.address.as_deref(), Some("tcp://127.0.0.1:50051"));
        assert_eq!(args.plugin_id.as_deref(), Some("greeter-2"));
        assert!(args.json_logs);
        assert!(args.log_level.is_none());
    }
}
