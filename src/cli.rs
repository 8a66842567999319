use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};

#[derive(Debug, Clone, Parser)]
#[command(name = "amazonq-api-rs", version, about = "Amazon Q to OpenAI/Anthropic API bridge (Rust)")]
pub struct Cli {
    #[command(subcommand)]
    pub command: Option<Command>,

    #[arg(long, default_value = "127.0.0.1:8000")]
    pub addr: String,

    /// TOML configuration file
    #[arg(long)]
    pub config: Option<PathBuf>,

    /// Credentials JSON file (overrides config and the default data dir)
    #[arg(long)]
    pub credentials: Option<PathBuf>,

    /// Keep credentials in memory only
    #[arg(long, default_value_t = false)]
    pub memory_store: bool,

    #[arg(long, short = 'v', default_value_t = false)]
    pub verbose: bool,

    #[arg(long, default_value_t = false)]
    pub proxy_env: bool,

    /// Take refreshed tokens from the Amazon Q CLI database before using the refresh grant
    #[arg(long, default_value_t = false)]
    pub use_cli_db: bool,
}

#[derive(Debug, Clone, Subcommand)]
pub enum Command {
    /// Start the server
    Start,
    /// Refresh the access token once and exit
    RefreshToken,
    /// Print debug information
    Debug(DebugArgs),
    /// Import credentials from an Amazon Q CLI login
    ImportCli(ImportCliArgs),
}

#[derive(Debug, Clone, Args)]
pub struct DebugArgs {
    #[arg(long, default_value_t = false)]
    pub json: bool,
}

#[derive(Debug, Clone, Args)]
pub struct ImportCliArgs {
    /// Path to the CLI's data.sqlite3 (defaults to the platform location)
    #[arg(long)]
    pub db: Option<PathBuf>,

    /// Print the extracted fields as JSON instead of saving them
    #[arg(long, default_value_t = false)]
    pub print: bool,
}

#[cfg(test)]
mod tests {
    use super::{Cli, Command};
    use clap::Parser;

    #[test]
    fn defaults_to_serving_on_local_port() {
        let cli = Cli::parse_from(["amazonq-api-rs"]);
        assert!(cli.command.is_none());
        assert_eq!(cli.addr, "127.0.0.1:8000");
        assert!(!cli.memory_store);
    }

    #[test]
    fn parses_subcommands_and_flags() {
        let cli = Cli::parse_from(["amazonq-api-rs", "--memory-store", "-v", "debug", "--json"]);
        assert!(cli.memory_store && cli.verbose);
        assert!(matches!(cli.command, Some(Command::Debug(ref args)) if args.json));

        let cli = Cli::parse_from(["amazonq-api-rs", "--credentials", "/tmp/c.json", "refresh-token"]);
        assert!(matches!(cli.command, Some(Command::RefreshToken)));
        assert_eq!(cli.credentials.as_deref(), Some(std::path::Path::new("/tmp/c.json")));

        let cli = Cli::parse_from(["amazonq-api-rs", "--use-cli-db", "import-cli", "--db", "/tmp/q.sqlite3", "--print"]);
        assert!(cli.use_cli_db);
        match cli.command {
            Some(Command::ImportCli(args)) => {
                assert!(args.print);
                assert_eq!(args.db.as_deref(), Some(std::path::Path::new("/tmp/q.sqlite3")));
            }
            other => panic!("expected import-cli, got {other:?}"),
        }
    }
}
