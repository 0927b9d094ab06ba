//! Tollgate - capability-restricting API gateway
//!
//! `tollgate serve` runs the gateway in the foreground. `tollgate keys ...`
//! administers the API key file that callers authenticate against.

#![deny(unsafe_code)]
#![deny(missing_docs)]
#![deny(clippy::all)]
#![warn(unreachable_pub)]
#![deny(clippy::unwrap_used)]
#![cfg_attr(test, allow(clippy::unwrap_used))]

use std::path::PathBuf;

use anyhow::Result;
use clap::{ArgGroup, Args, Parser, Subcommand};
use tollgate_approval::ConfirmationMode;
use tollgate_config::{ChannelKind, Config, ConfigOverrides};
use tollgate_keys::FileKeyStore;

mod commands;
mod config_bridge;
mod theme;

use commands::{keys, serve};

/// Tollgate - capability-restricting API gateway
#[derive(Debug, Parser)]
#[command(name = "tollgate")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Path to a TOML configuration file
    #[arg(short, long, global = true, env = "TOLLGATE_CONFIG")]
    config: Option<PathBuf>,

    /// Enable debug logging
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Debug, Subcommand)]
enum Commands {
    /// Run the gateway in the foreground
    Serve(ServeArgs),

    /// Manage caller API keys
    Keys {
        /// API key file
        #[arg(long, global = true, env = "TOLLGATE_API_KEYS_FILE")]
        api_keys_file: Option<PathBuf>,

        #[command(subcommand)]
        command: KeyCommands,
    },
}

#[derive(Debug, Args)]
#[command(group(
    ArgGroup::new("confirmation_mode").args(["confirm_all", "confirm_modify", "no_confirm"])
))]
struct ServeArgs {
    /// Address to listen on
    #[arg(long, env = "TOLLGATE_HOST")]
    host: Option<String>,

    /// Port to listen on
    #[arg(short, long, env = "TOLLGATE_PORT")]
    port: Option<u16>,

    /// API key file
    #[arg(long, env = "TOLLGATE_API_KEYS_FILE")]
    api_keys_file: Option<PathBuf>,

    /// OAuth token file holding the backend credential
    #[arg(long, env = "TOLLGATE_TOKEN_FILE")]
    token_file: Option<PathBuf>,

    /// Ask the operator before every allowed request, reads included
    #[arg(long)]
    confirm_all: bool,

    /// Ask the operator before modifying requests only
    #[arg(long)]
    confirm_modify: bool,

    /// Forward allowed requests without asking
    #[arg(long)]
    no_confirm: bool,

    /// Take decisions in a browser on the operator port instead of the terminal
    #[arg(long)]
    web_confirm: bool,

    /// Operator port for --web-confirm
    #[arg(long, env = "TOLLGATE_WEB_PORT")]
    web_port: Option<u16>,

    /// Seconds to wait for a decision before refusing the request
    #[arg(long, env = "TOLLGATE_CONFIRMATION_TIMEOUT", value_name = "SECS")]
    confirmation_timeout: Option<u64>,

    /// Log level
    #[arg(long, env = "TOLLGATE_LOG_LEVEL")]
    log_level: Option<String>,

    /// Write logs to this file instead of stderr
    #[arg(long, env = "TOLLGATE_LOG_FILE")]
    log_file: Option<PathBuf>,
}

impl ServeArgs {
    fn confirmation_mode(&self) -> Option<ConfirmationMode> {
        if self.confirm_all {
            Some(ConfirmationMode::All)
        } else if self.confirm_modify {
            Some(ConfirmationMode::ModifyOnly)
        } else if self.no_confirm {
            Some(ConfirmationMode::None)
        } else {
            None
        }
    }

    fn overrides(&self) -> ConfigOverrides {
        ConfigOverrides {
            host: self.host.clone(),
            port: self.port,
            keys_file: self.api_keys_file.clone(),
            token_file: self.token_file.clone(),
            confirmation_mode: self.confirmation_mode().map(|m| m.to_string()),
            confirmation_timeout_secs: self.confirmation_timeout,
            confirmation_channel: self.web_confirm.then_some(ChannelKind::Web),
            web_port: self.web_port,
            log_level: self.log_level.clone(),
            log_file: self.log_file.clone(),
        }
    }
}

#[derive(Debug, Subcommand)]
enum KeyCommands {
    /// Create a key and print it once
    Create {
        /// Key name
        #[arg(long)]
        name: String,
    },
    /// List keys
    List,
    /// Show one key, masked
    Show {
        /// Key name
        #[arg(long)]
        name: String,
    },
    /// Allow a disabled key again
    Enable {
        /// Key name
        #[arg(long)]
        name: String,
    },
    /// Refuse a key without deleting it
    Disable {
        /// Key name
        #[arg(long)]
        name: String,
    },
    /// Delete a key permanently
    Revoke {
        /// Key name
        #[arg(long)]
        name: String,
        /// Skip the confirmation prompt
        #[arg(short, long)]
        yes: bool,
    },
}

impl Cli {
    fn overrides(&self) -> ConfigOverrides {
        let mut overrides = match &self.command {
            Commands::Serve(args) => args.overrides(),
            Commands::Keys { api_keys_file, .. } => ConfigOverrides {
                keys_file: api_keys_file.clone(),
                ..ConfigOverrides::default()
            },
        };
        if self.verbose && overrides.log_level.is_none() {
            overrides.log_level = Some("debug".to_owned());
        }
        overrides
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let config = Config::load(cli.config.as_deref(), &cli.overrides())?;

    let mut log_config = config_bridge::to_log_config(&config.logging)?;
    // Key administration talks to a person; keep the store's info lines out of it.
    if matches!(cli.command, Commands::Keys { .. }) && !cli.verbose {
        "warn".clone_into(&mut log_config.level);
    }
    let _log_guard = match tollgate_telemetry::setup_logging(&log_config) {
        Ok(guard) => Some(guard),
        Err(e) => {
            eprintln!("Failed to initialize logging: {e}");
            None
        },
    };

    match cli.command {
        Commands::Serve(_) => serve::run_serve(&config).await?,
        Commands::Keys { command, .. } => {
            handle_keys(&FileKeyStore::new(&config.keys.file), command)?;
        },
    }

    Ok(())
}

fn handle_keys(store: &FileKeyStore, command: KeyCommands) -> Result<()> {
    match command {
        KeyCommands::Create { name } => keys::create_key(store, &name),
        KeyCommands::List => keys::list_keys(store),
        KeyCommands::Show { name } => keys::show_key(store, &name),
        KeyCommands::Enable { name } => keys::set_enabled(store, &name, true),
        KeyCommands::Disable { name } => keys::set_enabled(store, &name, false),
        KeyCommands::Revoke { name, yes } => keys::revoke_key(store, &name, yes),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    fn parse(args: &[&str]) -> Result<Cli, clap::Error> {
        Cli::try_parse_from(std::iter::once("tollgate").chain(args.iter().copied()))
    }

    #[test]
    fn test_cli_definition_is_consistent() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_serve_flags_become_overrides() {
        let cli = parse(&[
            "serve",
            "--port",
            "9100",
            "--api-keys-file",
            "/etc/tollgate/keys.json",
            "--no-confirm",
            "--web-confirm",
            "--confirmation-timeout",
            "60",
        ])
        .unwrap();
        let overrides = cli.overrides();
        assert_eq!(overrides.port, Some(9100));
        assert_eq!(
            overrides.keys_file,
            Some(PathBuf::from("/etc/tollgate/keys.json"))
        );
        assert_eq!(overrides.confirmation_mode.as_deref(), Some("none"));
        assert_eq!(overrides.confirmation_channel, Some(ChannelKind::Web));
        assert_eq!(overrides.confirmation_timeout_secs, Some(60));
        assert_eq!(overrides.host, None);
    }

    #[test]
    fn test_serve_without_flags_leaves_config_alone() {
        let cli = parse(&["serve"]).unwrap();
        assert_eq!(cli.overrides(), ConfigOverrides::default());
    }

    #[test]
    fn test_confirmation_flags_are_exclusive() {
        let err = parse(&["serve", "--confirm-all", "--no-confirm"]).unwrap_err();
        assert_eq!(err.kind(), clap::error::ErrorKind::ArgumentConflict);

        for (flag, mode) in [
            ("--confirm-all", "all"),
            ("--confirm-modify", "modify"),
            ("--no-confirm", "none"),
        ] {
            let cli = parse(&["serve", flag]).unwrap();
            assert_eq!(cli.overrides().confirmation_mode.as_deref(), Some(mode));
        }
    }

    #[test]
    fn test_verbose_raises_log_level_unless_given() {
        let cli = parse(&["-v", "serve"]).unwrap();
        assert_eq!(cli.overrides().log_level.as_deref(), Some("debug"));

        let cli = parse(&["serve", "-v", "--log-level", "trace"]).unwrap();
        assert_eq!(cli.overrides().log_level.as_deref(), Some("trace"));
    }

    #[test]
    fn test_keys_commands_parse() {
        let cli = parse(&["keys", "revoke", "--name", "mail-agent", "--yes"]).unwrap();
        assert!(matches!(
            cli.command,
            Commands::Keys {
                command: KeyCommands::Revoke { ref name, yes: true },
                ..
            } if name == "mail-agent"
        ));

        let cli = parse(&["keys", "list", "--api-keys-file", "keys.json"]).unwrap();
        assert_eq!(
            cli.overrides().keys_file,
            Some(PathBuf::from("keys.json"))
        );

        assert!(parse(&["keys", "create"]).is_err());
    }
}
