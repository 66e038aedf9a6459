//! Procesure CLI - Windows remote access provisioning
//!
//! Usage:
//!   procesure install                 - Provision server, agent and RDP
//!   procesure sshd match-user <user>  - Upsert a Match User block in sshd_config
//!   procesure supervise               - Keep the server and agent running

mod commands;
mod config;

use anyhow::{bail, Result};
use clap::{Parser, Subcommand};
use commands::install::ComponentKind;
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

/// Procesure - remote access provisioning for Windows machines
#[derive(Parser)]
#[command(name = "procesure")]
#[command(author = "Procesure Team")]
#[command(version)]
#[command(about = "Provision a private SSH server, tunnel agent and RDP on this machine")]
#[command(long_about = r#"
Procesure sets up a Windows machine for remote access.

Write a config file once:
  $ procesure config init

Then provision everything:
  $ procesure install

And keep the server and agent alive:
  $ procesure supervise
"#)]
struct Cli {
    /// Enable verbose output
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Installation config file (defaults to the user config directory)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Provision the components described by the config file
    Install {
        /// Only install these components (repeatable)
        #[arg(long, value_enum)]
        only: Vec<ComponentKind>,

        /// Don't ask for confirmation
        #[arg(short, long)]
        yes: bool,
    },

    /// Edit sshd_config
    Sshd {
        #[command(subcommand)]
        action: SshdAction,
    },

    /// Restart the server and agent whenever they stop
    Supervise {
        /// Seconds between liveness checks
        #[arg(short, long, default_value_t = procesure_core::DEFAULT_CHECK_INTERVAL.as_secs(),
              value_parser = clap::value_parser!(u64).range(1..))]
        interval: u64,
    },

    /// Manage the installation config file
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },
}

#[derive(Subcommand)]
enum SshdAction {
    /// Insert or replace the Match User block for a user
    MatchUser {
        /// Account the block applies to
        user: String,

        /// sshd_config to edit (defaults to the installed server's)
        #[arg(short, long)]
        file: Option<PathBuf>,

        /// AuthorizedKeysFile value (defaults to the user's Procesure keys file)
        #[arg(short, long)]
        keys_file: Option<String>,
    },
}

#[derive(Subcommand)]
enum ConfigAction {
    /// Write a config file with default values
    Init {
        /// Overwrite an existing file
        #[arg(long)]
        force: bool,
    },
    /// Print the current configuration (secrets masked)
    Show,
    /// Show config file path
    Path,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Set up logging
    let filter = if cli.verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::new("info")
    };

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .without_time()
        .with_target(false)
        .init();

    match cli.command {
        Commands::Install { only, yes } => commands::install::run(cli.config, only, yes).await,
        Commands::Sshd { action } => match action {
            SshdAction::MatchUser {
                user,
                file,
                keys_file,
            } => commands::sshd::match_user(user, file, keys_file, cli.config).await,
        },
        Commands::Supervise { interval } => commands::supervise::run(interval, cli.config).await,
        Commands::Config { action } => run_config(action, cli.config),
    }
}

fn run_config(action: ConfigAction, config_path: Option<PathBuf>) -> Result<()> {
    use colored::Colorize;

    let file = config::ConfigFile::locate(config_path)?;

    match action {
        ConfigAction::Init { force } => {
            if file.exists() && !force {
                bail!(
                    "Config already exists at {} (use --force to overwrite)",
                    file.path().display()
                );
            }
            file.save(&procesure_core::InstallationConfig::default())?;
            println!(
                "{} Wrote default config to {}",
                "✓".green(),
                file.path().display().to_string().cyan()
            );
            println!();
            println!("Fill in the server, agent and rdp sections, then run: {}", "procesure install".cyan());
        }
        ConfigAction::Show => {
            if !file.exists() {
                println!("{}", "No config file yet.".dimmed());
                println!();
                println!("Create one with: {}", "procesure config init".cyan());
                return Ok(());
            }

            let cfg = file.load()?;
            println!("{}", config::redacted_json(&cfg)?);

            let problems = cfg.problems();
            if !problems.is_empty() {
                println!();
                println!("{}", "Problems:".bold());
                for problem in &problems {
                    println!("  {} {}", "•".yellow(), problem);
                }
            }
        }
        ConfigAction::Path => {
            println!("{}", file.path().display());
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_cli_parsing() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_install_defaults() {
        let cli = Cli::try_parse_from(["procesure", "install"]).unwrap();
        assert!(cli.config.is_none());
        match cli.command {
            Commands::Install { only, yes } => {
                assert!(only.is_empty());
                assert!(!yes);
            }
            _ => panic!("Expected Install command"),
        }
    }

    #[test]
    fn test_install_only_components() {
        let cli = Cli::try_parse_from([
            "procesure", "install",
            "--only", "server",
            "--only", "rdp",
            "--yes",
            "--config", "C:/procesure.json",
        ])
        .unwrap();
        assert_eq!(cli.config, Some(PathBuf::from("C:/procesure.json")));
        match cli.command {
            Commands::Install { only, yes } => {
                assert_eq!(only, vec![ComponentKind::Server, ComponentKind::Rdp]);
                assert!(yes);
            }
            _ => panic!("Expected Install command"),
        }
    }

    #[test]
    fn test_install_rejects_unknown_component() {
        assert!(Cli::try_parse_from(["procesure", "install", "--only", "vpn"]).is_err());
    }

    #[test]
    fn test_sshd_match_user() {
        let cli = Cli::try_parse_from([
            "procesure", "sshd", "match-user", "alice",
            "--file", "/tmp/sshd_config",
        ])
        .unwrap();
        match cli.command {
            Commands::Sshd {
                action: SshdAction::MatchUser { user, file, keys_file },
            } => {
                assert_eq!(user, "alice");
                assert_eq!(file, Some(PathBuf::from("/tmp/sshd_config")));
                assert!(keys_file.is_none());
            }
            _ => panic!("Expected Sshd command"),
        }
    }

    #[test]
    fn test_supervise_defaults() {
        let cli = Cli::try_parse_from(["procesure", "supervise"]).unwrap();
        match cli.command {
            Commands::Supervise { interval } => assert_eq!(interval, 60),
            _ => panic!("Expected Supervise command"),
        }
    }

    #[test]
    fn test_supervise_rejects_zero_interval() {
        assert!(Cli::try_parse_from(["procesure", "supervise", "--interval", "0"]).is_err());
    }

    #[test]
    fn test_config_init_force() {
        let cli = Cli::try_parse_from(["procesure", "config", "init", "--force"]).unwrap();
        match cli.command {
            Commands::Config {
                action: ConfigAction::Init { force },
            } => assert!(force),
            _ => panic!("Expected Config init"),
        }
    }

    #[test]
    fn test_verbose_flag() {
        let cli = Cli::try_parse_from(["procesure", "-v", "config", "path"]).unwrap();
        assert!(cli.verbose);
    }
}
