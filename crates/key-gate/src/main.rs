use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::sync::Arc;

use api_key::{KeyFilter, OwnerId};
use chrono::{Duration, Utc};
use clap::{Args, Parser, Subcommand};
use key_gate::admin::{AdminConsole, table_header};
use key_gate::configuration::ServerConfig;
use key_gate::error::{Error, Result};
use key_gate::metric::Metrics;
use key_gate::server::Server;
use key_gate::sqlite::SqliteRepository;
use pingora::server::configuration::Opt;

#[derive(Parser, Debug)]
#[command(name = "key-gate", version, about = "Issue, revoke and enforce API keys")]
struct Cli {
    /// Path to the YAML config file.
    #[arg(short, long, global = true, default_value = "key-gate.yaml")]
    config: PathBuf,

    #[command(subcommand)]
    command: Command,
}

/// pingora's own process flags, exposed on `serve`.
#[derive(Args, Debug)]
struct ServeArgs {
    /// Upgrade from a running old server.
    #[arg(short, long)]
    upgrade: bool,
    /// Run in the background.
    #[arg(short, long)]
    daemon: bool,
    /// Test the configuration and exit.
    #[arg(short, long)]
    test: bool,
    /// pingora server config (threads, pid file, upgrade socket).
    #[arg(long)]
    pingora_conf: Option<String>,
}

impl From<ServeArgs> for Opt {
    fn from(args: ServeArgs) -> Self {
        Opt {
            upgrade: args.upgrade,
            daemon: args.daemon,
            test: args.test,
            conf: args.pingora_conf,
            ..Opt::default()
        }
    }
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Run the authenticating reverse proxy.
    Serve(ServeArgs),
    /// Issue a new key. The key is printed once and cannot be shown again.
    Create {
        #[arg(long)]
        owner: String,
    },
    /// List keys (never shows secret material).
    List {
        #[arg(long)]
        owner: Option<String>,
        /// Only revoked keys.
        #[arg(long, conflicts_with = "active")]
        revoked: bool,
        /// Only active keys.
        #[arg(long)]
        active: bool,
        /// Only keys created in the last N days.
        #[arg(long, value_name = "DAYS")]
        since_days: Option<u32>,
        #[arg(long)]
        json: bool,
    },
    /// Revoke one or more keys by prefix.
    Revoke {
        #[arg(required = true)]
        ids: Vec<String>,
    },
    /// Administrative override: re-activate a revoked key.
    Reactivate { id: String },
    /// Permanently delete a key record.
    Delete {
        id: String,
        #[arg(long)]
        yes: bool,
    },
    /// Check a key and print its owner.
    Verify { key: String },
}

fn main() -> ExitCode {
    // Enable basic logging; set RUST_LOG=info for visibility.
    env_logger::init();

    let cli = Cli::parse();
    match run(cli) {
        Ok(code) => code,
        Err(e) => {
            eprintln!("error: {e}");
            ExitCode::FAILURE
        }
    }
}

fn run(cli: Cli) -> Result<ExitCode> {
    let config = ServerConfig::load(&cli.config)?;
    let base_path = cli
        .config
        .parent()
        .map(Path::to_path_buf)
        .unwrap_or_default();

    match cli.command {
        Command::Serve(args) => serve(args, &config, &base_path),
        command => administer(command, &config, &base_path),
    }
}

fn serve(args: ServeArgs, config: &ServerConfig, base_path: &Path) -> Result<ExitCode> {
    let mut server = Server::new(Some(args.into()))?;
    server.bootstrap(config, base_path, Arc::new(Metrics::default()))?;
    server.run_forever();
    Ok(ExitCode::SUCCESS)
}

fn administer(command: Command, config: &ServerConfig, base_path: &Path) -> Result<ExitCode> {
    let repo = Arc::new(SqliteRepository::open(config.database_path(base_path))?);
    let console = AdminConsole::new(repo, &config.api_key)?;

    match command {
        Command::Serve(args) => return serve(args, config, base_path),
        Command::Create { owner } => {
            let issued = console.create_key(&OwnerId::new(owner))?;
            eprintln!("WARNING: {}", issued.warning());
            println!("{}", issued.plaintext.expose());
        }
        Command::List {
            owner,
            revoked,
            active,
            since_days,
            json,
        } => {
            let mut filter = KeyFilter::default();
            if let Some(owner) = owner {
                filter = filter.owner(OwnerId::new(owner));
            }
            if revoked || active {
                filter = filter.revoked(revoked);
            }
            if let Some(days) = since_days {
                filter = filter.created_since(Utc::now() - Duration::days(i64::from(days)));
            }
            let rows = console.list_keys(&filter)?;
            if json {
                println!("{}", serde_json::to_string_pretty(&rows)?);
            } else {
                println!("{}", table_header());
                for row in rows {
                    println!("{row}");
                }
            }
        }
        Command::Revoke { ids } => {
            let found = console.revoke_keys(&ids)?;
            println!("Revoked {found} of {} API keys", ids.len());
            if found < ids.len() {
                return Ok(ExitCode::FAILURE);
            }
        }
        Command::Reactivate { id } => {
            console.reactivate_key(&id)?;
            println!("Re-activated {id}");
        }
        Command::Delete { id, yes } => {
            if !yes {
                return Err(Error::NotConfirmed("delete a key"));
            }
            console.delete_key(&id)?;
            println!("Deleted {id}");
        }
        Command::Verify { key } => match console.authenticate(&key) {
            Ok(owner) => println!("{owner}"),
            Err(e) => {
                eprintln!("{e}");
                return Ok(ExitCode::FAILURE);
            }
        },
    }

    Ok(ExitCode::SUCCESS)
}
