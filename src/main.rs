//! Binary entrypoint for the Threadboard CLI.
//!
//! Commands:
//! - `start [--bind <addr>]` - run the web server
//! - `init` - create a starter `config.toml` and the default categories
//! - `status` - print forum totals
//! - `create-admin` - interactively create (or reset) the administrator account
//! - `set-level <user> <level>` - change a user's role
//! - `audit [--page N]` - show the moderation audit trail
//!
//! See the library crate docs for module‑level details: `threadboard::`.
use anyhow::{anyhow, Result};
use clap::{Parser, Subcommand};
use log::{info, warn};

use threadboard::config::Config;
use threadboard::roles;
use threadboard::storage::StorageError;
use threadboard::web::{open_storage, ForumServer};

#[derive(Parser)]
#[command(name = "threadboard")]
#[command(about = "A discussion forum with categories, threads and private messages")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Configuration file path (can be used before or after subcommand)
    #[arg(short, long, default_value = "config.toml", global = true)]
    config: String,

    /// Verbose logging (-v, -vv for more; may appear before or after subcommand)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,
}

#[derive(Subcommand)]
enum Commands {
    /// Start the web server
    Start {
        /// Listen address, overriding server.bind (e.g. 0.0.0.0:8080)
        #[arg(short, long)]
        bind: Option<String>,
    },
    /// Write a default configuration and seed the default categories
    Init,
    /// Show forum statistics
    Status,
    /// Create the administrator named in forum.admin, or reset its password
    CreateAdmin {
        /// Email address for a newly created account
        #[arg(short, long, default_value = "admin@localhost.localdomain")]
        email: String,
    },
    /// Change a user's role (user, moderator, admin or a numeric level)
    SetLevel { username: String, level: String },
    /// Print the moderation audit trail, newest first
    Audit {
        #[arg(short, long, default_value_t = 1)]
        page: usize,
    },
}

const DEFAULT_CATEGORIES: &[&str] = &["Announcements", "General", "Help"];

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Init runs before a config file exists
    let pre_config = match cli.command {
        Commands::Init => None,
        _ => Some(Config::load(&cli.config).await?),
    };
    init_logging(&pre_config, cli.verbose);

    match (cli.command, pre_config) {
        (Commands::Init, _) => {
            info!("Initializing new forum configuration");
            if std::path::Path::new(&cli.config).exists() {
                return Err(anyhow!("{} already exists; refusing to overwrite", cli.config));
            }
            Config::create_default(&cli.config).await?;
            info!("Configuration file created at {}", cli.config);

            let config = Config::load(&cli.config).await?;
            let mut storage = open_storage(&config).await?;
            for name in DEFAULT_CATEGORIES {
                match storage.create_category(name, None).await {
                    Ok(c) => info!("Created category {}", c.slug),
                    Err(StorageError::AlreadyExists(_)) => {}
                    Err(e) => warn!("Could not create category {}: {}", name, e),
                }
            }
            info!("Initialized categories at {}/categories.json", config.storage.data_dir);
            println!("Next: run `threadboard create-admin` to set up '{}'.", config.forum.admin);
        }
        (Commands::Start { bind }, Some(mut config)) => {
            if let Some(bind) = bind {
                config.server.bind = bind;
                config.server.socket_addr()?;
            }
            info!("Starting Threadboard v{}", env!("CARGO_PKG_VERSION"));
            let server = ForumServer::new(config).await?;
            server.run().await?;
        }
        (Commands::Status, Some(config)) => {
            let storage = open_storage(&config).await?;
            let stats = storage.get_statistics().await?;
            println!("{} - {}", config.forum.name, config.forum.description);
            println!("Data directory: {}", storage.base_dir());
            println!("Categories: {}", stats.total_categories);
            println!("Threads:    {}", stats.total_threads);
            println!("Posts:      {}", stats.total_posts);
            println!("Users:      {} ({} moderators+, {} joined this week)", stats.total_users, stats.moderator_count, stats.recent_registrations);
        }
        (Commands::CreateAdmin { email }, Some(config)) => {
            println!("Setting password for administrator '{}'.", config.forum.admin);
            // Prompt twice without echo
            let pass1 = rpassword::prompt_password("New password: ")?;
            let pass2 = rpassword::prompt_password("Confirm password: ")?;
            if pass1 != pass2 {
                println!("Error: passwords do not match.");
                return Ok(());
            }
            let mut storage = open_storage(&config).await?;
            match storage.ensure_admin(&config.forum.admin, &email, &pass1).await {
                Ok(user) => println!("Administrator '{}' ready ({}).", user.username, roles::role_name(user.user_level)),
                Err(StorageError::Invalid(msg)) => println!("Error: {}", msg),
                Err(e) => return Err(e.into()),
            }
        }
        (Commands::SetLevel { username, level }, Some(config)) => {
            let level = roles::parse_level(&level).ok_or_else(|| anyhow!("Unknown level '{}'", level))?;
            let mut storage = open_storage(&config).await?;
            let user = storage.update_user_level(&username, level, "cli").await?;
            println!("{} is now {}.", user.username, roles::role_name(user.user_level));
        }
        (Commands::Audit { page }, Some(config)) => {
            let storage = open_storage(&config).await?;
            for entry in storage.get_admin_audit_page(page, 20).await? {
                println!(
                    "{} {:<16} by {:<12} {} {}",
                    entry.timestamp.format("%Y-%m-%d %H:%M:%S"),
                    entry.action,
                    entry.actor,
                    entry.target.unwrap_or_default(),
                    entry.details.unwrap_or_default()
                );
            }
        }
        (_, None) => return Err(anyhow!("Configuration not loaded")),
    }

    Ok(())
}

fn init_logging(config: &Option<Config>, verbosity: u8) {
    use std::io::Write;
    let mut builder = env_logger::Builder::new();
    // CLI verbosity overrides the configured level
    let configured = config
        .as_ref()
        .and_then(|c| c.logging.level.parse::<log::LevelFilter>().ok())
        .unwrap_or(log::LevelFilter::Info);
    let base_level = match verbosity {
        0 => configured,
        1 => log::LevelFilter::Debug,
        _ => log::LevelFilter::Trace,
    };
    builder.filter_level(base_level);

    let log_file = config
        .as_ref()
        .and_then(|c| c.logging.file.as_ref())
        .and_then(|file| std::fs::OpenOptions::new().create(true).append(true).open(file).ok());
    let security_path = config.as_ref().and_then(|c| c.logging.security_file.clone());

    match log_file {
        Some(f) => {
            let write_mutex = std::sync::Arc::new(std::sync::Mutex::new(f));
            // Echo to the console only when someone is watching it
            let is_tty = atty::is(atty::Stream::Stdout);

            builder.format(move |fmt, record| {
                let ts = chrono::Utc::now().format("%Y-%m-%dT%H:%M:%SZ");
                let line = format!("{} [{}] {}", ts, record.level(), record.args());

                if let Ok(mut guard) = write_mutex.lock() {
                    let _ = writeln!(guard, "{}", line);
                }

                if record.target() == "security" {
                    if let Some(ref sec_path) = security_path {
                        if let Ok(mut sf) = std::fs::OpenOptions::new().create(true).append(true).open(sec_path) {
                            let _ = writeln!(sf, "{}", line);
                        }
                    }
                }

                if is_tty {
                    writeln!(fmt, "{}", line)
                } else {
                    Ok(())
                }
            });
        }
        None => {
            builder.format(|fmt, record| {
                let ts = chrono::Utc::now().format("%Y-%m-%dT%H:%M:%SZ");
                writeln!(fmt, "{} [{}] {}", ts, record.level(), record.args())
            });
        }
    }
    let _ = builder.try_init();
}
