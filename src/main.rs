use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use communique::config::Config;
use communique::open_store;
use communique_store::MessageType;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Parser)]
#[command(name = "communique")]
#[command(about = "Inspect the local communique message store")]
#[command(version)]
struct Cli {
    /// Configuration file path
    #[arg(short, long)]
    config: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Print the stored roster and its version
    Roster,
    /// Print the message history with a contact
    History {
        /// Contact address
        jid: String,
        /// Only show messages of this type (chat, groupchat, headline, normal, error)
        #[arg(long = "type")]
        msg_type: Option<String>,
    },
    /// Print where archive backfill would resume for each contact
    Cursors,
    /// Print a default configuration file
    Config,
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    if let Commands::Config = cli.command {
        print!("{}", Config::default_toml());
        return Ok(());
    }

    let (config, path) = Config::load(cli.config.as_deref())?;
    init_logging(config.log_level());
    tracing::debug!("Loaded config from {}", path.display());
    config
        .validate()
        .with_context(|| format!("Invalid configuration in {}", path.display()))?;

    let store = open_store(&config)?;

    match cli.command {
        Commands::Roster => {
            let mut version_printed = false;
            store.for_each_roster_item(|ver, item| {
                if !version_printed {
                    println!("version: {ver}");
                    version_printed = true;
                }
                let groups = if item.groups.is_empty() {
                    String::new()
                } else {
                    format!(" [{}]", item.groups.join(", "))
                };
                println!("{}\t{}\t{}{groups}", item.jid, item.name, item.subscription);
            })?;
            if !version_printed {
                println!("version: {}", store.roster_version()?);
            }
        }
        Commands::History { jid, msg_type } => {
            let jid = jid.parse().with_context(|| format!("Invalid address: {jid}"))?;
            let filter = msg_type
                .map(|t| t.parse::<MessageType>())
                .transpose()
                .context("Invalid message type")?;
            let mut rows = store.query_history(&jid, filter);
            while rows.advance() {
                let msg = rows.current();
                let arrow = if msg.sent { ">" } else { "<" };
                let mark = if msg.received { " ✓" } else { "" };
                println!("{} {arrow} {}: {}{mark}", msg.delay.to_rfc3339(), msg.from.bare(), msg.body);
            }
            rows.close().context("Failed reading history")?;
        }
        Commands::Cursors => {
            for cursor in store.after_id().collect_all()? {
                println!("{}\t{}\t{}", cursor.jid, cursor.archive_id, cursor.delay.to_rfc3339());
            }
        }
        Commands::Config => {}
    }
    Ok(())
}

fn init_logging(level: &str) {
    let filter = match level.to_lowercase().as_str() {
        "error" => tracing::Level::ERROR,
        "warn" => tracing::Level::WARN,
        "info" => tracing::Level::INFO,
        "debug" => tracing::Level::DEBUG,
        "trace" => tracing::Level::TRACE,
        _ => tracing::Level::INFO,
    };

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(filter.to_string())),
        )
        .with(
            tracing_subscriber::fmt::layer()
                .with_target(false)
                .with_writer(std::io::stderr)
                .compact(),
        )
        .init();
}
