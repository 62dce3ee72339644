mod tasks;

use clap::{Parser, Subcommand};
use scoutq_core::Platform;
use tracing_subscriber::EnvFilter;

#[derive(Debug, Parser)]
#[command(name = "scoutq")]
#[command(about = "Operate the scoutq task ledger")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Debug, Subcommand)]
enum Commands {
    /// Queue a subject for processing
    Submit {
        #[arg(long)]
        platform: Platform,
        #[arg(long)]
        subject: String,
        /// Account classification (e.g., branding)
        #[arg(long)]
        account_type: String,
        #[arg(long, default_value = "")]
        posting_style: String,
        /// Comma-separated competitor handles
        #[arg(long, value_delimiter = ',')]
        competitors: Vec<String>,
        /// Replace an existing record instead of refusing
        #[arg(long)]
        force: bool,
    },
    /// Show status counts, or one record when --subject is given
    Status {
        #[arg(long)]
        platform: Platform,
        #[arg(long)]
        subject: Option<String>,
    },
    /// Delete expired objects under a namespace
    Sweep {
        /// Key prefix to sweep (e.g., recommendation/)
        #[arg(long)]
        namespace: String,
    },
    /// Return records with expired processing leases to pending
    Reclaim {
        #[arg(long)]
        platform: Platform,
        /// Lease length; defaults to SCOUTQ_LEASE_SECS
        #[arg(long)]
        lease_secs: Option<u64>,
    },
    /// Print the next free artifact sequence number
    NextSeq {
        #[arg(long)]
        kind: String,
        #[arg(long)]
        platform: Platform,
        #[arg(long)]
        subject: String,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let config = scoutq_core::load_app_config()?;
    let env_filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(config.log_level.clone()))?;
    tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_writer(std::io::stderr)
        .init();

    let store = scoutq_store::open_store(&config)?;
    tracing::debug!(command = ?cli.command, "cli: running command");

    match cli.command {
        Commands::Submit {
            platform,
            subject,
            account_type,
            posting_style,
            competitors,
            force,
        } => {
            let task = scoutq_ledger::NewTask {
                platform,
                subject,
                account_type,
                posting_style,
                competitors,
            };
            tasks::run_submit(store, task, force).await?;
        }
        Commands::Status { platform, subject } => {
            tasks::run_status(store, platform, subject.as_deref()).await?;
        }
        Commands::Sweep { namespace } => {
            tasks::run_sweep(store, &namespace).await?;
        }
        Commands::Reclaim {
            platform,
            lease_secs,
        } => {
            let lease = match lease_secs {
                Some(secs) => Some(std::time::Duration::from_secs(secs)),
                None => config.lease(),
            };
            tasks::run_reclaim(store, platform, lease, config.max_attempts).await?;
        }
        Commands::NextSeq {
            kind,
            platform,
            subject,
        } => {
            tasks::run_next_seq(store, &kind, platform, &subject).await?;
        }
    }

    Ok(())
}
