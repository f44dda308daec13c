use std::path::PathBuf;
use std::process::ExitCode;

use clap::{Args, Parser, Subcommand};
use log::{error, info};

use mailbot::config::{load_or_default, validate_config, ScanLimit};
use mailbot::session::open_ledger;
use mailbot::{LocalMailSession, MailbotError, Report, UnsubscribeSession};

#[derive(Parser, Debug)]
#[command(name = "mailbot")]
#[command(version)]
#[command(about = "Finds newsletter subscriptions in a mailbox and unsubscribes from them", long_about = None)]
struct Cli {
    /// Config file (.json, .yaml or .yml); defaults to ~/.mailbot/config.*
    #[arg(short, long, env = "MAILBOT_CONFIG")]
    config: Option<PathBuf>,

    /// Mail directory with one subdirectory of exported messages per folder
    #[arg(short, long, env = "MAILBOT_MAIL_DIR")]
    mail_dir: Option<PathBuf>,

    /// Print results as JSON
    #[arg(long)]
    json: bool,

    /// Emit logs as JSON lines
    #[arg(long)]
    log_json: bool,

    /// Log filter directives, e.g. "mailbot=debug"; overrides RUST_LOG
    #[arg(long)]
    log_filter: Option<String>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Scan the mailbox and list newsletters
    Scan {
        /// Messages per folder, or "all"
        #[arg(long)]
        limit: Option<ScanLimit>,
    },

    /// Scan, then unsubscribe from the selected newsletters
    Unsubscribe {
        #[command(flatten)]
        selection: Selection,

        /// Messages per folder, or "all"
        #[arg(long)]
        limit: Option<ScanLimit>,
    },

    /// Forget processed senders so they are offered again
    Reset {
        #[command(flatten)]
        selection: Selection,
    },

    /// Show the senders processed so far
    Status,
}

#[derive(Args, Debug)]
#[group(required = true, multiple = false)]
struct Selection {
    /// Sender address; repeat for several
    #[arg(long = "sender")]
    senders: Vec<String>,

    /// Every pending newsletter (or every processed sender for reset)
    #[arg(long)]
    all: bool,
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    if let Err(e) = mailbot::logging::init(cli.log_filter.as_deref(), cli.log_json) {
        eprintln!("{}", e);
    }

    match run(cli).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!("{}", e);
            eprintln!("Error: {}", e);
            ExitCode::FAILURE
        }
    }
}

async fn run(cli: Cli) -> Result<(), MailbotError> {
    let mut config = load_or_default(cli.config.as_deref())?;

    match cli.command {
        Command::Scan { limit } => {
            if let Some(limit) = limit {
                config.limit = limit;
                validate_config(&config)?;
            }
            let mut session = UnsubscribeSession::from_config(config, None)?;
            install_ctrlc(&session);
            let mut mail = open_mail_dir(cli.mail_dir)?;

            session.scan(&mut mail).await?;
            print_report(&session.report(), cli.json)
        }
        Command::Unsubscribe { selection, limit } => {
            if let Some(limit) = limit {
                config.limit = limit;
                validate_config(&config)?;
            }
            let mut session = UnsubscribeSession::from_config(config, None)?;
            install_ctrlc(&session);
            let mut mail = open_mail_dir(cli.mail_dir)?;

            let summary = session.scan(&mut mail).await?;
            if summary.cancelled {
                info!("Scan cancelled, not unsubscribing");
                return print_report(&session.report(), cli.json);
            }

            let result = if selection.all {
                session.unsubscribe_all_pending().await
            } else {
                session.unsubscribe(&selection.senders).await
            };

            // Completed attempts are shown even when the run was aborted.
            print_report(&session.report(), cli.json)?;
            let run = result?;
            for sender in &run.unknown {
                eprintln!("Not a newsletter of this scan: {}", sender);
            }
            Ok(())
        }
        Command::Reset { selection } => {
            let ledger = open_ledger(&config)?;
            if selection.all {
                let removed = ledger.reset_all()?;
                println!("Reset {} senders", removed);
            } else {
                for sender in &selection.senders {
                    if ledger.reset(sender)? {
                        println!("Reset {}", sender);
                    } else {
                        println!("{} was not processed", sender);
                    }
                }
            }
            Ok(())
        }
        Command::Status => {
            let ledger = open_ledger(&config)?;
            let snapshot = ledger.snapshot();
            if cli.json {
                println!("{}", serde_json::to_string_pretty(&snapshot)?);
            } else {
                for (sender, record) in snapshot.iter() {
                    println!(
                        "{}  {}  {}  {}",
                        record.processed_at.format("%Y-%m-%d %H:%M"),
                        sender,
                        record.outcome,
                        record.detail.as_deref().unwrap_or("")
                    );
                }
                println!("{} processed senders", snapshot.len());
            }
            Ok(())
        }
    }
}

fn open_mail_dir(dir: Option<PathBuf>) -> Result<LocalMailSession, MailbotError> {
    let dir = dir.ok_or_else(|| mailbot::ConfigError::Validation {
        message: "--mail-dir (or MAILBOT_MAIL_DIR) is required".to_string(),
    })?;
    Ok(LocalMailSession::open(dir)?)
}

fn install_ctrlc(session: &UnsubscribeSession) {
    let cancel = session.cancel_flag();
    if let Err(e) = ctrlc::set_handler(move || {
        eprintln!("Cancelling after the current step...");
        cancel.cancel();
    }) {
        error!("Failed to install Ctrl-C handler: {}", e);
    }
}

fn print_report(report: &Report, json: bool) -> Result<(), MailbotError> {
    if json {
        println!("{}", report.to_json()?);
    } else {
        print!("{}", report.render_table());
    }
    Ok(())
}
