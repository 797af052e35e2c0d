//! SudoMode: governance for AI agents.
//!
//! Agents submit intents instead of acting; SudoMode allows, denies, or
//! holds them for a human.
//!
//! Quick start:
//!   sudomode serve                                   # run the decision server
//!   sudomode exec --resource stripe.charge --action charge --arg amount=5000
//!   sudomode approvals list                          # see what's waiting
//!   sudomode log                                     # see what happened
//!
//! For more info: sudomode --help

use clap::{Parser, Subcommand};
use colored::Colorize;
use std::path::PathBuf;
use std::time::Duration;
use sudomode::approval::Resolution;
use sudomode::cli;
use sudomode::client::PollOptions;
use sudomode::config::Settings;
use sudomode::policy::Intent;
use tracing_subscriber::EnvFilter;

/// SudoMode, policy decisions and human approval for agent actions.
#[derive(Parser)]
#[command(
    name = "sudomode",
    version,
    about = "Policy decisions and human approval for AI agent actions",
    long_about = "SudoMode sits between an agent and the things it can break.\n\
                  Every intent is checked against an ordered policy: allowed,\n\
                  denied, or held until a human approves it.\n\n\
                  Quick start:\n  \
                  sudomode serve              # run the decision server\n  \
                  sudomode approvals list     # see what's waiting\n  \
                  sudomode log                # see what happened"
)]
struct Cli {
    #[command(flatten)]
    settings: Settings,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the decision server on the gateway socket
    Serve,

    /// Validate a policy file, optionally dry-running an intent against it
    Check {
        /// Policy file [default: --policies]
        policy: Option<PathBuf>,

        /// Resource to dry-run
        #[arg(long, requires = "action")]
        resource: Option<String>,

        /// Action to dry-run
        #[arg(long, requires = "resource")]
        action: Option<String>,

        /// Intent arguments as a JSON object
        #[arg(long)]
        args: Option<String>,

        /// Single argument as key=value (repeatable)
        #[arg(long = "arg", value_name = "KEY=VALUE")]
        arg: Vec<String>,
    },

    /// Submit an intent to the server and wait for the verdict
    Exec {
        #[arg(long)]
        resource: String,

        #[arg(long)]
        action: String,

        /// Intent arguments as a JSON object
        #[arg(long)]
        args: Option<String>,

        /// Single argument as key=value (repeatable)
        #[arg(long = "arg", value_name = "KEY=VALUE")]
        arg: Vec<String>,

        /// Seconds between status checks while waiting for approval
        #[arg(long, default_value_t = 2.0)]
        interval: f64,

        /// Give up waiting after this many seconds
        #[arg(long)]
        timeout: Option<f64>,
    },

    /// List, inspect and resolve approval requests
    Approvals {
        #[command(subcommand)]
        command: ApprovalCommands,
    },

    /// See what was governed
    Log {
        /// Show a specific server session
        #[arg(short, long)]
        session: Option<String>,

        /// Filter: governed, resolved
        #[arg(short, long)]
        event: Option<String>,

        /// Filter: allow, deny, require_approval, approved, rejected
        #[arg(short, long)]
        outcome: Option<String>,

        /// Filter by resource
        #[arg(short, long)]
        resource: Option<String>,

        /// Show only the most recent N entries
        #[arg(short, long)]
        limit: Option<usize>,

        /// Show only the summary
        #[arg(long)]
        summary: bool,

        /// List recorded server sessions
        #[arg(long)]
        sessions: bool,
    },
}

#[derive(Subcommand)]
enum ApprovalCommands {
    /// List approval requests
    List {
        /// Only requests still waiting
        #[arg(long)]
        pending: bool,
    },
    /// Show one request
    Show { id: String },
    /// Approve a pending request
    Approve { id: String },
    /// Reject a pending request
    Reject { id: String },
}

#[tokio::main]
async fn main() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("sudomode=info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let settings = cli.settings;

    let result = match cli.command {
        Commands::Serve => cli::serve::run_serve(&settings).await,

        Commands::Check {
            policy,
            resource,
            action,
            args,
            arg,
        } => {
            let path = policy.unwrap_or_else(|| settings.policies.clone());
            match (resource, action) {
                (Some(resource), Some(action)) => {
                    cli::exec::build_args(args.as_deref(), &arg).and_then(|args| {
                        let intent = Intent::new(resource, action).with_args(args);
                        cli::check::run_check(&path, Some(&intent))
                    })
                }
                _ => cli::check::run_check(&path, None),
            }
        }

        Commands::Exec {
            resource,
            action,
            args,
            arg,
            interval,
            timeout,
        } => match poll_options(interval, timeout) {
            Ok(options) => match cli::exec::build_args(args.as_deref(), &arg) {
                Ok(args) => {
                    let intent = Intent::new(resource, action).with_args(args);
                    cli::exec::run_exec(&settings.socket, intent, options).await
                }
                Err(e) => Err(e),
            },
            Err(e) => Err(e),
        },

        Commands::Approvals { command } => match command {
            ApprovalCommands::List { pending } => {
                cli::approvals::run_list(&settings.socket, pending).await
            }
            ApprovalCommands::Show { id } => cli::approvals::run_show(&settings.socket, &id).await,
            ApprovalCommands::Approve { id } => {
                cli::approvals::run_resolve(&settings.socket, &id, Resolution::Approve).await
            }
            ApprovalCommands::Reject { id } => {
                cli::approvals::run_resolve(&settings.socket, &id, Resolution::Reject).await
            }
        },

        Commands::Log {
            session,
            event,
            outcome,
            resource,
            limit,
            summary,
            sessions,
        } => settings.audit_log_path().and_then(|path| {
            if sessions {
                cli::log::run_log_sessions(&path)
            } else {
                let options = cli::log::LogOptions {
                    session,
                    event,
                    outcome,
                    resource,
                    limit,
                    summary_only: summary,
                };
                cli::log::run_log(&path, &options)
            }
        }),
    };

    if let Err(e) = result {
        eprintln!();
        eprintln!("  {} {}", "✗".red().bold(), e);
        for cause in e.chain().skip(1) {
            eprintln!("  {} {}", "caused by:".dimmed(), cause);
        }
        eprintln!();
        std::process::exit(1);
    }
}

fn poll_options(interval: f64, timeout: Option<f64>) -> anyhow::Result<PollOptions> {
    let seconds = |value: f64, flag: &str| {
        Duration::try_from_secs_f64(value)
            .map_err(|_| anyhow::anyhow!("--{} must be a non-negative number of seconds", flag))
    };
    let mut options = PollOptions::default().with_interval(seconds(interval, "interval")?);
    if let Some(timeout) = timeout {
        options = options.with_timeout(seconds(timeout, "timeout")?);
    }
    Ok(options)
}
