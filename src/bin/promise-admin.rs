use std::path::PathBuf;

use anyhow::Result;
use clap::{Parser, Subcommand};
use serde::Serialize;
use tracing_subscriber::EnvFilter;

use promise_ledger::commands::{Commands, ensure_initialized};
use promise_ledger::models::{Decision, Difficulty, Outcome, PromiseFilter, PromiseStatus, RequestStatus};
use promise_ledger::services::validation::parse_deadline;

#[derive(Parser)]
#[command(
    name = "promise-admin",
    about = "Operator tool for a local promise ledger"
)]
struct Cli {
    /// Ledger root (defaults to $PROMISE_LEDGER_ROOT or ./.promise-ledger)
    #[arg(long, global = true)]
    root: Option<PathBuf>,
    #[command(subcommand)]
    cmd: Cmd,
}

#[derive(Subcommand)]
enum Cmd {
    /// Create the directory layout and default config
    Init,
    /// Declare a new promise
    Create {
        #[arg(long)]
        address: String,
        #[arg(long)]
        message: String,
        /// RFC 3339 timestamp, e.g. 2026-12-31T23:59:59Z
        #[arg(long)]
        deadline: String,
        #[arg(long, default_value = "")]
        category: String,
        #[arg(long, default_value = "easy")]
        difficulty: String,
    },
    /// Mark a promise completed
    Complete {
        id: String,
        #[arg(long)]
        proof: Option<String>,
    },
    /// Mark a promise failed
    Fail {
        id: String,
        #[arg(long)]
        proof: Option<String>,
    },
    /// Override displayed progress (0-100)
    Progress { id: String, progress: i64 },
    /// Ask for a promise to be deleted
    RequestDelete {
        promise_id: String,
        #[arg(long)]
        requester: String,
    },
    /// Approve or reject a delete request
    Resolve {
        request_id: String,
        /// approved | rejected
        decision: String,
        #[arg(long)]
        admin: String,
    },
    /// Record a visit for an anonymous session
    TouchSession {
        session_id: String,
        #[arg(long, default_value = "")]
        ip: String,
    },
    /// List promises, newest first
    Promises {
        #[arg(long)]
        address: Option<String>,
        #[arg(long)]
        status: Option<String>,
    },
    /// Show one user, or all users
    Users {
        #[arg(long)]
        address: Option<String>,
    },
    /// Users by reputation
    Leaderboard {
        #[arg(long, default_value_t = 10)]
        limit: usize,
    },
    /// List delete requests
    Requests {
        #[arg(long)]
        status: Option<String>,
    },
    /// Show stored global stats
    Stats,
    /// Rescan every collection and store fresh stats
    Recompute,
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")))
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    if let Cmd::Init = cli.cmd {
        let root = cli.root.unwrap_or_else(promise_ledger::config::ledger_root);
        let report = ensure_initialized(&root)?;
        println!("initialized ledger at {}", report.root.display());
        for c in &report.created {
            println!("  created {c}");
        }
        return Ok(());
    }

    let ledger = match &cli.root {
        Some(root) => Commands::open(root)?,
        None => Commands::open_default()?,
    };

    match cli.cmd {
        Cmd::Init => Ok(()),
        Cmd::Create {
            address,
            message,
            deadline,
            category,
            difficulty,
        } => {
            let deadline = parse_deadline(&deadline)?;
            let difficulty: Difficulty = difficulty.parse()?;
            emit(&ledger.create_promise(&address, &message, deadline, &category, difficulty)?)
        }
        Cmd::Complete { id, proof } => {
            emit(&ledger.update_promise_status(&id, Outcome::Completed, proof)?)
        }
        Cmd::Fail { id, proof } => emit(&ledger.update_promise_status(&id, Outcome::Failed, proof)?),
        Cmd::Progress { id, progress } => emit(&ledger.admin_set_progress(&id, progress)?),
        Cmd::RequestDelete {
            promise_id,
            requester,
        } => emit(&ledger.request_deletion(&promise_id, &requester)?),
        Cmd::Resolve {
            request_id,
            decision,
            admin,
        } => {
            let decision: Decision = decision.parse()?;
            emit(&ledger.resolve(&request_id, decision, &admin)?)
        }
        Cmd::TouchSession { session_id, ip } => emit(&ledger.touch_session(&session_id, &ip)?),
        Cmd::Promises { address, status } => {
            let status = status.map(|s| s.parse::<PromiseStatus>()).transpose()?;
            emit(&ledger.list_promises(&PromiseFilter { address, status })?)
        }
        Cmd::Users { address } => match address {
            Some(a) => emit(&ledger.get_user(&a)?),
            None => emit(&ledger.list_users()?),
        },
        Cmd::Leaderboard { limit } => emit(&ledger.leaderboard(limit)?),
        Cmd::Requests { status } => {
            let status = status.map(|s| s.parse::<RequestStatus>()).transpose()?;
            emit(&ledger.list_requests(status)?)
        }
        Cmd::Stats => emit(&ledger.stats()?),
        Cmd::Recompute => emit(&ledger.recompute()?),
    }
}

fn emit<T: Serialize>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}
