use clap::{Parser, Subcommand};
use std::path::PathBuf;

use workledger::audit::AuditEventType;
use workledger::jobs::{DEFAULT_LIST_LIMIT, JobStatus};

#[derive(Parser, Debug)]
#[command(name = "workledger")]
#[command(about = "Operator CLI for the workledger job, artifact and audit ledger", long_about = None)]
pub struct Cli {
    /// Configuration file (overrides WORKLEDGER_CONFIG)
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Recompute audit hash chains and report violations
    VerifyChain(ScopeFilter),
    /// Show one job record
    Job { job_id: String },
    /// List jobs for a tenant/project, newest first
    Jobs(JobsArgs),
    /// Query audit events for a tenant/project, newest first
    Audit(AuditArgs),
    /// List dead-lettered jobs
    Dlq {
        #[arg(long, default_value_t = DEFAULT_LIST_LIMIT)]
        limit: usize,
    },
    /// Fail stale jobs and prune expired raw uploads
    Sweep,
    /// Print record counts and process metrics
    Stats,
}

#[derive(clap::Args, Debug)]
pub struct ScopeFilter {
    #[arg(long)]
    pub tenant: Option<String>,
    #[arg(long, requires = "tenant")]
    pub project: Option<String>,
}

#[derive(clap::Args, Debug)]
pub struct JobsArgs {
    #[arg(long)]
    pub tenant: String,
    #[arg(long)]
    pub project: String,
    #[arg(long, value_parser = parse_status)]
    pub status: Option<JobStatus>,
    #[arg(long, default_value_t = DEFAULT_LIST_LIMIT)]
    pub limit: usize,
}

#[derive(clap::Args, Debug)]
pub struct AuditArgs {
    #[arg(long)]
    pub tenant: String,
    #[arg(long)]
    pub project: String,
    #[arg(long, value_parser = parse_event_type)]
    pub event_type: Option<AuditEventType>,
    #[arg(long)]
    pub resource_id: Option<String>,
    #[arg(long, default_value_t = DEFAULT_LIST_LIMIT)]
    pub limit: usize,
}

fn parse_status(s: &str) -> Result<JobStatus, String> {
    s.parse()
}

fn parse_event_type(s: &str) -> Result<AuditEventType, String> {
    s.parse()
}
