mod cli;

use clap::Parser;
use cli::{AuditArgs, Cli, Commands};
use serde::Serialize;
use serde_json::json;
use tracing::{info, warn};

use workledger::Services;
use workledger::artifacts::prune_raw_uploads;
use workledger::audit::AuditQuery;
use workledger::config::Config;
use workledger::jobs::sweep_stale_jobs;
use workledger::observability::init_tracing;

type BoxError = Box<dyn std::error::Error + Send + Sync>;

/// Exit status when chain verification finds violations.
const EXIT_CHAIN_INVALID: i32 = 2;

fn main() -> Result<(), BoxError> {
    let cli = Cli::parse();

    let config = match &cli.config {
        Some(path) => Config::load_from_path(path.clone())?,
        None => Config::load()?,
    };
    init_tracing(&config.telemetry.log_filter);

    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .max_blocking_threads(config.runtime.blocking_threads)
        .build()?;

    runtime.block_on(run(cli.command, config))
}

async fn run(command: Commands, config: Config) -> Result<(), BoxError> {
    let services = Services::open(&config)?;

    match command {
        Commands::VerifyChain(scope) => {
            let report = services
                .audit
                .verify_chain_integrity(scope.tenant.as_deref(), scope.project.as_deref())?;
            print_json(&report)?;
            if !report.is_valid {
                warn!(violations = report.violations.len(), "Audit chain verification failed");
                std::process::exit(EXIT_CHAIN_INVALID);
            }
        }
        Commands::Job { job_id } => print_json(&services.jobs.get_status(&job_id)?)?,
        Commands::Jobs(args) => {
            let jobs = services.jobs.list_by_tenant_project(
                &args.tenant,
                &args.project,
                args.status,
                args.limit,
            )?;
            print_json(&jobs)?;
        }
        Commands::Audit(args) => print_json(&services.audit.query_events(&audit_query(args))?)?,
        Commands::Dlq { limit } => print_json(&services.jobs.dead_letters(limit)?)?,
        Commands::Sweep => {
            let swept = sweep_stale_jobs(
                &services.jobs,
                &services.audit,
                config.retention.stale_job_timeout(),
            )?;
            let pruned = prune_raw_uploads(
                &services.artifacts,
                services.blobs.as_ref(),
                config.retention.raw_upload_ttl(),
            )
            .await?;
            services.store.persist()?;
            info!(failed = swept.failed, pruned = pruned.pruned, "Sweep finished");
            print_json(&json!({ "stale_jobs": swept, "raw_uploads": pruned }))?;
        }
        Commands::Stats => {
            print_json(&json!({
                "store": services.store.stats()?,
                "metrics": services.metrics.snapshot(),
            }))?;
        }
    }

    Ok(())
}

fn audit_query(args: AuditArgs) -> AuditQuery {
    let mut query = AuditQuery::new(args.tenant, args.project).limit(args.limit);
    if let Some(event_type) = args.event_type {
        query = query.event_type(event_type);
    }
    if let Some(resource_id) = args.resource_id {
        query = query.resource_id(resource_id);
    }
    query
}

fn print_json<T: Serialize>(value: &T) -> Result<(), BoxError> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}
