//! # incident-enricher
//!
//! Runs one stage job against the local SQLite collaborators, or drives a
//! whole fetch → summarize → post pipeline for an incident file.

#![deny(unsafe_code)]

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use serde_json::{json, Value};
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use enricher_core::ports::PointerStore;
use enricher_core::{JobContext, JobId, JobRequest, Pointer};
use enricher_engine::{load_settings, Collaborators, SlackWebhookSink, Stage, Worker, WorkerSettings};
use enricher_store::{Database, SqliteArtifactStore, SqliteIdempotencyCache, SqlitePointerStore};
use enricher_telemetry::{init_telemetry, TelemetryConfig};

const SERVICE: &str = "incident-enricher";

#[derive(Parser, Debug)]
#[command(name = "incident-enricher", about = "Incident evidence, summary and posting worker")]
struct Cli {
    /// Path to the `SQLite` database (overrides settings).
    #[arg(long, global = true)]
    db_path: Option<PathBuf>,

    /// Human-readable logs instead of JSON lines.
    #[arg(long, global = true)]
    pretty: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Run a single stage job and print its JobResult.
    Run {
        #[arg(long)]
        stage: Stage,
        #[arg(long)]
        job_id: String,
        /// Defaults to `--env context_ptr=...` when omitted.
        #[arg(long)]
        context_ptr: Option<String>,
        /// Job env entry as KEY=VALUE. Repeatable.
        #[arg(long = "env", value_parser = parse_env_pair)]
        env: Vec<(String, String)>,
    },
    /// Run all three stages for an incident JSON file and print the PostResult.
    Pipeline {
        #[arg(long)]
        incident: PathBuf,
        /// Job env entry as KEY=VALUE, applied to every stage. Repeatable.
        #[arg(long = "env", value_parser = parse_env_pair)]
        env: Vec<(String, String)>,
    },
}

fn parse_env_pair(raw: &str) -> Result<(String, String), String> {
    let (key, value) = raw
        .split_once('=')
        .ok_or_else(|| format!("expected KEY=VALUE, got `{raw}`"))?;
    let key = key.trim();
    if key.is_empty() {
        return Err(format!("empty key in `{raw}`"));
    }
    Ok((key.to_string(), value.to_string()))
}

fn collaborators(db: &Database, settings: &WorkerSettings) -> Result<Collaborators> {
    let webhook = SlackWebhookSink::new(Duration::from_secs(settings.http_timeout_secs))
        .context("Failed to build webhook client")?;
    Ok(Collaborators {
        artifacts: Arc::new(SqliteArtifactStore::new(db.clone())),
        pointers: Arc::new(SqlitePointerStore::new(db.clone(), settings.data_ttl())),
        cache: Arc::new(SqliteIdempotencyCache::new(db.clone())),
        webhook: Arc::new(webhook),
    })
}

async fn run_stage(
    worker: &Worker,
    stage: Stage,
    request: JobRequest,
    cancel: CancellationToken,
) -> Result<Value> {
    let result = worker.run(stage, &request, JobContext::new(cancel)).await?;
    Ok(serde_json::to_value(result)?)
}

async fn run_pipeline(
    worker: &Worker,
    pointers: &dyn PointerStore,
    incident: Value,
    env: &[(String, String)],
    cancel: CancellationToken,
) -> Result<Value> {
    let mut context = incident.clone();
    let mut outputs = Vec::with_capacity(Stage::ALL.len());

    for stage in Stage::ALL {
        let ptr = pointers.write_context(&context).await?;
        let mut request = JobRequest::new(JobId::new(), ptr);
        for (k, v) in env {
            request = request.with_env(k.as_str(), v.as_str());
        }
        let result = worker
            .run(stage, &request, JobContext::new(cancel.clone()))
            .await
            .with_context(|| format!("{stage} stage failed"))?;
        let output = pointers.read_json(&result.result_ptr).await?;
        info!(stage = %stage, result_ptr = %result.result_ptr, "stage complete");
        outputs.push(output);

        context = match outputs.as_slice() {
            [bundle] => json!({ "evidence": bundle }),
            [bundle, summary] => json!({ "incident": incident, "evidence": bundle, "summary": summary }),
            _ => Value::Null,
        };
    }

    outputs.pop().context("pipeline produced no output")
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    init_telemetry(&TelemetryConfig {
        json: !cli.pretty,
        service: SERVICE.to_string(),
        ..Default::default()
    })
    .context("Failed to initialize logging")?;

    let mut settings = load_settings(SERVICE).context("Failed to load settings")?;
    if let Some(path) = cli.db_path {
        settings.database_path = path;
    }

    let db = Database::open(&settings.database_path)
        .with_context(|| format!("Failed to open database: {}", settings.database_path.display()))?;
    let purged = db.purge_expired().context("Failed to purge expired records")?;
    if purged > 0 {
        info!(purged, "expired records removed");
    }

    let ports = collaborators(&db, &settings)?;
    let pointers = ports.pointers.clone();
    let worker = Worker::new(settings, ports).context("Failed to start worker")?;

    let cancel = CancellationToken::new();
    let on_signal = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("interrupt received, cancelling job");
            on_signal.cancel();
        }
    });

    let output = match cli.command {
        Command::Run {
            stage,
            job_id,
            context_ptr,
            env,
        } => {
            let request = JobRequest {
                job_id: Some(JobId::from_raw(job_id)),
                context_ptr: context_ptr.map(Pointer::from_raw),
                env: env.into_iter().collect(),
            };
            run_stage(&worker, stage, request, cancel).await?
        }
        Command::Pipeline { incident, env } => {
            let raw = std::fs::read_to_string(&incident)
                .with_context(|| format!("Failed to read {}", incident.display()))?;
            let incident: Value = serde_json::from_str(&raw)
                .with_context(|| format!("Invalid incident JSON in {}", incident.display()))?;
            run_pipeline(&worker, pointers.as_ref(), incident, &env, cancel).await?
        }
    };

    println!("{}", serde_json::to_string_pretty(&output)?);
    Ok(())
}
