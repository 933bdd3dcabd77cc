use crate::commands::{read_document, runtime};
use clap::Args;
use common::config::{read_config, EngineConfig};
use common::error::WorkerError;
use common::types::{Job, JobKind};
use engine::{DeploymentManager, EngineContext, Outcome};
use executor::ConnectionManager;
use shared_clients::cache::MemoryCache;
use shared_clients::callback::RecordingCallbacks;
use shared_clients::connector::DryRunConnector;
use shared_clients::document::MemoryDocumentStore;
use shared_clients::notifier::LogNotifier;
use std::path::PathBuf;
use std::sync::Arc;

#[derive(Debug, Args)]
pub struct SimulateArgs {
    /// Job payload (JSON or YAML)
    #[arg(long, value_name = "FILE")]
    pub job: PathBuf,
    /// Job kind, e.g. deploy-version
    #[arg(long)]
    pub kind: JobKind,
}

pub struct Simulation {
    pub outcome: Outcome,
    pub log: Vec<String>,
    pub statements: Vec<String>,
}

pub fn handle_simulate(args: &SimulateArgs, config_path: Option<PathBuf>) -> Result<(), WorkerError> {
    let config = match config_path {
        Some(path) => read_config(Some(path)).map_err(WorkerError::init)?,
        None => EngineConfig::default(),
    };
    let job: Job = read_document(&args.job)?;
    let simulation = runtime()?.block_on(simulate(config, args.kind, job));

    for line in &simulation.log {
        println!("{line}");
    }
    if !simulation.statements.is_empty() {
        println!();
        for statement in &simulation.statements {
            println!("{statement}");
        }
    }
    match simulation.outcome {
        Outcome::Failed(err) => Err(WorkerError::run(err)),
        Outcome::Preempted => Err(WorkerError::run_msg("environment status changed during the run")),
        Outcome::Succeeded => Ok(()),
    }
}

/// Runs `job` end to end with nothing leaving the process.
pub async fn simulate(config: EngineConfig, kind: JobKind, job: Job) -> Simulation {
    let connector = DryRunConnector::new();
    let ctx = EngineContext::new(
        config,
        Arc::new(MemoryCache::new()),
        Arc::new(MemoryDocumentStore::new()),
        Arc::new(ConnectionManager::new(Arc::new(connector.clone()))),
        Arc::new(RecordingCallbacks::new()),
        Arc::new(LogNotifier),
    );

    let mut manager = DeploymentManager::new(ctx, job);
    let outcome = manager.run(kind, None).await;
    let log = manager
        .into_log()
        .into_entries()
        .into_iter()
        .map(|entry| format!("[{:?}] {} ({}ms)", entry.status, entry.message, entry.duration))
        .collect();

    Simulation {
        outcome,
        log,
        statements: connector.statements().statements(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use common::types::DatabaseType;
    use std::fs;
    use test_utils::fixtures::{database, environment, field, job, model, ts};

    fn deploy_job(db_type: DatabaseType) -> Job {
        let db = database(
            "db1",
            db_type,
            vec![model("m1", "users").field(field("f1", "name", "text")).build()],
        );
        job(environment("env1", &["db1"]), ts(0), vec![db])
    }

    #[tokio::test]
    async fn deploy_runs_against_dry_run_adapters() {
        let simulation = simulate(
            EngineConfig::default(),
            JobKind::DeployVersion,
            deploy_job(DatabaseType::PostgreSQL),
        )
        .await;

        assert!(simulation.outcome.is_success());
        assert!(simulation.log.iter().any(|line| line.contains("Created model 'users'")));
        assert!(simulation
            .statements
            .iter()
            .any(|sql| sql.contains("CREATE TABLE")));
    }

    #[tokio::test]
    async fn unsupported_database_fails_the_simulation() {
        let simulation = simulate(
            EngineConfig::default(),
            JobKind::DeployVersion,
            deploy_job(DatabaseType::Oracle),
        )
        .await;
        assert!(matches!(simulation.outcome, Outcome::Failed(_)));
    }

    #[test]
    fn failed_job_is_a_run_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("job.json");
        fs::write(
            &path,
            serde_json::to_string(&deploy_job(DatabaseType::Oracle)).unwrap(),
        )
        .unwrap();
        let args = SimulateArgs {
            job: path,
            kind: JobKind::DeployVersion,
        };
        let err = handle_simulate(&args, None).unwrap_err();
        assert!(matches!(err, WorkerError::Run { .. }));
    }
}
