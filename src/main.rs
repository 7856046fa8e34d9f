use std::{path::PathBuf, process::ExitCode, sync::Arc};

use anyhow::Context;
use clap::Parser;
use normalizer::{
    backend::debug::DebugDestination,
    config::Config,
    deploy::local::db::LocalDatabase,
    job::{JobExecutor, Options, storage::Destination},
    progress::{self, BatchPhase, NullReporter, ProgressReporter},
    schema::MappingSpec,
};
use tracing::error;

#[derive(Parser)]
struct Opts {
    #[clap(short, long, env = "NORMALIZER_CONFIG")]
    config: PathBuf,
    /// Log destination statements instead of executing them
    #[clap(long)]
    dry_run: bool,
    #[clap(long)]
    no_progress: bool,
}

async fn execute<D: Destination>(
    source: &LocalDatabase,
    destination: D,
    options: Options,
    spec: &MappingSpec,
    reporter: Arc<dyn ProgressReporter>,
) -> anyhow::Result<()>
where
    D::Error: std::error::Error + Send + Sync + 'static,
{
    JobExecutor::new(source.client(), destination, options)
        .with_reporter(reporter)
        .execute(spec)
        .await
        .with_context(|| "normalize")
}

async fn run(opts: Opts, reporter: Arc<dyn ProgressReporter>) -> anyhow::Result<()> {
    reporter.set_phase(BatchPhase::LoadingConfig);
    let text = tokio::fs::read_to_string(&opts.config)
        .await
        .with_context(|| "read config")?;
    let config = Config::from_yaml(&text)
        .with_context(|| format!("parse config from {}", opts.config.display()))?;
    let options = config.options().with_context(|| "validate config")?;

    reporter.set_phase(BatchPhase::ParsingMapping);
    let base = opts.config.parent().map(PathBuf::from).unwrap_or_default();
    let spec = config.mapping(&base).await.with_context(|| "load mapping")?;

    let source = LocalDatabase::open(&config.source)
        .await
        .with_context(|| format!("open source {}", config.source))?;

    reporter.set_phase(BatchPhase::Normalizing);
    if opts.dry_run {
        execute(&source, DebugDestination::default(), options, &spec, reporter).await
    } else {
        let destination = LocalDatabase::open(&config.destination)
            .await
            .with_context(|| format!("open destination {}", config.destination))?;
        execute(&source, destination.client(), options, &spec, reporter).await
    }
}

#[tokio::main]
async fn main() -> ExitCode {
    let opts = Opts::parse();
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();
    let reporter: Arc<dyn ProgressReporter> = if opts.no_progress {
        Arc::new(NullReporter)
    } else {
        progress::create_reporter()
    };
    let code = conclude(run(opts, reporter.clone()).await, reporter.as_ref());
    reporter.finish();
    code
}

/// Report the outcome of a run and map it to the process exit status.
fn conclude(result: anyhow::Result<()>, reporter: &dyn ProgressReporter) -> ExitCode {
    match result {
        Ok(()) => {
            reporter.set_phase(BatchPhase::Completed);
            ExitCode::SUCCESS
        }
        Err(e) => {
            reporter.set_phase(BatchPhase::Failed(format!("{e:#}")));
            error!(?e, "critical error");
            ExitCode::FAILURE
        }
    }
}
