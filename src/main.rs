//! query-tasks - runs and verifies instructional query exercises.

use query_tasks::cli::{Cli, Command};
use query_tasks::config::{Config, ConnectionConfig};
use query_tasks::error::Result;
use query_tasks::fixtures::FixtureStore;
use query_tasks::harness::Harness;
use query_tasks::output::{OutputFormat, render_report, render_rows, render_task_list};
use query_tasks::tasks::{self, SuiteKind, TaskInfo, TaskSuite};
use query_tasks::{explain, logging};
use std::path::PathBuf;
use std::process::ExitCode;
use tracing::{error, info};

/// Fixture directory used when neither the CLI nor the config names one.
const DEFAULT_FIXTURES_DIR: &str = "fixtures";

#[tokio::main]
async fn main() -> ExitCode {
    // A missing .env file is fine
    let _ = dotenvy::dotenv();

    let cli = Cli::parse_args();
    if cli.log_file {
        logging::init_file_logging();
    } else {
        logging::init_stderr_logging();
    }

    match run(cli).await {
        Ok(code) => code,
        Err(e) => {
            error!("{}: {}", e.category(), e);
            eprintln!("{}: {}", e.category(), e);
            ExitCode::FAILURE
        }
    }
}

async fn run(cli: Cli) -> Result<ExitCode> {
    // list and explain never read the config file
    let config = if cli.command.needs_connection() {
        let config_path = cli.config_path();
        info!("Loading config from: {}", config_path.display());
        Config::load_from_file(&config_path)?
    } else {
        Config::default()
    };

    match &cli.command {
        Command::List { suite } => {
            let kinds = suite.map_or_else(|| SuiteKind::ALL.to_vec(), |kind| vec![kind]);
            for kind in kinds {
                println!("{}", render_task_list(kind, kind.tasks()));
            }
            Ok(ExitCode::SUCCESS)
        }

        Command::Explain { suite, task } => {
            let selected = select_tasks(*suite, task.as_deref())?;
            print!("{}", explain::explain(*suite, &selected).await?);
            Ok(ExitCode::SUCCESS)
        }

        Command::Run {
            suite,
            task,
            format,
            skip_setup,
        } => {
            let selected = select_tasks(*suite, task.as_deref())?;
            let bound = open_suite(&cli, &config, *suite).await?;
            let result = run_tasks(bound.as_ref(), &config, &selected, *format, *skip_setup).await;
            close(bound.as_ref()).await;
            result
        }

        Command::Verify {
            suite,
            task,
            fixtures,
            repeat,
        } => {
            let selected = select_tasks(*suite, task.as_deref())?;
            let store = fixtures
                .clone()
                .or_else(|| config.harness.fixtures_dir.clone())
                .map(FixtureStore::new);
            let repeat = repeat.unwrap_or(config.harness.repeat);

            let bound = open_suite(&cli, &config, *suite).await?;
            let result = Harness::new(bound.as_ref(), &config.harness)
                .verify(&selected, repeat, store.as_ref())
                .await;
            close(bound.as_ref()).await;

            let report = result?;
            println!("{}", render_report(*suite, &report));
            Ok(if report.is_success() {
                ExitCode::SUCCESS
            } else {
                ExitCode::FAILURE
            })
        }

        Command::Snapshot {
            suite,
            task,
            fixtures,
        } => {
            let selected = select_tasks(*suite, task.as_deref())?;
            let store = FixtureStore::new(
                fixtures
                    .clone()
                    .or_else(|| config.harness.fixtures_dir.clone())
                    .unwrap_or_else(|| PathBuf::from(DEFAULT_FIXTURES_DIR)),
            );

            let bound = open_suite(&cli, &config, *suite).await?;
            let result = Harness::new(bound.as_ref(), &config.harness)
                .snapshot(&selected, &store)
                .await;
            close(bound.as_ref()).await;

            let written = result?;
            println!(
                "Wrote {} fixtures under {}",
                written.len(),
                store.root().display()
            );
            Ok(ExitCode::SUCCESS)
        }
    }
}

/// Runs the setup hook unless skipped, then prints every task's rows.
async fn run_tasks(
    suite: &dyn TaskSuite,
    config: &Config,
    selected: &[&TaskInfo],
    format: OutputFormat,
    skip_setup: bool,
) -> Result<ExitCode> {
    let harness = Harness::new(suite, &config.harness);
    if !skip_setup {
        harness.setup().await?;
    }
    for task in selected {
        let rows = harness.run(task).await?;
        println!("-- {}", task.name);
        println!("{}", render_rows(task.columns, &rows, format)?);
    }
    Ok(ExitCode::SUCCESS)
}

/// The named task, or every task of the suite.
fn select_tasks(kind: SuiteKind, task: Option<&str>) -> Result<Vec<&'static TaskInfo>> {
    match task {
        Some(name) => Ok(vec![kind.task(name)?]),
        None => Ok(kind.tasks().iter().collect()),
    }
}

/// Resolves the suite's connection and opens it.
async fn open_suite(cli: &Cli, config: &Config, kind: SuiteKind) -> Result<Box<dyn TaskSuite>> {
    let connection: ConnectionConfig = config.resolve_connection(
        cli.to_connection_config()?,
        cli.connection.as_deref(),
        kind,
        |key| std::env::var(key).ok(),
    )?;
    info!("Connection: {}", connection.display_string());
    tasks::open(kind, &connection).await
}

async fn close(suite: &dyn TaskSuite) {
    if let Err(e) = suite.close().await {
        error!("Failed to close connection: {}", e);
    }
}
