use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Result;
use tracing_subscriber::EnvFilter;

use beacon::config::Config;
use beacon::runner::PhpunitRunner;
use beacon::server::{self, AppState};
use beacon::{hub, project};

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("beacon=info")),
        )
        .init();

    // Optional path argument; the root walk starts from the cwd otherwise,
    // so an unmarked project resolves to the cwd itself.
    let start = std::env::args()
        .nth(1)
        .map(PathBuf::from)
        .unwrap_or_else(|| std::env::current_dir().unwrap_or_else(|_| PathBuf::from(".")));
    let root = project::find_project_root(&start);

    let config = Config::load(&root);
    let runner = match config.runner.binary {
        Some(ref binary) => PhpunitRunner::with_binary(root.clone(), root.join(binary)),
        None => PhpunitRunner::new(root.clone()),
    };

    let coverage_include: Vec<String> = config
        .coverage
        .include
        .iter()
        .map(|dir| root.join(dir).to_string_lossy().into_owned())
        .collect();

    let state = AppState {
        hub: hub::shared(),
        project_root: root.clone(),
        runner: Arc::new(runner),
        coverage_report: root.join(&config.coverage.report),
        coverage_include,
    };

    server::serve(state, &config.server.listen).await
}
