use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use axum::extract::ws::{Message, WebSocket};
use axum::extract::{State, WebSocketUpgrade};
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::routing::{get, post};
use axum::{Json, Router};
use futures_util::{SinkExt, StreamExt};
use serde::Serialize;
use tokio::sync::mpsc;
use tracing::{error, info, warn};

use crate::hub::SharedHub;
use crate::models::{CoverageReport, RunResult, TestCatalog};
use crate::runner::{PhpunitRunner, ProcessHandle, RunRequest, RunnerEvent};
use crate::{discovery, report};

/// Messages pushed over the live channel, tagged for the viewer UI.
#[derive(Serialize)]
#[serde(tag = "type", rename_all = "lowercase")]
enum Outbound<'a> {
    Catalog { payload: &'a TestCatalog },
    Progress { stream: &'static str, line: &'a str },
    Result { payload: &'a RunResult },
    Coverage { payload: &'a CoverageReport },
    Error { message: &'a str },
}

impl Outbound<'_> {
    fn to_text(&self) -> String {
        // Serialization of these shapes cannot fail; fall back to a plain
        // error frame if it somehow does.
        serde_json::to_string(self)
            .unwrap_or_else(|_| r#"{"type":"error","message":"serialization failed"}"#.to_string())
    }
}

#[derive(Clone)]
pub struct AppState {
    pub hub: SharedHub,
    pub project_root: PathBuf,
    pub runner: Arc<PhpunitRunner>,
    pub coverage_report: PathBuf,
    pub coverage_include: Vec<String>,
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/ws", get(ws_handler))
        .route("/catalog", get(catalog_handler))
        .route("/run", post(run_handler))
        .route("/coverage", get(coverage_handler))
        .with_state(state)
}

pub async fn serve(state: AppState, listen: &str) -> Result<()> {
    let listener = tokio::net::TcpListener::bind(listen)
        .await
        .with_context(|| format!("failed to bind {listen}"))?;
    info!(%listen, root = %state.project_root.display(), "dashboard listening");
    axum::serve(listener, router(state))
        .await
        .context("server error")
}

async fn ws_handler(State(state): State<AppState>, upgrade: WebSocketUpgrade) -> impl IntoResponse {
    upgrade.on_upgrade(move |socket| handle_socket(state, socket))
}

async fn handle_socket(state: AppState, socket: WebSocket) {
    let (mut sender, mut receiver) = socket.split();
    let (tx, mut rx) = mpsc::unbounded_channel::<String>();
    let id = state.hub.lock().unwrap().connect(tx);

    let mut send_task = tokio::spawn(async move {
        while let Some(message) = rx.recv().await {
            if sender.send(Message::Text(message.into())).await.is_err() {
                break;
            }
        }
    });

    // Inbound frames are read and discarded; the channel is server→client.
    let mut recv_task = tokio::spawn(async move {
        while let Some(Ok(message)) = receiver.next().await {
            if matches!(message, Message::Close(_)) {
                break;
            }
        }
    });

    tokio::select! {
        _ = &mut send_task => recv_task.abort(),
        _ = &mut recv_task => send_task.abort(),
    }
    state.hub.lock().unwrap().disconnect(id);
}

/// Rescan the project and return the catalog, pushing it to viewers too.
async fn catalog_handler(State(state): State<AppState>) -> Json<TestCatalog> {
    let catalog = discovery::discover(&state.project_root);
    state
        .hub
        .lock()
        .unwrap()
        .broadcast(&Outbound::Catalog { payload: &catalog }.to_text());
    Json(catalog)
}

/// Kick off a test run. Responds as soon as the process is spawned; output,
/// the parsed result, and any parse error arrive on the live channel.
async fn run_handler(
    State(state): State<AppState>,
    Json(request): Json<RunRequest>,
) -> impl IntoResponse {
    let log_file = match tempfile::Builder::new()
        .prefix("beacon-junit-")
        .suffix(".xml")
        .tempfile()
    {
        Ok(file) => file.into_temp_path(),
        Err(err) => {
            return (
                StatusCode::INTERNAL_SERVER_ERROR,
                format!("failed to create log file: {err}"),
            );
        }
    };

    let handle = match state.runner.run(&log_file, &request) {
        Ok(handle) => handle,
        Err(err) => {
            error!(%err, "test run failed to start");
            let message = err.to_string();
            state
                .hub
                .lock()
                .unwrap()
                .broadcast(&Outbound::Error { message: &message }.to_text());
            return (StatusCode::INTERNAL_SERVER_ERROR, message);
        }
    };

    let hub = state.hub.clone();
    tokio::spawn(async move {
        stream_run(hub, handle, log_file).await;
    });

    (StatusCode::ACCEPTED, "run started".to_string())
}

/// Drive one spawned run to completion: forward output lines as progress,
/// then parse the log the runner wrote and broadcast the canonical result.
async fn stream_run(hub: SharedHub, mut handle: ProcessHandle, log_file: tempfile::TempPath) {
    while let Some(event) = handle.next_event().await {
        let (stream, line) = match &event {
            RunnerEvent::Stdout(line) => ("stdout", line.as_str()),
            RunnerEvent::Stderr(line) => ("stderr", line.as_str()),
        };
        hub.lock()
            .unwrap()
            .broadcast(&Outbound::Progress { stream, line }.to_text());
    }

    match handle.wait().await {
        Ok(status) => info!(code = status.code(), "test runner exited"),
        Err(err) => warn!(%err, "could not reap test runner"),
    }

    let xml = std::fs::read_to_string(&log_file).unwrap_or_default();
    match report::junit::parse(&xml) {
        Ok(result) => {
            hub.lock()
                .unwrap()
                .broadcast(&Outbound::Result { payload: &result }.to_text());
        }
        Err(err) => {
            warn!(%err, "run produced no parsable report");
            let message = err.to_string();
            hub.lock()
                .unwrap()
                .broadcast(&Outbound::Error { message: &message }.to_text());
        }
    }
}

/// Parse the project's Clover report, cross-referenced against the
/// configured included source directories.
async fn coverage_handler(State(state): State<AppState>) -> Result<Json<CoverageReport>, (StatusCode, String)> {
    let xml = std::fs::read_to_string(&state.coverage_report).map_err(|err| {
        (
            StatusCode::NOT_FOUND,
            format!(
                "no coverage report at {}: {err}",
                state.coverage_report.display()
            ),
        )
    })?;

    let coverage = report::clover::parse(&xml, &state.coverage_include)
        .map_err(|err| (StatusCode::UNPROCESSABLE_ENTITY, err.to_string()))?;

    state
        .hub
        .lock()
        .unwrap()
        .broadcast(&Outbound::Coverage { payload: &coverage }.to_text());
    Ok(Json(coverage))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::RunSummary;

    #[test]
    fn outbound_frames_are_tagged_json() {
        let catalog = TestCatalog::default();
        let text = Outbound::Catalog { payload: &catalog }.to_text();
        assert_eq!(text, r#"{"type":"catalog","payload":{"suites":[]}}"#);

        let result = RunResult {
            suites: vec![],
            summary: RunSummary::default(),
        };
        let text = Outbound::Result { payload: &result }.to_text();
        assert!(text.starts_with(r#"{"type":"result""#));

        let text = Outbound::Progress {
            stream: "stdout",
            line: "OK (2 tests)",
        }
        .to_text();
        assert_eq!(
            text,
            r#"{"type":"progress","stream":"stdout","line":"OK (2 tests)"}"#
        );
    }
}
