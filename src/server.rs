use std::{convert::Infallible, path::PathBuf, sync::Arc, time::Duration};

use anyhow::{Context, Result};
use axum::{
    extract::{rejection::FormRejection, State},
    http::StatusCode,
    response::{
        sse::{Event, KeepAlive, Sse},
        IntoResponse, Response,
    },
    routing::{get, post},
    Form, Json, Router,
};
use futures::stream::{self, Stream};
use serde::{Deserialize, Serialize};
use tokio_util::sync::CancellationToken;
use tower_http::{services::ServeDir, trace::TraceLayer};
use tracing::{info, warn};

use crate::{
    channel::{ResultChannel, DEFAULT_CAPACITY},
    netdetect, ports,
    progress::ProgressTracker,
    scanner::{self, DEFAULT_PROBE_TIMEOUT},
    streamer::{EventStreamer, StreamEvent},
    types::ProgressState,
};

/// Run-time settings for the control surface.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// JSON port catalog read at the start of every run
    pub catalog_path: PathBuf,
    pub probe_timeout: Duration,
    pub channel_capacity: usize,
    /// Scan local interface addresses in addition to user-supplied targets
    pub discover_local: bool,
    /// Directory of static UI files
    pub ui_dir: PathBuf,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            catalog_path: PathBuf::from("common_ports.json"),
            probe_timeout: DEFAULT_PROBE_TIMEOUT,
            channel_capacity: DEFAULT_CAPACITY,
            discover_local: true,
            ui_dir: PathBuf::from("ui"),
        }
    }
}

#[derive(Clone)]
pub struct AppState {
    inner: Arc<Shared>,
}

struct Shared {
    config: ServerConfig,
    tracker: Arc<ProgressTracker>,
    results: Arc<ResultChannel>,
    /// Cancelled on server shutdown; every event stream holds a child token.
    shutdown: CancellationToken,
}

impl AppState {
    pub fn new(config: ServerConfig) -> Self {
        let results = Arc::new(ResultChannel::new(config.channel_capacity));
        Self {
            inner: Arc::new(Shared {
                config,
                tracker: Arc::new(ProgressTracker::new()),
                results,
                shutdown: CancellationToken::new(),
            }),
        }
    }

    pub fn tracker(&self) -> &Arc<ProgressTracker> {
        &self.inner.tracker
    }

    pub fn results(&self) -> &Arc<ResultChannel> {
        &self.inner.results
    }

    pub fn shutdown(&self) -> &CancellationToken {
        &self.inner.shutdown
    }

    /// Admit and launch a run over local addresses plus `extra_targets`.
    ///
    /// Returns `false` without touching anything if a run is already in progress.
    /// Nothing between admission and launch awaits, so a dropped request cannot
    /// leave the tracker marked running.
    pub fn start_run(&self, extra_targets: &str) -> bool {
        let s = &self.inner;
        if !s.tracker.try_start() {
            warn!("scan rejected: already running");
            return false;
        }

        let mut targets = if s.config.discover_local {
            netdetect::local_targets_or_empty()
        } else {
            Vec::new()
        };
        targets.extend(netdetect::parse_extra_targets(extra_targets));
        let ports = ports::load_catalog_or_empty(&s.config.catalog_path);

        scanner::launch(
            targets,
            ports,
            &s.results,
            Arc::clone(&s.tracker),
            s.config.probe_timeout,
        );
        true
    }
}

/// Form body of `POST /scan`.
#[derive(Debug, Default, Deserialize)]
pub struct ScanForm {
    /// Comma-separated extra targets
    #[serde(default, rename = "customIPs")]
    pub custom_ips: String,
}

#[derive(Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct Message {
    pub message: String,
}

impl Message {
    fn json(message: &str) -> Json<Self> {
        Json(Self {
            message: message.to_string(),
        })
    }
}

pub fn router(state: AppState) -> Router {
    let static_svc =
        ServeDir::new(&state.inner.config.ui_dir).append_index_html_on_directories(true);

    let api = Router::new().route("/status", get(get_status));

    Router::new()
        .route("/scan", post(post_scan))
        .route("/events", get(get_events))
        .nest("/api", api)
        .fallback_service(static_svc)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Serve until Ctrl+C, then end open event streams and drain connections.
pub async fn spawn_server(bind: &str, config: ServerConfig) -> Result<()> {
    let state = AppState::new(config);
    let shutdown = state.shutdown().clone();
    let app = router(state);
    let listener = tokio::net::TcpListener::bind(bind)
        .await
        .with_context(|| format!("failed to bind {bind}"))?;
    info!("serving UI on http://{}", listener.local_addr()?);
    axum::serve(listener, app)
        .with_graceful_shutdown(async move {
            let _ = tokio::signal::ctrl_c().await;
            info!("shutting down");
            shutdown.cancel();
        })
        .await?;
    Ok(())
}

async fn get_status(State(app): State<AppState>) -> Json<ProgressState> {
    Json(app.tracker().snapshot())
}

async fn post_scan(
    State(app): State<AppState>,
    form: Result<Form<ScanForm>, FormRejection>,
) -> Response {
    // A missing or non-form body just means no extra targets.
    let form = form.map(|Form(f)| f).unwrap_or_default();
    if app.start_run(&form.custom_ips) {
        (StatusCode::OK, Message::json("Scan started")).into_response()
    } else {
        (StatusCode::CONFLICT, Message::json("Scan already in progress")).into_response()
    }
}

async fn get_events(
    State(app): State<AppState>,
) -> Sse<impl Stream<Item = Result<Event, Infallible>>> {
    // The body owns the streamer, so a result is dequeued only when hyper asks
    // for the next frame. Dropping the body on disconnect hands the rest back.
    let streamer = EventStreamer::new(Arc::clone(app.results()), app.shutdown().child_token());
    let body = stream::unfold(streamer, |mut streamer| async move {
        let event = streamer.next().await?;
        Some((Ok::<_, Infallible>(to_sse(event)), streamer))
    });

    Sse::new(body).keep_alive(KeepAlive::default())
}

fn to_sse(event: StreamEvent) -> Event {
    match event {
        StreamEvent::Result(result) => Event::default()
            .event("message")
            .json_data(&result)
            .unwrap_or_else(|e| {
                warn!(error = %e, "failed to encode scan result");
                Event::default().comment("encode error")
            }),
        StreamEvent::Complete => Event::default().event("complete").data("Scan complete"),
    }
}
