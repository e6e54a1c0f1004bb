//! Actix Web control server exposing viewer snapshots, metrics, and the
//! playback / route / picking controls.
//!
//! The server runs on a dedicated thread so the viewer loop never touches the
//! Actix runtime. Handlers only read the latest snapshot from a `watch`
//! receiver and queue commands; they never mutate viewer state directly.

use std::str::FromStr;

use actix_web::{
    App, HttpResponse, HttpServer,
    http::header,
    web::{self, Bytes},
};
use anyhow::{Context, Result};
use async_stream::stream;
use frame_ingest::Direction;
use metrics_exporter_prometheus::PrometheusHandle;
use ml_core::DetectionModel;
use playback::{CommandSender, RouteField, ViewerCommand, ViewerSnapshot, runtime::telemetry};
use serde::Deserialize;
use serde_json::to_string;
use tokio::sync::{oneshot, watch};
use tracing::{debug, error};

/// Shared state backing HTTP handlers.
pub(crate) struct ServerState {
    pub(crate) commands: CommandSender,
    pub(crate) snapshots: watch::Receiver<ViewerSnapshot>,
    pub(crate) metrics: Option<&'static PrometheusHandle>,
}

#[derive(Default)]
/// Handle for the control server thread.
pub(crate) struct ControlServer {
    shutdown: Option<oneshot::Sender<()>>,
    handle: Option<std::thread::JoinHandle<()>>,
}

impl ControlServer {
    /// Signal the server to stop and block until the thread exits.
    pub(crate) fn stop(self) {
        if let Some(tx) = self.shutdown {
            let _ = tx.send(());
        }
        if let Some(handle) = self.handle {
            let _ = handle.join();
        }
    }
}

#[derive(Deserialize)]
struct FieldEdit {
    field: RouteField,
    value: String,
}

#[derive(Deserialize)]
struct ModelSelection {
    model: String,
}

#[derive(Deserialize)]
struct MapClick {
    lat: f64,
    lng: f64,
}

#[derive(Deserialize)]
struct RenderSize {
    width: f32,
    height: f32,
}

/// Spawn the control server thread and return a handle that can stop it.
pub(crate) fn spawn_control_server(
    bind: (String, u16),
    commands: CommandSender,
    snapshots: watch::Receiver<ViewerSnapshot>,
    metrics: Option<&'static PrometheusHandle>,
) -> Result<ControlServer> {
    let (shutdown_tx, shutdown_rx) = oneshot::channel::<()>();
    let handle = telemetry::spawn_thread("viewer-control-server", move || {
        if let Err(err) = actix_web::rt::System::new().block_on(async move {
            let server = HttpServer::new(move || {
                App::new()
                    .app_data(web::Data::new(ServerState {
                        commands: commands.clone(),
                        snapshots: snapshots.clone(),
                        metrics,
                    }))
                    .configure(routes)
            })
            .workers(1)
            .bind(bind)?
            .run();

            let srv_handle = server.handle();
            actix_web::rt::spawn(async move {
                let _ = shutdown_rx.await;
                srv_handle.stop(true).await;
            });

            server.await
        }) {
            error!("HTTP server error: {err}");
        }
    })
    .context("Failed to spawn control server thread")?;
    Ok(ControlServer {
        shutdown: Some(shutdown_tx),
        handle: Some(handle),
    })
}

fn routes(cfg: &mut web::ServiceConfig) {
    cfg.route("/state", web::get().to(state_handler))
        .route("/state/stream", web::get().to(state_stream_handler))
        .route("/metrics", web::get().to(metrics_handler))
        .route("/playback/{action}", web::post().to(playback_handler))
        .route("/direction/{direction}", web::post().to(direction_handler))
        .route("/route/field", web::post().to(route_field_handler))
        .route("/route/model", web::post().to(route_model_handler))
        .route("/route/submit", web::post().to(submit_handler))
        .route("/pick/arm", web::post().to(arm_handler))
        .route("/pick/disarm", web::post().to(disarm_handler))
        .route("/map/click", web::post().to(map_click_handler))
        .route("/render", web::post().to(render_handler));
}

/// Queue a command for the viewer loop.
fn dispatch(state: &ServerState, command: ViewerCommand) -> HttpResponse {
    debug!(?command, "queueing viewer command");
    match state.commands.send(command) {
        Ok(()) => HttpResponse::Accepted().finish(),
        Err(_) => HttpResponse::ServiceUnavailable().body("viewer is not running"),
    }
}

fn playback_command(action: &str) -> Option<ViewerCommand> {
    match action {
        "play" => Some(ViewerCommand::Play),
        "pause" => Some(ViewerCommand::Pause),
        "toggle" => Some(ViewerCommand::Toggle),
        "prev" => Some(ViewerCommand::StepPrev),
        "next" => Some(ViewerCommand::StepNext),
        _ => None,
    }
}

/// Return the latest snapshot as JSON.
async fn state_handler(state: web::Data<ServerState>) -> HttpResponse {
    let snapshot = state.snapshots.borrow().clone();
    HttpResponse::Ok()
        .insert_header((header::ACCESS_CONTROL_ALLOW_ORIGIN, "*"))
        .json(snapshot)
}

/// Stream snapshots as Server-Sent Events, one per viewer reaction.
async fn state_stream_handler(state: web::Data<ServerState>) -> HttpResponse {
    let mut snapshots = state.snapshots.clone();
    let stream = stream! {
        yield Ok::<Bytes, actix_web::Error>(Bytes::from_static(b"retry: 500\n\n"));
        loop {
            let snapshot = snapshots.borrow_and_update().clone();
            match to_string(&snapshot) {
                Ok(json) => {
                    let mut sse_chunk = String::with_capacity(json.len() + 32);
                    sse_chunk.push_str("id: ");
                    sse_chunk.push_str(&snapshot.generation.to_string());
                    sse_chunk.push('\n');
                    sse_chunk.push_str("data: ");
                    sse_chunk.push_str(&json);
                    sse_chunk.push_str("\n\n");
                    yield Ok::<Bytes, actix_web::Error>(Bytes::from(sse_chunk));
                }
                Err(err) => {
                    let error_chunk = format!("event: error\ndata: {err}\n\n");
                    yield Ok::<Bytes, actix_web::Error>(Bytes::from(error_chunk));
                }
            }
            if snapshots.changed().await.is_err() {
                break;
            }
        }
    };

    HttpResponse::Ok()
        .insert_header((header::ACCESS_CONTROL_ALLOW_ORIGIN, "*"))
        .insert_header((header::ACCESS_CONTROL_ALLOW_HEADERS, "*"))
        .insert_header((header::ACCESS_CONTROL_ALLOW_METHODS, "GET"))
        .insert_header((header::ACCESS_CONTROL_EXPOSE_HEADERS, "Content-Type"))
        .append_header(("Cache-Control", "no-cache"))
        .append_header(("Content-Type", "text/event-stream"))
        .append_header(("Connection", "keep-alive"))
        .streaming(stream)
}

async fn metrics_handler(state: web::Data<ServerState>) -> HttpResponse {
    match state.metrics {
        Some(handle) => HttpResponse::Ok()
            .content_type("text/plain; version=0.0.4")
            .body(handle.render()),
        None => HttpResponse::NotFound().finish(),
    }
}

async fn playback_handler(
    path: web::Path<String>,
    state: web::Data<ServerState>,
) -> HttpResponse {
    match playback_command(&path) {
        Some(command) => dispatch(&state, command),
        None => HttpResponse::BadRequest().body(format!(
            "unknown playback action {:?} (expected play, pause, toggle, prev or next)",
            path.as_str()
        )),
    }
}

async fn direction_handler(
    path: web::Path<String>,
    state: web::Data<ServerState>,
) -> HttpResponse {
    match Direction::from_str(&path) {
        Ok(direction) => dispatch(&state, ViewerCommand::SetDirection(direction)),
        Err(err) => HttpResponse::BadRequest().body(err.to_string()),
    }
}

async fn route_field_handler(
    edit: web::Json<FieldEdit>,
    state: web::Data<ServerState>,
) -> HttpResponse {
    let FieldEdit { field, value } = edit.into_inner();
    dispatch(&state, ViewerCommand::EditRoute { field, value })
}

async fn route_model_handler(
    selection: web::Json<ModelSelection>,
    state: web::Data<ServerState>,
) -> HttpResponse {
    match selection.model.parse::<DetectionModel>() {
        Ok(model) => dispatch(&state, ViewerCommand::SelectModel(model)),
        Err(err) => HttpResponse::BadRequest().body(err.to_string()),
    }
}

async fn submit_handler(state: web::Data<ServerState>) -> HttpResponse {
    dispatch(&state, ViewerCommand::Submit)
}

async fn arm_handler(state: web::Data<ServerState>) -> HttpResponse {
    dispatch(&state, ViewerCommand::ArmPicking)
}

async fn disarm_handler(state: web::Data<ServerState>) -> HttpResponse {
    dispatch(&state, ViewerCommand::DisarmPicking)
}

async fn map_click_handler(
    click: web::Json<MapClick>,
    state: web::Data<ServerState>,
) -> HttpResponse {
    dispatch(
        &state,
        ViewerCommand::MapClick {
            lat: click.lat,
            lng: click.lng,
        },
    )
}

async fn render_handler(
    size: web::Json<RenderSize>,
    state: web::Data<ServerState>,
) -> HttpResponse {
    dispatch(
        &state,
        ViewerCommand::Resize {
            width: size.width,
            height: size.height,
        },
    )
}
