//! Synchronized multi-direction playback of streamed route captures.
//!
//! - `session`: session lifecycle and generation bookkeeping.
//! - `scheduler`: the shared cursor and its playback timer.
//! - `position`: vehicle marker feedback for the frame on screen.
//! - `picker`: map-click capture of route endpoints.
//! - `viewer`: the event loop tying everything together.
//! - `runtime`: configuration, telemetry, and the stream watchdog.

pub mod map;
pub mod picker;
pub mod position;
pub mod route;
pub mod runtime;
pub mod scheduler;
pub mod session;
pub mod viewer;

pub use map::{MapSink, MapView, Marker, MarkerIcon};
pub use picker::{Awaiting, CoordinatePicker, Pick, PickState};
pub use position::PositionEmitter;
pub use route::{InvalidRoute, LatLng, RouteDraft, RouteField, RouteRequest};
pub use runtime::{BackendSource, TelemetryOptions, ViewerCliArgs, ViewerConfig};
pub use scheduler::{DEFAULT_TICK_INTERVAL, PlaybackPhase, PlaybackScheduler, Tick};
pub use session::{SessionController, SessionStart, StreamSession};
pub use viewer::{
    CommandReceiver, CommandSender, Control, StreamStatus, Viewer, ViewerCommand, ViewerOptions,
    ViewerSnapshot, command_channel,
};
