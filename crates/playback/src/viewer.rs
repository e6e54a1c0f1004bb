//! The viewer event loop.
//!
//! A [`Viewer`] owns every piece of mutable state: the session controller, the
//! frame buffer, the playback scheduler, the position emitter, the coordinate
//! picker, and the route draft. It runs on a single task and reacts to four
//! sources: control commands, inbound transport events, the playback deadline,
//! and the stall watchdog poll. After each reaction the loop publishes a fresh
//! [`ViewerSnapshot`] on a `watch` channel; collaborators only ever read that.

use std::time::Duration;

use frame_ingest::{
    Direction, Frame, FrameBuffer, Generation, Inbound, InboundReceiver, Ingest, Transport,
};
use ml_core::{DetectionModel, OverlayRect, map_boxes};
use serde::Serialize;
use tokio::{
    sync::{mpsc, watch},
    time::{Instant, MissedTickBehavior},
};
use tracing::{Instrument, debug, info, info_span, warn};

use crate::{
    map::{MapSink, MapView, Marker},
    picker::{CoordinatePicker, Pick, PickState},
    position::PositionEmitter,
    route::{RouteDraft, RouteField},
    runtime::{
        config::DEFAULT_STALL_THRESHOLD,
        watchdog::{StreamWatchdog, WATCHDOG_POLL_INTERVAL_MS},
    },
    scheduler::{DEFAULT_TICK_INTERVAL, PlaybackPhase, PlaybackScheduler, Tick, wait_until},
    session::{SessionController, SessionStart, StreamSession},
};

/// Shown when the active direction has no frame at the cursor.
pub const PLACEHOLDER_IMAGE: &str = "/static/images/placeholder.jpg";

pub type CommandSender = mpsc::UnboundedSender<ViewerCommand>;
pub type CommandReceiver = mpsc::UnboundedReceiver<ViewerCommand>;

pub fn command_channel() -> (CommandSender, CommandReceiver) {
    mpsc::unbounded_channel()
}

#[derive(Debug, Clone, PartialEq)]
pub enum ViewerCommand {
    Play,
    Pause,
    Toggle,
    StepPrev,
    StepNext,
    SetDirection(Direction),
    EditRoute { field: RouteField, value: String },
    SelectModel(DetectionModel),
    ArmPicking,
    DisarmPicking,
    MapClick { lat: f64, lng: f64 },
    Submit,
    /// The active frame was drawn at a new size.
    Resize { width: f32, height: f32 },
    Shutdown,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Control {
    Continue,
    Shutdown,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(tag = "state", rename_all = "camelCase")]
pub enum StreamStatus {
    #[default]
    Idle,
    /// Waiting for the transport to accept the latest request.
    Starting {
        generation: Generation,
    },
    Streaming {
        generation: Generation,
    },
    Ended {
        generation: Generation,
    },
    StartFailed {
        reason: String,
    },
    Disconnected {
        generation: Generation,
        reason: String,
    },
    Stalled {
        generation: Generation,
    },
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DirectionTab {
    pub direction: Direction,
    pub label: &'static str,
    pub frames: usize,
    pub active: bool,
}

/// Read-only view of the viewer after the latest reaction.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ViewerSnapshot {
    pub generation: Generation,
    pub session: Option<StreamSession>,
    pub status: StreamStatus,
    pub phase: PlaybackPhase,
    pub playing: bool,
    pub cursor: usize,
    pub max_cursor: Option<usize>,
    /// `Viewing image N of M`, once anything is buffered.
    pub progress: Option<String>,
    pub active_direction: Direction,
    pub tabs: Vec<DirectionTab>,
    pub frame: Option<Frame>,
    /// Image to draw: the frame's locator, or the placeholder.
    pub image_ref: String,
    pub overlays: Vec<OverlayRect>,
    pub render_width: f32,
    pub render_height: f32,
    pub route: RouteDraft,
    pub pick: PickState,
    pub map: MapView,
    pub markers: Vec<Marker>,
}

#[derive(Clone, Debug)]
pub struct ViewerOptions {
    pub user_id: String,
    pub tick_interval: Duration,
    pub stall_threshold: Duration,
    pub render_width: f32,
    pub render_height: f32,
    /// Initial route form contents.
    pub route: RouteDraft,
    /// Submit `route` as soon as the loop starts.
    pub autostart: bool,
}

impl Default for ViewerOptions {
    fn default() -> Self {
        Self {
            user_id: "1".into(),
            tick_interval: DEFAULT_TICK_INTERVAL,
            stall_threshold: DEFAULT_STALL_THRESHOLD,
            render_width: 0.0,
            render_height: 0.0,
            route: RouteDraft::default(),
            autostart: false,
        }
    }
}

pub fn progress_label(cursor: usize, frames: usize) -> Option<String> {
    (frames > 0).then(|| format!("Viewing image {} of {frames}", cursor + 1))
}

pub struct Viewer {
    controller: SessionController,
    buffer: FrameBuffer,
    scheduler: PlaybackScheduler,
    emitter: PositionEmitter,
    picker: CoordinatePicker,
    draft: RouteDraft,
    map: MapView,
    active_direction: Direction,
    render: (f32, f32),
    status: StreamStatus,
    watchdog: StreamWatchdog,
    autostart: bool,
    snapshots: watch::Sender<ViewerSnapshot>,
}

impl Viewer {
    pub fn new(options: ViewerOptions, transport: Box<dyn Transport>) -> Self {
        let (snapshots, _) = watch::channel(ViewerSnapshot::default());
        let mut viewer = Self {
            controller: SessionController::new(options.user_id, transport),
            buffer: FrameBuffer::new(),
            scheduler: PlaybackScheduler::new(options.tick_interval),
            emitter: PositionEmitter::new(),
            picker: CoordinatePicker::new(),
            draft: options.route,
            map: MapView::default(),
            active_direction: Direction::Front,
            render: (options.render_width, options.render_height),
            status: StreamStatus::Idle,
            watchdog: StreamWatchdog::new(options.stall_threshold),
            autostart: options.autostart,
            snapshots,
        };
        viewer
            .map
            .set_route_endpoints(viewer.draft.start(), viewer.draft.end());
        viewer.refresh();
        viewer
    }

    pub fn subscribe(&self) -> watch::Receiver<ViewerSnapshot> {
        self.snapshots.subscribe()
    }

    pub fn handle_command(&mut self, command: ViewerCommand) -> Control {
        debug!(?command, "viewer command");
        let max_cursor = self.buffer.max_cursor();
        match command {
            ViewerCommand::Play => {
                self.scheduler.play(max_cursor);
            }
            ViewerCommand::Pause => {
                self.scheduler.pause();
            }
            ViewerCommand::Toggle => {
                self.scheduler.toggle(max_cursor);
            }
            ViewerCommand::StepPrev => {
                self.scheduler.step_prev();
            }
            ViewerCommand::StepNext => {
                self.scheduler.step_next(max_cursor);
            }
            ViewerCommand::SetDirection(direction) => self.active_direction = direction,
            ViewerCommand::EditRoute { field, value } => {
                self.draft.set_field(field, value);
                self.map
                    .set_route_endpoints(self.draft.start(), self.draft.end());
            }
            ViewerCommand::SelectModel(model) => self.draft.set_model(model),
            ViewerCommand::ArmPicking => self.picker.arm(),
            ViewerCommand::DisarmPicking => self.picker.disarm(),
            ViewerCommand::MapClick { lat, lng } => {
                if let Pick::Ignored =
                    self.picker
                        .on_map_click(lat, lng, &mut self.draft, &mut self.map)
                {
                    debug!(lat, lng, "map click not captured");
                }
            }
            ViewerCommand::Submit => self.submit(),
            ViewerCommand::Resize { width, height } => self.render = (width, height),
            ViewerCommand::Shutdown => return Control::Shutdown,
        }
        self.refresh();
        Control::Continue
    }

    fn submit(&mut self) {
        self.picker.disarm();
        match self.controller.start_session(&self.draft) {
            SessionStart::Requested(generation) => {
                self.watchdog.disarm();
                self.status = StreamStatus::Starting { generation };
            }
            SessionStart::Rejected(_) => {}
            SessionStart::Failed(err) => {
                self.status = StreamStatus::StartFailed {
                    reason: err.to_string(),
                };
            }
        }
    }

    pub fn handle_inbound(&mut self, event: Inbound) {
        let current = self.controller.generation();
        if event.generation() != current {
            debug!(
                current,
                received = event.generation(),
                "dropping stream event from superseded session"
            );
            metrics::counter!("route_viewer_stale_events_total").increment(1);
            return;
        }
        match event {
            Inbound::Accepted { generation } => {
                if !self
                    .controller
                    .accept(generation, &mut self.buffer, &mut self.scheduler)
                {
                    return;
                }
                self.emitter.rewatch();
                self.status = StreamStatus::Streaming { generation };
                self.watchdog.arm(Instant::now());
            }
            Inbound::Refused { generation, reason } => {
                if !self.controller.refuse(generation) {
                    return;
                }
                warn!(generation, "Stream session refused: {reason}");
                self.status = StreamStatus::StartFailed { reason };
            }
            Inbound::Frame { generation, frame } => match self.buffer.on_frame(generation, frame) {
                Ingest::Stale { current, received } => {
                    debug!(current, received, "dropping frame from superseded session");
                    metrics::counter!("route_viewer_stale_events_total").increment(1);
                    return;
                }
                Ingest::Appended {
                    direction, first, ..
                } => {
                    metrics::counter!(
                        "route_viewer_frames_total",
                        "direction" => direction.as_str()
                    )
                    .increment(1);
                    if self.watchdog.beat(Instant::now()) {
                        info!(generation, "Frame stream resumed");
                    }
                    if matches!(
                        self.status,
                        StreamStatus::Stalled { .. } | StreamStatus::StartFailed { .. }
                    ) {
                        self.status = StreamStatus::Streaming { generation };
                    }
                    if first {
                        self.scheduler.play(self.buffer.max_cursor());
                    }
                }
            },
            Inbound::Ended { generation } => {
                info!(generation, "Frame stream finished");
                self.watchdog.disarm();
                self.status = StreamStatus::Ended { generation };
            }
            Inbound::Disconnected { generation, reason } => {
                warn!(generation, "Frame stream disconnected: {reason}");
                self.watchdog.disarm();
                self.status = StreamStatus::Disconnected { generation, reason };
            }
        }
        self.refresh();
    }

    pub fn handle_tick(&mut self, now: Instant) {
        match self.scheduler.tick(now, self.buffer.max_cursor()) {
            Tick::Advanced(cursor) => {
                metrics::counter!("route_viewer_playback_ticks_total").increment(1);
                debug!(cursor, "playback advanced");
            }
            Tick::Finished => info!(cursor = self.scheduler.cursor(), "Playback reached the end"),
            Tick::Ignored => return,
        }
        self.refresh();
    }

    pub fn check_watchdog(&mut self, now: Instant) {
        if !self.watchdog.check(now) {
            return;
        }
        if let StreamStatus::Streaming { generation } = self.status {
            warn!(generation, "No frames received recently; stream looks stalled");
            self.status = StreamStatus::Stalled { generation };
            self.refresh();
        }
    }

    /// Re-run position feedback and publish a snapshot.
    fn refresh(&mut self) {
        self.emitter.observe(
            &self.buffer,
            self.active_direction,
            self.scheduler.cursor(),
            &mut self.map,
        );
        let snapshot = self.snapshot();
        metrics::gauge!("route_viewer_cursor").set(snapshot.cursor as f64);
        metrics::gauge!("route_viewer_buffered_points").set(self.buffer.max_len() as f64);
        self.snapshots.send_replace(snapshot);
    }

    pub fn snapshot(&self) -> ViewerSnapshot {
        let cursor = self.scheduler.cursor();
        let frame = self.buffer.get(self.active_direction, cursor).cloned();
        let (width, height) = self.render;
        let overlays = frame
            .as_ref()
            .map(|frame| map_boxes(&frame.detections, width, height))
            .unwrap_or_default();
        let image_ref = frame
            .as_ref()
            .and_then(|frame| frame.image_ref.clone())
            .unwrap_or_else(|| PLACEHOLDER_IMAGE.to_string());

        ViewerSnapshot {
            generation: self.controller.generation(),
            session: self.controller.active().cloned(),
            status: self.status.clone(),
            phase: self.scheduler.phase(),
            playing: self.scheduler.is_playing(),
            cursor,
            max_cursor: self.buffer.max_cursor(),
            progress: progress_label(cursor, self.buffer.max_len()),
            active_direction: self.active_direction,
            tabs: Direction::ALL
                .into_iter()
                .map(|direction| DirectionTab {
                    direction,
                    label: direction.label(),
                    frames: self.buffer.len(direction),
                    active: direction == self.active_direction,
                })
                .collect(),
            frame,
            image_ref,
            overlays,
            render_width: width,
            render_height: height,
            route: self.draft.clone(),
            pick: self.picker.state(),
            map: self.map.clone(),
            markers: self.map.markers(),
        }
    }

    /// Drive the viewer until a shutdown command arrives or every command
    /// sender is gone.
    pub async fn run(mut self, mut commands: CommandReceiver, mut inbound: InboundReceiver) {
        let span = info_span!("viewer", transport = self.controller.transport_name());
        async move {
            let mut watchdog_poll =
                tokio::time::interval(Duration::from_millis(WATCHDOG_POLL_INTERVAL_MS));
            watchdog_poll.set_missed_tick_behavior(MissedTickBehavior::Delay);

            if self.autostart {
                self.handle_command(ViewerCommand::Submit);
            }

            loop {
                let deadline = self.scheduler.deadline();
                tokio::select! {
                    command = commands.recv() => {
                        let Some(command) = command else {
                            info!("Command channel closed; stopping viewer");
                            break;
                        };
                        if self.handle_command(command) == Control::Shutdown {
                            info!("Viewer shutting down");
                            break;
                        }
                    }
                    Some(event) = inbound.recv() => self.handle_inbound(event),
                    _ = wait_until(deadline) => self.handle_tick(Instant::now()),
                    _ = watchdog_poll.tick() => self.check_watchdog(Instant::now()),
                }
            }
        }
        .instrument(span)
        .await
    }
}
