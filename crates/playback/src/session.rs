//! Session lifecycle: validation, generation bookkeeping, and the begin-session
//! command.

use chrono::{DateTime, Utc};
use frame_ingest::{FrameBuffer, Generation, Transport, TransportError};
use serde::Serialize;
use tracing::{debug, info, warn};

use crate::{
    route::{InvalidRoute, RouteDraft, RouteRequest},
    scheduler::PlaybackScheduler,
};

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StreamSession {
    pub generation: Generation,
    pub request: RouteRequest,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug)]
pub enum SessionStart {
    /// Draft was incomplete or malformed; nothing changed.
    Rejected(InvalidRoute),
    /// The command is on its way. The session becomes active once the
    /// transport accepts it.
    Requested(Generation),
    /// The transport refused the command; the previous session stays active.
    Failed(TransportError),
}

pub struct SessionController {
    user_id: String,
    generation: Generation,
    pending: Option<StreamSession>,
    active: Option<StreamSession>,
    transport: Box<dyn Transport>,
}

impl SessionController {
    pub fn new(user_id: impl Into<String>, transport: Box<dyn Transport>) -> Self {
        Self {
            user_id: user_id.into(),
            generation: 0,
            pending: None,
            active: None,
            transport,
        }
    }

    /// Generation of the latest requested session, `0` before the first one.
    /// Events tagged with any other generation are stale.
    pub fn generation(&self) -> Generation {
        self.generation
    }

    pub fn active(&self) -> Option<&StreamSession> {
        self.active.as_ref()
    }

    /// Session waiting for the transport to accept or refuse it.
    pub fn pending(&self) -> Option<&StreamSession> {
        self.pending.as_ref()
    }

    pub fn transport_name(&self) -> &'static str {
        self.transport.name()
    }

    /// Request a new session built from `draft`.
    ///
    /// A handed-off command takes the next generation right away, so events
    /// from the superseded session are dropped from here on. Buffers and
    /// playback are left alone until [`accept`](Self::accept).
    pub fn start_session(&mut self, draft: &RouteDraft) -> SessionStart {
        let request = match draft.to_request() {
            Ok(request) => request,
            Err(err) => {
                debug!("Dropping route submission: {err}");
                metrics::counter!("route_viewer_sessions_total", "outcome" => "rejected")
                    .increment(1);
                return SessionStart::Rejected(err);
            }
        };

        let next = self.generation + 1;
        let command = request.to_command(&self.user_id);
        if let Err(err) = self.transport.begin_session(next, &command) {
            warn!(
                transport = self.transport.name(),
                "Failed to start stream session: {err}"
            );
            metrics::counter!("route_viewer_sessions_total", "outcome" => "failed").increment(1);
            return SessionStart::Failed(err);
        }

        self.generation = next;
        info!(
            generation = next,
            user_id = %self.user_id,
            num_points = request.num_points,
            model = %request.model,
            "Requested stream session"
        );
        self.pending = Some(StreamSession {
            generation: next,
            request,
            created_at: Utc::now(),
        });
        SessionStart::Requested(next)
    }

    /// Promote the pending session once its transport accepted it.
    ///
    /// The timer is cancelled, the cursor rewound, and every sequence cleared
    /// before this returns, so no frame of the new generation can be observed
    /// against old state. Returns `false` when `generation` is not pending.
    pub fn accept(
        &mut self,
        generation: Generation,
        buffer: &mut FrameBuffer,
        scheduler: &mut PlaybackScheduler,
    ) -> bool {
        let Some(session) = self
            .pending
            .take_if(|pending| pending.generation == generation)
        else {
            return false;
        };
        scheduler.reset();
        buffer.reset(generation);
        info!(generation, "Started stream session");
        self.active = Some(session);
        metrics::counter!("route_viewer_sessions_total", "outcome" => "started").increment(1);
        true
    }

    /// Drop the pending session after its transport refused it. Buffers and
    /// playback keep showing the previous session.
    pub fn refuse(&mut self, generation: Generation) -> bool {
        if self
            .pending
            .take_if(|pending| pending.generation == generation)
            .is_none()
        {
            return false;
        }
        metrics::counter!("route_viewer_sessions_total", "outcome" => "failed").increment(1);
        true
    }
}

#[cfg(test)]
mod tests {
    use frame_ingest::{ChannelTransport, Direction, Frame, inbound_channel};
    use ml_core::DetectionModel;

    use super::*;

    fn draft() -> RouteDraft {
        RouteDraft {
            start_lat: "37.774900".into(),
            start_lng: "-122.419400".into(),
            end_lat: "37.804900".into(),
            end_lng: "-122.271100".into(),
            num_points: "10".into(),
            model: DetectionModel::Dino,
        }
    }

    fn frame(direction: Direction) -> Frame {
        Frame {
            direction,
            image_ref: None,
            lat: None,
            lon: None,
            detections: Vec::new(),
        }
    }

    #[test]
    fn acceptance_clears_buffers_and_rewinds() {
        let (tx, _rx) = inbound_channel();
        let (transport, handle) = ChannelTransport::new(tx);
        let mut controller = SessionController::new("7", Box::new(transport));
        let mut buffer = FrameBuffer::new();
        let mut scheduler = PlaybackScheduler::default();

        assert!(matches!(
            controller.start_session(&draft()),
            SessionStart::Requested(1)
        ));
        assert!(controller.accept(1, &mut buffer, &mut scheduler));
        for direction in Direction::ALL {
            buffer.on_frame(1, frame(direction));
            buffer.on_frame(1, frame(direction));
        }
        scheduler.play(buffer.max_cursor());
        scheduler.step_next(buffer.max_cursor());

        assert!(matches!(
            controller.start_session(&draft()),
            SessionStart::Requested(2)
        ));
        assert_eq!(controller.generation(), 2);
        assert_eq!(buffer.len(Direction::Front), 2);
        assert_eq!(scheduler.cursor(), 1);

        assert!(!controller.accept(1, &mut buffer, &mut scheduler));
        assert!(controller.accept(2, &mut buffer, &mut scheduler));
        assert!(buffer.is_empty());
        assert_eq!(buffer.generation(), 2);
        assert_eq!(scheduler.cursor(), 0);
        assert!(!scheduler.is_playing());
        assert_eq!(scheduler.active_timers(), 0);
        assert!(controller.pending().is_none());

        let sent = handle.commands();
        assert_eq!(sent.len(), 2);
        assert_eq!(sent[1].generation, 2);
        assert_eq!(sent[1].command.user_id, "7");
        assert_eq!(sent[1].command.model, DetectionModel::Dino);
        assert_eq!(controller.active().map(|s| s.generation), Some(2));
    }

    #[test]
    fn incomplete_draft_is_dropped_silently() {
        let (tx, _rx) = inbound_channel();
        let (transport, handle) = ChannelTransport::new(tx);
        let mut controller = SessionController::new("7", Box::new(transport));

        let mut partial = draft();
        partial.end_lat.clear();
        assert!(matches!(
            controller.start_session(&partial),
            SessionStart::Rejected(InvalidRoute::Missing(_))
        ));
        assert!(handle.commands().is_empty());
        assert_eq!(controller.generation(), 0);
        assert!(controller.active().is_none());
        assert!(controller.pending().is_none());
    }

    #[test]
    fn transport_failure_keeps_previous_session() {
        let (tx, _rx) = inbound_channel();
        let (transport, handle) = ChannelTransport::new(tx);
        let mut controller = SessionController::new("7", Box::new(transport));
        let mut buffer = FrameBuffer::new();
        let mut scheduler = PlaybackScheduler::default();

        controller.start_session(&draft());
        controller.accept(1, &mut buffer, &mut scheduler);
        buffer.on_frame(1, frame(Direction::Front));

        handle.close();
        assert!(matches!(
            controller.start_session(&draft()),
            SessionStart::Failed(TransportError::Closed)
        ));
        assert_eq!(controller.generation(), 1);
        assert!(controller.pending().is_none());
        assert_eq!(buffer.len(Direction::Front), 1);

        handle.reopen();
        assert!(matches!(
            controller.start_session(&draft()),
            SessionStart::Requested(2)
        ));
    }

    #[test]
    fn refused_session_leaves_buffers_alone() {
        let (tx, _rx) = inbound_channel();
        let (transport, _handle) = ChannelTransport::new(tx);
        let mut controller = SessionController::new("7", Box::new(transport));
        let mut buffer = FrameBuffer::new();
        let mut scheduler = PlaybackScheduler::default();

        controller.start_session(&draft());
        controller.accept(1, &mut buffer, &mut scheduler);
        buffer.on_frame(1, frame(Direction::Back));
        scheduler.play(buffer.max_cursor());

        controller.start_session(&draft());
        assert!(controller.refuse(2));
        assert!(!controller.refuse(2));
        assert!(!controller.accept(2, &mut buffer, &mut scheduler));

        assert_eq!(controller.generation(), 2);
        assert_eq!(controller.active().map(|s| s.generation), Some(1));
        assert_eq!(buffer.len(Direction::Back), 1);
        assert!(scheduler.is_playing());
    }
}
