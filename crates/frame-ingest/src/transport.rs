//! Transport seam between the viewer and whatever produces frames.
//!
//! A transport receives begin-session commands and pushes [`Inbound`] events
//! into an unbounded channel drained by the viewer loop. Every event carries
//! the generation it was requested under so the loop can drop stale ones.

use std::sync::{
    Arc, Mutex,
    atomic::{AtomicBool, Ordering},
};

use tokio::sync::mpsc;

use crate::{
    types::{Frame, Generation, Inbound, TransportError},
    wire::StartStream,
};

pub type InboundSender = mpsc::UnboundedSender<Inbound>;
pub type InboundReceiver = mpsc::UnboundedReceiver<Inbound>;

pub fn inbound_channel() -> (InboundSender, InboundReceiver) {
    mpsc::unbounded_channel()
}

pub trait Transport: Send {
    /// Emit the begin-session command for `generation`.
    ///
    /// Must not block on the network: only failures to hand the command off
    /// are reported here. The outcome of the request arrives later as exactly
    /// one [`Inbound::Accepted`] or [`Inbound::Refused`], ahead of any frame.
    fn begin_session(
        &mut self,
        generation: Generation,
        command: &StartStream,
    ) -> Result<(), TransportError>;

    fn name(&self) -> &'static str;
}

/// Command recorded by a [`ChannelTransport`].
#[derive(Debug, Clone, PartialEq)]
pub struct SentCommand {
    pub generation: Generation,
    pub command: StartStream,
}

#[derive(Clone)]
struct ChannelShared {
    sink: InboundSender,
    sent: Arc<Mutex<Vec<SentCommand>>>,
    open: Arc<AtomicBool>,
}

/// In-process transport: commands are recorded and frames are pushed by hand
/// through a [`ChannelHandle`]. Used for replays and tests.
pub struct ChannelTransport {
    shared: ChannelShared,
}

/// Producer side of a [`ChannelTransport`].
#[derive(Clone)]
pub struct ChannelHandle {
    shared: ChannelShared,
}

impl ChannelTransport {
    pub fn new(sink: InboundSender) -> (Self, ChannelHandle) {
        let shared = ChannelShared {
            sink,
            sent: Arc::new(Mutex::new(Vec::new())),
            open: Arc::new(AtomicBool::new(true)),
        };
        (
            Self {
                shared: shared.clone(),
            },
            ChannelHandle { shared },
        )
    }
}

impl Transport for ChannelTransport {
    fn begin_session(
        &mut self,
        generation: Generation,
        command: &StartStream,
    ) -> Result<(), TransportError> {
        if !self.shared.open.load(Ordering::SeqCst) || self.shared.sink.is_closed() {
            return Err(TransportError::Closed);
        }
        let mut sent = self
            .shared
            .sent
            .lock()
            .map_err(|_| TransportError::Closed)?;
        sent.push(SentCommand {
            generation,
            command: command.clone(),
        });
        Ok(())
    }

    fn name(&self) -> &'static str {
        "channel"
    }
}

impl ChannelHandle {
    /// Push a frame tagged with `generation`. Returns `false` once the viewer
    /// has gone away.
    pub fn push_frame(&self, generation: Generation, frame: Frame) -> bool {
        self.push(Inbound::Frame { generation, frame })
    }

    /// Report that the backend took the command for `generation`.
    pub fn accept(&self, generation: Generation) -> bool {
        self.push(Inbound::Accepted { generation })
    }

    pub fn refuse(&self, generation: Generation, reason: impl Into<String>) -> bool {
        self.push(Inbound::Refused {
            generation,
            reason: reason.into(),
        })
    }

    pub fn push(&self, event: Inbound) -> bool {
        self.shared.sink.send(event).is_ok()
    }

    /// Commands received so far, oldest first.
    pub fn commands(&self) -> Vec<SentCommand> {
        match self.shared.sent.lock() {
            Ok(sent) => sent.clone(),
            Err(_) => Vec::new(),
        }
    }

    /// Generation of the most recent begin-session command.
    pub fn latest_generation(&self) -> Option<Generation> {
        self.commands().last().map(|sent| sent.generation)
    }

    /// Reject all further begin-session commands.
    pub fn close(&self) {
        self.shared.open.store(false, Ordering::SeqCst);
    }

    pub fn reopen(&self) {
        self.shared.open.store(true, Ordering::SeqCst);
    }
}
