//! Shared playback cursor and its single periodic timer.
//!
//! The scheduler never owns a tokio timer. It only records the next deadline;
//! the viewer loop sleeps until that deadline and calls [`PlaybackScheduler::tick`].
//! Clearing the deadline is therefore the same as cancelling the timer, and at
//! most one can ever be pending.

use std::time::Duration;

use serde::Serialize;
use tokio::time::Instant;
use tracing::debug;

pub const DEFAULT_TICK_INTERVAL: Duration = Duration::from_millis(1_500);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum PlaybackPhase {
    #[default]
    Idle,
    Playing,
    Paused,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Tick {
    Advanced(usize),
    /// Cursor reached the end; playback stopped.
    Finished,
    /// Not playing; nothing to do.
    Ignored,
}

#[derive(Debug)]
pub struct PlaybackScheduler {
    tick_interval: Duration,
    phase: PlaybackPhase,
    cursor: usize,
    deadline: Option<Instant>,
}

impl Default for PlaybackScheduler {
    fn default() -> Self {
        Self::new(DEFAULT_TICK_INTERVAL)
    }
}

impl PlaybackScheduler {
    pub fn new(tick_interval: Duration) -> Self {
        Self {
            tick_interval,
            phase: PlaybackPhase::Idle,
            cursor: 0,
            deadline: None,
        }
    }

    pub fn tick_interval(&self) -> Duration {
        self.tick_interval
    }

    pub fn phase(&self) -> PlaybackPhase {
        self.phase
    }

    pub fn is_playing(&self) -> bool {
        self.phase == PlaybackPhase::Playing
    }

    pub fn cursor(&self) -> usize {
        self.cursor
    }

    /// When the pending tick is due, if any.
    pub fn deadline(&self) -> Option<Instant> {
        self.deadline
    }

    pub fn active_timers(&self) -> usize {
        usize::from(self.deadline.is_some())
    }

    /// Start playing. Does nothing while already playing or while nothing is
    /// buffered (`max_cursor` is `None`).
    pub fn play(&mut self, max_cursor: Option<usize>) -> bool {
        if self.is_playing() || max_cursor.is_none() {
            return false;
        }
        self.phase = PlaybackPhase::Playing;
        self.deadline = Some(Instant::now() + self.tick_interval);
        debug!(cursor = self.cursor, "playback started");
        true
    }

    pub fn pause(&mut self) -> bool {
        if !self.is_playing() {
            return false;
        }
        self.phase = PlaybackPhase::Paused;
        self.deadline = None;
        debug!(cursor = self.cursor, "playback paused");
        true
    }

    pub fn toggle(&mut self, max_cursor: Option<usize>) -> bool {
        if self.is_playing() {
            self.pause()
        } else {
            self.play(max_cursor)
        }
    }

    pub fn step_prev(&mut self) -> usize {
        self.pause();
        self.cursor = self.cursor.saturating_sub(1);
        self.cursor
    }

    pub fn step_next(&mut self, max_cursor: Option<usize>) -> usize {
        self.pause();
        if let Some(max) = max_cursor {
            self.cursor = (self.cursor + 1).min(max);
        }
        self.cursor
    }

    /// Timer callback. Advances by one while room remains, otherwise stops
    /// without wrapping.
    pub fn tick(&mut self, now: Instant, max_cursor: Option<usize>) -> Tick {
        if !self.is_playing() {
            self.deadline = None;
            return Tick::Ignored;
        }
        match max_cursor {
            Some(max) if self.cursor < max => {
                self.cursor += 1;
                self.deadline = Some(now + self.tick_interval);
                Tick::Advanced(self.cursor)
            }
            _ => {
                self.phase = PlaybackPhase::Idle;
                self.deadline = None;
                debug!(cursor = self.cursor, "playback reached the last frame");
                Tick::Finished
            }
        }
    }

    /// Cancel the timer and rewind for a fresh session.
    pub fn reset(&mut self) {
        self.phase = PlaybackPhase::Idle;
        self.cursor = 0;
        self.deadline = None;
    }
}

/// Sleep until `deadline`, or forever when there is none.
pub async fn wait_until(deadline: Option<Instant>) {
    match deadline {
        Some(deadline) => tokio::time::sleep_until(deadline).await,
        None => std::future::pending::<()>().await,
    }
}
