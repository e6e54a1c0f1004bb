//! Append-only per-direction frame sequences for the active session.

use tracing::trace;

use crate::types::{Direction, Frame, Generation};

/// Result of offering a frame to the buffer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Ingest {
    Appended {
        direction: Direction,
        index: usize,
        /// First frame of the session across all directions.
        first: bool,
    },
    /// Tagged with a superseded session; dropped.
    Stale {
        current: Generation,
        received: Generation,
    },
}

/// Four ordered sequences, one per [`Direction`], owned by a single session
/// generation.
///
/// Frames are kept strictly in arrival order. Gaps or duplicates from the
/// transport are preserved as-is.
#[derive(Debug, Default)]
pub struct FrameBuffer {
    generation: Generation,
    sequences: [Vec<Frame>; 4],
}

impl FrameBuffer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn generation(&self) -> Generation {
        self.generation
    }

    /// Drop every buffered frame and start accepting frames for `generation`
    /// only.
    pub fn reset(&mut self, generation: Generation) {
        for sequence in &mut self.sequences {
            sequence.clear();
        }
        self.generation = generation;
    }

    pub fn on_frame(&mut self, generation: Generation, frame: Frame) -> Ingest {
        if generation != self.generation {
            return Ingest::Stale {
                current: self.generation,
                received: generation,
            };
        }

        let first = self.is_empty();
        let direction = frame.direction;
        let sequence = &mut self.sequences[direction.index()];
        sequence.push(frame);
        let index = sequence.len() - 1;
        trace!(%direction, index, generation, "buffered frame");

        Ingest::Appended {
            direction,
            index,
            first,
        }
    }

    pub fn sequence(&self, direction: Direction) -> &[Frame] {
        &self.sequences[direction.index()]
    }

    pub fn get(&self, direction: Direction, index: usize) -> Option<&Frame> {
        self.sequences[direction.index()].get(index)
    }

    pub fn len(&self, direction: Direction) -> usize {
        self.sequences[direction.index()].len()
    }

    /// Length of the longest sequence.
    pub fn max_len(&self) -> usize {
        self.sequences.iter().map(Vec::len).max().unwrap_or(0)
    }

    /// Highest cursor position with a frame in at least one direction, `None`
    /// while nothing is buffered.
    pub fn max_cursor(&self) -> Option<usize> {
        self.max_len().checked_sub(1)
    }

    pub fn is_empty(&self) -> bool {
        self.sequences.iter().all(Vec::is_empty)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn frame(direction: Direction, tag: &str) -> Frame {
        Frame {
            direction,
            image_ref: Some(tag.to_string()),
            lat: None,
            lon: None,
            detections: Vec::new(),
        }
    }

    fn refs(buffer: &FrameBuffer, direction: Direction) -> Vec<String> {
        buffer
            .sequence(direction)
            .iter()
            .filter_map(|frame| frame.image_ref.clone())
            .collect()
    }

    #[test]
    fn keeps_arrival_order_within_a_direction() {
        for count in [0usize, 1, 2, 17] {
            let mut buffer = FrameBuffer::new();
            let expected: Vec<String> = (0..count).map(|i| format!("f{i}")).collect();
            for tag in &expected {
                buffer.on_frame(0, frame(Direction::Left, tag));
            }
            assert_eq!(refs(&buffer, Direction::Left), expected);
        }
    }

    #[test]
    fn interleaved_directions_do_not_affect_each_other() {
        let mut buffer = FrameBuffer::new();
        buffer.reset(3);
        buffer.on_frame(3, frame(Direction::Back, "b0"));
        buffer.on_frame(3, frame(Direction::Front, "f0"));
        buffer.on_frame(3, frame(Direction::Back, "b1"));
        buffer.on_frame(3, frame(Direction::Back, "b1"));

        assert_eq!(refs(&buffer, Direction::Back), ["b0", "b1", "b1"]);
        assert_eq!(refs(&buffer, Direction::Front), ["f0"]);
        assert_eq!(buffer.len(Direction::Right), 0);
        assert_eq!(buffer.max_len(), 3);
        assert_eq!(buffer.max_cursor(), Some(2));
    }

    #[test]
    fn flags_only_the_first_frame_of_a_session() {
        let mut buffer = FrameBuffer::new();
        buffer.reset(1);
        assert_eq!(
            buffer.on_frame(1, frame(Direction::Right, "r0")),
            Ingest::Appended {
                direction: Direction::Right,
                index: 0,
                first: true
            }
        );
        assert_eq!(
            buffer.on_frame(1, frame(Direction::Front, "f0")),
            Ingest::Appended {
                direction: Direction::Front,
                index: 0,
                first: false
            }
        );
    }

    #[test]
    fn drops_frames_from_other_generations() {
        let mut buffer = FrameBuffer::new();
        buffer.reset(1);
        buffer.on_frame(1, frame(Direction::Front, "old"));
        buffer.reset(2);

        assert!(buffer.is_empty());
        assert_eq!(buffer.max_cursor(), None);
        assert_eq!(
            buffer.on_frame(1, frame(Direction::Front, "late")),
            Ingest::Stale {
                current: 2,
                received: 1
            }
        );
        assert!(buffer.is_empty());

        buffer.on_frame(2, frame(Direction::Front, "new"));
        assert_eq!(refs(&buffer, Direction::Front), ["new"]);
    }
}
