use std::collections::VecDeque;

/// Frames waiting for the next connected session, oldest first
#[derive(Debug, Default)]
pub struct OutboundQueue {
    frames: VecDeque<String>,
}

impl OutboundQueue {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, frame: String) {
        self.frames.push_back(frame);
    }

    /// Put back a frame whose write failed so it stays first in line
    pub fn requeue(&mut self, frame: String) {
        self.frames.push_front(frame);
    }

    pub fn pop(&mut self) -> Option<String> {
        self.frames.pop_front()
    }

    pub fn len(&self) -> usize {
        self.frames.len()
    }

    pub fn is_empty(&self) -> bool {
        self.frames.is_empty()
    }
}
