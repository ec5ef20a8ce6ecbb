//! Bounded pre-speech frame FIFO.
//!
//! While the capture state machine waits for the first speech frame it keeps
//! the most recent `capacity` frames here, so the lead-in to an utterance
//! (breath, soft onset consonants) is not lost. The oldest frame is evicted
//! once the ring is full; eviction is the only place the capture path ever
//! drops audio.

use std::collections::VecDeque;

use super::frame::AudioFrame;

/// Fixed-capacity FIFO of the most recent pre-speech frames.
#[derive(Debug)]
pub struct PreSpeechRing {
    frames: VecDeque<AudioFrame>,
    capacity: usize,
}

impl PreSpeechRing {
    /// `capacity` = pre-speech buffer duration / chunk duration, in frames.
    /// A capacity of 0 disables pre-speech buffering entirely.
    pub fn new(capacity: usize) -> Self {
        Self {
            frames: VecDeque::with_capacity(capacity),
            capacity,
        }
    }

    /// Push a frame, evicting the oldest if the ring is at capacity.
    pub fn push(&mut self, frame: AudioFrame) {
        if self.capacity == 0 {
            return;
        }
        if self.frames.len() == self.capacity {
            self.frames.pop_front();
        }
        self.frames.push_back(frame);
    }

    /// Move all buffered frames out in chronological order, leaving the ring empty.
    pub fn drain(&mut self) -> Vec<AudioFrame> {
        self.frames.drain(..).collect()
    }

    pub fn len(&self) -> usize {
        self.frames.len()
    }

    pub fn is_empty(&self) -> bool {
        self.frames.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn frame(tag: i16) -> AudioFrame {
        AudioFrame::new(vec![tag; 4], 16_000)
    }

    #[test]
    fn never_exceeds_capacity() {
        let mut ring = PreSpeechRing::new(3);
        for i in 0..10 {
            ring.push(frame(i));
            assert!(ring.len() <= 3);
        }
    }

    #[test]
    fn evicts_oldest_first() {
        let mut ring = PreSpeechRing::new(3);
        for i in 0..5 {
            ring.push(frame(i));
        }
        let drained = ring.drain();
        let tags: Vec<i16> = drained.iter().map(|f| f.samples[0]).collect();
        assert_eq!(tags, vec![2, 3, 4]);
    }

    #[test]
    fn drain_preserves_order_and_empties() {
        let mut ring = PreSpeechRing::new(4);
        ring.push(frame(7));
        ring.push(frame(8));
        let drained = ring.drain();
        assert_eq!(drained.len(), 2);
        assert_eq!(drained[0].samples[0], 7);
        assert_eq!(drained[1].samples[0], 8);
        assert!(ring.is_empty());
    }

    #[test]
    fn zero_capacity_holds_nothing() {
        let mut ring = PreSpeechRing::new(0);
        ring.push(frame(1));
        assert!(ring.is_empty());
        assert!(ring.drain().is_empty());
    }
}
