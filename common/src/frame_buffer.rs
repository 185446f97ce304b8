use std::collections::VecDeque;

/// Number of captured frames kept for the gameplay preview.
pub const PREVIEW_FRAME_CAPACITY: usize = 20;

/// Fixed-capacity ring of the most recent frames; pushing into a full buffer
/// evicts the oldest frame.
#[derive(Debug, Clone)]
pub struct FrameBuffer<T = Vec<u8>> {
    frames: VecDeque<T>,
    capacity: usize,
}

impl<T> FrameBuffer<T> {
    /// A zero capacity is raised to one.
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            frames: VecDeque::with_capacity(capacity),
            capacity,
        }
    }

    /// Returns the evicted frame, if any.
    pub fn push(&mut self, frame: T) -> Option<T> {
        let evicted = if self.frames.len() == self.capacity {
            self.frames.pop_front()
        } else {
            None
        };
        self.frames.push_back(frame);
        evicted
    }

    pub fn len(&self) -> usize {
        self.frames.len()
    }

    pub fn is_empty(&self) -> bool {
        self.frames.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn clear(&mut self) {
        self.frames.clear();
    }

    /// Oldest first.
    pub fn iter(&self) -> impl Iterator<Item = &T> {
        self.frames.iter()
    }

    pub fn take_all(&mut self) -> Vec<T> {
        self.frames.drain(..).collect()
    }
}

impl<T> Default for FrameBuffer<T> {
    fn default() -> Self {
        Self::new(PREVIEW_FRAME_CAPACITY)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn twenty_first_frame_drops_the_oldest() {
        let mut buffer = FrameBuffer::default();
        for i in 0..PREVIEW_FRAME_CAPACITY as u32 {
            assert_eq!(buffer.push(i), None);
        }
        assert_eq!(buffer.len(), 20);

        assert_eq!(buffer.push(20), Some(0));
        assert_eq!(buffer.len(), 20);
        assert_eq!(buffer.iter().next(), Some(&1));
        assert_eq!(buffer.iter().last(), Some(&20));
    }

    #[test]
    fn zero_capacity_keeps_latest_frame() {
        let mut buffer = FrameBuffer::new(0);
        assert_eq!(buffer.capacity(), 1);
        assert_eq!(buffer.push('a'), None);
        assert_eq!(buffer.push('b'), Some('a'));
        assert_eq!(buffer.take_all(), vec!['b']);
    }

    #[test]
    fn never_exceeds_capacity() {
        let mut buffer = FrameBuffer::new(3);
        for i in 0..100 {
            buffer.push(i);
            assert!(buffer.len() <= 3);
        }
        assert_eq!(buffer.take_all(), vec![97, 98, 99]);
        assert!(buffer.is_empty());
    }
}
