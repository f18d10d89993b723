use std::collections::VecDeque;

/// Upper bound on the bytes handed to a single write
pub const MAX_WRITE_CHUNK: usize = 4096;

/// Ordered bytes awaiting transmission on one endpoint.
///
/// Bytes stay queued until their write completes, so an empty queue is the
/// same thing as "no write in flight". At most one chunk is ever handed out
/// before [`TransmitQueue::complete`] acknowledges it.
#[derive(Debug)]
pub struct TransmitQueue {
    pending: VecDeque<u8>,
    in_flight: Option<usize>,
    max_chunk: usize,
}

impl TransmitQueue {
    pub fn new() -> Self {
        Self::with_chunk_limit(MAX_WRITE_CHUNK)
    }

    pub fn with_chunk_limit(max_chunk: usize) -> Self {
        Self {
            pending: VecDeque::new(),
            in_flight: None,
            max_chunk: max_chunk.max(1),
        }
    }

    /// Append to the tail. Returns the chunk to write if the queue was idle;
    /// while a write is in flight the bytes just wait their turn.
    pub fn push(&mut self, data: &[u8]) -> Option<Vec<u8>> {
        if data.is_empty() {
            return None;
        }

        let was_idle = self.pending.is_empty();
        self.pending.extend(data.iter().copied());

        if was_idle {
            self.begin()
        } else {
            None
        }
    }

    /// Acknowledge the in-flight chunk. Pops it and returns the next chunk if
    /// anything is left.
    pub fn complete(&mut self) -> Option<Vec<u8>> {
        let written = self.in_flight.take()?;
        self.pending.drain(..written);
        self.begin()
    }

    fn begin(&mut self) -> Option<Vec<u8>> {
        debug_assert!(self.in_flight.is_none());
        if self.pending.is_empty() {
            return None;
        }

        let n = self.pending.len().min(self.max_chunk);
        let chunk: Vec<u8> = self.pending.iter().take(n).copied().collect();
        self.in_flight = Some(n);
        Some(chunk)
    }

    pub fn is_writing(&self) -> bool {
        self.in_flight.is_some()
    }

    /// Bytes not yet acknowledged, including the in-flight chunk
    pub fn len(&self) -> usize {
        self.pending.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pending.is_empty()
    }

    pub fn clear(&mut self) {
        self.pending.clear();
        self.in_flight = None;
    }
}

impl Default for TransmitQueue {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn first_push_starts_a_write() {
        let mut queue = TransmitQueue::new();
        assert_eq!(queue.push(b"hello"), Some(b"hello".to_vec()));
        assert!(queue.is_writing());
    }

    #[test]
    fn push_during_write_does_not_start_another() {
        let mut queue = TransmitQueue::new();
        assert!(queue.push(b"abc").is_some());
        assert_eq!(queue.push(b"def"), None);
        assert_eq!(queue.push(b"ghi"), None);
        assert_eq!(queue.len(), 9);

        // the rest drains as one chunk once the first write lands
        assert_eq!(queue.complete(), Some(b"defghi".to_vec()));
        assert_eq!(queue.complete(), None);
        assert!(queue.is_empty());
        assert!(!queue.is_writing());
    }

    #[test]
    fn empty_push_is_ignored() {
        let mut queue = TransmitQueue::new();
        assert_eq!(queue.push(&[]), None);
        assert!(!queue.is_writing());
    }

    #[test]
    fn complete_without_write_is_noop() {
        let mut queue = TransmitQueue::new();
        assert_eq!(queue.complete(), None);
    }

    #[test]
    fn large_pushes_are_chunked_in_order() {
        let mut queue = TransmitQueue::with_chunk_limit(4);
        let data: Vec<u8> = (0u8..10).collect();

        let mut written = queue.push(&data).expect("write started");
        let mut out = Vec::new();
        loop {
            assert!(written.len() <= 4);
            out.extend_from_slice(&written);
            match queue.complete() {
                Some(next) => written = next,
                None => break,
            }
        }
        assert_eq!(out, data);
    }

    #[test]
    fn idle_again_after_drain() {
        let mut queue = TransmitQueue::new();
        queue.push(b"x");
        assert_eq!(queue.complete(), None);
        assert_eq!(queue.push(b"y"), Some(b"y".to_vec()));
    }
}
