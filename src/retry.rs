//! Per-stream retry counter (component G).

use crate::ids::StreamId;

/// Counts consecutive retryable failures for the most recently seen stream.
/// Seeing a different stream-id resets the counter, matching the original's
/// "new stream means new luck" semantics.
pub struct RetryLedger {
    max_retries: u32,
    stream_id: StreamId,
    count: u32,
}

impl RetryLedger {
    pub fn new(max_retries: u32) -> Self {
        RetryLedger {
            max_retries,
            stream_id: StreamId::invalid(),
            count: 0,
        }
    }

    /// Records that `id` is now playing, resetting its retry count to zero.
    pub fn playing(&mut self, id: StreamId) {
        self.stream_id = id;
        self.count = 0;
    }

    /// Returns whether another retry of `id` is still permitted, bumping the
    /// counter as a side effect. A different id than the one on record
    /// implicitly starts a fresh count for it.
    pub fn retry(&mut self, id: StreamId) -> bool {
        if id != self.stream_id {
            self.stream_id = id;
            self.count = 0;
        }

        if self.count >= self.max_retries {
            return false;
        }

        self.count += 1;
        true
    }

    pub fn reset(&mut self) {
        self.stream_id = StreamId::invalid();
        self.count = 0;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn retries_exactly_max_times_then_rejects() {
        let mut ledger = RetryLedger::new(2);
        let id = StreamId::from_raw(1);
        ledger.playing(id);
        assert!(ledger.retry(id));
        assert!(ledger.retry(id));
        assert!(!ledger.retry(id));
    }

    #[test]
    fn new_stream_resets_count() {
        let mut ledger = RetryLedger::new(2);
        let a = StreamId::from_raw(1);
        let b = StreamId::from_raw(2);
        ledger.playing(a);
        assert!(ledger.retry(a));
        assert!(ledger.retry(a));
        assert!(!ledger.retry(a));

        ledger.playing(b);
        assert!(ledger.retry(b));
    }

    #[test]
    fn reset_invalidates_tracked_id() {
        let mut ledger = RetryLedger::new(2);
        let id = StreamId::from_raw(7);
        ledger.playing(id);
        ledger.retry(id);
        ledger.reset();
        // Same id after reset starts fresh again.
        assert!(ledger.retry(id));
    }
}
