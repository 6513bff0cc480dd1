//! The player transport boundary: outbound commands this core issues to the
//! external stream player (§6 outbound vocabulary).
//!
//! Concrete transport (D-Bus, RPC, whatever wire format the daemon speaks)
//! is out of scope; this crate only ever calls through this trait, and never
//! holds a lock while doing so (§5).

use crate::ids::StreamId;
use crate::metadata::MetaDataSet;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum TimeUnit {
    Milliseconds,
    Seconds,
}

/// How many already-queued items the player should keep when a push lands,
/// derived from [`crate::control::InsertMode`].
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum KeepFirstN {
    /// Keep everything already queued (append).
    KeepAll,
    /// Drop the queue but keep the currently playing item.
    ClearQueue,
    /// Drop everything, including the currently playing item.
    ClearAll,
}

impl KeepFirstN {
    pub fn as_wire_value(self) -> i32 {
        match self {
            KeepFirstN::KeepAll => -1,
            KeepFirstN::ClearQueue => 0,
            KeepFirstN::ClearAll => -2,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct PushResult {
    pub fifo_overflow: bool,
    pub is_playing: bool,
}

pub struct ClearResult {
    pub playing_id: StreamId,
    pub queued_ids: Vec<StreamId>,
    pub removed_ids: Vec<StreamId>,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum RepeatShuffleCommand {
    Toggle,
}

/// Outbound commands to a single selected player transport.
///
/// `force` calls on [`crate::audio_source::AudioSource`] are routed through
/// a second handle obtained independent of selection state (spec §9 open
/// question: "a stop command that must succeed even after the audio source
/// has been logically deselected").
pub trait PlayerTransport: Send + Sync {
    #[allow(clippy::too_many_arguments)]
    fn push(
        &self,
        stream_id: StreamId,
        uri: &str,
        stream_key: &[u8],
        position: i64,
        position_units: TimeUnit,
        duration: i64,
        duration_units: TimeUnit,
        keep_first_n: KeepFirstN,
        metadata: &MetaDataSet,
    ) -> anyhow::Result<PushResult>;

    fn clear(&self, keep_first_n: KeepFirstN) -> anyhow::Result<ClearResult>;

    fn start(&self, reason: &str) -> anyhow::Result<()>;
    fn stop(&self, reason: &str) -> anyhow::Result<()>;
    fn pause(&self, reason: &str) -> anyhow::Result<()>;

    fn skip_to_next(&self) -> anyhow::Result<()>;
    fn skip_to_previous(&self) -> anyhow::Result<()>;

    fn seek(&self, value: i64, units: TimeUnit) -> anyhow::Result<()>;
    fn set_speed(&self, factor: f64) -> anyhow::Result<()>;

    fn set_repeat_mode(&self, command: RepeatShuffleCommand) -> anyhow::Result<()>;
    fn set_shuffle_mode(&self, command: RepeatShuffleCommand) -> anyhow::Result<()>;
}

#[cfg(any(test, feature = "test-support"))]
pub mod test_support {
    use super::*;
    use std::collections::VecDeque;
    use std::sync::atomic::{AtomicBool, AtomicI64, AtomicUsize, Ordering};
    use std::sync::Mutex;

    /// In-memory transport double: records every call and answers each
    /// `push` with the next [`PushResult`] queued via
    /// [`FakePlayerTransport::queue_push_result`], defaulting to "not yet
    /// playing, no overflow" once the queue runs dry.
    #[derive(Default)]
    pub struct FakePlayerTransport {
        pub pushed: Mutex<Vec<(StreamId, String, KeepFirstN)>>,
        pub start_count: AtomicUsize,
        pub stop_count: AtomicUsize,
        pub pause_count: AtomicUsize,
        pub cleared: AtomicBool,
        pub seeked_to: AtomicI64,
        push_results: Mutex<VecDeque<PushResult>>,
        push_fails: AtomicBool,
    }

    impl FakePlayerTransport {
        pub fn new() -> Self {
            FakePlayerTransport::default()
        }

        pub fn queue_push_result(&self, result: PushResult) {
            self.push_results.lock().unwrap().push_back(result);
        }

        pub fn set_push_fails(&self, fails: bool) {
            self.push_fails.store(fails, Ordering::SeqCst);
        }

        pub fn pushed_uris(&self) -> Vec<String> {
            self.pushed.lock().unwrap().iter().map(|(_, uri, _)| uri.clone()).collect()
        }
    }

    impl PlayerTransport for FakePlayerTransport {
        fn push(
            &self,
            stream_id: StreamId,
            uri: &str,
            _stream_key: &[u8],
            _position: i64,
            _position_units: TimeUnit,
            _duration: i64,
            _duration_units: TimeUnit,
            keep_first_n: KeepFirstN,
            _metadata: &MetaDataSet,
        ) -> anyhow::Result<PushResult> {
            if self.push_fails.load(Ordering::SeqCst) {
                anyhow::bail!("fake transport: push failed");
            }
            self.pushed.lock().unwrap().push((stream_id, uri.to_string(), keep_first_n));
            Ok(self
                .push_results
                .lock()
                .unwrap()
                .pop_front()
                .unwrap_or(PushResult { fifo_overflow: false, is_playing: false }))
        }

        fn clear(&self, _keep_first_n: KeepFirstN) -> anyhow::Result<ClearResult> {
            self.cleared.store(true, Ordering::SeqCst);
            Ok(ClearResult { playing_id: StreamId::invalid(), queued_ids: vec![], removed_ids: vec![] })
        }

        fn start(&self, _reason: &str) -> anyhow::Result<()> {
            self.start_count.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }

        fn stop(&self, _reason: &str) -> anyhow::Result<()> {
            self.stop_count.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }

        fn pause(&self, _reason: &str) -> anyhow::Result<()> {
            self.pause_count.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }

        fn skip_to_next(&self) -> anyhow::Result<()> {
            Ok(())
        }

        fn skip_to_previous(&self) -> anyhow::Result<()> {
            Ok(())
        }

        fn seek(&self, value: i64, _units: TimeUnit) -> anyhow::Result<()> {
            self.seeked_to.store(value, Ordering::SeqCst);
            Ok(())
        }

        fn set_speed(&self, _factor: f64) -> anyhow::Result<()> {
            Ok(())
        }

        fn set_repeat_mode(&self, _command: RepeatShuffleCommand) -> anyhow::Result<()> {
            Ok(())
        }

        fn set_shuffle_mode(&self, _command: RepeatShuffleCommand) -> anyhow::Result<()> {
            Ok(())
        }
    }
}
