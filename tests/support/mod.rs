//! Shared test doubles and scenario setup for the end-to-end tests.

use std::collections::VecDeque;
use std::sync::{Arc, Mutex};

use playctl::crawler::{
    CompletionFilter, Crawler, Cursor, Direction, FindMode, FindNextCompletion, FindNextOp,
    GetUrisCompletion, GetUrisOp, RecursiveMode,
};
use playctl::metadata::MetaDataSet;
use playctl::transport::test_support::FakePlayerTransport;
use playctl::{AudioSource, Config, DefaultPermissions, FinishedWith, Permissions, PlayerControl};

/// A crawler double whose `mk_find_next`/`mk_get_uris` pull the next canned
/// op off a queue, in the order the test pushed them. `run_find_next` and
/// `run_get_uris` just invoke the completion callback inline with whatever
/// op they were handed, the way a same-thread crawler implementation would.
pub struct ScriptedCrawler {
    find_next_queue: Mutex<VecDeque<Arc<dyn FindNextOp>>>,
    get_uris_queue: Mutex<VecDeque<Arc<dyn GetUrisOp>>>,
    recursive_mode: RecursiveMode,
}

impl ScriptedCrawler {
    pub fn new() -> Self {
        ScriptedCrawler {
            find_next_queue: Mutex::new(VecDeque::new()),
            get_uris_queue: Mutex::new(VecDeque::new()),
            recursive_mode: RecursiveMode::FlatList,
        }
    }

    pub fn push_find_next(&self, op: Arc<dyn FindNextOp>) {
        self.find_next_queue.lock().unwrap().push_back(op);
    }

    pub fn push_get_uris(&self, op: Arc<dyn GetUrisOp>) {
        self.get_uris_queue.lock().unwrap().push_back(op);
    }
}

impl Crawler for ScriptedCrawler {
    fn run_find_next(
        &self,
        op: Arc<dyn FindNextOp>,
        _delay: Option<std::time::Duration>,
        filter: CompletionFilter,
        on_complete: FindNextCompletion,
    ) -> bool {
        if filter.should_deliver(op.is_canceled()) {
            on_complete(op);
        }
        true
    }

    fn run_get_uris(&self, op: Arc<dyn GetUrisOp>, filter: CompletionFilter, on_complete: GetUrisCompletion) -> bool {
        if filter.should_deliver(op.is_canceled()) {
            on_complete(op);
        }
        true
    }

    fn mk_find_next(
        &self,
        _tag: &str,
        _recursive_mode: RecursiveMode,
        _direction: Direction,
        _start_cursor: Arc<dyn Cursor>,
        _find_mode: FindMode,
    ) -> Arc<dyn FindNextOp> {
        self.find_next_queue.lock().unwrap().pop_front().expect("test did not queue enough find-next results")
    }

    fn mk_get_uris(&self, _position: Arc<dyn Cursor>, _metadata: MetaDataSet) -> Arc<dyn GetUrisOp> {
        self.get_uris_queue.lock().unwrap().pop_front().expect("test did not queue enough get-uris results")
    }

    fn default_recursive_mode(&self) -> RecursiveMode {
        self.recursive_mode
    }
}

/// A crawler double whose `run_find_next`/`run_get_uris` hold the op and its
/// completion closure instead of firing inline, so a test can keep an op
/// genuinely "in flight" across several of its own calls before deciding
/// when (and whether) it completes.
#[derive(Default)]
pub struct ManualCrawler {
    find_next_queue: Mutex<VecDeque<Arc<dyn FindNextOp>>>,
    get_uris_queue: Mutex<VecDeque<Arc<dyn GetUrisOp>>>,
    pending_find_next: Mutex<VecDeque<(Arc<dyn FindNextOp>, CompletionFilter, FindNextCompletion)>>,
    pending_get_uris: Mutex<VecDeque<(Arc<dyn GetUrisOp>, CompletionFilter, GetUrisCompletion)>>,
}

impl ManualCrawler {
    pub fn new() -> Self {
        ManualCrawler::default()
    }

    pub fn push_find_next(&self, op: Arc<dyn FindNextOp>) {
        self.find_next_queue.lock().unwrap().push_back(op);
    }

    pub fn push_get_uris(&self, op: Arc<dyn GetUrisOp>) {
        self.get_uris_queue.lock().unwrap().push_back(op);
    }

    pub fn has_pending_find_next(&self) -> bool {
        !self.pending_find_next.lock().unwrap().is_empty()
    }

    pub fn has_pending_get_uris(&self) -> bool {
        !self.pending_get_uris.lock().unwrap().is_empty()
    }

    /// Fires the oldest still-pending find-next completion, honoring the
    /// `CompletionFilter` the core scheduled it with.
    pub fn complete_next_find_next(&self) {
        let (op, filter, on_complete) =
            self.pending_find_next.lock().unwrap().pop_front().expect("no pending find-next op to complete");
        if filter.should_deliver(op.is_canceled()) {
            on_complete(op);
        }
    }

    /// Fires the oldest still-pending get-uris completion, honoring the
    /// `CompletionFilter` the core scheduled it with.
    pub fn complete_next_get_uris(&self) {
        let (op, filter, on_complete) =
            self.pending_get_uris.lock().unwrap().pop_front().expect("no pending get-uris op to complete");
        if filter.should_deliver(op.is_canceled()) {
            on_complete(op);
        }
    }
}

impl Crawler for ManualCrawler {
    fn run_find_next(
        &self,
        op: Arc<dyn FindNextOp>,
        _delay: Option<std::time::Duration>,
        filter: CompletionFilter,
        on_complete: FindNextCompletion,
    ) -> bool {
        self.pending_find_next.lock().unwrap().push_back((op, filter, on_complete));
        true
    }

    fn run_get_uris(&self, op: Arc<dyn GetUrisOp>, filter: CompletionFilter, on_complete: GetUrisCompletion) -> bool {
        self.pending_get_uris.lock().unwrap().push_back((op, filter, on_complete));
        true
    }

    fn mk_find_next(
        &self,
        _tag: &str,
        _recursive_mode: RecursiveMode,
        _direction: Direction,
        _start_cursor: Arc<dyn Cursor>,
        _find_mode: FindMode,
    ) -> Arc<dyn FindNextOp> {
        self.find_next_queue.lock().unwrap().pop_front().expect("test did not queue enough find-next results")
    }

    fn mk_get_uris(&self, _position: Arc<dyn Cursor>, _metadata: MetaDataSet) -> Arc<dyn GetUrisOp> {
        self.get_uris_queue.lock().unwrap().pop_front().expect("test did not queue enough get-uris results")
    }

    fn default_recursive_mode(&self) -> RecursiveMode {
        RecursiveMode::FlatList
    }
}

/// A [`Permissions`] double with a handful of knobs tests actually need to
/// flip; everything else stays wide open like [`DefaultPermissions`].
pub struct ConfigurablePermissions {
    max_prefetch: std::sync::atomic::AtomicU8,
    can_skip_on_error: std::sync::atomic::AtomicBool,
    retry_if_stream_broken: std::sync::atomic::AtomicBool,
    can_prefetch_for_gapless: std::sync::atomic::AtomicBool,
}

impl ConfigurablePermissions {
    pub fn new() -> Self {
        ConfigurablePermissions {
            max_prefetch: std::sync::atomic::AtomicU8::new(5),
            can_skip_on_error: std::sync::atomic::AtomicBool::new(true),
            retry_if_stream_broken: std::sync::atomic::AtomicBool::new(false),
            can_prefetch_for_gapless: std::sync::atomic::AtomicBool::new(true),
        }
    }

    pub fn set_max_prefetch(&self, n: u8) {
        self.max_prefetch.store(n, std::sync::atomic::Ordering::SeqCst);
    }

    pub fn set_can_skip_on_error(&self, allowed: bool) {
        self.can_skip_on_error.store(allowed, std::sync::atomic::Ordering::SeqCst);
    }

    pub fn set_retry_if_stream_broken(&self, allowed: bool) {
        self.retry_if_stream_broken.store(allowed, std::sync::atomic::Ordering::SeqCst);
    }

    pub fn set_can_prefetch_for_gapless(&self, allowed: bool) {
        self.can_prefetch_for_gapless.store(allowed, std::sync::atomic::Ordering::SeqCst);
    }
}

impl Default for ConfigurablePermissions {
    fn default() -> Self {
        ConfigurablePermissions::new()
    }
}

impl Permissions for ConfigurablePermissions {
    fn can_play(&self) -> bool {
        true
    }
    fn can_pause(&self) -> bool {
        true
    }
    fn can_resume(&self) -> bool {
        true
    }
    fn can_skip_backward(&self) -> bool {
        true
    }
    fn can_skip_forward(&self) -> bool {
        true
    }
    fn can_fast_wind_backward(&self) -> bool {
        true
    }
    fn can_fast_wind_forward(&self) -> bool {
        true
    }
    fn can_set_shuffle(&self) -> bool {
        true
    }
    fn can_toggle_shuffle(&self) -> bool {
        true
    }
    fn can_repeat_single(&self) -> bool {
        true
    }
    fn can_repeat_all(&self) -> bool {
        true
    }
    fn can_toggle_repeat(&self) -> bool {
        true
    }
    fn can_show_listing(&self) -> bool {
        true
    }
    fn can_prefetch_for_gapless(&self) -> bool {
        self.can_prefetch_for_gapless.load(std::sync::atomic::Ordering::SeqCst)
    }
    fn can_skip_on_error(&self) -> bool {
        self.can_skip_on_error.load(std::sync::atomic::Ordering::SeqCst)
    }
    fn retry_if_stream_broken(&self) -> bool {
        self.retry_if_stream_broken.load(std::sync::atomic::Ordering::SeqCst)
    }
    fn max_prefetch(&self) -> u8 {
        self.max_prefetch.load(std::sync::atomic::Ordering::SeqCst)
    }
}

/// Records every [`FinishedWith`] notification a scenario's controller
/// fires, in order.
#[derive(Default)]
pub struct FinishedLog(Mutex<Vec<FinishedWith>>);

impl FinishedLog {
    pub fn new() -> Arc<Self> {
        Arc::new(FinishedLog::default())
    }

    pub fn events(&self) -> Vec<FinishedWith> {
        self.0.lock().unwrap().clone()
    }
}

/// Builds a [`PlayerControl`] with one audio source already selected and
/// wired to `transport`, and `crawler` plugged in with the given
/// permissions. `finished` receives every `finished_notification` callback
/// fired while the scenario runs.
pub fn selected_control(
    crawler: Arc<dyn Crawler>,
    permissions: Arc<dyn Permissions>,
    transport: Arc<FakePlayerTransport>,
    finished: Arc<FinishedLog>,
) -> Arc<PlayerControl> {
    let control = PlayerControl::new(Config::default());

    let mut source = AudioSource::new("test.source");
    source.select_now();
    source.set_transports(transport.clone(), transport);
    control.plug_audio_source(
        source,
        false,
        Arc::new(move |with| finished.0.lock().unwrap().push(with)),
    );
    control.plug_crawler(crawler, permissions);

    control
}

pub fn selected_control_with_defaults(
    crawler: Arc<dyn Crawler>,
    transport: Arc<FakePlayerTransport>,
    finished: Arc<FinishedLog>,
) -> Arc<PlayerControl> {
    selected_control(crawler, Arc::new(DefaultPermissions), transport, finished)
}
