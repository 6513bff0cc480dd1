//! The crawler contract consumed by the control core (component E).
//!
//! The core never enumerates a list itself; it drives an opaque [`Crawler`]
//! that produces two kinds of asynchronous task objects (find-next, get-uris)
//! and holds named [`Bookmarks`] pointing at positions within it.

use std::sync::Arc;

use crate::ids::ListId;
use crate::metadata::MetaDataSet;

/// Position within a crawler list. Clonable and comparable so it can be
/// stashed on a [`crate::queue::QueuedStream`] as its *originating cursor*
/// without the queue needing to know anything about the list hierarchy.
pub trait Cursor: Send + Sync + std::fmt::Debug {
    fn clone_box(&self) -> Arc<dyn Cursor>;
    fn list_id(&self) -> ListId;
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Direction {
    Forward,
    Backward,
}

impl Direction {
    pub fn flipped(self) -> Self {
        match self {
            Direction::Forward => Direction::Backward,
            Direction::Backward => Direction::Forward,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum RecursiveMode {
    FlatList,
    Recursive,
}

/// Where a find-next op is allowed to land relative to the current item.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum FindMode {
    /// Land on any playable item, including the starting position itself.
    Any,
    /// Must move strictly past the starting position.
    StrictlyNext,
}

/// Outcome of a find-next op: where the search ended up relative to the
/// list, distinct from success/failure of the op itself.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PositionalState {
    SomewhereInList,
    Unknown,
    ReachedStartOfList,
    ReachedEndOfList,
}

/// Lifecycle shared by both op kinds.
///
/// `extract_position` is documented as "extractable once": after the first
/// successful extraction, later calls return `None`. This mirrors the
/// original's `std::unique_ptr`-guarded position field, modeled here with an
/// interior-mutable take rather than requiring `&mut self` through an `Arc`.
pub trait OpHandle: Send + Sync {
    fn cancel(&self);
    fn is_canceled(&self) -> bool;
    fn is_failure(&self) -> bool;
}

/// A find-next operation: locate the next playable item in a given
/// direction starting from a cursor.
pub trait FindNextOp: OpHandle {
    /// `None` while pending.
    fn result(&self) -> Option<PositionalState>;
    fn metadata(&self) -> Option<MetaDataSet>;
    /// Extracts the landed-on cursor. Can only succeed once per op.
    fn extract_position(&self) -> Option<Arc<dyn Cursor>>;
}

/// A get-uris operation: resolve a located item to concrete, playable URIs.
pub trait GetUrisOp: OpHandle {
    fn stream_key(&self) -> Option<Vec<u8>>;
    fn metadata(&self) -> Option<MetaDataSet>;
    fn direct_uris(&self) -> Vec<String>;
    /// Airable-style sorted alternative link list, highest priority first.
    fn sorted_links(&self) -> Vec<String>;
    fn has_no_uris(&self) -> bool;
}

/// Whether a completion callback should still fire for a canceled op.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum CompletionFilter {
    DeliverAll,
    SuppressCanceled,
}

impl CompletionFilter {
    pub fn should_deliver(self, op_was_canceled: bool) -> bool {
        match self {
            CompletionFilter::DeliverAll => true,
            CompletionFilter::SuppressCanceled => !op_was_canceled,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum BookmarkName {
    AboutToPlay,
    CurrentlyPlaying,
    PrefetchCursor,
    SkipCursor,
}

/// Named cursor references, overwritten rather than stacked.
#[derive(Default)]
pub struct Bookmarks {
    slots: std::collections::HashMap<BookmarkName, Arc<dyn Cursor>>,
}

impl Bookmarks {
    pub fn new() -> Self {
        Bookmarks::default()
    }

    pub fn set(&mut self, name: BookmarkName, cursor: Arc<dyn Cursor>) {
        self.slots.insert(name, cursor);
    }

    pub fn get(&self, name: BookmarkName) -> Option<Arc<dyn Cursor>> {
        self.slots.get(&name).cloned()
    }

    pub fn clear(&mut self, name: BookmarkName) {
        self.slots.remove(&name);
    }

    /// First non-empty bookmark among `names`, in order.
    pub fn get_first_of(&self, names: &[BookmarkName]) -> Option<Arc<dyn Cursor>> {
        names.iter().find_map(|n| self.get(*n))
    }
}

pub type FindNextCompletion = Box<dyn FnOnce(Arc<dyn FindNextOp>) + Send>;
pub type GetUrisCompletion = Box<dyn FnOnce(Arc<dyn GetUrisOp>) + Send>;

/// The crawler as consumed by the control core. Enumeration, redirect
/// resolution and list-broker transport all live behind this trait; the core
/// only ever schedules ops and reacts to their completion callback.
///
/// Each find-next/get-uris op is an owned task object (spec §9): the
/// `Arc<dyn FindNextOp>` handed to `on_complete` *is* the task, queryable for
/// its terminal state after delivery.
pub trait Crawler: Send + Sync {
    /// Schedules `op` to run, optionally after `delay`, invoking
    /// `on_complete` when it finishes unless `filter` suppresses a canceled
    /// completion. Returns `false` if the crawler could not accept the op at
    /// all (e.g. already shut down), in which case `on_complete` never fires.
    fn run_find_next(
        &self,
        op: Arc<dyn FindNextOp>,
        delay: Option<std::time::Duration>,
        filter: CompletionFilter,
        on_complete: FindNextCompletion,
    ) -> bool;

    fn run_get_uris(
        &self,
        op: Arc<dyn GetUrisOp>,
        filter: CompletionFilter,
        on_complete: GetUrisCompletion,
    ) -> bool;

    fn mk_find_next(
        &self,
        tag: &str,
        recursive_mode: RecursiveMode,
        direction: Direction,
        start_cursor: Arc<dyn Cursor>,
        find_mode: FindMode,
    ) -> Arc<dyn FindNextOp>;

    fn mk_get_uris(&self, position: Arc<dyn Cursor>, metadata: MetaDataSet) -> Arc<dyn GetUrisOp>;

    /// Recursion policy for ops this crawler's list is configured with,
    /// consulted whenever the core builds a find-next op itself (prefetch,
    /// skip) rather than being handed a ready-made one.
    fn default_recursive_mode(&self) -> RecursiveMode;
}

#[cfg(any(test, feature = "test-support"))]
pub mod test_support {
    use super::*;
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::sync::Mutex;

    #[derive(Debug)]
    pub struct FakeCursor(pub ListId);

    impl Cursor for FakeCursor {
        fn clone_box(&self) -> Arc<dyn Cursor> {
            Arc::new(FakeCursor(self.0))
        }
        fn list_id(&self) -> ListId {
            self.0
        }
    }

    pub struct FakeFindNextOp {
        canceled: AtomicBool,
        failure: AtomicBool,
        result: Mutex<Option<PositionalState>>,
        position: Mutex<Option<Arc<dyn Cursor>>>,
        metadata: Mutex<Option<MetaDataSet>>,
    }

    impl FakeFindNextOp {
        pub fn new(result: PositionalState, cursor: Arc<dyn Cursor>) -> Arc<Self> {
            Arc::new(FakeFindNextOp {
                canceled: AtomicBool::new(false),
                failure: AtomicBool::new(false),
                result: Mutex::new(Some(result)),
                position: Mutex::new(Some(cursor)),
                metadata: Mutex::new(Some(MetaDataSet::new())),
            })
        }
    }

    impl OpHandle for FakeFindNextOp {
        fn cancel(&self) {
            self.canceled.store(true, Ordering::SeqCst);
        }
        fn is_canceled(&self) -> bool {
            self.canceled.load(Ordering::SeqCst)
        }
        fn is_failure(&self) -> bool {
            self.failure.load(Ordering::SeqCst)
        }
    }

    impl FindNextOp for FakeFindNextOp {
        fn result(&self) -> Option<PositionalState> {
            *self.result.lock().unwrap()
        }
        fn metadata(&self) -> Option<MetaDataSet> {
            self.metadata.lock().unwrap().clone()
        }
        fn extract_position(&self) -> Option<Arc<dyn Cursor>> {
            self.position.lock().unwrap().take()
        }
    }

    pub struct FakeGetUrisOp {
        canceled: AtomicBool,
        failure: bool,
        no_uris: bool,
        stream_key: Vec<u8>,
        metadata: MetaDataSet,
        direct_uris: Vec<String>,
    }

    impl FakeGetUrisOp {
        pub fn new(direct_uris: Vec<String>) -> Arc<Self> {
            Arc::new(FakeGetUrisOp {
                canceled: AtomicBool::new(false),
                failure: false,
                no_uris: direct_uris.is_empty(),
                stream_key: vec![],
                metadata: MetaDataSet::new(),
                direct_uris,
            })
        }

        pub fn failing() -> Arc<Self> {
            Arc::new(FakeGetUrisOp {
                canceled: AtomicBool::new(false),
                failure: true,
                no_uris: true,
                stream_key: vec![],
                metadata: MetaDataSet::new(),
                direct_uris: vec![],
            })
        }
    }

    impl OpHandle for FakeGetUrisOp {
        fn cancel(&self) {
            self.canceled.store(true, Ordering::SeqCst);
        }
        fn is_canceled(&self) -> bool {
            self.canceled.load(Ordering::SeqCst)
        }
        fn is_failure(&self) -> bool {
            self.failure
        }
    }

    impl GetUrisOp for FakeGetUrisOp {
        fn stream_key(&self) -> Option<Vec<u8>> {
            Some(self.stream_key.clone())
        }
        fn metadata(&self) -> Option<MetaDataSet> {
            Some(self.metadata.clone())
        }
        fn direct_uris(&self) -> Vec<String> {
            self.direct_uris.clone()
        }
        fn sorted_links(&self) -> Vec<String> {
            vec![]
        }
        fn has_no_uris(&self) -> bool {
            self.no_uris
        }
    }

    /// A crawler double that runs every op synchronously and inline, from
    /// whatever thread calls `run_find_next`/`run_get_uris`.
    pub struct FakeCrawler {
        pub find_next_result: Mutex<Option<Arc<dyn FindNextOp>>>,
        pub get_uris_result: Mutex<Option<Arc<dyn GetUrisOp>>>,
        pub run_find_next_succeeds: std::sync::atomic::AtomicBool,
        pub run_get_uris_succeeds: std::sync::atomic::AtomicBool,
    }

    impl FakeCrawler {
        pub fn new() -> Self {
            FakeCrawler {
                find_next_result: Mutex::new(None),
                get_uris_result: Mutex::new(None),
                run_find_next_succeeds: std::sync::atomic::AtomicBool::new(true),
                run_get_uris_succeeds: std::sync::atomic::AtomicBool::new(true),
            }
        }

        pub fn set_next_find_next_result(&self, op: Arc<dyn FindNextOp>) {
            *self.find_next_result.lock().unwrap() = Some(op);
        }

        pub fn set_next_get_uris_result(&self, op: Arc<dyn GetUrisOp>) {
            *self.get_uris_result.lock().unwrap() = Some(op);
        }
    }

    impl Default for FakeCrawler {
        fn default() -> Self {
            FakeCrawler::new()
        }
    }

    impl Crawler for FakeCrawler {
        fn run_find_next(
            &self,
            op: Arc<dyn FindNextOp>,
            _delay: Option<std::time::Duration>,
            filter: CompletionFilter,
            on_complete: FindNextCompletion,
        ) -> bool {
            if !self.run_find_next_succeeds.load(Ordering::SeqCst) {
                return false;
            }
            if filter.should_deliver(op.is_canceled()) {
                on_complete(op);
            }
            true
        }

        fn run_get_uris(
            &self,
            op: Arc<dyn GetUrisOp>,
            filter: CompletionFilter,
            on_complete: GetUrisCompletion,
        ) -> bool {
            if !self.run_get_uris_succeeds.load(Ordering::SeqCst) {
                return false;
            }
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
            self.find_next_result
                .lock()
                .unwrap()
                .clone()
                .unwrap_or_else(|| FakeFindNextOp::new(PositionalState::Unknown, Arc::new(FakeCursor(ListId(1)))))
        }

        fn mk_get_uris(&self, _position: Arc<dyn Cursor>, _metadata: MetaDataSet) -> Arc<dyn GetUrisOp> {
            self.get_uris_result
                .lock()
                .unwrap()
                .clone()
                .unwrap_or_else(|| FakeGetUrisOp::new(vec![]))
        }

        fn default_recursive_mode(&self) -> RecursiveMode {
            RecursiveMode::FlatList
        }
    }
}
