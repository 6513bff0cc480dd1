//! Coalesces rapid skip presses into a single pending find-next session
//! (component F), grounded closely on the original `Player::Skipper`.

use std::sync::{Arc, Mutex};

use crate::crawler::{Cursor, Direction, FindNextOp, PositionalState};
use crate::player_data::{PlayerData, PlayerState, UserIntention};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum RequestResult {
    Rejected,
    Skipping,
    BackToNormal,
    /// Caller passed no `done` callback; nothing was started.
    FirstSkipRequestSuppressed,
    FirstSkipRequestPending,
    Failed,
}

/// Builds and launches a fresh find-next op in `direction` starting at
/// `pos`, wiring its completion back into the skipper via the supplied
/// callback.
pub type RunNewFindNextOp = Box<
    dyn Fn(
            &'static str,
            Arc<dyn Cursor>,
            Direction,
            Box<dyn FnOnce(Arc<dyn FindNextOp>) + Send>,
        ) -> Option<Arc<dyn FindNextOp>>
        + Send
        + Sync,
>;

/// Invoked exactly once per skip session with the op that settled it (or
/// `None` if the session failed to even start one).
pub type SkipperDoneCallback = Box<dyn FnOnce(Option<Arc<dyn FindNextOp>>) -> bool + Send>;

/// Holds a [`SkipperDoneCallback`] that may be taken either by the
/// completion closure handed to the crawler, or, if the crawler rejected the
/// op synchronously, by the caller that tried to launch it. Exactly one of
/// those two paths fires, satisfying the at-most-once guarantee even when
/// `run_new_find_next_fn` fails without ever invoking our closure.
type DoneSlot = Arc<Mutex<Option<SkipperDoneCallback>>>;

struct Inner {
    find_next_op: Option<Arc<dyn FindNextOp>>,
    pending_skip_requests: i32,
    run_new_find_next_fn: Option<RunNewFindNextOp>,
    max_pending_skip_requests: i32,
}

impl Inner {
    fn reset(&mut self) {
        self.find_next_op = None;
        self.pending_skip_requests = 0;
        self.run_new_find_next_fn = None;
    }
}

fn set_intention_for_skipping(player_data: &mut PlayerData) -> bool {
    match player_data.user_intention() {
        UserIntention::Nothing | UserIntention::Stopping => false,
        UserIntention::Pausing => {
            player_data.set_intention(UserIntention::SkippingPaused);
            true
        }
        UserIntention::Listening => {
            player_data.set_intention(UserIntention::SkippingLive);
            true
        }
        UserIntention::SkippingPaused | UserIntention::SkippingLive => true,
    }
}

fn should_reject_skip_request(player_data: &PlayerData) -> bool {
    player_data.player_state() == PlayerState::Stopped
}

/// Coalesces direction-pressed skip events into at most one in-flight
/// find-next session, with a signed pending count tracking unresolved
/// presses made while that session is running.
pub struct Skipper {
    inner: Mutex<Inner>,
}

impl Default for Skipper {
    fn default() -> Self {
        Skipper::new(5)
    }
}

impl Skipper {
    pub fn new(max_pending_skip_requests: i32) -> Self {
        Skipper {
            inner: Mutex::new(Inner {
                find_next_op: None,
                pending_skip_requests: 0,
                run_new_find_next_fn: None,
                max_pending_skip_requests,
            }),
        }
    }

    pub fn is_active(&self) -> bool {
        self.inner.lock().unwrap().find_next_op.is_some()
    }

    pub fn reset(&self) {
        self.inner.lock().unwrap().reset();
    }

    pub fn forward_request(
        self: &Arc<Self>,
        player_data: &mut PlayerData,
        pos: Option<Arc<dyn Cursor>>,
        run_new_find_next_fn: RunNewFindNextOp,
        done: Option<SkipperDoneCallback>,
    ) -> RequestResult {
        self.direction_request(player_data, pos, run_new_find_next_fn, done, Direction::Forward)
    }

    pub fn backward_request(
        self: &Arc<Self>,
        player_data: &mut PlayerData,
        pos: Option<Arc<dyn Cursor>>,
        run_new_find_next_fn: RunNewFindNextOp,
        done: SkipperDoneCallback,
    ) -> RequestResult {
        self.direction_request(player_data, pos, run_new_find_next_fn, Some(done), Direction::Backward)
    }

    fn direction_request(
        self: &Arc<Self>,
        player_data: &mut PlayerData,
        pos: Option<Arc<dyn Cursor>>,
        run_new_find_next_fn: RunNewFindNextOp,
        done: Option<SkipperDoneCallback>,
        direction: Direction,
    ) -> RequestResult {
        let Some(pos) = pos else { return RequestResult::Failed };

        let mut inner = self.inner.lock().unwrap();

        if should_reject_skip_request(player_data) {
            return RequestResult::Rejected;
        }

        if inner.pending_skip_requests != 0 {
            let limit = inner.max_pending_skip_requests;
            let at_limit = match direction {
                Direction::Forward => inner.pending_skip_requests >= limit,
                Direction::Backward => inner.pending_skip_requests <= -limit,
            };
            if at_limit {
                return RequestResult::Rejected;
            }
            match direction {
                Direction::Forward => inner.pending_skip_requests += 1,
                Direction::Backward => inner.pending_skip_requests -= 1,
            }
            if inner.pending_skip_requests != 0 {
                return RequestResult::Skipping;
            }
            inner.reset();
            return RequestResult::BackToNormal;
        }

        if inner.find_next_op.is_some() {
            if inner.max_pending_skip_requests > 0 {
                match direction {
                    Direction::Forward => inner.pending_skip_requests += 1,
                    Direction::Backward => inner.pending_skip_requests -= 1,
                }
            }
            return RequestResult::Skipping;
        }

        if !set_intention_for_skipping(player_data) {
            return RequestResult::Rejected;
        }

        let Some(done) = done else { return RequestResult::FirstSkipRequestSuppressed };

        inner.run_new_find_next_fn = Some(run_new_find_next_fn);
        let done_slot: DoneSlot = Arc::new(Mutex::new(Some(done)));
        let op = self.launch(&mut inner, pos, direction, "fresh skip request", &done_slot);

        match op {
            Some(op) => {
                inner.find_next_op = Some(op);
                RequestResult::FirstSkipRequestPending
            }
            None => {
                tracing::warn!(?direction, "failed starting find operation for skip");
                inner.reset();
                if let Some(done) = done_slot.lock().unwrap().take() {
                    done(None);
                }
                RequestResult::Failed
            }
        }
    }

    fn launch(
        self: &Arc<Self>,
        inner: &mut Inner,
        pos: Arc<dyn Cursor>,
        direction: Direction,
        tag: &'static str,
        done_slot: &DoneSlot,
    ) -> Option<Arc<dyn FindNextOp>> {
        let self_clone = Arc::clone(self);
        let slot_clone = Arc::clone(done_slot);
        let run_fn = inner.run_new_find_next_fn.as_ref().unwrap();
        run_fn(
            tag,
            pos,
            direction,
            Box::new(move |op| {
                if let Some(done) = slot_clone.lock().unwrap().take() {
                    self_clone.found_or_failed(op, done);
                }
            }),
        )
    }

    /// Completion handler wired into every find-next op launched by this
    /// skipper. Invokes `done` at most once per skip session.
    fn found_or_failed(self: &Arc<Self>, op: Arc<dyn FindNextOp>, done: SkipperDoneCallback) {
        let mut inner = self.inner.lock().unwrap();

        if op.is_failure() {
            let fnop = inner.find_next_op.take();
            inner.reset();
            drop(inner);
            done(fnop);
            return;
        }

        match op.result() {
            Some(PositionalState::SomewhereInList) => {}
            Some(PositionalState::Unknown) => {
                tracing::warn!("unknown positional state while skipping");
            }
            Some(PositionalState::ReachedStartOfList) | Some(PositionalState::ReachedEndOfList) => {
                inner.pending_skip_requests = 0;
            }
            None => {
                tracing::warn!("find-next op completed without a result");
            }
        }

        if inner.pending_skip_requests == 0 {
            let fnop = inner.find_next_op.take();
            inner.reset();
            drop(inner);
            done(fnop);
            return;
        }

        let direction = if inner.pending_skip_requests > 0 {
            Direction::Forward
        } else {
            Direction::Backward
        };

        if direction == Direction::Forward {
            inner.pending_skip_requests -= 1;
        } else {
            inner.pending_skip_requests += 1;
        }

        let Some(pos) = op.extract_position() else {
            tracing::warn!("find-next op produced no position to continue from");
            let fnop = inner.find_next_op.take();
            inner.reset();
            drop(inner);
            done(fnop);
            return;
        };

        let done_slot: DoneSlot = Arc::new(Mutex::new(Some(done)));
        let next_op = self.launch(&mut inner, pos, direction, "follow-up skip request", &done_slot);

        match next_op {
            Some(next_op) => {
                inner.find_next_op = Some(next_op);
            }
            None => {
                tracing::warn!("failed starting next find operation for skipping");
                inner.reset();
                drop(inner);
                if let Some(done) = done_slot.lock().unwrap().take() {
                    done(None);
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crawler::test_support::{FakeCursor, FakeFindNextOp};
    use crate::ids::ListId;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn cursor() -> Arc<dyn Cursor> {
        Arc::new(FakeCursor(ListId(1)))
    }

    fn run_fn_returning(op: Arc<dyn FindNextOp>) -> RunNewFindNextOp {
        Box::new(move |_tag, _pos, _dir, on_complete| {
            on_complete(Arc::clone(&op));
            Some(op.clone())
        })
    }

    #[test]
    fn single_request_fires_done_once() {
        let skipper = Arc::new(Skipper::new(20));
        let mut pd = PlayerData::new(20);
        pd.set_player_state(PlayerState::Playing);
        pd.set_intention(UserIntention::Listening);

        let op = FakeFindNextOp::new(PositionalState::SomewhereInList, cursor());
        let done_count = Arc::new(AtomicUsize::new(0));
        let done_count2 = done_count.clone();

        let result = skipper.forward_request(
            &mut pd,
            Some(cursor()),
            run_fn_returning(op),
            Some(Box::new(move |_op| {
                done_count2.fetch_add(1, Ordering::SeqCst);
                true
            })),
        );

        assert_eq!(result, RequestResult::FirstSkipRequestPending);
        assert_eq!(done_count.load(Ordering::SeqCst), 1);
        assert!(!skipper.is_active());
    }

    #[test]
    fn reject_when_stopped() {
        let skipper = Arc::new(Skipper::new(20));
        let mut pd = PlayerData::new(20);
        pd.set_player_state(PlayerState::Stopped);

        let op = FakeFindNextOp::new(PositionalState::SomewhereInList, cursor());
        let result = skipper.forward_request(
            &mut pd,
            Some(cursor()),
            run_fn_returning(op),
            Some(Box::new(|_op| true)),
        );
        assert_eq!(result, RequestResult::Rejected);
    }
}
