//! UI-facing entry points (§4.I "commands", grounded on `play_request`,
//! `stop_request`, `pause_request`, `skip_forward_request`,
//! `skip_backward_request`, `rewind_request`, `fast_wind_set_speed_request`
//! and `seek_stream_request` in `player_control.cc`).

use std::sync::Arc;

use crate::audio_source::AudioSourceState;
use crate::crawler::{
    BookmarkName, CompletionFilter, Cursor, Direction, FindMode, FindNextOp, PositionalState,
};
use crate::events::{TimeUnits, UiCommand};
use crate::permissions::Permissions;
use crate::player_data::{PlayerState, UserIntention};
use crate::skipper::{RequestResult, RunNewFindNextOp, SkipperDoneCallback};
use crate::transport::TimeUnit;

use super::{FinishedWith, InsertMode, PlayNewMode, PlayerControl};

fn reference_position_for_skip(
    source: &crate::audio_source::AudioSource,
    intention: UserIntention,
) -> Option<Arc<dyn Cursor>> {
    match intention {
        UserIntention::Nothing | UserIntention::Stopping => None,
        UserIntention::Pausing | UserIntention::Listening => {
            source.bookmarks().get_first_of(&[BookmarkName::AboutToPlay, BookmarkName::CurrentlyPlaying])
        }
        UserIntention::SkippingPaused | UserIntention::SkippingLive => {
            source.bookmarks().get(BookmarkName::SkipCursor)
        }
    }
}

impl PlayerControl {
    /// Handles one of the UI-facing commands (§6). `sender`s carried on some
    /// variants are logged only; attribution beyond that is out of scope.
    pub fn handle_ui_command(self: &Arc<Self>, command: UiCommand) {
        match command {
            UiCommand::PlaybackStart { sender } => self.play(None, &format!("start requested by {sender}")),
            UiCommand::PlaybackStop { sender } => self.stop(&format!("stop requested by {sender}")),
            UiCommand::PlaybackPause { sender } => self.pause(&format!("pause requested by {sender}")),
            UiCommand::PlaybackPrevious => self.previous(),
            UiCommand::PlaybackNext => self.skip_forward(),
            UiCommand::PlaybackFastWindSetSpeed { factor } => self.fast_wind_set_speed(factor),
            UiCommand::PlaybackSeekStreamPos { value, units } => {
                let units = match units {
                    TimeUnits::Milliseconds => TimeUnit::Milliseconds,
                    TimeUnits::Seconds => TimeUnit::Seconds,
                };
                self.seek_stream(value, units);
            }
            UiCommand::PlaybackModeRepeatToggle => {
                self.with_transport(false, |t| t.set_repeat_mode(crate::transport::RepeatShuffleCommand::Toggle));
            }
            UiCommand::PlaybackModeShuffleToggle => {
                self.with_transport(false, |t| t.set_shuffle_mode(crate::transport::RepeatShuffleCommand::Toggle));
            }
        }
    }

    pub(super) fn permission_allows(&self, check: impl FnOnce(&dyn Permissions) -> bool) -> bool {
        let state = self.state.lock().unwrap();
        state.permissions.as_ref().is_none_or(|p| check(p.as_ref()))
    }

    pub(super) fn is_selected(&self) -> bool {
        self.state
            .lock()
            .unwrap()
            .audio_source
            .as_ref()
            .is_some_and(|a| a.state() == AudioSourceState::Selected)
    }

    /// Starts playback. `find_op` carries a caller-supplied find-next op
    /// (e.g. "play this specific item"); `None` means "resume/unpause
    /// whatever is already loaded".
    pub fn play(self: &Arc<Self>, find_op: Option<Arc<dyn FindNextOp>>, reason: &str) {
        if !self.permission_allows(|p| p.can_play()) {
            tracing::warn!("ignoring play request: not permitted");
            return;
        }

        let decision = {
            let (mut state, mut player_data) = self.locks();

            let Some(source) = state.audio_source.as_ref() else {
                return;
            };

            match source.state() {
                AudioSourceState::Deselected => return,
                AudioSourceState::Requested => {
                    player_data.set_intention(UserIntention::Listening);
                    state.audio_source_selected_find_op = find_op;
                    return;
                }
                AudioSourceState::Selected => {
                    player_data.set_intention(UserIntention::Listening);
                }
            }

            if let Some(find_op) = find_op {
                let Some(crawler) = state.crawler.clone() else {
                    tracing::warn!("play request carried a find operation but no crawler is plugged");
                    return;
                };
                if let Some(prior) = state.prefetch_next_item_op.take() {
                    prior.cancel();
                }
                state.prefetch_next_item_op = Some(Arc::clone(&find_op));
                Some((crawler, find_op))
            } else {
                None
            }
        };

        match decision {
            Some((crawler, find_op)) => {
                let control = Arc::clone(self);
                let ran = crawler.run_find_next(
                    Arc::clone(&find_op),
                    None,
                    CompletionFilter::SuppressCanceled,
                    Box::new(move |op| control.found_item_for_playing(op)),
                );
                if !ran {
                    self.state.lock().unwrap().prefetch_next_item_op = None;
                }
            }
            None => {
                let player_state = self.player_data.lock().unwrap().player_state();
                if matches!(player_state, PlayerState::Stopped | PlayerState::Paused) {
                    self.with_transport(false, |t| t.start(reason));
                }
            }
        }
    }

    pub(crate) fn found_item_for_playing(self: &Arc<Self>, op: Arc<dyn FindNextOp>) {
        {
            let mut state = self.state.lock().unwrap();
            if state.prefetch_next_item_op.as_ref().is_some_and(|o| Arc::ptr_eq(o, &op)) {
                state.prefetch_next_item_op = None;
            }
        }

        if op.is_canceled() {
            return;
        }

        let list_exhausted = if op.is_failure() {
            tracing::warn!("find-next op for direct playback failed");
            true
        } else {
            !matches!(op.result(), Some(PositionalState::SomewhereInList))
        };

        if list_exhausted {
            self.skipper.reset();
            {
                let mut player_data = self.player_data.lock().unwrap();
                let after = match player_data.user_intention() {
                    UserIntention::SkippingPaused => Some(UserIntention::Pausing),
                    UserIntention::SkippingLive => Some(UserIntention::Listening),
                    _ => None,
                };
                if let Some(after) = after {
                    player_data.set_intention(after);
                }
            }
            self.finished_notification(FinishedWith::Playing);
            return;
        }

        let Some(pos) = op.extract_position() else { return };
        let metadata = op.metadata().unwrap_or_default();

        let crawler = {
            let mut state = self.state.lock().unwrap();
            if let Some(source) = state.audio_source.as_mut() {
                source.bookmarks_mut().set(BookmarkName::AboutToPlay, pos.clone_box());
            }
            state.crawler.clone()
        };
        let Some(crawler) = crawler else { return };

        let uris_op = crawler.mk_get_uris(pos.clone_box(), metadata);
        self.state.lock().unwrap().prefetch_uris_op = Some(Arc::clone(&uris_op));

        let control = Arc::clone(self);
        let pos_for_completion = pos.clone_box();
        let ran = crawler.run_get_uris(
            uris_op,
            CompletionFilter::SuppressCanceled,
            Box::new(move |op| control.found_item_uris_for_playing(op, pos_for_completion, Direction::Forward)),
        );

        if !ran {
            tracing::warn!("failed running get-uris op for direct playback");
            self.state.lock().unwrap().prefetch_uris_op = None;
        }
    }

    pub(crate) fn found_item_uris_for_playing(
        self: &Arc<Self>,
        op: Arc<dyn crate::crawler::GetUrisOp>,
        originating_cursor: Arc<dyn Cursor>,
        from_direction: Direction,
    ) {
        {
            let mut state = self.state.lock().unwrap();
            if state.prefetch_uris_op.as_ref().is_some_and(|o| Arc::ptr_eq(o, &op)) {
                state.prefetch_uris_op = None;
            }
        }

        if op.is_canceled() {
            return;
        }

        if op.is_failure() || op.has_no_uris() {
            if self.permission_allows(|p| p.can_skip_on_error()) {
                match from_direction {
                    Direction::Forward => self.skip_forward(),
                    Direction::Backward => self.skip_backward(),
                }
            }
            return;
        }

        let intention = self.player_data.lock().unwrap().user_intention();

        let (play_new_mode, reason) = match intention {
            UserIntention::Nothing | UserIntention::Stopping => return,
            UserIntention::SkippingPaused | UserIntention::Pausing => {
                (PlayNewMode::SendPauseCommandIfIdle, "found next URI in list while paused")
            }
            UserIntention::SkippingLive | UserIntention::Listening => {
                (PlayNewMode::SendPlayCommandIfIdle, "found next URI in list while listening")
            }
        };

        if self.queue_item_from_op(op.as_ref(), originating_cursor, InsertMode::ReplaceAll, play_new_mode, reason.into()) {
            self.start_prefetch_next_item(
                "found URIs for first stream".into(),
                BookmarkName::AboutToPlay,
                Direction::Forward,
                false,
                super::Execution::Now,
            );
        }
    }

    pub fn stop(&self, reason: &str) {
        self.player_data.lock().unwrap().set_intention(UserIntention::Stopping);
        if self.is_selected() {
            self.with_transport(false, |t| t.stop(reason));
        }
    }

    pub fn pause(&self, reason: &str) {
        if !self.permission_allows(|p| p.can_pause()) {
            tracing::warn!("ignoring pause request: not permitted");
            return;
        }
        self.player_data.lock().unwrap().set_intention(UserIntention::Pausing);
        if self.is_selected() {
            self.with_transport(false, |t| t.pause(reason));
        }
    }

    fn build_run_new_find_next_fn(self: &Arc<Self>) -> RunNewFindNextOp {
        let control = Arc::clone(self);
        Box::new(move |tag, pos, direction, on_complete| {
            let (crawler, recursive_mode) = {
                let mut state = control.state.lock().unwrap();
                if let Some(op) = state.prefetch_next_item_op.take() {
                    op.cancel();
                }
                if let Some(op) = state.prefetch_uris_op.take() {
                    op.cancel();
                }
                let crawler = state.crawler.clone()?;
                let recursive_mode = crawler.default_recursive_mode();
                if let Some(source) = state.audio_source.as_mut() {
                    source.bookmarks_mut().set(BookmarkName::SkipCursor, pos.clone_box());
                }
                (crawler, recursive_mode)
            };

            let op = crawler.mk_find_next(tag, recursive_mode, direction, pos, FindMode::StrictlyNext);
            let ran = crawler.run_find_next(Arc::clone(&op), None, CompletionFilter::SuppressCanceled, on_complete);
            if ran { Some(op) } else { None }
        })
    }

    fn build_skip_done_fn(self: &Arc<Self>, previous_intention: UserIntention) -> SkipperDoneCallback {
        let control = Arc::clone(self);
        Box::new(move |op: Option<Arc<dyn FindNextOp>>| {
            let Some(op) = op else { return false };
            if op.is_canceled() {
                return false;
            }

            control.player_data.lock().unwrap().set_intention(previous_intention);

            let found = matches!(
                op.result(),
                Some(PositionalState::SomewhereInList) | Some(PositionalState::Unknown) | None
            );

            if found {
                {
                    let mut state = control.state.lock().unwrap();
                    if let Some(prior) = state.prefetch_next_item_op.take() {
                        prior.cancel();
                    }
                }
                control.found_item_for_playing(op);
            } else {
                control.arm_jump_back_to_currently_playing();
            }

            true
        })
    }

    /// The skip session ran off the end of the list with nothing new to
    /// play; arms one more find-next op that returns to whatever is
    /// currently loaded rather than leaving playback stranded.
    fn arm_jump_back_to_currently_playing(self: &Arc<Self>) {
        let launch = {
            let state = self.state.lock().unwrap();
            let crawler = state.crawler.clone();
            let pos = state
                .audio_source
                .as_ref()
                .and_then(|s| s.bookmarks().get(BookmarkName::CurrentlyPlaying));
            crawler.zip(pos)
        };

        let Some((crawler, pos)) = launch else {
            self.skipper.reset();
            return;
        };

        let recursive_mode = crawler.default_recursive_mode();
        let op = crawler.mk_find_next("jump back to currently playing item", recursive_mode, Direction::Forward, pos, FindMode::Any);

        let control = Arc::clone(self);
        let ran = crawler.run_find_next(
            op,
            None,
            CompletionFilter::SuppressCanceled,
            Box::new(move |_op| control.skipper.reset()),
        );

        if !ran {
            self.skipper.reset();
        }
    }

    pub fn skip_forward(self: &Arc<Self>) {
        if self.state.lock().unwrap().crawler.is_none() {
            self.with_transport(false, |t| t.skip_to_next());
            return;
        }
        if !self.permission_allows(|p| p.can_skip_forward()) {
            tracing::warn!("ignoring skip forward request: not permitted");
            return;
        }
        self.skip_request(Direction::Forward);
    }

    pub fn skip_backward(self: &Arc<Self>) {
        if self.state.lock().unwrap().crawler.is_none() {
            self.with_transport(false, |t| t.skip_to_previous());
            return;
        }
        if !self.permission_allows(|p| p.can_skip_backward()) {
            tracing::warn!("ignoring skip backward request: not permitted");
            return;
        }
        self.skip_request(Direction::Backward);
    }

    fn skip_request(self: &Arc<Self>, direction: Direction) {
        let reference = {
            let (mut state, player_data) = self.locks();
            let intention = player_data.user_intention();

            let Some(source) = state.audio_source.as_ref() else { return };
            if source.state() != AudioSourceState::Selected {
                return;
            }

            let Some(reference) = reference_position_for_skip(source, intention) else {
                return;
            };

            state.prefetch_direction_after_failure = direction;
            (reference, intention)
        };

        let (reference, intention) = reference;
        let run_new_find_next_fn = self.build_run_new_find_next_fn();
        let done_fn = self.build_skip_done_fn(intention);

        let mut player_data = self.player_data.lock().unwrap();
        let result = match direction {
            Direction::Forward => {
                self.skipper.forward_request(&mut player_data, Some(reference), run_new_find_next_fn, Some(done_fn))
            }
            Direction::Backward => {
                self.skipper.backward_request(&mut player_data, Some(reference), run_new_find_next_fn, done_fn)
            }
        };

        if matches!(result, RequestResult::Failed | RequestResult::FirstSkipRequestSuppressed) {
            player_data.set_intention(intention);
        }
    }

    /// `PLAYBACK_PREVIOUS` threshold (`view_play.cc`'s `rewind_threshold`):
    /// below this far into the current stream, "previous" means "go to the
    /// previous item"; past it, it means "start this one over".
    const REWIND_THRESHOLD_MS: i64 = 5000;

    /// `PLAYBACK_PREVIOUS`: rewind to the start of the current stream if
    /// we're more than [`Self::REWIND_THRESHOLD_MS`] into it and the user
    /// actually wants to be listening or paused here; otherwise fall back to
    /// a full skip backward. An unknown position counts as "not far enough
    /// in" and also falls back to skip backward.
    pub fn previous(self: &Arc<Self>) {
        let (position_ms, intention) = {
            let player_data = self.player_data.lock().unwrap();
            (player_data.now_playing_times().position_ms, player_data.user_intention())
        };

        if position_ms >= 0 && position_ms > Self::REWIND_THRESHOLD_MS {
            if matches!(intention, UserIntention::Pausing | UserIntention::Listening) {
                self.rewind();
            }
        } else {
            self.skip_backward();
        }
    }

    /// Seeks back to the start of the current stream.
    pub fn rewind(self: &Arc<Self>) {
        if !self.is_selected() {
            return;
        }
        self.with_transport(false, |t| t.seek(0, TimeUnit::Milliseconds));
    }

    pub fn fast_wind_set_speed(&self, factor: f64) {
        if factor > 0.0 && !self.permission_allows(|p| p.can_fast_wind_forward() || p.can_fast_wind_backward()) {
            tracing::warn!("ignoring fast wind request: not permitted");
            return;
        }
        self.with_transport(false, |t| t.set_speed(factor));
    }

    pub fn seek_stream(&self, value: i64, units: TimeUnit) {
        if value < 0 {
            tracing::warn!(value, "invalid seek position");
            return;
        }
        if !self.permission_allows(|p| p.can_fast_wind_forward() || p.can_fast_wind_backward()) {
            tracing::warn!("ignoring seek request: not permitted");
            return;
        }
        if !self.is_selected() {
            return;
        }
        self.with_transport(false, |t| t.seek(value, units));
    }
}
