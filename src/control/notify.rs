//! Notifications arriving from the player transport (§4.I "notify", grounded
//! on `play_notification`, `stop_notification_ok`, `stop_notification_with_error`
//! and `pause_notification` in `player_control.cc`).

use std::sync::Arc;

use crate::crawler::{BookmarkName, Direction};
use crate::events::{CoreEvent, PlayerNotification};
use crate::ids::{OurStreamId, StreamId};
use crate::player_data::{PlayerState, TrackTimes, UserIntention};
use crate::stopped_reason::StoppedReason;

use super::{classify_stop_ok_full, Execution, InsertMode, PlayNewMode, PlayerControl, ReplayResult, StopReaction};

impl PlayerControl {
    /// Routes one §6 player-transport notification to the matching
    /// `*_notification` handler, and republishes the resulting observable
    /// transitions on [`crate::events::CoreEventBus`] for the display layer.
    pub fn handle_player_notification(self: &Arc<Self>, notification: PlayerNotification) {
        match notification {
            PlayerNotification::NowPlaying { stream_id, queue_full, dropped, metadata, url } => {
                tracing::debug!(queue_full, "player reports now playing");
                let is_new_stream = {
                    let mut player_data = self.player_data.lock().unwrap();
                    if !dropped.is_empty() {
                        player_data.player_dropped_from_queue(&dropped);
                    }
                    let is_new_stream = player_data.now_playing_stream_id() != stream_id;
                    if is_new_stream {
                        player_data.note_now_playing(stream_id, url.clone());
                    }
                    player_data.put_now_playing_metadata(stream_id, metadata);
                    is_new_stream
                };
                self.play_notification(stream_id, is_new_stream, "now playing notification");
                self.events().broadcast(CoreEvent::NowPlayingChanged { stream_id, url });
                self.broadcast_visible_state();
            }
            PlayerNotification::StreamStopped { stream_id, urlfifo_empty, dropped, error_id } => {
                if !dropped.is_empty() {
                    self.player_data.lock().unwrap().player_dropped_from_queue(&dropped);
                }
                let reaction = if error_id.is_empty() {
                    self.stop_notification_ok(stream_id)
                } else {
                    self.stop_notification_with_error(stream_id, urlfifo_empty, &error_id)
                };
                if reaction == StopReaction::Stopped {
                    self.events().broadcast(CoreEvent::Stopped);
                }
                self.broadcast_visible_state();
            }
            PlayerNotification::StreamPaused { stream_id } => {
                self.pause_notification(stream_id, "stream paused notification");
                self.broadcast_visible_state();
            }
            PlayerNotification::StreamUnpaused { stream_id } => {
                self.play_notification(stream_id, false, "stream unpaused notification");
                self.broadcast_visible_state();
            }
            PlayerNotification::StreamPosition { stream_id, position_ms, duration_ms } => {
                self.player_data
                    .lock()
                    .unwrap()
                    .update_track_times(stream_id, TrackTimes { position_ms, duration_ms });
            }
            PlayerNotification::StreamDroppedEarly { stream_id, error_id } => {
                tracing::info!(?stream_id, error_id, "stream dropped before playing");
                self.player_data.lock().unwrap().player_rejected_unplayed_stream(stream_id);
            }
            PlayerNotification::SpeedChanged { stream_id, speed } => {
                self.player_data.lock().unwrap().update_playback_speed(stream_id, speed);
                self.broadcast_visible_state();
            }
            PlayerNotification::PlaybackModeChanged { repeat, shuffle } => {
                self.player_data.lock().unwrap().set_playback_modes(repeat, shuffle);
            }
        }

        self.broadcast_released_lists();
    }

    fn broadcast_visible_state(&self) {
        let state = self.player_data.lock().unwrap().get_current_visible_stream_state();
        self.events().broadcast(CoreEvent::VisibleStateChanged(state));
    }

    /// Publishes a [`CoreEvent::ListReferenceDropped`] for every list-id
    /// that was pinned only by streams just removed from the queue.
    pub(crate) fn broadcast_released_lists(&self) {
        for list_id in self.player_data.lock().unwrap().take_released_lists() {
            self.events().broadcast(CoreEvent::ListReferenceDropped(list_id));
        }
    }

    /// The player reports it is now (or still) playing `stream_id`.
    pub fn play_notification(self: &Arc<Self>, stream_id: StreamId, is_new_stream: bool, reason: &str) {
        {
            let mut state = self.state.lock().unwrap();
            state.retry_ledger.playing(stream_id);
        }

        let changed = {
            let mut player_data = self.player_data.lock().unwrap();
            player_data.set_player_state_for_stream(stream_id, PlayerState::Playing)
        };

        if !changed {
            return;
        }

        if is_new_stream {
            let mut state = self.state.lock().unwrap();
            if state.prefetch_direction_after_failure == Direction::Backward {
                state.prefetch_direction_after_failure = Direction::Forward;
                if let Some(op) = state.prefetch_uris_op.take() {
                    op.cancel();
                }
            }
        }

        if let Some(our_id) = OurStreamId::from_generic(stream_id) {
            let (mut state, player_data) = self.locks();
            if let Some(qs) = player_data.queued_streams().get_stream_by_id(our_id) {
                let cursor = qs.originating_cursor.clone_box();
                if let Some(source) = state.audio_source.as_mut() {
                    if is_new_stream {
                        source.bookmarks_mut().set(BookmarkName::CurrentlyPlaying, cursor.clone_box());
                        source.bookmarks_mut().set(BookmarkName::AboutToPlay, cursor);
                    }
                }
            } else {
                tracing::warn!(?our_id, "no list position recorded for now-playing stream");
            }
        }

        self.enforce_intention(reason);
    }

    /// `STREAM_STOPPED` with no error attached.
    pub fn stop_notification_ok(self: &Arc<Self>, stream_id: StreamId) -> StopReaction {
        let Some((classification, intention)) = ({
            let (state, player_data) = self.locks();
            if state.audio_source.is_none() || state.crawler.is_none() {
                None
            } else {
                let head = player_data.queued_streams().in_flight();
                let classification = classify_stop_ok_full(head, stream_id, |id| {
                    player_data.queued_streams().get_stream_by_id(id).is_some()
                });
                Some((classification, player_data.user_intention()))
            }
        }) else {
            return StopReaction::NotAttached;
        };

        use crate::control::StopClassification as C;

        match classification {
            C::EmptyAsExpected | C::NotOurs | C::UnexpectedlyNotOurs | C::InvalidId => {
                return StopReaction::StreamIgnored
            }
            // A crawler is always plugged at this point (checked above), so
            // these never force `Stopping` the way the error-path does.
            C::OursAsExpected | C::OursQueued | C::OursWrongId | C::UnexpectedlyOurs => {}
        }

        match intention {
            UserIntention::Stopping => {
                let mut state = self.state.lock().unwrap();
                if let Some(source) = state.audio_source.as_mut() {
                    source.resume_data_mut().reset();
                }
                return StopReaction::Stopped;
            }
            UserIntention::Nothing => return StopReaction::Stopped,
            UserIntention::Pausing | UserIntention::Listening | UserIntention::SkippingPaused | UserIntention::SkippingLive => {}
        }

        let still_prefetching = {
            let mut state = self.state.lock().unwrap();
            let mut player_data = self.player_data.lock().unwrap();
            player_data.player_has_stopped();
            state.retry_ledger.reset();

            let no_prefetch_in_flight = state.prefetch_next_item_op.is_none() && state.prefetch_uris_op.is_none();
            let queue_has_work = !player_data.queued_streams().is_empty();

            !(no_prefetch_in_flight && (!queue_has_work || classification != C::OursWrongId))
        };

        if !still_prefetching {
            let mut state = self.state.lock().unwrap();
            if let Some(source) = state.audio_source.as_mut() {
                source.resume_data_mut().reset();
            }
            return StopReaction::Stopped;
        }

        tracing::info!("stream stopped while next stream is still unavailable, audible gap is very likely");
        self.with_transport(false, |t| t.start("player stopped, still searching for next stream"));
        StopReaction::Queued
    }

    /// `STREAM_STOPPED` with an error id attached.
    pub fn stop_notification_with_error(
        self: &Arc<Self>,
        stream_id: StreamId,
        urlfifo_empty: bool,
        error_id: &str,
    ) -> StopReaction {
        if self.state.lock().unwrap().audio_source.is_none() {
            return StopReaction::NotAttached;
        }

        let reason = StoppedReason::parse(error_id);

        if reason.is_already_stopped_echo() {
            return StopReaction::Queued;
        }

        let (classification, intention) = {
            let (state, player_data) = self.locks();
            let head = player_data.queued_streams().in_flight();
            let classification = classify_stop_ok_full(head, stream_id, |id| {
                player_data.queued_streams().get_stream_by_id(id).is_some()
            });
            drop(state);
            (classification, player_data.user_intention())
        };

        use crate::control::StopClassification as C;

        match classification {
            C::EmptyAsExpected | C::NotOurs | C::UnexpectedlyNotOurs | C::InvalidId => {
                return StopReaction::StreamIgnored
            }
            C::OursAsExpected | C::OursQueued | C::OursWrongId | C::UnexpectedlyOurs => {}
        }

        let stop_regardless = matches!(classification, C::UnexpectedlyOurs | C::OursWrongId);
        let effective_intention = if stop_regardless { UserIntention::Stopping } else { intention };

        let replay_mode = match effective_intention {
            UserIntention::Stopping => {
                let mut state = self.state.lock().unwrap();
                if let Some(source) = state.audio_source.as_mut() {
                    source.resume_data_mut().reset();
                }
                return StopReaction::Stopped;
            }
            UserIntention::Nothing => return StopReaction::Stopped,
            UserIntention::Pausing | UserIntention::SkippingPaused => PlayNewMode::SendPauseCommandIfIdle,
            UserIntention::Listening | UserIntention::SkippingLive => PlayNewMode::SendPlayCommandIfIdle,
        };

        let retry_if_broken = {
            let state = self.state.lock().unwrap();
            state.permissions.as_ref().is_some_and(|p| p.retry_if_stream_broken())
        };
        let should_retry = reason.is_retryable(retry_if_broken);

        let Some(our_id) = OurStreamId::from_generic(stream_id) else {
            tracing::warn!(?stream_id, "stop-with-error for a foreign stream id we believed was ours");
            return StopReaction::Stopped;
        };

        if should_retry {
            match self.replay(our_id, true, replay_mode) {
                ReplayResult::Ok | ReplayResult::EmptyQueue => return StopReaction::Retry,
                ReplayResult::RetryFailedHard => return StopReaction::Stopped,
                ReplayResult::GaveUp => {}
            }
        }

        {
            let mut player_data = self.player_data.lock().unwrap();
            player_data.queued_stream_remove(our_id);
        }
        self.state.lock().unwrap().retry_ledger.reset();

        if !self.permission_allows(|p| p.can_skip_on_error()) {
            return StopReaction::Stopped;
        }

        if urlfifo_empty {
            let queue_has_work = !self.player_data.lock().unwrap().queued_streams().is_empty();
            if queue_has_work {
                return StopReaction::Queued;
            }

            let direction = self.state.lock().unwrap().prefetch_direction_after_failure;
            self.start_prefetch_next_item(
                "skip to next because we need to go on".into(),
                BookmarkName::PrefetchCursor,
                direction,
                true,
                Execution::Now,
            );
            return StopReaction::TakeNext;
        }

        let queue_has_work = !self.player_data.lock().unwrap().queued_streams().is_empty();
        if !queue_has_work {
            tracing::warn!("out of sync: stream player stopped our stream with error and has streams queued, but we don't know which");
            return StopReaction::Stopped;
        }

        let sent = match replay_mode {
            PlayNewMode::Keep => false,
            PlayNewMode::SendPlayCommandIfIdle => self
                .with_transport(false, |t| t.start("player stopped with error, play next in queue"))
                .is_some(),
            PlayNewMode::SendPauseCommandIfIdle => self
                .with_transport(false, |t| t.pause("player stopped with error, pause next in queue"))
                .is_some(),
        };

        if sent {
            self.bookmark_about_to_play_next();
            return StopReaction::TakeNext;
        }

        StopReaction::Stopped
    }

    fn bookmark_about_to_play_next(&self) {
        let (mut state, player_data) = self.locks();
        let Some(next) = player_data.queued_streams().in_flight() else {
            tracing::warn!("no next queued stream to bookmark");
            return;
        };
        let Some(qs) = player_data.queued_streams().get_stream_by_id(next) else {
            tracing::warn!(?next, "no list position for queued stream");
            return;
        };
        if let Some(source) = state.audio_source.as_mut() {
            source.bookmarks_mut().set(BookmarkName::AboutToPlay, qs.originating_cursor.clone_box());
        }
    }

    pub fn pause_notification(self: &Arc<Self>, stream_id: StreamId, reason: &str) {
        {
            let mut state = self.state.lock().unwrap();
            state.retry_ledger.playing(stream_id);
        }

        if !self.is_selected() {
            return;
        }

        self.player_data.lock().unwrap().set_player_state(PlayerState::Paused);
        self.enforce_intention(reason);
    }

    /// Re-queues `stream_id` (replacing the player-side queue entirely),
    /// then re-queues every other previously queued stream behind it.
    /// Grounded on `Player::Control::replay`.
    pub(crate) fn replay(self: &Arc<Self>, stream_id: OurStreamId, is_retry: bool, play_new_mode: PlayNewMode) -> ReplayResult {
        let retry_ok = self.state.lock().unwrap().retry_ledger.retry(stream_id.as_generic());
        if !retry_ok {
            if is_retry {
                tracing::info!(?stream_id, "giving up on stream");
            }
            return ReplayResult::GaveUp;
        }

        if is_retry {
            tracing::info!(?stream_id, "retry stream");
        }

        let is_queued = self.queue_stream_or_forget(
            stream_id,
            InsertMode::ReplaceAll,
            play_new_mode,
            "replay stream".into(),
        );

        if !is_queued && is_retry {
            return ReplayResult::RetryFailedHard;
        }

        let remaining: Vec<OurStreamId> = {
            let player_data = self.player_data.lock().unwrap();
            player_data
                .queued_streams()
                .copy_all_stream_ids()
                .into_iter()
                .filter(|&id| id != stream_id)
                .collect()
        };

        for id in &remaining {
            self.queue_stream_or_forget(*id, InsertMode::Append, PlayNewMode::Keep, "replay queued stream".into());
        }

        tracing::info!(count = remaining.len(), "queued streams once again");

        if remaining.is_empty() {
            ReplayResult::EmptyQueue
        } else {
            ReplayResult::Ok
        }
    }
}
