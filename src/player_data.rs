//! Observable player state, user intention, and the queue they drive
//! (component D).

use std::collections::HashMap;

use crate::error::QueueError;
use crate::ids::{ListId, OurStreamId, StreamId};
use crate::metadata::MetaDataSet;
use crate::queue::{QueuedStream, QueuedStreams, StreamLinks};

#[derive(Clone, Copy, Debug, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub enum PlayerState {
    Stopped,
    Buffering,
    Playing,
    Paused,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub enum UserIntention {
    Nothing,
    Stopping,
    Pausing,
    Listening,
    SkippingPaused,
    SkippingLive,
}

/// Derived, user-visible playback state (player_state × speed → state).
#[derive(Clone, Copy, Debug, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub enum VisibleStreamState {
    Stopped,
    Buffering,
    Paused,
    Playing,
    FastForward,
    FastRewind,
}

/// Derives the visible state from the raw player state and playback speed,
/// per the table in §4.D.
pub fn visible_stream_state(state: PlayerState, speed: f64) -> VisibleStreamState {
    match state {
        PlayerState::Stopped => VisibleStreamState::Stopped,
        PlayerState::Buffering => VisibleStreamState::Buffering,
        PlayerState::Paused => VisibleStreamState::Paused,
        PlayerState::Playing => {
            if speed == 1.0 {
                VisibleStreamState::Playing
            } else if speed > 0.0 {
                VisibleStreamState::FastForward
            } else {
                VisibleStreamState::FastRewind
            }
        }
    }
}

/// Position and duration, in milliseconds. Negative means unknown.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct TrackTimes {
    pub position_ms: i64,
    pub duration_ms: i64,
}

impl TrackTimes {
    pub const UNKNOWN: TrackTimes = TrackTimes { position_ms: -1, duration_ms: -1 };
}

/// The most recently reported now-playing stream.
#[derive(Default)]
struct NowPlayingInfo {
    stream_id: StreamId,
    url: String,
    times: Option<TrackTimes>,
    metadata: Option<MetaDataSet>,
}

impl NowPlayingInfo {
    fn now_playing(&mut self, stream_id: StreamId, url: String) {
        debug_assert!(stream_id.is_valid());
        debug_assert_ne!(stream_id, self.stream_id);
        self.stream_id = stream_id;
        self.url = url;
        self.times = None;
        self.metadata = None;
    }

    fn nothing(&mut self) {
        self.stream_id = StreamId::invalid();
        self.url.clear();
        self.times = None;
        self.metadata = None;
    }

    fn put_meta_data(&mut self, stream_id: StreamId, metadata: MetaDataSet) -> bool {
        if stream_id == self.stream_id {
            self.metadata = Some(metadata);
            true
        } else {
            tracing::warn!(?stream_id, now_playing = ?self.stream_id, "metadata for wrong stream");
            false
        }
    }

    fn update_times(&mut self, stream_id: StreamId, times: TrackTimes) -> bool {
        if stream_id != self.stream_id {
            return false;
        }
        self.times = Some(times);
        true
    }
}

/// Observable player state: what the player reports, what the user wants,
/// and the queue that bridges them.
pub struct PlayerData {
    player_state: PlayerState,
    user_intention: UserIntention,
    playback_speed: f64,
    now_playing: NowPlayingInfo,
    referenced_lists: HashMap<ListId, usize>,
    /// List-ids whose refcount hit zero since the last [`Self::take_released_lists`]
    /// call, for the control layer to republish as [`crate::events::CoreEvent::ListReferenceDropped`].
    released_lists: Vec<ListId>,
    queued_streams: QueuedStreams,
    repeat_mode: bool,
    shuffle_mode: bool,
}

fn ref_list_id(counts: &mut HashMap<ListId, usize>, list_id: ListId) {
    *counts.entry(list_id).or_insert(0) += 1;
}

/// Decrements `list_id`'s refcount, returning `true` if it just hit zero.
fn unref_list_id(counts: &mut HashMap<ListId, usize>, list_id: ListId) -> bool {
    let Some(count) = counts.get_mut(&list_id) else { return false };
    debug_assert!(*count > 0);
    *count -= 1;
    if *count == 0 {
        counts.remove(&list_id);
        true
    } else {
        false
    }
}

impl PlayerData {
    pub fn new(population_cap: usize) -> Self {
        PlayerData {
            player_state: PlayerState::Stopped,
            user_intention: UserIntention::Nothing,
            playback_speed: 1.0,
            now_playing: NowPlayingInfo::default(),
            referenced_lists: HashMap::new(),
            released_lists: Vec::new(),
            queued_streams: QueuedStreams::new(population_cap, Box::new(|_| {})),
            repeat_mode: false,
            shuffle_mode: false,
        }
    }

    pub fn player_state(&self) -> PlayerState {
        self.player_state
    }

    pub fn user_intention(&self) -> UserIntention {
        self.user_intention
    }

    pub fn playback_speed(&self) -> f64 {
        self.playback_speed
    }

    pub fn queued_streams(&self) -> &QueuedStreams {
        &self.queued_streams
    }

    pub fn queued_streams_mut(&mut self) -> &mut QueuedStreams {
        &mut self.queued_streams
    }

    pub fn referenced_list_count(&self, list_id: ListId) -> usize {
        self.referenced_lists.get(&list_id).copied().unwrap_or(0)
    }

    pub fn repeat_mode(&self) -> bool {
        self.repeat_mode
    }

    pub fn shuffle_mode(&self) -> bool {
        self.shuffle_mode
    }

    /// `PLAYBACK_MODE_CHANGED`: the player is reporting its actual repeat/
    /// shuffle state, which may differ from what we last asked it to toggle
    /// to (it's the source of truth, not us).
    pub fn set_playback_modes(&mut self, repeat: bool, shuffle: bool) {
        self.repeat_mode = repeat;
        self.shuffle_mode = shuffle;
    }

    pub fn set_intention(&mut self, intention: UserIntention) {
        self.user_intention = intention;
    }

    pub fn set_player_state(&mut self, state: PlayerState) -> bool {
        let changed = state != self.player_state;
        self.player_state = state;
        changed
    }

    /// Variant called when the now-playing stream id changes alongside the
    /// state transition; reconciles the queue before updating state.
    pub fn set_player_state_for_stream(&mut self, new_current: StreamId, state: PlayerState) -> bool {
        if !self.stream_has_changed(new_current) {
            return false;
        }
        self.set_player_state(state)
    }

    pub fn get_current_visible_stream_state(&self) -> VisibleStreamState {
        visible_stream_state(self.player_state, self.playback_speed)
    }

    pub fn update_playback_speed(&mut self, stream_id: StreamId, speed: f64) -> bool {
        if self.now_playing.stream_id != stream_id {
            return false;
        }
        self.playback_speed = speed;
        true
    }

    pub fn update_track_times(&mut self, stream_id: StreamId, times: TrackTimes) -> bool {
        self.now_playing.update_times(stream_id, times)
    }

    pub fn now_playing_stream_id(&self) -> StreamId {
        self.now_playing.stream_id
    }

    /// Position/duration most recently reported for the now-playing stream,
    /// or [`TrackTimes::UNKNOWN`] if none has arrived yet.
    pub fn now_playing_times(&self) -> TrackTimes {
        self.now_playing.times.unwrap_or(TrackTimes::UNKNOWN)
    }

    pub fn now_playing_metadata(&self, stream_id: StreamId) -> Option<&MetaDataSet> {
        if stream_id.is_valid() && stream_id != self.now_playing.stream_id {
            tracing::warn!(?stream_id, now_playing = ?self.now_playing.stream_id, "metadata requested for wrong stream");
            return None;
        }
        self.now_playing.metadata.as_ref()
    }

    pub fn note_now_playing(&mut self, stream_id: StreamId, url: String) {
        self.now_playing.now_playing(stream_id, url);
    }

    pub fn note_nothing_playing(&mut self) {
        self.now_playing.nothing();
    }

    pub fn put_now_playing_metadata(&mut self, stream_id: StreamId, metadata: MetaDataSet) -> bool {
        self.now_playing.put_meta_data(stream_id, metadata)
    }

    #[allow(clippy::too_many_arguments)]
    pub fn queued_stream_append(
        &mut self,
        stream_key: Vec<u8>,
        metadata: MetaDataSet,
        links: StreamLinks,
        list_id: ListId,
        originating_cursor: std::sync::Arc<dyn crate::crawler::Cursor>,
    ) -> OurStreamId {
        let id = self
            .queued_streams
            .append(stream_key, metadata, links, list_id, originating_cursor);
        if id.is_valid() {
            ref_list_id(&mut self.referenced_lists, list_id);
        }
        id
    }

    fn remove_data_for_stream(&mut self, qs: &QueuedStream) {
        if unref_list_id(&mut self.referenced_lists, qs.list_id) {
            self.released_lists.push(qs.list_id);
        }
    }

    /// Drains the list-ids that were fully released (refcount hit zero)
    /// since the last call, for the control layer to publish as
    /// [`crate::events::CoreEvent::ListReferenceDropped`].
    pub fn take_released_lists(&mut self) -> Vec<ListId> {
        std::mem::take(&mut self.released_lists)
    }

    /// Transitions a record from `Floating` to `Queued`: the player has
    /// acknowledged the push, but hasn't yet reported it as now-playing.
    pub fn queued_stream_sent_to_player(&mut self, id: OurStreamId) {
        self.queued_streams.mark_lifecycle(id, crate::queue::StreamLifecycle::Queued);
        self.queued_streams.log("after sending to player", tracing::Level::DEBUG);
    }

    pub fn queued_stream_playing_next(&mut self) {
        self.queued_streams.shift_if_not_flying();
    }

    pub fn queued_stream_remove(&mut self, id: OurStreamId) {
        for qs in self.queued_streams.clear_if(|qs| qs.id == id) {
            self.remove_data_for_stream(&qs);
        }
    }

    pub fn remove_all_queued_streams(&mut self, also_remove_playing: bool) {
        let removed = if also_remove_playing {
            self.queued_streams.clear()
        } else {
            let head = self.queued_streams.in_flight();
            self.queued_streams.clear_if(|qs| Some(qs.id) != head)
        };
        for qs in removed {
            self.remove_data_for_stream(&qs);
        }
    }

    /// Resets to a clean slate after a queue invariant was violated: clears
    /// the queue, releasing every list reference it held, and restores
    /// nominal playback speed.
    pub fn player_failed(&mut self) {
        for qs in self.queued_streams.clear() {
            self.remove_data_for_stream(&qs);
        }
        self.playback_speed = 1.0;
    }

    /// Records that our stream has genuinely stopped playing: drops
    /// now-playing tracking and resets playback speed to nominal, without
    /// touching the queue (the caller decides separately whether the queue
    /// still holds unplayed work).
    pub fn player_has_stopped(&mut self) {
        self.set_player_state(PlayerState::Stopped);
        self.now_playing.nothing();
        self.playback_speed = 1.0;
    }

    /// Shifts the queue to match the player's reported next stream. On
    /// desync, resets via [`Self::player_failed`] and returns `false`.
    pub fn stream_has_changed(&mut self, next_stream_id: StreamId) -> bool {
        self.queued_streams.log("before change notification", tracing::Level::DEBUG);

        let next = OurStreamId::from_generic(next_stream_id).unwrap_or(OurStreamId::invalid());

        match self.queued_streams.shift(next) {
            Ok(_) => {
                self.queued_streams.log("after change notification", tracing::Level::DEBUG);
                true
            }
            Err(QueueError::ShiftMismatch { .. }) => {
                tracing::warn!("queue desync on stream change, resetting");
                self.player_failed();
                false
            }
            Err(other) => {
                tracing::warn!(error = %other, "unexpected queue error on stream change");
                self.player_failed();
                false
            }
        }
    }

    /// Splits `dropped` into our ids and foreign ids, then repeatedly pops
    /// the front of the queue for every one of our ids found there. A
    /// mismatch (one of our ids isn't found at the head) is a hard desync.
    pub fn player_dropped_from_queue(&mut self, dropped: &[StreamId]) -> bool {
        if dropped.is_empty() {
            return true;
        }

        self.queued_streams.log("before drop", tracing::Level::DEBUG);

        let mut ours: std::collections::HashSet<OurStreamId> = std::collections::HashSet::new();
        let mut foreign = Vec::new();
        for &id in dropped {
            match OurStreamId::from_generic(id) {
                Some(our_id) => {
                    ours.insert(our_id);
                }
                None => foreign.push(id),
            }
        }

        while !ours.is_empty() && !self.queued_streams.is_empty() {
            match self.queued_streams.remove_front(&mut ours) {
                Ok(Some(qs)) => self.remove_data_for_stream(&qs),
                Ok(None) => {
                    tracing::warn!(?ours, "player dropped streams we don't know about");
                    self.player_failed();
                    return false;
                }
                Err(e) => {
                    tracing::warn!(error = %e, "failed dropping streams");
                    self.player_failed();
                    return false;
                }
            }
        }

        self.queued_streams.log("after drop", tracing::Level::DEBUG);

        for id in foreign {
            tracing::info!(?id, "dropped foreign stream");
        }

        true
    }

    /// Removes a stream the player rejected before ever playing it. Ids not
    /// minted by this core are logged and ignored.
    pub fn player_rejected_unplayed_stream(&mut self, dropped: StreamId) {
        let Some(our_id) = OurStreamId::from_generic(dropped) else {
            tracing::info!(?dropped, "rejected foreign stream");
            return;
        };

        self.queued_streams.log("before drop", tracing::Level::DEBUG);

        match self.queued_streams.remove_anywhere(our_id) {
            Some(qs) => {
                self.remove_data_for_stream(&qs);
                self.queued_streams.log("after drop", tracing::Level::DEBUG);
            }
            None => tracing::warn!(?dropped, "player rejected a stream we don't know about"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn visible_state_table() {
        assert_eq!(visible_stream_state(PlayerState::Stopped, 1.0), VisibleStreamState::Stopped);
        assert_eq!(visible_stream_state(PlayerState::Buffering, 1.0), VisibleStreamState::Buffering);
        assert_eq!(visible_stream_state(PlayerState::Paused, 1.0), VisibleStreamState::Paused);
        assert_eq!(visible_stream_state(PlayerState::Playing, 1.0), VisibleStreamState::Playing);
        assert_eq!(visible_stream_state(PlayerState::Playing, 2.0), VisibleStreamState::FastForward);
        assert_eq!(visible_stream_state(PlayerState::Playing, -1.0), VisibleStreamState::FastRewind);
    }

    #[test]
    fn dropping_nothing_is_a_no_op_success() {
        let mut pd = PlayerData::new(20);
        assert!(pd.player_dropped_from_queue(&[]));
    }

    #[test]
    fn rejecting_foreign_stream_is_ignored() {
        let mut pd = PlayerData::new(20);
        pd.player_rejected_unplayed_stream(StreamId::from_raw(42));
    }
}
