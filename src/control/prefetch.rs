//! The gapless lookahead pipeline (§4.I "prefetch", grounded on
//! `start_prefetch_next_item`, `found_prefetched_item`,
//! `found_prefetched_item_uris`, `queue_item_from_op` and
//! `queue_stream_or_forget` in `player_control.cc`).

use std::sync::Arc;

use crate::crawler::{BookmarkName, CompletionFilter, Cursor, Direction, FindMode, FindNextOp, GetUrisOp, PositionalState};
use crate::ids::OurStreamId;
use crate::metadata::{MetaDataKey, MetaDataSet};
use crate::player_data::UserIntention;
use crate::queue::StreamLinks;
use crate::redirect::ResolveOutcome;
use crate::transport::{KeepFirstN, TimeUnit};

use super::{Execution, FinishedWith, InsertMode, PlayNewMode, PlayerControl};

/// Re-points the prefetch cursor bookmark and returns the position it should
/// now search from. When `from_where` is itself `PrefetchCursor`, tries it,
/// then `CurrentlyPlaying`, then `AboutToPlay`, in order; otherwise just
/// takes `from_where` directly. Either way, the winning position is stashed
/// back into `PrefetchCursor` so a later bare retry has something to use.
fn resolve_prefetch_cursor(
    source: &mut crate::audio_source::AudioSource,
    from_where: BookmarkName,
) -> Option<Arc<dyn Cursor>> {
    if from_where == BookmarkName::PrefetchCursor {
        if let Some(found) = source.bookmarks().get_first_of(&[
            BookmarkName::PrefetchCursor,
            BookmarkName::CurrentlyPlaying,
            BookmarkName::AboutToPlay,
        ]) {
            source.bookmarks_mut().set(BookmarkName::PrefetchCursor, found);
        }
    } else if let Some(found) = source.bookmarks().get(from_where) {
        source.bookmarks_mut().set(BookmarkName::PrefetchCursor, found);
    }

    source.bookmarks().get(BookmarkName::PrefetchCursor)
}

/// Coarse bitrate gate applied to a whole queued item. The crawler
/// abstraction hands back a flat URI list with no per-link bitrate, unlike
/// the original's priority-sorted Airable link list; nominal track bitrate
/// is the closest equivalent available here.
fn passes_bitrate_policy(limiter: &(dyn Fn(u32) -> bool + Send + Sync), metadata: &MetaDataSet) -> bool {
    match metadata.get(MetaDataKey::BitrateNominal).and_then(|v| v.parse::<u32>().ok()) {
        Some(kbps) => limiter(kbps),
        None => true,
    }
}

fn links_from_op(op: &dyn GetUrisOp) -> StreamLinks {
    let sorted = op.sorted_links();
    if sorted.is_empty() {
        StreamLinks::Direct(op.direct_uris())
    } else {
        StreamLinks::Airable(sorted)
    }
}

impl PlayerControl {
    /// Arms one more prefetch find-next op unless one is already in flight,
    /// a skip session owns the crawler right now, or the prefetch queue is
    /// already as deep as permitted.
    pub(crate) fn start_prefetch_next_item(
        self: &Arc<Self>,
        reason: String,
        from_where: BookmarkName,
        direction: Direction,
        force_play_uri_when_available: bool,
        execution: Execution,
    ) {
        if !self.is_selected() {
            return;
        }

        let launch = {
            let mut state = self.state.lock().unwrap();

            if state.prefetch_next_item_op.is_some() || self.skipper.is_active() {
                return;
            }

            let Some(crawler) = state.crawler.clone() else { return };

            let max_prefetch = state
                .permissions
                .as_ref()
                .map_or(state.config.default_max_prefetched_streams, |p| p.max_prefetch())
                as usize;
            if self.player_data.lock().unwrap().queued_streams().queue_len() >= max_prefetch {
                return;
            }

            let Some(source) = state.audio_source.as_mut() else { return };
            let Some(pos) = resolve_prefetch_cursor(source, from_where) else { return };

            let recursive_mode = crawler.default_recursive_mode();
            let op = crawler.mk_find_next(
                &format!("Prefetch next item for gapless playback ({reason})"),
                recursive_mode,
                direction,
                pos,
                FindMode::StrictlyNext,
            );
            state.prefetch_next_item_op = Some(Arc::clone(&op));
            Some((crawler, op))
        };

        let Some((crawler, op)) = launch else { return };

        let delay = match execution {
            Execution::Now => None,
            Execution::Delayed => Some(self.state.lock().unwrap().config.prefetch_lookahead_delay),
        };

        let control = Arc::clone(self);
        let ran = crawler.run_find_next(
            Arc::clone(&op),
            delay,
            CompletionFilter::SuppressCanceled,
            Box::new(move |op| control.found_prefetched_item(op, force_play_uri_when_available)),
        );

        if !ran {
            self.state.lock().unwrap().prefetch_next_item_op = None;
        }
    }

    pub(crate) fn found_prefetched_item(self: &Arc<Self>, op: Arc<dyn FindNextOp>, force_play_uri_when_available: bool) {
        {
            let mut state = self.state.lock().unwrap();
            if state.prefetch_next_item_op.as_ref().is_some_and(|o| Arc::ptr_eq(o, &op)) {
                state.prefetch_next_item_op = None;
            }
        }

        if op.is_canceled() {
            return;
        }

        if op.is_failure() {
            tracing::warn!("prefetch find-next op failed");
            return;
        }

        let direction_after_failure = self.state.lock().unwrap().prefetch_direction_after_failure;

        match op.result() {
            Some(PositionalState::SomewhereInList) => {}
            None | Some(PositionalState::Unknown) => return,
            Some(PositionalState::ReachedStartOfList) => {
                if direction_after_failure == Direction::Backward {
                    self.state.lock().unwrap().prefetch_direction_after_failure = Direction::Forward;
                    self.start_prefetch_next_item(
                        "lookahead forward after hitting start of list backwards".into(),
                        BookmarkName::PrefetchCursor,
                        Direction::Forward,
                        false,
                        Execution::Delayed,
                    );
                }
                return;
            }
            Some(PositionalState::ReachedEndOfList) => {
                if direction_after_failure == Direction::Forward {
                    self.finished_notification(FinishedWith::Prefetching);
                }
                return;
            }
        }

        if !self.permission_allows(|p| p.can_prefetch_for_gapless()) {
            return;
        }

        let Some(pos) = op.extract_position() else { return };
        let metadata = op.metadata().unwrap_or_default();

        let crawler = {
            let mut state = self.state.lock().unwrap();
            if let Some(source) = state.audio_source.as_mut() {
                source.bookmarks_mut().set(BookmarkName::PrefetchCursor, pos.clone_box());
            }
            state.crawler.clone()
        };
        let Some(crawler) = crawler else { return };

        let uris_op = crawler.mk_get_uris(pos.clone_box(), metadata);
        self.state.lock().unwrap().prefetch_uris_op = Some(Arc::clone(&uris_op));

        let control = Arc::clone(self);
        let originating_cursor = pos.clone_box();
        let ran = crawler.run_get_uris(
            uris_op,
            CompletionFilter::SuppressCanceled,
            Box::new(move |op| {
                control.found_prefetched_item_uris(op, originating_cursor, direction_after_failure, force_play_uri_when_available)
            }),
        );

        if !ran {
            tracing::warn!("failed running prefetch URIs op for gapless playback");
            self.state.lock().unwrap().prefetch_uris_op = None;
        }
    }

    pub(crate) fn found_prefetched_item_uris(
        self: &Arc<Self>,
        op: Arc<dyn GetUrisOp>,
        originating_cursor: Arc<dyn Cursor>,
        from_direction: Direction,
        force_play_uri_when_available: bool,
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
            let reason = if op.is_failure() { "skip to next because of failure" } else { "skip to next because of empty stream URIs" };
            self.start_prefetch_next_item(
                reason.into(),
                BookmarkName::PrefetchCursor,
                from_direction,
                force_play_uri_when_available,
                Execution::Delayed,
            );
            return;
        }

        let intention = self.player_data.lock().unwrap().user_intention();

        match intention {
            UserIntention::Nothing | UserIntention::Stopping => return,
            // Treated like the non-skipping cases below; only logged
            // distinctly because this is a surprising moment to find one.
            UserIntention::SkippingPaused | UserIntention::SkippingLive => {
                tracing::debug!(?intention, "found item while skipping, treating like non-skipping");
            }
            UserIntention::Pausing | UserIntention::Listening => {}
        }

        let play_new_mode = if force_play_uri_when_available || intention == UserIntention::Listening {
            PlayNewMode::SendPlayCommandIfIdle
        } else {
            PlayNewMode::SendPauseCommandIfIdle
        };

        if self.queue_item_from_op(op.as_ref(), originating_cursor, InsertMode::Append, play_new_mode, "prefetched stream".into()) {
            let execution = if intention == UserIntention::Listening { Execution::Delayed } else { Execution::Now };
            let direction = self.state.lock().unwrap().prefetch_direction_after_failure;
            self.start_prefetch_next_item(
                "lookahead after successfully prefetched URIs".into(),
                BookmarkName::PrefetchCursor,
                direction,
                false,
                execution,
            );
        }
    }

    /// Appends a stream record for a completed get-uris op and hands it to
    /// [`Self::queue_stream_or_forget`]. Returns whether the item is now
    /// queued (or pending resolution) rather than dropped.
    pub(crate) fn queue_item_from_op(
        self: &Arc<Self>,
        op: &dyn GetUrisOp,
        originating_cursor: Arc<dyn Cursor>,
        insert_mode: InsertMode,
        play_new_mode: PlayNewMode,
        reason: String,
    ) -> bool {
        if self.state.lock().unwrap().crawler.is_none() {
            return false;
        }

        let links = links_from_op(op);
        if links.is_empty() {
            return false;
        }

        let metadata = op.metadata().unwrap_or_default();

        let passes = {
            let state = self.state.lock().unwrap();
            passes_bitrate_policy(state.bitrate_limiter.as_ref(), &metadata)
        };
        if !passes {
            tracing::info!("dropping prefetched item: bitrate policy rejected it");
            return false;
        }

        let stream_key = op.stream_key().unwrap_or_default();
        let list_id = originating_cursor.list_id();

        if matches!(insert_mode, InsertMode::ReplaceQueue | InsertMode::ReplaceAll) {
            let mut state = self.state.lock().unwrap();
            if let Some(source) = state.audio_source.as_mut() {
                source.bookmarks_mut().set(BookmarkName::AboutToPlay, originating_cursor.clone_box());
            }
        }

        let id = {
            let mut player_data = self.player_data.lock().unwrap();
            player_data.queued_stream_append(stream_key, metadata, links, list_id, originating_cursor)
        };

        if !id.is_valid() {
            return false;
        }

        self.queue_stream_or_forget(id, insert_mode, play_new_mode, reason)
    }

    /// Resolves `id`'s links to a single playable URI and pushes it to the
    /// player transport, forgetting the queued record on any failure along
    /// the way. Resolution may complete inline or later, from whatever
    /// thread the resolver calls back on.
    pub(crate) fn queue_stream_or_forget(
        self: &Arc<Self>,
        id: OurStreamId,
        insert_mode: InsertMode,
        play_new_mode: PlayNewMode,
        reason: String,
    ) -> bool {
        let links = {
            let player_data = self.player_data.lock().unwrap();
            match player_data.queued_streams().get_stream_by_id(id) {
                Some(qs) => qs.links.clone(),
                None => return false,
            }
        };

        let resolver = self.state.lock().unwrap().uri_resolver.clone();

        let control = Arc::clone(self);
        let outcome = resolver.resolve_first(
            &links,
            Box::new(move |uri| control.push_resolved_uri(id, insert_mode, play_new_mode, reason, uri)),
        );

        !matches!(outcome, ResolveOutcome::Resolved(None))
    }

    fn push_resolved_uri(
        self: &Arc<Self>,
        id: OurStreamId,
        insert_mode: InsertMode,
        play_new_mode: PlayNewMode,
        reason: String,
        uri: Option<String>,
    ) {
        let Some(uri) = uri else {
            tracing::warn!(?id, "no playable URI for queued stream, forgetting it");
            self.player_data.lock().unwrap().queued_stream_remove(id);
            self.broadcast_released_lists();
            return;
        };

        let (stream_key, metadata) = {
            let player_data = self.player_data.lock().unwrap();
            match player_data.queued_streams().get_stream_by_id(id) {
                Some(qs) => (qs.stream_key.clone(), qs.metadata.clone()),
                None => return,
            }
        };

        let keep_first_n = match insert_mode {
            InsertMode::Append => KeepFirstN::KeepAll,
            InsertMode::ReplaceQueue => KeepFirstN::ClearQueue,
            InsertMode::ReplaceAll => KeepFirstN::ClearAll,
        };

        let stream_id = id.as_generic();
        tracing::info!(?stream_id, uri, "passing URI for stream to player");

        let pushed = self.with_transport(false, |t| {
            t.push(
                stream_id,
                &uri,
                &stream_key,
                0,
                TimeUnit::Milliseconds,
                0,
                TimeUnit::Milliseconds,
                keep_first_n,
                &metadata,
            )
        });

        let Some(result) = pushed else {
            tracing::warn!(?id, "failed queuing URI to stream player");
            self.player_data.lock().unwrap().queued_stream_remove(id);
            self.broadcast_released_lists();
            return;
        };

        if result.fifo_overflow {
            tracing::warn!(?id, "URL FIFO overflow, losing queued item");
            self.player_data.lock().unwrap().queued_stream_remove(id);
            self.broadcast_released_lists();
            return;
        }

        self.player_data.lock().unwrap().queued_stream_sent_to_player(id);

        if result.is_playing {
            return;
        }

        let reason = format!("{reason}, ID {stream_id:?}");
        let sent = match play_new_mode {
            PlayNewMode::Keep => true,
            PlayNewMode::SendPlayCommandIfIdle => self.with_transport(false, |t| t.start(&reason)).is_some(),
            PlayNewMode::SendPauseCommandIfIdle => self.with_transport(false, |t| t.pause(&reason)).is_some(),
        };

        if !sent {
            tracing::warn!(?id, "failed sending play/pause command after queuing stream");
        }
    }
}
