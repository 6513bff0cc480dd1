//! Scenario tests exercising the control core end-to-end through its public
//! surface: UI-facing commands, player-transport notifications, and the
//! crawler completion callbacks that drive queueing and gapless lookahead.

mod support;

use std::sync::Arc;

use playctl::crawler::test_support::{FakeCursor, FakeFindNextOp, FakeGetUrisOp};
use playctl::crawler::PositionalState;
use playctl::events::PlayerNotification;
use playctl::ids::{ListId, StreamId};
use playctl::metadata::MetaDataSet;
use playctl::transport::test_support::FakePlayerTransport;
use playctl::{FinishedWith, PlayerState, StopReaction, UserIntention};

use support::{selected_control, ConfigurablePermissions, FinishedLog, ManualCrawler, ScriptedCrawler};

/// Happy gapless advance: an item is playing, its successor has already
/// been prefetched and queued, and the player reports `NowPlaying` for the
/// successor directly — no stop in between.
#[test]
fn happy_gapless_advance() {
    let crawler = Arc::new(ScriptedCrawler::new());
    let transport = Arc::new(FakePlayerTransport::new());
    let permissions = Arc::new(ConfigurablePermissions::new());
    permissions.set_max_prefetch(2);
    let finished = FinishedLog::new();

    let control = selected_control(crawler.clone(), permissions, transport.clone(), finished);

    // First push result (item A) reports the player idle; the second (item
    // B, appended while A is already playing) reports it already running.
    transport.queue_push_result(playctl::transport::PushResult { fifo_overflow: false, is_playing: false });
    transport.queue_push_result(playctl::transport::PushResult { fifo_overflow: false, is_playing: true });

    crawler.push_get_uris(FakeGetUrisOp::new(vec!["uri-a".into()]));
    crawler.push_find_next(FakeFindNextOp::new(PositionalState::SomewhereInList, Arc::new(FakeCursor(ListId(2)))));
    crawler.push_get_uris(FakeGetUrisOp::new(vec!["uri-b".into()]));

    control.play(Some(FakeFindNextOp::new(PositionalState::SomewhereInList, Arc::new(FakeCursor(ListId(1))))), "user pressed play");

    assert_eq!(transport.pushed_uris(), vec!["uri-a".to_string(), "uri-b".to_string()]);
    assert_eq!(transport.start_count.load(std::sync::atomic::Ordering::SeqCst), 1);
    assert_eq!(control.player_data().lock().unwrap().queued_streams().queue_len(), 2);
    assert_eq!(control.player_data().lock().unwrap().queued_streams().in_flight(), None);

    let (stream_id_a, stream_id_b) = {
        let pushed = transport.pushed.lock().unwrap();
        (pushed[0].0, pushed[1].0)
    };

    control.handle_player_notification(PlayerNotification::NowPlaying {
        stream_id: stream_id_a,
        queue_full: false,
        dropped: vec![],
        metadata: MetaDataSet::new(),
        url: "uri-a".into(),
    });
    assert_eq!(control.player_data().lock().unwrap().player_state(), PlayerState::Playing);
    assert_eq!(control.player_data().lock().unwrap().queued_streams().queue_len(), 1);

    control.handle_player_notification(PlayerNotification::NowPlaying {
        stream_id: stream_id_b,
        queue_full: false,
        dropped: vec![],
        metadata: MetaDataSet::new(),
        url: "uri-b".into(),
    });

    assert_eq!(control.player_data().lock().unwrap().queued_streams().queue_len(), 0);
    assert_eq!(
        control.player_data().lock().unwrap().now_playing_stream_id(),
        stream_id_b
    );
    assert_eq!(transport.stop_count.load(std::sync::atomic::Ordering::SeqCst), 0, "advance stayed gapless");
}

/// Skip coalescing: a second `skip_forward` arriving while the first one's
/// find-next op is still in flight must not launch a second concurrent
/// crawler op — it's absorbed as one more hop in the same chain, and the
/// whole session still settles in exactly one final landing.
#[test]
fn skip_coalescing() {
    let crawler = Arc::new(ManualCrawler::new());
    let transport = Arc::new(FakePlayerTransport::new());
    let permissions = Arc::new(ConfigurablePermissions::new());
    permissions.set_max_prefetch(1);
    let finished = FinishedLog::new();

    let control = selected_control(crawler.clone(), permissions, transport.clone(), finished);

    crawler.push_get_uris(FakeGetUrisOp::new(vec!["uri-a".into()]));
    control.play(Some(FakeFindNextOp::new(PositionalState::SomewhereInList, Arc::new(FakeCursor(ListId(1))))), "user pressed play");
    crawler.complete_next_find_next();
    crawler.complete_next_get_uris();
    assert_eq!(transport.pushed_uris(), vec!["uri-a".to_string()]);

    crawler.push_find_next(FakeFindNextOp::new(PositionalState::SomewhereInList, Arc::new(FakeCursor(ListId(2)))));
    crawler.push_find_next(FakeFindNextOp::new(PositionalState::SomewhereInList, Arc::new(FakeCursor(ListId(3)))));
    crawler.push_get_uris(FakeGetUrisOp::new(vec!["uri-b".into()]));

    control.skip_forward();
    assert!(crawler.has_pending_find_next(), "first press launched a find-next op");

    control.skip_forward();
    assert!(crawler.has_pending_find_next(), "second press coalesced, no second op launched");
    assert_eq!(control.player_data().lock().unwrap().user_intention(), UserIntention::SkippingLive);

    // Completing the in-flight op drains one unit of pending count and
    // chains straight into the next hop without any further user input.
    crawler.complete_next_find_next();
    assert!(crawler.has_pending_find_next(), "coalesced press produced exactly one follow-up hop");

    // The chain drains to zero pending requests here, delivering the final
    // landing to the direct-playback completion path.
    crawler.complete_next_find_next();
    crawler.complete_next_get_uris();

    assert_eq!(transport.pushed_uris(), vec!["uri-a".to_string(), "uri-b".to_string()]);
    assert_eq!(control.player_data().lock().unwrap().user_intention(), UserIntention::Listening);
}

/// End-of-list during prefetch: the lookahead find-next op reaches the end
/// of the list while the current (last) item is still playing. No further
/// prefetch is attempted, and once that last item stops with nothing
/// queued behind it, the core reports a clean stop rather than looping
/// looking for more.
#[test]
fn end_of_list_during_prefetch() {
    let crawler = Arc::new(ScriptedCrawler::new());
    let transport = Arc::new(FakePlayerTransport::new());
    let permissions = Arc::new(ConfigurablePermissions::new());
    permissions.set_max_prefetch(2);
    let finished = FinishedLog::new();

    let control = selected_control(crawler.clone(), permissions, transport.clone(), finished.clone());

    crawler.push_get_uris(FakeGetUrisOp::new(vec!["uri-a".into()]));
    crawler.push_find_next(FakeFindNextOp::new(PositionalState::ReachedEndOfList, Arc::new(FakeCursor(ListId(2)))));

    control.play(Some(FakeFindNextOp::new(PositionalState::SomewhereInList, Arc::new(FakeCursor(ListId(1))))), "user pressed play");

    assert_eq!(transport.pushed_uris(), vec!["uri-a".to_string()]);
    assert_eq!(finished.events(), vec![FinishedWith::Prefetching]);
    assert_eq!(control.player_data().lock().unwrap().queued_streams().queue_len(), 1);

    let stream_id_a = transport.pushed.lock().unwrap()[0].0;

    control.handle_player_notification(PlayerNotification::NowPlaying {
        stream_id: stream_id_a,
        queue_full: false,
        dropped: vec![],
        metadata: MetaDataSet::new(),
        url: "uri-a".into(),
    });
    assert_eq!(control.player_data().lock().unwrap().queued_streams().queue_len(), 0);

    let reaction = control.stop_notification_ok(stream_id_a);
    assert_eq!(reaction, StopReaction::Stopped);
}

/// Retryable network error: a stream fails with `io.net` (always
/// retryable) twice in a row — each retry re-pushes the same item — then a
/// third consecutive failure exhausts `Config::default().max_retries` and
/// the core gives up on it and moves on to the next queued item.
#[test]
fn retryable_network_error() {
    let crawler = Arc::new(ScriptedCrawler::new());
    let transport = Arc::new(FakePlayerTransport::new());
    let permissions = Arc::new(ConfigurablePermissions::new());
    permissions.set_max_prefetch(1);
    let finished = FinishedLog::new();

    let control = selected_control(crawler.clone(), permissions, transport.clone(), finished);

    crawler.push_get_uris(FakeGetUrisOp::new(vec!["uri-a".into()]));
    control.play(Some(FakeFindNextOp::new(PositionalState::SomewhereInList, Arc::new(FakeCursor(ListId(1))))), "user pressed play");

    let stream_id_a = transport.pushed.lock().unwrap()[0].0;

    control.handle_player_notification(PlayerNotification::NowPlaying {
        stream_id: stream_id_a,
        queue_full: false,
        dropped: vec![],
        metadata: MetaDataSet::new(),
        url: "uri-a".into(),
    });

    let reaction1 = control.stop_notification_with_error(stream_id_a, true, "io.net");
    assert_eq!(reaction1, StopReaction::Retry);

    let reaction2 = control.stop_notification_with_error(stream_id_a, true, "io.net");
    assert_eq!(reaction2, StopReaction::Retry);

    assert_eq!(transport.pushed_uris().iter().filter(|u| u.as_str() == "uri-a").count(), 3, "two retries re-pushed the same item");

    // The third consecutive failure exhausts max_retries (2); the core
    // gives up on A and looks for the next item starting from where A was.
    crawler.push_find_next(FakeFindNextOp::new(PositionalState::SomewhereInList, Arc::new(FakeCursor(ListId(2)))));
    crawler.push_get_uris(FakeGetUrisOp::new(vec!["uri-b".into()]));

    let reaction3 = control.stop_notification_with_error(stream_id_a, true, "io.net");
    assert_eq!(reaction3, StopReaction::TakeNext);

    assert!(transport.pushed_uris().contains(&"uri-b".to_string()));
    assert_eq!(control.player_data().lock().unwrap().queued_streams().in_flight(), None);
    assert_eq!(control.player_data().lock().unwrap().queued_streams().queue_len(), 1);
}

/// Audio-source hand-over: a different audio source is selected while this
/// one is still active. The losing source is force-stopped and deselected;
/// any further command bound to it is now silently ignored rather than
/// reaching the transport.
#[test]
fn audio_source_hand_over() {
    let crawler = Arc::new(ScriptedCrawler::new());
    let transport = Arc::new(FakePlayerTransport::new());
    let finished = FinishedLog::new();

    let control = support::selected_control_with_defaults(crawler, transport.clone(), finished);

    let accepted = control.source_selected_notification("a-different-source");
    assert!(!accepted, "hand-over to a different source id is reported as a mismatch");
    assert_eq!(transport.stop_count.load(std::sync::atomic::Ordering::SeqCst), 1, "losing source is force-stopped");

    let stop_count_after_handover = transport.stop_count.load(std::sync::atomic::Ordering::SeqCst);

    control.play(None, "late command arriving after hand-over");
    assert_eq!(transport.start_count.load(std::sync::atomic::Ordering::SeqCst), 0, "play is rejected, not forwarded");

    control.stop("late command arriving after hand-over");
    assert_eq!(
        transport.stop_count.load(std::sync::atomic::Ordering::SeqCst),
        stop_count_after_handover,
        "no further stop reaches the transport for a deselected source"
    );
}

/// Desync on stop: the player reports `STREAM_STOPPED` (no error) for a
/// stream id tagged as ours but that we have no record of at all — neither
/// in flight nor anywhere in the queue. With real queued work still
/// pending, the core treats this as a transient desync rather than an
/// empty-queue stop: it nudges the player to keep going instead of giving
/// up.
#[test]
fn desync_on_stop() {
    let crawler = Arc::new(ScriptedCrawler::new());
    let transport = Arc::new(FakePlayerTransport::new());
    let permissions = Arc::new(ConfigurablePermissions::new());
    permissions.set_max_prefetch(2);
    let finished = FinishedLog::new();

    let control = selected_control(crawler.clone(), permissions, transport.clone(), finished);

    crawler.push_get_uris(FakeGetUrisOp::new(vec!["uri-a".into()]));
    crawler.push_find_next(FakeFindNextOp::new(PositionalState::SomewhereInList, Arc::new(FakeCursor(ListId(2)))));
    crawler.push_get_uris(FakeGetUrisOp::new(vec!["uri-b".into()]));

    control.play(Some(FakeFindNextOp::new(PositionalState::SomewhereInList, Arc::new(FakeCursor(ListId(1))))), "user pressed play");

    let stream_id_a = transport.pushed.lock().unwrap()[0].0;
    control.handle_player_notification(PlayerNotification::NowPlaying {
        stream_id: stream_id_a,
        queue_full: false,
        dropped: vec![],
        metadata: MetaDataSet::new(),
        url: "uri-a".into(),
    });
    assert_eq!(control.player_data().lock().unwrap().queued_streams().queue_len(), 1, "B is still queued behind A");

    // Tagged as one of ours (high bit set) but never allocated by this
    // session's id allocator — a phantom id the core has no record of.
    let phantom = StreamId::from_raw(0x8000_7777);

    let start_count_before = transport.start_count.load(std::sync::atomic::Ordering::SeqCst);
    let reaction = control.stop_notification_ok(phantom);

    assert_eq!(reaction, StopReaction::Queued);
    assert!(transport.start_count.load(std::sync::atomic::Ordering::SeqCst) > start_count_before);
    assert_eq!(
        control.player_data().lock().unwrap().queued_streams().in_flight(),
        playctl::ids::OurStreamId::from_generic(stream_id_a)
    );
    assert_eq!(control.player_data().lock().unwrap().queued_streams().queue_len(), 1, "B untouched by the phantom stop");
}
