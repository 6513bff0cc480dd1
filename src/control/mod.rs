//! The orchestrator (component I): consumes user intents and player
//! notifications, drives the crawler, queues streams into the player, and
//! enforces user intent against observed player state.
//!
//! Grounded on `examples/original_source/src/player_control.{hh,cc}`
//! (`Player::Control`). Split across submodules the way the original splits
//! across member functions: [`commands`] covers the UI-facing entry points,
//! [`notify`] covers notifications arriving from the player transport, and
//! [`prefetch`] covers the gapless lookahead pipeline.

mod commands;
mod enforcement;
mod notifications;
mod notify;
mod prefetch;

pub use enforcement::{enforce, EnforcementCommand};
pub use notifications::{classify_stop_ok, classify_stop_ok_full, StopClassification};

use std::sync::{Arc, Mutex, MutexGuard};

use crate::audio_source::AudioSource;
use crate::config::Config;
use crate::crawler::{Crawler, Direction, FindNextOp, GetUrisOp};
use crate::events::CoreEventBus;
use crate::permissions::Permissions;
use crate::player_data::PlayerData;
use crate::redirect::{DirectUriResolver, UriResolver};
use crate::retry::RetryLedger;
use crate::skipper::Skipper;

/// Outcome reported back from a `STREAM_STOPPED`-with-no-error notification.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum StopReaction {
    NotAttached,
    StreamIgnored,
    Stopped,
    Queued,
    Retry,
    TakeNext,
}

/// How a freshly queued stream should affect a possibly-idle player.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PlayNewMode {
    Keep,
    SendPlayCommandIfIdle,
    SendPauseCommandIfIdle,
}

/// How much of the existing player-side queue a push should keep.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum InsertMode {
    Append,
    ReplaceQueue,
    ReplaceAll,
}

/// Reported through the `finished_notification` callback when there is
/// nothing left to do in the current direction.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum FinishedWith {
    Prefetching,
    Playing,
}

/// Whether a prefetch lookahead should be launched immediately or after
/// [`Config::prefetch_lookahead_delay`].
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Execution {
    Now,
    Delayed,
}

pub(crate) enum ReplayResult {
    Ok,
    GaveUp,
    RetryFailedHard,
    EmptyQueue,
}

pub type FinishedNotification = Arc<dyn Fn(FinishedWith) + Send + Sync>;

/// Everything the orchestrator needs that isn't [`PlayerData`] — locked
/// separately and always acquired after the data lock (§5).
pub(crate) struct ControlState {
    pub(crate) audio_source: Option<AudioSource>,
    pub(crate) crawler: Option<Arc<dyn Crawler>>,
    pub(crate) permissions: Option<Arc<dyn Permissions>>,
    pub(crate) with_enforced_intentions: bool,
    pub(crate) retry_ledger: RetryLedger,
    pub(crate) prefetch_next_item_op: Option<Arc<dyn FindNextOp>>,
    pub(crate) prefetch_uris_op: Option<Arc<dyn GetUrisOp>>,
    pub(crate) prefetch_direction_after_failure: Direction,
    pub(crate) finished_notification: Option<FinishedNotification>,
    pub(crate) audio_source_selected_find_op: Option<Arc<dyn FindNextOp>>,
    pub(crate) uri_resolver: Arc<dyn UriResolver>,
    pub(crate) bitrate_limiter: Arc<dyn Fn(u32) -> bool + Send + Sync>,
    pub(crate) config: Config,
}

/// The control-plane core. Cheap to share: wrap in `Arc` and call its
/// methods from as many threads as the embedder needs; every entry point
/// that schedules crawler work takes `self: &Arc<Self>` so completion
/// closures can hold their own reference back in.
pub struct PlayerControl {
    pub(crate) state: Mutex<ControlState>,
    pub(crate) player_data: Arc<Mutex<PlayerData>>,
    pub(crate) skipper: Arc<Skipper>,
    pub(crate) events: CoreEventBus,
}

impl PlayerControl {
    pub fn new(config: Config) -> Arc<Self> {
        let player_data = Arc::new(Mutex::new(PlayerData::new(config.stream_id_population_cap)));
        let retry_ledger = RetryLedger::new(config.max_retries);
        let skipper = Arc::new(Skipper::new(config.max_pending_skip_requests));

        Arc::new(PlayerControl {
            state: Mutex::new(ControlState {
                audio_source: None,
                crawler: None,
                permissions: None,
                with_enforced_intentions: false,
                retry_ledger,
                prefetch_next_item_op: None,
                prefetch_uris_op: None,
                prefetch_direction_after_failure: Direction::Forward,
                finished_notification: None,
                audio_source_selected_find_op: None,
                uri_resolver: Arc::new(DirectUriResolver),
                bitrate_limiter: Arc::new(|_| true),
                config,
            }),
            player_data,
            skipper,
            events: CoreEventBus::new(),
        })
    }

    pub fn events(&self) -> &CoreEventBus {
        &self.events
    }

    pub fn player_data(&self) -> &Arc<Mutex<PlayerData>> {
        &self.player_data
    }

    /// Acquires both locks in the mandated order (§5): control state, then
    /// player data.
    pub(crate) fn locks(&self) -> (MutexGuard<'_, ControlState>, MutexGuard<'_, PlayerData>) {
        let state = self.state.lock().unwrap();
        let player_data = self.player_data.lock().unwrap();
        (state, player_data)
    }

    pub fn is_any_audio_source_plugged(&self) -> bool {
        self.state.lock().unwrap().audio_source.is_some()
    }

    pub fn is_active_controller_for(&self, audio_source_id: &str) -> bool {
        self.state
            .lock()
            .unwrap()
            .audio_source
            .as_ref()
            .is_some_and(|a| a.id == audio_source_id)
    }

    pub fn plug_audio_source(
        &self,
        audio_source: AudioSource,
        with_enforced_intentions: bool,
        finished_notification: FinishedNotification,
    ) {
        let mut state = self.state.lock().unwrap();
        state.audio_source = Some(audio_source);
        state.with_enforced_intentions = with_enforced_intentions;
        state.finished_notification = Some(finished_notification);
    }

    pub fn plug_crawler(&self, crawler: Arc<dyn Crawler>, permissions: Arc<dyn Permissions>) {
        let mut state = self.state.lock().unwrap();
        state.crawler = Some(crawler);
        state.permissions = Some(permissions);
    }

    pub fn plug_uri_resolver(&self, resolver: Arc<dyn UriResolver>) {
        self.state.lock().unwrap().uri_resolver = resolver;
    }

    pub fn plug_bitrate_limiter(&self, limiter: Arc<dyn Fn(u32) -> bool + Send + Sync>) {
        self.state.lock().unwrap().bitrate_limiter = limiter;
    }

    /// Cancels in-flight crawl ops and drops resume state. If `complete`,
    /// also disassociates the audio source, crawler and permissions, as
    /// when tearing the whole controller down rather than just losing a
    /// transport temporarily.
    pub fn unplug(&self, complete: bool) {
        let mut state = self.state.lock().unwrap();

        if let Some(op) = state.prefetch_next_item_op.take() {
            op.cancel();
        }
        if let Some(op) = state.prefetch_uris_op.take() {
            op.cancel();
        }
        state.audio_source_selected_find_op.take();
        self.skipper.reset();

        if let Some(source) = state.audio_source.as_mut() {
            source.resume_data_mut().reset();
        }

        if complete {
            state.audio_source = None;
            state.finished_notification = None;
            state.crawler = None;
            state.permissions = None;
        }
    }

    /// The audio path was handed to this audio source by the embedder.
    /// Replays whatever command was stashed while the source was merely
    /// `Requested` (§4.J).
    pub fn source_selected_notification(self: &Arc<Self>, audio_source_id: &str) -> bool {
        use crate::player_data::UserIntention;

        let lost_transport = {
            let mut state = self.state.lock().unwrap();

            let Some(source) = state.audio_source.as_mut() else {
                return false;
            };

            if source.id != audio_source_id {
                let force_transport = source.transport(true).cloned();
                source.deselected_notification();
                state.audio_source_selected_find_op.take();
                Some(force_transport)
            } else {
                None
            }
        };

        if let Some(force_transport) = lost_transport {
            if let Some(transport) = force_transport {
                if let Err(error) = transport.stop("deselected: a different audio source was selected") {
                    tracing::warn!(%error, "player transport call failed");
                }
            }
            return false;
        }

        let pending = {
            let (mut state, mut player_data) = self.locks();

            let Some(source) = state.audio_source.as_mut() else {
                return false;
            };

            source.selected_notification();
            let pending = state.audio_source_selected_find_op.take();
            (pending, player_data.user_intention())
        };

        let (pending, intention) = pending;

        match intention {
            UserIntention::Listening => self.play(pending, "audio source selected, user intended to listen"),
            UserIntention::Stopping => self.stop("audio source selected, user intended to stop"),
            UserIntention::Pausing => self.pause("audio source selected, user intended to pause"),
            UserIntention::Nothing | UserIntention::SkippingPaused | UserIntention::SkippingLive => {}
        }

        true
    }

    /// The audio path has been taken away. `audio_source_id` of `None`
    /// means "whoever is currently selected, unconditionally".
    pub fn source_deselected_notification(&self, audio_source_id: Option<&str>) -> bool {
        let mut state = self.state.lock().unwrap();
        let matches = state
            .audio_source
            .as_ref()
            .is_some_and(|a| audio_source_id.is_none_or(|id| id == a.id));

        if !matches {
            return false;
        }

        if let Some(source) = state.audio_source.as_mut() {
            source.deselected_notification();
        }
        state.audio_source_selected_find_op.take();
        true
    }

    /// Clones the active audio source's transport (or its force handle) and
    /// calls `f` with no lock held, per §5.
    pub(crate) fn with_transport<R>(
        &self,
        force: bool,
        f: impl FnOnce(&dyn crate::transport::PlayerTransport) -> anyhow::Result<R>,
    ) -> Option<R> {
        let transport = {
            let state = self.state.lock().unwrap();
            state.audio_source.as_ref().and_then(|a| a.transport(force).cloned())
        };
        let transport = transport?;
        match f(transport.as_ref()) {
            Ok(value) => Some(value),
            Err(error) => {
                tracing::warn!(%error, "player transport call failed");
                None
            }
        }
    }

    /// Runs the enforcement table and issues at most one command if the
    /// observed player state doesn't match intent yet. A no-op unless this
    /// audio source was plugged `with_enforced_intentions`.
    pub(crate) fn enforce_intention(&self, reason: &str) {
        let command = {
            let (state, player_data) = self.locks();
            if !state.with_enforced_intentions {
                return;
            }
            enforce(player_data.user_intention(), player_data.player_state())
        };

        match command {
            EnforcementCommand::None => {}
            EnforcementCommand::Stop => {
                self.with_transport(false, |t| t.stop(reason));
            }
            EnforcementCommand::Pause => {
                self.with_transport(false, |t| t.pause(reason));
            }
            EnforcementCommand::Play => {
                self.with_transport(false, |t| t.start(reason));
            }
        }
    }

    pub(crate) fn finished_notification(&self, with: FinishedWith) {
        let callback = self.state.lock().unwrap().finished_notification.clone();
        if let Some(callback) = callback {
            callback(with);
        }
    }
}
