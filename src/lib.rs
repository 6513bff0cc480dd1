//! Control-plane core for a networked audio playback daemon.
//!
//! Mediates between a user-intent surface, a crawler-driven playlist
//! browser, and one or more out-of-process stream players, keeping a
//! coherent queue and at-most-once play decisions across concurrent
//! mutation, partial failure, and asynchronous crawl results. See
//! `control::PlayerControl` for the orchestrator tying the pieces together.

pub mod audio_source;
pub mod config;
pub mod control;
pub mod crawler;
pub mod error;
pub mod events;
pub mod ids;
pub mod metadata;
pub mod permissions;
pub mod player_data;
pub mod queue;
pub mod redirect;
pub mod retry;
pub mod skipper;
pub mod stopped_reason;
pub mod transport;

pub use audio_source::{AudioSource, AudioSourceState, ResumeData};
pub use config::Config;
pub use control::{FinishedWith, InsertMode, PlayNewMode, PlayerControl, StopReaction};
pub use error::{CoreError, QueueError};
pub use events::{CoreEvent, CoreEventBus, PlayerNotification, TimeUnits, UiCommand};
pub use ids::{ListId, OurStreamId, StreamId, StreamIdAllocator};
pub use metadata::{MetaDataKey, MetaDataSet};
pub use permissions::{DefaultPermissions, Permissions};
pub use player_data::{PlayerData, PlayerState, UserIntention, VisibleStreamState};
pub use queue::{QueuedStream, QueuedStreams, StreamLifecycle, StreamLinks};
pub use redirect::{DirectUriResolver, ResolveOutcome, UriResolver};
pub use retry::RetryLedger;
pub use skipper::Skipper;
pub use stopped_reason::StoppedReason;
pub use transport::{KeepFirstN, PlayerTransport, TimeUnit};
