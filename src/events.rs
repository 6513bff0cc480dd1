//! External message vocabulary (§6) and the bus it travels over.
//!
//! Concrete transport is out of scope: callers push [`PlayerNotification`]s
//! in from whatever bus actually carries D-Bus/RPC traffic, and subscribe to
//! [`CoreEvent`]s to learn what the core did about it.

use std::sync::{Arc, Mutex};

use crossbeam_channel::{Receiver, Sender, unbounded};

use crate::ids::{ListId, StreamId};
use crate::metadata::MetaDataSet;
use crate::player_data::VisibleStreamState;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum TimeUnits {
    Milliseconds,
    Seconds,
}

/// Inbound commands from the UI surface.
#[derive(Clone, Debug)]
pub enum UiCommand {
    PlaybackStart { sender: String },
    PlaybackStop { sender: String },
    PlaybackPause { sender: String },
    /// Rewind if position > 5s, else skip_backward — the threshold is
    /// applied by the caller (it needs `now_playing`'s position, which the
    /// event vocabulary itself doesn't carry).
    PlaybackPrevious,
    PlaybackNext,
    PlaybackFastWindSetSpeed { factor: f64 },
    PlaybackSeekStreamPos { value: i64, units: TimeUnits },
    PlaybackModeRepeatToggle,
    PlaybackModeShuffleToggle,
}

/// Inbound notifications from the player transport.
#[derive(Clone, Debug)]
pub enum PlayerNotification {
    NowPlaying {
        stream_id: StreamId,
        queue_full: bool,
        dropped: Vec<StreamId>,
        metadata: MetaDataSet,
        url: String,
    },
    StreamStopped {
        stream_id: StreamId,
        urlfifo_empty: bool,
        dropped: Vec<StreamId>,
        /// `""` or `"domain.code"`, see [`crate::stopped_reason`].
        error_id: String,
    },
    StreamPaused {
        stream_id: StreamId,
    },
    StreamUnpaused {
        stream_id: StreamId,
    },
    StreamPosition {
        stream_id: StreamId,
        position_ms: i64,
        duration_ms: i64,
    },
    StreamDroppedEarly {
        stream_id: StreamId,
        error_id: String,
    },
    SpeedChanged {
        stream_id: StreamId,
        speed: f64,
    },
    PlaybackModeChanged {
        repeat: bool,
        shuffle: bool,
    },
}

/// What the core did in response to a command or notification, published to
/// observers (e.g. the display-serialization layer).
#[derive(Clone, Debug)]
pub enum CoreEvent {
    VisibleStateChanged(VisibleStreamState),
    NowPlayingChanged { stream_id: StreamId, url: String },
    ListReferenceDropped(ListId),
    Stopped,
}

/// Fan-out bus for [`CoreEvent`]s: each subscriber gets its own unbounded
/// channel, dead receivers are pruned on the next broadcast.
#[derive(Clone, Default)]
pub struct CoreEventBus {
    subscribers: Arc<Mutex<Vec<Sender<CoreEvent>>>>,
}

impl CoreEventBus {
    pub fn new() -> Self {
        CoreEventBus { subscribers: Arc::new(Mutex::new(Vec::new())) }
    }

    pub fn subscribe(&self) -> Receiver<CoreEvent> {
        let (tx, rx) = unbounded::<CoreEvent>();
        self.subscribers.lock().unwrap().push(tx);
        rx
    }

    pub fn broadcast(&self, event: CoreEvent) {
        let mut subscribers = self.subscribers.lock().unwrap();
        subscribers.retain(|tx| tx.send(event.clone()).is_ok());
    }
}
