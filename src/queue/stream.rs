//! A single queued stream record, owned by exactly one [`super::QueuedStreams`].

use std::sync::Arc;

use crate::crawler::Cursor;
use crate::ids::{ListId, OurStreamId};
use crate::metadata::MetaDataSet;

/// Lifecycle of a [`QueuedStream`] inside its owning [`super::QueuedStreams`].
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum StreamLifecycle {
    /// Created, not yet handed to the player transport.
    Floating,
    /// Handed to the player, push acknowledged.
    Queued,
    /// Player reports this as its current (in-flight) item.
    Current,
    /// Removed from the container; any held reference is now stale.
    AboutToDie,
}

/// Either a flat list of direct URIs, or a priority-sorted list of Airable
/// redirect links still needing resolution.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum StreamLinks {
    Direct(Vec<String>),
    Airable(Vec<String>),
}

impl StreamLinks {
    pub fn is_empty(&self) -> bool {
        match self {
            StreamLinks::Direct(v) => v.is_empty(),
            StreamLinks::Airable(v) => v.is_empty(),
        }
    }
}

/// One entry in the queue: everything the core needs to push a stream to the
/// player transport and to recover its position in the list on retry.
pub struct QueuedStream {
    pub id: OurStreamId,
    pub lifecycle: StreamLifecycle,
    /// Opaque blob from the list broker, passed through verbatim.
    pub stream_key: Vec<u8>,
    pub metadata: MetaDataSet,
    pub links: StreamLinks,
    pub list_id: ListId,
    /// Clone of the crawler cursor at which this item was found.
    pub originating_cursor: Arc<dyn Cursor>,
}

impl std::fmt::Debug for QueuedStream {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("QueuedStream")
            .field("id", &self.id)
            .field("lifecycle", &self.lifecycle)
            .field("list_id", &self.list_id)
            .field("links", &self.links)
            .finish()
    }
}
