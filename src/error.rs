use thiserror::Error;

use crate::ids::{ListId, OurStreamId};

/// Errors that reflect a broken invariant inside the control core itself.
///
/// Every variant here corresponds to a desync or bug class from the
/// enforcement table: none of them are expected to happen in a correctly
/// wired system, but the core must detect and report them rather than
/// silently corrupting its queue.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum QueueError {
    #[error("cannot shift queue: expected next {expected:?}, have in-flight {in_flight:?} and head {head:?}")]
    ShiftMismatch {
        expected: OurStreamId,
        in_flight: Option<OurStreamId>,
        head: Option<OurStreamId>,
    },
    #[error("cannot remove front: neither in-flight {in_flight:?} nor head {head:?} is in the drop set")]
    RemoveFrontMismatch {
        in_flight: Option<OurStreamId>,
        head: Option<OurStreamId>,
    },
    #[error("cannot remove front: queue is completely empty")]
    RemoveFrontEmpty,
    #[error("stream {0:?} not found in container")]
    NotFound(OurStreamId),
    #[error("too many streams queued, cannot queue more")]
    Full,
}

/// Top-level error type surfaced by fallible [`crate::control::PlayerControl`]
/// entry points.
#[derive(Error, Debug)]
pub enum CoreError {
    #[error("queue invariant violated: {0}")]
    Queue(#[from] QueueError),
    #[error("player transport call failed: {0}")]
    Transport(#[source] anyhow::Error),
    #[error("list-id {0:?} referenced with a zero refcount")]
    RefcountUnderflow(ListId),
}
