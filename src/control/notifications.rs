//! Classification tables for player notifications (§4.I receive side).

use crate::ids::{OurStreamId, StreamId};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum StopClassification {
    OursAsExpected,
    UnexpectedlyNotOurs,
    OursWrongId,
    OursQueued,
    EmptyAsExpected,
    NotOurs,
    UnexpectedlyOurs,
    InvalidId,
}

/// Classifies a `STREAM_STOPPED`/okay notification against our expectation
/// of what the player's head item should be.
///
/// Mirrors `is_stream_expected` in
/// `examples/original_source/src/player_control.cc:979-1002`: when the head
/// is valid (we expect a specific stream) but the notified id is invalid,
/// that's [`StopClassification::InvalidId`] — not the "head invalid" branch.
/// An invalid notified id only falls into
/// [`StopClassification::EmptyAsExpected`] when the head itself is invalid
/// (`player_control.cc:982-985`); a valid head paired with an invalid
/// notified id is its own case (`player_control.cc:993-994`), distinct from
/// `UnexpectedlyNotOurs` (valid head, notified id valid but foreign,
/// `player_control.cc:996-997`).
pub fn classify_stop_ok(
    expected_head: Option<OurStreamId>,
    notified: StreamId,
    is_next_in_queue: impl FnOnce(OurStreamId) -> bool,
) -> StopClassification {
    let notified_ours = OurStreamId::from_generic(notified);

    match (expected_head, notified_ours) {
        (Some(head), Some(ours)) if head == ours => StopClassification::OursAsExpected,
        (Some(_), None) if !notified.is_valid() => StopClassification::InvalidId,
        (Some(_), None) => StopClassification::UnexpectedlyNotOurs,
        (Some(_), Some(ours)) => {
            if is_next_in_queue(ours) {
                StopClassification::OursQueued
            } else {
                StopClassification::OursWrongId
            }
        }
        (None, None) => StopClassification::EmptyAsExpected,
        (None, Some(_)) if !notified.is_valid() => StopClassification::EmptyAsExpected,
        (None, Some(_)) => StopClassification::UnexpectedlyOurs,
    }
}

/// `classify_stop_ok` above only covers the "our head vs. notified" half;
/// foreign, non-`None` ids that aren't ours also need to be distinguished
/// when `expected_head` is `None` (spec's `NOT_OURS` row).
pub fn classify_stop_ok_full(
    expected_head: Option<OurStreamId>,
    notified: StreamId,
    is_next_in_queue: impl FnOnce(OurStreamId) -> bool,
) -> StopClassification {
    if expected_head.is_none() && notified.is_valid() && OurStreamId::from_generic(notified).is_none() {
        return StopClassification::NotOurs;
    }
    classify_stop_ok(expected_head, notified, is_next_in_queue)
}
