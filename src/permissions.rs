//! Per-audio-source capability vector (component H).
//!
//! Queried read-only by [`crate::control`] on every decision that might be
//! rejected. Switching the selected audio source replaces the whole vector,
//! never mutates it in place.

pub trait Permissions: Send + Sync {
    fn can_play(&self) -> bool;
    fn can_pause(&self) -> bool;
    fn can_resume(&self) -> bool;
    fn can_skip_backward(&self) -> bool;
    fn can_skip_forward(&self) -> bool;
    fn can_fast_wind_backward(&self) -> bool;
    fn can_fast_wind_forward(&self) -> bool;
    fn can_set_shuffle(&self) -> bool;
    fn can_toggle_shuffle(&self) -> bool;
    fn can_repeat_single(&self) -> bool;
    fn can_repeat_all(&self) -> bool;
    fn can_toggle_repeat(&self) -> bool;
    fn can_show_listing(&self) -> bool;
    fn can_prefetch_for_gapless(&self) -> bool;
    fn can_skip_on_error(&self) -> bool;
    fn retry_if_stream_broken(&self) -> bool;
    fn max_prefetch(&self) -> u8;
}

/// The permissive default: everything allowed except retrying a stream the
/// player reported as broken, with a lookahead of 5 prefetched streams.
pub struct DefaultPermissions;

impl Permissions for DefaultPermissions {
    fn can_play(&self) -> bool {
        true
    }
    fn can_pause(&self) -> bool {
        true
    }
    fn can_resume(&self) -> bool {
        true
    }
    fn can_skip_backward(&self) -> bool {
        true
    }
    fn can_skip_forward(&self) -> bool {
        true
    }
    fn can_fast_wind_backward(&self) -> bool {
        true
    }
    fn can_fast_wind_forward(&self) -> bool {
        true
    }
    fn can_set_shuffle(&self) -> bool {
        true
    }
    fn can_toggle_shuffle(&self) -> bool {
        true
    }
    fn can_repeat_single(&self) -> bool {
        true
    }
    fn can_repeat_all(&self) -> bool {
        true
    }
    fn can_toggle_repeat(&self) -> bool {
        true
    }
    fn can_show_listing(&self) -> bool {
        true
    }
    fn can_prefetch_for_gapless(&self) -> bool {
        true
    }
    fn can_skip_on_error(&self) -> bool {
        true
    }
    fn retry_if_stream_broken(&self) -> bool {
        false
    }
    fn max_prefetch(&self) -> u8 {
        5
    }
}
