//! Tunables the original hardcoded as constants, lifted into a small,
//! injectable configuration struct (spec §9: "treat as process-wide
//! services injected into the core at construction; avoid re-introducing
//! globals").

use std::time::Duration;

#[derive(Clone, Debug, serde::Serialize, serde::Deserialize)]
pub struct Config {
    /// Ceiling on coalesced skip presses in either direction (component F).
    pub max_pending_skip_requests: i32,
    /// Per-stream retry ceiling (component G).
    pub max_retries: u32,
    /// Live-id population cap for the stream-id allocator (component A).
    pub stream_id_population_cap: usize,
    /// Delay before a lookahead prefetch find-next is issued.
    #[serde(with = "duration_millis")]
    pub prefetch_lookahead_delay: Duration,
    /// Default `max_prefetch` used when no permissions vector is plugged in.
    pub default_max_prefetched_streams: u8,
}

impl Default for Config {
    fn default() -> Self {
        Config {
            max_pending_skip_requests: 5,
            max_retries: 2,
            stream_id_population_cap: 20,
            prefetch_lookahead_delay: Duration::from_secs(3),
            default_max_prefetched_streams: 5,
        }
    }
}

mod duration_millis {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S: Serializer>(d: &Duration, s: S) -> Result<S::Ok, S::Error> {
        s.serialize_u64(d.as_millis() as u64)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Duration, D::Error> {
        Ok(Duration::from_millis(u64::deserialize(d)?))
    }
}
