//! Fixed-schema per-stream metadata (component B).

use std::collections::BTreeMap;

/// The fixed vocabulary of metadata keys this core understands.
///
/// Anything outside this enum is an unknown key and additions to it are
/// ignored (logged at debug level, never an error).
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, serde::Serialize, serde::Deserialize)]
pub enum MetaDataKey {
    Artist,
    Album,
    Title,
    Codec,
    BitrateNominal,
    BitrateMinimum,
    BitrateMaximum,
    BitrateCurrent,
    /// Internal: display title distinct from the crawler-provided `Title`.
    InternalTitle,
    InternalUrl,
    InternalOpaqueLine1,
    InternalOpaqueLine2,
    InternalOpaqueLine3,
}

impl MetaDataKey {
    /// The four bitrate variants get rounded-to-kbps reformatting; everything
    /// else is stored as given.
    fn is_bitrate(self) -> bool {
        matches!(
            self,
            MetaDataKey::BitrateNominal
                | MetaDataKey::BitrateMinimum
                | MetaDataKey::BitrateMaximum
                | MetaDataKey::BitrateCurrent
        )
    }

    fn is_internal(self) -> bool {
        matches!(
            self,
            MetaDataKey::InternalTitle
                | MetaDataKey::InternalUrl
                | MetaDataKey::InternalOpaqueLine1
                | MetaDataKey::InternalOpaqueLine2
                | MetaDataKey::InternalOpaqueLine3
        )
    }

    /// Maps the broker-facing field name to a key, or `None` if unknown.
    pub fn from_name(name: &str) -> Option<Self> {
        Some(match name {
            "artist" => MetaDataKey::Artist,
            "album" => MetaDataKey::Album,
            "title" => MetaDataKey::Title,
            "codec" => MetaDataKey::Codec,
            "bitrate.nominal" => MetaDataKey::BitrateNominal,
            "bitrate.minimum" => MetaDataKey::BitrateMinimum,
            "bitrate.maximum" => MetaDataKey::BitrateMaximum,
            "bitrate.current" => MetaDataKey::BitrateCurrent,
            "internal.title" => MetaDataKey::InternalTitle,
            "internal.url" => MetaDataKey::InternalUrl,
            "internal.opaque_line_1" => MetaDataKey::InternalOpaqueLine1,
            "internal.opaque_line_2" => MetaDataKey::InternalOpaqueLine2,
            "internal.opaque_line_3" => MetaDataKey::InternalOpaqueLine3,
            _ => return None,
        })
    }
}

/// A fixed-schema record of per-stream metadata, field-wise comparable.
#[derive(Clone, Debug, Default, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct MetaDataSet {
    fields: BTreeMap<MetaDataKey, String>,
}

impl MetaDataSet {
    pub fn new() -> Self {
        MetaDataSet::default()
    }

    pub fn get(&self, key: MetaDataKey) -> Option<&str> {
        self.fields.get(&key).map(String::as_str)
    }

    /// Adds a field addressed by its broker-facing name. Unknown names are
    /// ignored. Bitrate fields are passed through [`reformat_bitrate`].
    pub fn add_by_name(&mut self, name: &str, value: &str) {
        let Some(key) = MetaDataKey::from_name(name) else {
            tracing::debug!(name, "ignoring unknown metadata key");
            return;
        };
        self.add(key, value);
    }

    pub fn add(&mut self, key: MetaDataKey, value: &str) {
        let stored = if key.is_bitrate() {
            match reformat_bitrate(value) {
                Some(kbps) => kbps.to_string(),
                None => {
                    tracing::warn!(?key, value, "leaving non-numeric bitrate value unchanged");
                    value.to_string()
                }
            }
        } else {
            value.to_string()
        };
        self.fields.insert(key, stored);
    }

    /// Clears regular fields; internal fields (title/url/opaque lines) are
    /// only cleared when `include_internal` is set.
    pub fn clear(&mut self, include_internal: bool) {
        if include_internal {
            self.fields.clear();
        } else {
            self.fields.retain(|k, _| k.is_internal());
        }
    }
}

/// Rejects non-numeric, signed, whitespace-padded, or out-of-`u32`-range
/// input; otherwise rounds the parsed bits-per-second value to the nearest
/// kbit/s using integer arithmetic (no floating point).
pub fn reformat_bitrate(raw: &str) -> Option<u32> {
    if raw.is_empty() || !raw.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    let bps: u64 = raw.parse().ok()?;
    if bps > u32::MAX as u64 {
        return None;
    }
    // Round to nearest, ties away from zero, in integer math.
    let kbps = (bps + 500) / 1000;
    Some(kbps as u32)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bitrate_rounds_to_nearest_kbps() {
        assert_eq!(reformat_bitrate("320000"), Some(320));
        assert_eq!(reformat_bitrate("320499"), Some(320));
        assert_eq!(reformat_bitrate("320500"), Some(321));
    }

    #[test]
    fn bitrate_rejects_malformed_input() {
        assert_eq!(reformat_bitrate(""), None);
        assert_eq!(reformat_bitrate(" 320000"), None);
        assert_eq!(reformat_bitrate("-320000"), None);
        assert_eq!(reformat_bitrate("+320000"), None);
        assert_eq!(reformat_bitrate("320kbps"), None);
    }

    #[test]
    fn bitrate_rejects_out_of_range() {
        let too_big = (u32::MAX as u64 + 1).to_string();
        assert_eq!(reformat_bitrate(&too_big), None);
        assert_eq!(reformat_bitrate(&u32::MAX.to_string()), Some(u32::MAX / 1000));
    }

    #[test]
    fn unknown_keys_are_ignored() {
        let mut set = MetaDataSet::new();
        set.add_by_name("nonsense", "value");
        assert_eq!(set.get(MetaDataKey::Artist), None);
    }

    #[test]
    fn non_numeric_bitrate_left_unchanged() {
        let mut set = MetaDataSet::new();
        set.add_by_name("bitrate.nominal", "VBR");
        assert_eq!(set.get(MetaDataKey::BitrateNominal), Some("VBR"));
    }

    #[test]
    fn clear_distinguishes_internal_fields() {
        let mut set = MetaDataSet::new();
        set.add_by_name("artist", "Artist");
        set.add_by_name("internal.url", "http://example.invalid/stream");
        set.clear(false);
        assert_eq!(set.get(MetaDataKey::Artist), None);
        assert_eq!(set.get(MetaDataKey::InternalUrl), Some("http://example.invalid/stream"));
        set.clear(true);
        assert_eq!(set.get(MetaDataKey::InternalUrl), None);
    }
}
