//! Wire-format error-id parsing for `STREAM_STOPPED` notifications.
//!
//! The original parser (`player_stopped_reason.hh::parse`) calls
//! `std::string::compare()` and treats its result as a boolean, which makes
//! almost every branch take the wrong path (non-zero `compare()` is truthy,
//! so an equality check degenerates into a near-constant `true`). This is a
//! bug, not a behavior to preserve: parsing here is strict, splits once on
//! `.`, and falls back to `Unknown` on anything that doesn't match exactly.

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Domain {
    Flow,
    Io,
    Data,
    Unknown,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Code {
    FlowUnknown,
    FlowNoUrl,
    FlowStopped,
    IoMedia,
    IoNet,
    IoNoUrl,
    IoProtocol,
    IoAuth,
    IoUnavailable,
    IoType,
    IoDenied,
    DataCodec,
    DataFormat,
    DataBroken,
    DataEncrypted,
    DataNoDecrypter,
    Unknown,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct StoppedReason {
    pub domain: Domain,
    pub code: Code,
}

impl StoppedReason {
    pub const UNKNOWN: StoppedReason = StoppedReason { domain: Domain::Unknown, code: Code::Unknown };

    /// Parses an error id of the form `<domain>.<code>`. No leading or
    /// trailing whitespace is tolerated; an empty id parses to `flow.stopped`
    /// handled by the caller before reaching here (see
    /// [`crate::control`]'s stop-notification handler), not by this parser.
    pub fn parse(error_id: &str) -> StoppedReason {
        if error_id != error_id.trim() {
            return StoppedReason::UNKNOWN;
        }

        let Some((domain, code)) = error_id.split_once('.') else {
            return StoppedReason::UNKNOWN;
        };

        match domain {
            "flow" => match code {
                "unknown" => StoppedReason { domain: Domain::Flow, code: Code::FlowUnknown },
                "nourl" => StoppedReason { domain: Domain::Flow, code: Code::FlowNoUrl },
                "stopped" => StoppedReason { domain: Domain::Flow, code: Code::FlowStopped },
                _ => StoppedReason::UNKNOWN,
            },
            "io" => match code {
                "media" => StoppedReason { domain: Domain::Io, code: Code::IoMedia },
                "net" => StoppedReason { domain: Domain::Io, code: Code::IoNet },
                "nourl" => StoppedReason { domain: Domain::Io, code: Code::IoNoUrl },
                "protocol" => StoppedReason { domain: Domain::Io, code: Code::IoProtocol },
                "auth" => StoppedReason { domain: Domain::Io, code: Code::IoAuth },
                "unavailable" => StoppedReason { domain: Domain::Io, code: Code::IoUnavailable },
                "type" => StoppedReason { domain: Domain::Io, code: Code::IoType },
                "denied" => StoppedReason { domain: Domain::Io, code: Code::IoDenied },
                _ => StoppedReason::UNKNOWN,
            },
            "data" => match code {
                "codec" => StoppedReason { domain: Domain::Data, code: Code::DataCodec },
                "format" => StoppedReason { domain: Domain::Data, code: Code::DataFormat },
                "broken" => StoppedReason { domain: Domain::Data, code: Code::DataBroken },
                "encrypted" => StoppedReason { domain: Domain::Data, code: Code::DataEncrypted },
                "nodecrypter" => StoppedReason { domain: Domain::Data, code: Code::DataNoDecrypter },
                _ => StoppedReason::UNKNOWN,
            },
            _ => StoppedReason::UNKNOWN,
        }
    }

    /// Whether this reason should be retried per §4.I's table, given whether
    /// permissions allow retrying a stream reported as broken.
    pub fn is_retryable(self, retry_if_stream_broken: bool) -> bool {
        match (self.domain, self.code) {
            (Domain::Io, Code::IoNet | Code::IoNoUrl | Code::IoProtocol) => true,
            (Domain::Data, Code::DataBroken) => retry_if_stream_broken,
            _ => false,
        }
    }

    pub fn is_already_stopped_echo(self) -> bool {
        matches!((self.domain, self.code), (Domain::Flow, Code::FlowStopped))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_known_codes() {
        assert_eq!(StoppedReason::parse("io.net"), StoppedReason { domain: Domain::Io, code: Code::IoNet });
        assert_eq!(
            StoppedReason::parse("data.broken"),
            StoppedReason { domain: Domain::Data, code: Code::DataBroken }
        );
        assert_eq!(
            StoppedReason::parse("flow.stopped"),
            StoppedReason { domain: Domain::Flow, code: Code::FlowStopped }
        );
    }

    #[test]
    fn rejects_whitespace_and_unknown_domains() {
        assert_eq!(StoppedReason::parse(" io.net"), StoppedReason::UNKNOWN);
        assert_eq!(StoppedReason::parse("io.net "), StoppedReason::UNKNOWN);
        assert_eq!(StoppedReason::parse("bogus.code"), StoppedReason::UNKNOWN);
        assert_eq!(StoppedReason::parse("io.bogus"), StoppedReason::UNKNOWN);
        assert_eq!(StoppedReason::parse(""), StoppedReason::UNKNOWN);
        assert_eq!(StoppedReason::parse("noseparator"), StoppedReason::UNKNOWN);
    }

    #[test]
    fn retry_policy_matches_table() {
        assert!(StoppedReason::parse("io.net").is_retryable(false));
        assert!(StoppedReason::parse("io.nourl").is_retryable(false));
        assert!(StoppedReason::parse("io.protocol").is_retryable(false));
        assert!(!StoppedReason::parse("data.broken").is_retryable(false));
        assert!(StoppedReason::parse("data.broken").is_retryable(true));
        assert!(!StoppedReason::parse("io.media").is_retryable(true));
    }
}
