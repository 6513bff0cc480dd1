//! Resolves a queued stream's first playable URI, possibly through an
//! Airable-style redirect lookup (spec §4.I, `queue_stream_or_forget`).
//!
//! Direct links resolve synchronously with no work at all; Airable links may
//! need a network round trip, hence the callback-based interface mirroring
//! [`crate::crawler::Crawler`].

use crate::queue::StreamLinks;

/// Either the resolver answered inline, or it will call the completion
/// closure later from some other thread.
pub enum ResolveOutcome {
    Resolved(Option<String>),
    Pending,
}

pub type ResolveCompletion = Box<dyn FnOnce(Option<String>) + Send>;

pub trait UriResolver: Send + Sync {
    /// Resolves `links` to the single URI that should be pushed to the
    /// player. `on_complete` is invoked exactly once, either from within this
    /// call (and [`ResolveOutcome::Resolved`] is also returned) or later.
    fn resolve_first(&self, links: &StreamLinks, on_complete: ResolveCompletion) -> ResolveOutcome;
}

/// Resolver for sources with no redirect layer: direct links resolve to
/// their first entry, Airable links are treated as unresolvable.
pub struct DirectUriResolver;

impl UriResolver for DirectUriResolver {
    fn resolve_first(&self, links: &StreamLinks, on_complete: ResolveCompletion) -> ResolveOutcome {
        let resolved = match links {
            StreamLinks::Direct(uris) => uris.first().cloned(),
            StreamLinks::Airable(_) => None,
        };
        on_complete(resolved.clone());
        ResolveOutcome::Resolved(resolved)
    }
}
