//! A named playback source with a lifecycle and two transport handles
//! (component J).

use std::sync::Arc;

use crate::crawler::{BookmarkName, Bookmarks, Cursor};
use crate::transport::PlayerTransport;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum AudioSourceState {
    Deselected,
    Requested,
    Selected,
}

/// Enough state to resume playback after a restart: either a crawler
/// bookmark snapshot (list-browser sources) or a plain URL and position
/// (sources with no list browser behind them). Supplements the distilled
/// spec per original `player_resume_data.hh`.
#[derive(Clone, Default)]
pub struct ResumeData {
    crawler_bookmark: Option<Arc<dyn Cursor>>,
    plain_url: Option<String>,
    position_ms: i64,
}

impl ResumeData {
    pub fn reset(&mut self) {
        *self = ResumeData::default();
    }

    pub fn is_set(&self) -> bool {
        self.crawler_bookmark.is_some() || self.plain_url.is_some()
    }

    pub fn update_crawler_bookmark(&mut self, cursor: Arc<dyn Cursor>) {
        self.crawler_bookmark = Some(cursor);
    }

    pub fn update_plain_url(&mut self, url: String, position_ms: i64) {
        self.plain_url = Some(url);
        self.position_ms = position_ms;
    }

    pub fn crawler_bookmark(&self) -> Option<&Arc<dyn Cursor>> {
        self.crawler_bookmark.as_ref()
    }

    pub fn plain_url(&self) -> Option<(&str, i64)> {
        self.plain_url.as_deref().map(|u| (u, self.position_ms))
    }
}

/// A named playback source (e.g. `"strbo.plainurl"`, `"roon"`); at most one
/// is selected at a time. Owns two transport handles: the primary one, valid
/// only while selected, and a force handle usable even mid-deselection.
pub struct AudioSource {
    pub id: String,
    state: AudioSourceState,
    resume_data: ResumeData,
    bookmarks: Bookmarks,
    transport: Option<Arc<dyn PlayerTransport>>,
    force_transport: Option<Arc<dyn PlayerTransport>>,
}

impl AudioSource {
    pub fn new(id: impl Into<String>) -> Self {
        AudioSource {
            id: id.into(),
            state: AudioSourceState::Deselected,
            resume_data: ResumeData::default(),
            bookmarks: Bookmarks::new(),
            transport: None,
            force_transport: None,
        }
    }

    pub fn state(&self) -> AudioSourceState {
        self.state
    }

    pub fn bookmarks(&self) -> &Bookmarks {
        &self.bookmarks
    }

    pub fn bookmarks_mut(&mut self) -> &mut Bookmarks {
        &mut self.bookmarks
    }

    pub fn resume_data(&self) -> &ResumeData {
        &self.resume_data
    }

    pub fn resume_data_mut(&mut self) -> &mut ResumeData {
        &mut self.resume_data
    }

    /// Returns the primary transport if selected, or the force transport
    /// when `force` is set (usable regardless of selection state).
    pub fn transport(&self, force: bool) -> Option<&Arc<dyn PlayerTransport>> {
        if force {
            self.force_transport.as_ref()
        } else {
            self.transport.as_ref()
        }
    }

    pub fn set_transports(
        &mut self,
        transport: Arc<dyn PlayerTransport>,
        force_transport: Arc<dyn PlayerTransport>,
    ) {
        self.force_transport = Some(force_transport);

        if !matches!(self.state, AudioSourceState::Selected) {
            tracing::warn!(id = %self.id, "setting transports for a non-selected audio source");
        }

        self.transport = Some(transport);
    }

    fn set_state(&mut self, new_state: AudioSourceState) {
        if new_state == self.state {
            return;
        }
        self.state = new_state;
    }

    pub fn deselected_notification(&mut self) {
        self.set_state(AudioSourceState::Deselected);
        self.transport = None;
        self.force_transport = None;
        self.bookmarks.clear(BookmarkName::AboutToPlay);
        self.bookmarks.clear(BookmarkName::CurrentlyPlaying);
        self.bookmarks.clear(BookmarkName::PrefetchCursor);
        self.bookmarks.clear(BookmarkName::SkipCursor);
    }

    pub fn request(&mut self) {
        if self.state == AudioSourceState::Deselected {
            self.set_state(AudioSourceState::Requested);
        }
    }

    pub fn selected_notification(&mut self) {
        match self.state {
            AudioSourceState::Deselected => {
                tracing::warn!(id = %self.id, "cannot switch to selected state directly");
            }
            AudioSourceState::Requested => self.set_state(AudioSourceState::Selected),
            AudioSourceState::Selected => {}
        }
    }

    /// Forced transition used only when the audio path was set up
    /// externally. Calling it from `Requested` is a bug, but is handled by
    /// falling through to `Selected` anyway.
    pub fn select_now(&mut self) {
        match self.state {
            AudioSourceState::Requested => {
                tracing::warn!(id = %self.id, "bogus direct switch to selected state from requested state");
                self.set_state(AudioSourceState::Selected);
            }
            AudioSourceState::Deselected => self.set_state(AudioSourceState::Selected),
            AudioSourceState::Selected => {}
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn normal_lifecycle() {
        let mut src = AudioSource::new("strbo.plainurl");
        assert_eq!(src.state(), AudioSourceState::Deselected);
        src.request();
        assert_eq!(src.state(), AudioSourceState::Requested);
        src.selected_notification();
        assert_eq!(src.state(), AudioSourceState::Selected);
        src.deselected_notification();
        assert_eq!(src.state(), AudioSourceState::Deselected);
    }

    #[test]
    fn select_now_falls_through_from_requested() {
        let mut src = AudioSource::new("roon");
        src.request();
        src.select_now();
        assert_eq!(src.state(), AudioSourceState::Selected);
    }
}
