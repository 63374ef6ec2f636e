//! Mute state and playback effects.

use std::sync::{Arc, Mutex, MutexGuard};

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::document::NodeId;

/// Whether playback is muted, and by which media rule.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum MuteStatus {
    /// Audio plays.
    #[default]
    Unmuted,
    /// Audio is muted because of a caption matched under `rule`.
    Muted {
        /// Index of the media rule that caused the mute.
        rule: usize,
    },
}

/// Mute state of one media stream.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MuteState {
    /// Current status.
    pub status: MuteStatus,
    /// Text of the most recent caption that caused a mute.
    pub last_filtered_text: String,
    /// The most recent caption node that caused a mute. Identity only.
    pub last_filtered_node: Option<NodeId>,
}

impl MuteState {
    /// Whether playback is muted.
    #[must_use]
    pub fn is_muted(&self) -> bool {
        matches!(self.status, MuteStatus::Muted { .. })
    }

    /// The rule behind the current mute.
    #[must_use]
    pub fn active_rule(&self) -> Option<usize> {
        match self.status {
            MuteStatus::Muted { rule } => Some(rule),
            MuteStatus::Unmuted => None,
        }
    }
}

/// A caption node currently holding the stream muted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ActiveMute {
    /// The caption node.
    pub node: NodeId,
    /// Media rule the node was classified under.
    pub rule: usize,
    /// Caption text at the time of the match.
    pub text: String,
}

/// Effects on the media element.
pub trait PlaybackControl {
    /// Mute playback. `reason` names the media rule responsible.
    fn mute(&mut self, reason: &str);

    /// Restore playback volume.
    fn unmute(&mut self);
}

/// One mute or unmute on a [`Timeline`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PlaybackEvent {
    /// When the transition happened.
    pub at: DateTime<Utc>,
    /// Whether playback became muted.
    pub muted: bool,
    /// Media rule responsible for a mute.
    pub reason: Option<String>,
}

/// Shared, timestamped record of playback transitions.
#[derive(Debug, Clone, Default)]
pub struct Timeline {
    events: Arc<Mutex<Vec<PlaybackEvent>>>,
}

impl Timeline {
    fn lock(&self) -> MutexGuard<'_, Vec<PlaybackEvent>> {
        self.events
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
    }

    fn push(&self, muted: bool, reason: Option<String>) {
        self.lock().push(PlaybackEvent {
            at: Utc::now(),
            muted,
            reason,
        });
    }

    /// A copy of every recorded transition.
    #[must_use]
    pub fn events(&self) -> Vec<PlaybackEvent> {
        self.lock().clone()
    }

    /// Number of times playback was muted.
    #[must_use]
    pub fn muted_spans(&self) -> u32 {
        let count = self.lock().iter().filter(|e| e.muted).count();
        u32::try_from(count).unwrap_or(u32::MAX)
    }

    /// Whether the last transition left playback muted.
    #[must_use]
    pub fn is_muted(&self) -> bool {
        self.lock().last().is_some_and(|e| e.muted)
    }
}

/// Playback that only records what would have happened.
#[derive(Debug, Clone, Default)]
pub struct RecordingPlayback {
    timeline: Timeline,
}

impl RecordingPlayback {
    /// A recorder with an empty timeline.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// A handle to the timeline that stays readable after the recorder is moved.
    #[must_use]
    pub fn timeline(&self) -> Timeline {
        self.timeline.clone()
    }
}

impl PlaybackControl for RecordingPlayback {
    fn mute(&mut self, reason: &str) {
        self.timeline.push(true, Some(reason.to_string()));
    }

    fn unmute(&mut self) {
        self.timeline.push(false, None);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_mute_state_defaults() {
        let state = MuteState::default();
        assert!(!state.is_muted());
        assert_eq!(state.active_rule(), None);

        let muted = MuteState {
            status: MuteStatus::Muted { rule: 2 },
            ..MuteState::default()
        };
        assert!(muted.is_muted());
        assert_eq!(muted.active_rule(), Some(2));
    }

    #[test]
    fn test_recording_playback_timeline() {
        let mut playback = RecordingPlayback::new();
        let timeline = playback.timeline();
        assert!(!timeline.is_muted());

        playback.mute("captions");
        assert!(timeline.is_muted());
        playback.unmute();
        playback.mute("captions");

        let events = timeline.events();
        assert_eq!(events.len(), 3);
        assert_eq!(events[0].reason.as_deref(), Some("captions"));
        assert!(events[0].at <= events[1].at);
        assert_eq!(timeline.muted_spans(), 2);
        assert!(timeline.is_muted());
    }
}
