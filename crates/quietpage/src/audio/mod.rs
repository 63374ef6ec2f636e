//! Audio muting driven by caption content.
//!
//! The [`AudioMuteCoordinator`] watches caption elements recognized by a
//! [`MediaSiteAdapter`](crate::media::MediaSiteAdapter) and mutes playback
//! while one of them shows a match from the audio wordlist.

mod coordinator;
mod state;

pub use coordinator::{AudioContext, AudioDecision, AudioMuteCoordinator};
pub use state::{
    ActiveMute, MuteState, MuteStatus, PlaybackControl, PlaybackEvent, RecordingPlayback, Timeline,
};
