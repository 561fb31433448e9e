// the looper's data model: tracks, tunables, and session status

pub mod params;
pub mod status;
pub mod track;

pub use params::GhostParameters;
pub use status::{SessionStatus, Timing};
pub use track::{GhostNote, Track, TrackStore};
