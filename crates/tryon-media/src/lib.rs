//! tryon-media: I/O boundary for the try-on engine.
//!
//! Asynchronous image decode, a landmark provider replaying recorded
//! detections, and the persisted preference store.

pub mod decode;
pub mod prefs;
pub mod recorded;

pub use decode::{decode, spawn_decode, DecodeError, ImageSource};
pub use prefs::{PreferenceStore, Preferences, PrefsError, ViewMode};
pub use recorded::{RecordedLandmarks, RecordingError};
