//! facefind-core: match data model, gallery view, shared match state,
//! navigation, and the face-presence detector used for framing checks.

pub mod detector;
pub mod gallery;
pub mod route;
pub mod store;
pub mod types;

pub use detector::{FaceBox, FacePresence, Presence, ScrfdDetector};
pub use gallery::{ConfidenceTier, GalleryView};
pub use route::Route;
pub use store::{match_store, MatchReader, MatchWriter};
pub use types::{Match, MatchData, MatchSummary};

use std::path::PathBuf;

/// Default directory holding the detector model:
/// `$XDG_DATA_HOME/facefind/models`, falling back to `~/.local/share`.
pub fn default_model_dir() -> PathBuf {
    std::env::var("XDG_DATA_HOME")
        .map(PathBuf::from)
        .unwrap_or_else(|_| {
            let home = std::env::var("HOME").unwrap_or_else(|_| "/tmp".to_string());
            PathBuf::from(home).join(".local/share")
        })
        .join("facefind/models")
}
