//! Persisted user preferences (TOML).
//!
//! The store only remembers inputs between runs. The core never reads it;
//! callers turn a loaded [`Preferences`] into plain overlay inputs.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use thiserror::Error;
use tryon_core::{OverlayOptions, Tint};

const DEFAULT_SLIDER: u8 = 50;
const DEFAULT_OPACITY: f32 = 0.8;

#[derive(Error, Debug)]
pub enum PrefsError {
    #[error("failed to access {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("malformed preferences in {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },
    #[error("failed to serialize preferences: {0}")]
    Serialize(#[from] toml::ser::Error),
}

/// How the before/after comparison is laid out.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ViewMode {
    /// Before and after next to each other.
    #[default]
    Side,
    /// One frame, after revealed up to the slider position.
    Before,
}

impl FromStr for ViewMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "side" => Ok(ViewMode::Side),
            "before" => Ok(ViewMode::Before),
            other => Err(format!("unknown view mode '{other}' (expected side or before)")),
        }
    }
}

impl fmt::Display for ViewMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ViewMode::Side => write!(f, "side"),
            ViewMode::Before => write!(f, "before"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Preferences {
    pub face_image: Option<PathBuf>,
    pub mask_image: Option<PathBuf>,
    pub show_wireframe: bool,
    /// Before/after split position, 0..=100.
    pub slider: u8,
    pub view_mode: ViewMode,
    pub tint: Tint,
    pub opacity: f32,
}

impl Default for Preferences {
    fn default() -> Self {
        Self {
            face_image: None,
            mask_image: None,
            show_wireframe: true,
            slider: DEFAULT_SLIDER,
            view_mode: ViewMode::Side,
            tint: Tint::WHITE,
            opacity: DEFAULT_OPACITY,
        }
    }
}

impl Preferences {
    /// Pull out-of-range values back into range.
    pub fn sanitized(mut self) -> Self {
        self.slider = self.slider.min(100);
        self.opacity = if self.opacity.is_finite() {
            self.opacity.clamp(0.0, 1.0)
        } else {
            DEFAULT_OPACITY
        };
        self
    }

    pub fn overlay_options(&self, debug: bool) -> OverlayOptions {
        OverlayOptions {
            tint: self.tint,
            opacity: self.opacity,
            wireframe: self.show_wireframe,
            debug,
        }
    }
}

/// Preferences file on disk.
#[derive(Debug, Clone)]
pub struct PreferenceStore {
    path: PathBuf,
}

impl PreferenceStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Read the stored preferences. A missing file yields defaults.
    pub fn load(&self) -> Result<Preferences, PrefsError> {
        let text = match std::fs::read_to_string(&self.path) {
            Ok(text) => text,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                tracing::debug!(path = %self.path.display(), "no preferences file; using defaults");
                return Ok(Preferences::default());
            }
            Err(source) => {
                return Err(PrefsError::Io {
                    path: self.path.clone(),
                    source,
                })
            }
        };
        let prefs: Preferences = toml::from_str(&text).map_err(|source| PrefsError::Parse {
            path: self.path.clone(),
            source,
        })?;
        Ok(prefs.sanitized())
    }

    pub fn save(&self, prefs: &Preferences) -> Result<(), PrefsError> {
        let io_err = |source| PrefsError::Io {
            path: self.path.clone(),
            source,
        };
        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent).map_err(io_err)?;
        }
        let text = toml::to_string_pretty(prefs)?;
        std::fs::write(&self.path, text).map_err(io_err)?;
        tracing::debug!(path = %self.path.display(), "preferences saved");
        Ok(())
    }

    /// Load, apply `change`, save. Returns the stored result.
    pub fn update(&self, change: impl FnOnce(&mut Preferences)) -> Result<Preferences, PrefsError> {
        let mut prefs = self.load()?;
        change(&mut prefs);
        let prefs = prefs.sanitized();
        self.save(&prefs)?;
        Ok(prefs)
    }

    /// Forget both images and reset the wireframe, slider and view settings.
    /// Tint and opacity are kept.
    pub fn clear_all(&self) -> Result<Preferences, PrefsError> {
        self.update(|p| {
            let defaults = Preferences::default();
            p.face_image = None;
            p.mask_image = None;
            p.show_wireframe = defaults.show_wireframe;
            p.slider = defaults.slider;
            p.view_mode = defaults.view_mode;
        })
    }

    pub fn remove_face(&self) -> Result<Preferences, PrefsError> {
        self.update(|p| p.face_image = None)
    }

    pub fn remove_mask(&self) -> Result<Preferences, PrefsError> {
        self.update(|p| p.mask_image = None)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn store() -> (tempfile::TempDir, PreferenceStore) {
        let temp = tempfile::tempdir().unwrap();
        let store = PreferenceStore::new(temp.path().join("nested/prefs.toml"));
        (temp, store)
    }

    fn customized() -> Preferences {
        Preferences {
            face_image: Some(PathBuf::from("/photos/me.jpg")),
            mask_image: Some(PathBuf::from("/masks/lips.png")),
            show_wireframe: false,
            slider: 80,
            view_mode: ViewMode::Before,
            tint: "#cc3366".parse().unwrap(),
            opacity: 0.5,
        }
    }

    #[test]
    fn test_missing_file_gives_defaults() {
        let (_temp, store) = store();
        let prefs = store.load().unwrap();
        assert_eq!(prefs, Preferences::default());
        assert!(prefs.show_wireframe);
        assert_eq!(prefs.slider, 50);
    }

    #[test]
    fn test_save_then_load() {
        let (_temp, store) = store();
        store.save(&customized()).unwrap();
        assert_eq!(store.load().unwrap(), customized());
    }

    #[test]
    fn test_file_is_readable_toml() {
        let (_temp, store) = store();
        store.save(&customized()).unwrap();
        let text = std::fs::read_to_string(store.path()).unwrap();
        assert!(text.contains("view_mode = \"before\""), "{text}");
        assert!(text.contains("tint = \"#cc3366\""), "{text}");
    }

    #[test]
    fn test_partial_file_fills_defaults() {
        let (_temp, store) = store();
        std::fs::create_dir_all(store.path().parent().unwrap()).unwrap();
        std::fs::write(store.path(), "slider = 10\n").unwrap();
        let prefs = store.load().unwrap();
        assert_eq!(prefs.slider, 10);
        assert_eq!(prefs.view_mode, ViewMode::Side);
        assert_eq!(prefs.opacity, 0.8);
    }

    #[test]
    fn test_out_of_range_values_sanitized() {
        let (_temp, store) = store();
        std::fs::create_dir_all(store.path().parent().unwrap()).unwrap();
        std::fs::write(store.path(), "slider = 250\nopacity = 3.5\n").unwrap();
        let prefs = store.load().unwrap();
        assert_eq!(prefs.slider, 100);
        assert_eq!(prefs.opacity, 1.0);
    }

    #[test]
    fn test_malformed_file_is_error() {
        let (_temp, store) = store();
        std::fs::create_dir_all(store.path().parent().unwrap()).unwrap();
        std::fs::write(store.path(), "slider = \"wide\"\n").unwrap();
        assert!(matches!(store.load(), Err(PrefsError::Parse { .. })));
    }

    #[test]
    fn test_clear_all_keeps_material() {
        let (_temp, store) = store();
        store.save(&customized()).unwrap();
        let cleared = store.clear_all().unwrap();
        assert_eq!(cleared.face_image, None);
        assert_eq!(cleared.mask_image, None);
        assert!(cleared.show_wireframe);
        assert_eq!(cleared.slider, 50);
        assert_eq!(cleared.view_mode, ViewMode::Side);
        assert_eq!(cleared.tint, customized().tint);
        assert_eq!(cleared.opacity, 0.5);
        assert_eq!(store.load().unwrap(), cleared);
    }

    #[test]
    fn test_remove_face_and_mask() {
        let (_temp, store) = store();
        store.save(&customized()).unwrap();
        let prefs = store.remove_face().unwrap();
        assert_eq!(prefs.face_image, None);
        assert!(prefs.mask_image.is_some());
        let prefs = store.remove_mask().unwrap();
        assert_eq!(prefs.mask_image, None);
        assert_eq!(prefs.slider, 80);
    }

    #[test]
    fn test_view_mode_parse() {
        assert_eq!("before".parse::<ViewMode>().unwrap(), ViewMode::Before);
        assert!("top".parse::<ViewMode>().is_err());
        assert_eq!(ViewMode::Side.to_string(), "side");
    }

    #[test]
    fn test_overlay_options_from_prefs() {
        let opts = customized().overlay_options(true);
        assert!(!opts.wireframe);
        assert!(opts.debug);
        assert_eq!(opts.opacity, 0.5);
    }
}
