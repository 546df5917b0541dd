use std::path::PathBuf;
use std::time::Duration;

/// CLI configuration, loaded from environment variables.
pub struct Config {
    /// Upper bound on a single image decode.
    pub decode_timeout_ms: u64,
    /// Frames the headless loop runs before the result is captured.
    pub frames: usize,
    /// Location of the persisted preferences file.
    pub prefs_path: PathBuf,
    /// Draw light sample points and direction over every frame.
    pub debug_light: bool,
}

impl Config {
    /// Load configuration from `TRYON_*` environment variables with defaults.
    pub fn from_env() -> Self {
        let config_dir = std::env::var("XDG_CONFIG_HOME")
            .map(PathBuf::from)
            .unwrap_or_else(|_| {
                let home = std::env::var("HOME").unwrap_or_else(|_| "/tmp".to_string());
                PathBuf::from(home).join(".config")
            })
            .join("tryon");

        let prefs_path = std::env::var("TRYON_PREFS_PATH")
            .map(PathBuf::from)
            .unwrap_or_else(|_| config_dir.join("prefs.toml"));

        Self {
            decode_timeout_ms: env_u64("TRYON_DECODE_TIMEOUT_MS", 5000),
            frames: env_usize("TRYON_FRAMES", 30),
            prefs_path,
            debug_light: std::env::var("TRYON_DEBUG_LIGHT")
                .map(|v| v != "0")
                .unwrap_or(false),
        }
    }

    pub fn decode_timeout(&self) -> Duration {
        Duration::from_millis(self.decode_timeout_ms)
    }
}

fn env_u64(key: &str, default: u64) -> u64 {
    std::env::var(key)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

fn env_usize(key: &str, default: usize) -> usize {
    std::env::var(key)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}
