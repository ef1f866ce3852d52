use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

/// Client configuration, loaded from environment variables.
#[derive(Debug, Clone)]
pub struct Config {
    /// Face-matching endpoint receiving the selfie `POST`.
    pub match_endpoint: String,
    /// V4L2 device path (default: /dev/video0).
    pub camera_device: String,
    /// Requested capture width; the driver may negotiate another size.
    pub frame_width: u32,
    /// Requested capture height.
    pub frame_height: u32,
    /// Directory containing the face detector model.
    pub model_dir: PathBuf,
    /// Minimum spacing between two face-presence checks.
    pub detect_interval: Duration,
    /// Frames discarded after opening the camera (AGC/AE settling).
    pub warmup_frames: usize,
    /// Upper bound on one match request.
    pub request_timeout: Duration,
    /// JPEG quality of the submitted selfie (1–100).
    pub jpeg_quality: u8,
    /// Hand preview URLs to the system opener.
    pub open_previews: bool,
}

impl Config {
    /// Load configuration from `FACEFIND_*` environment variables with defaults.
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build from an arbitrary key lookup; unparsable values fall back to defaults.
    pub fn from_lookup(get: impl Fn(&str) -> Option<String>) -> Self {
        let model_dir = get("FACEFIND_MODEL_DIR")
            .map(PathBuf::from)
            .unwrap_or_else(facefind_core::default_model_dir);

        Self {
            match_endpoint: get("FACEFIND_MATCH_ENDPOINT")
                .unwrap_or_else(|| "http://127.0.0.1:8080/api/match".to_string()),
            camera_device: get("FACEFIND_CAMERA_DEVICE")
                .unwrap_or_else(|| "/dev/video0".to_string()),
            frame_width: parsed(&get, "FACEFIND_FRAME_WIDTH", 640),
            frame_height: parsed(&get, "FACEFIND_FRAME_HEIGHT", 480),
            model_dir,
            detect_interval: Duration::from_millis(parsed(&get, "FACEFIND_DETECT_INTERVAL_MS", 100)),
            warmup_frames: parsed(&get, "FACEFIND_WARMUP_FRAMES", 4),
            request_timeout: Duration::from_secs(parsed(&get, "FACEFIND_REQUEST_TIMEOUT_SECS", 30)),
            jpeg_quality: parsed::<u8>(&get, "FACEFIND_JPEG_QUALITY", 92).clamp(1, 100),
            open_previews: get("FACEFIND_OPEN_PREVIEWS")
                .map(|v| v != "0")
                .unwrap_or(true),
        }
    }
}

fn parsed<T: FromStr>(get: &impl Fn(&str) -> Option<String>, key: &str, default: T) -> T {
    match get(key) {
        Some(raw) => raw.trim().parse().unwrap_or_else(|_| {
            tracing::warn!(key, value = %raw, "ignoring unparsable setting");
            default
        }),
        None => default,
    }
}
