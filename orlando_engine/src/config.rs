use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

/// Engine-wide settings. Every field has a default so partial JSON files work.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Directory holding the scene archives and loose resources.
    pub data_root: PathBuf,
    pub screen_width: u32,
    pub screen_height: u32,
    /// Whether text resources carry the `!(b - 7)` byte transform.
    pub obfuscated_text: bool,
    /// Extra archives searched after a scene's own archives.
    pub shared_archives: Vec<String>,
    /// Pause between AVX frames.
    pub frame_delay_ms: u64,
    pub audio_buffer_bytes: usize,
    pub random_seed: Option<u64>,
    /// Upper bound on steps spent running a scene's `PRE` macro.
    pub max_pre_steps: u64,
    pub speech_frames_per_word: u32,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            data_root: PathBuf::from("data"),
            screen_width: 640,
            screen_height: 480,
            obfuscated_text: true,
            shared_archives: Vec::new(),
            frame_delay_ms: 25,
            audio_buffer_bytes: 256 * 1024,
            random_seed: None,
            max_pre_steps: 100_000,
            speech_frames_per_word: 6,
        }
    }
}

impl EngineConfig {
    /// Load settings from an optional JSON file; a missing path yields defaults.
    pub fn from_json_file(path: Option<&Path>) -> Result<Self> {
        let Some(path) = path else {
            return Ok(Self::default());
        };
        let raw = fs::read_to_string(path)
            .with_context(|| format!("failed to read engine config: {}", path.display()))?;
        serde_json::from_str(&raw)
            .with_context(|| format!("failed to parse engine config: {}", path.display()))
    }

    pub fn frame_delay(&self) -> Duration {
        Duration::from_millis(self.frame_delay_ms)
    }
}
