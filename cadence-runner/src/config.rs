use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::env;
use std::path::{Path, PathBuf};

const CONFIG_FILE_NAME: &str = "cadence.json";

#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
pub enum FilteringMode {
    /// Every destination pixel copies the closest source pixel.
    Nearest,
    /// Bilinear blend of the four closest source pixels.
    Smooth,
}

/// Row order of the packed 24-bit image handed to the blitter.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
pub enum RowOrder {
    TopDown,
    BottomUp,
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct LoopConfig {
    /// Letterbox fill, as `[red, green, blue]`.
    #[serde(default = "default_background")]
    pub background: [u8; 3],
    #[serde(default = "default_filtering")]
    pub filtering: FilteringMode,
    #[serde(default = "default_row_order")]
    pub row_order: RowOrder,
    /// Used when the monitor does not report its refresh rate.
    #[serde(default = "default_refresh_hz")]
    pub fallback_refresh_hz: f64,
    #[serde(default = "default_shutdown_poll_ms")]
    pub shutdown_poll_ms: u64,
    #[serde(default = "default_shutdown_poll_limit")]
    pub shutdown_poll_limit: u32,
    /// Pause audio while the window is occluded; playback resumes on the next redraw.
    #[serde(default = "default_suspend_when_occluded")]
    pub suspend_when_occluded: bool,
}

fn default_background() -> [u8; 3] { [0, 0, 0] }
fn default_filtering() -> FilteringMode { FilteringMode::Nearest }
fn default_row_order() -> RowOrder { RowOrder::TopDown }
fn default_refresh_hz() -> f64 { 60.0 }
fn default_shutdown_poll_ms() -> u64 { 10 }
fn default_shutdown_poll_limit() -> u32 { 500 }
fn default_suspend_when_occluded() -> bool { true }

impl Default for LoopConfig {
    fn default() -> Self {
        Self {
            background: default_background(),
            filtering: default_filtering(),
            row_order: default_row_order(),
            fallback_refresh_hz: default_refresh_hz(),
            shutdown_poll_ms: default_shutdown_poll_ms(),
            shutdown_poll_limit: default_shutdown_poll_limit(),
            suspend_when_occluded: default_suspend_when_occluded(),
        }
    }
}

impl LoopConfig {
    pub fn from_json(text: &str) -> Result<Self> {
        serde_json::from_str(text).context("Malformed loop config")
    }

    /// Loads the config from `explicit` if given (any failure is an error), otherwise
    /// from the first readable candidate next to the executable or in the working
    /// directory. Broken candidates are skipped with a warning.
    pub fn load(explicit: Option<&Path>) -> Result<Self> {
        if let Some(path) = explicit {
            let text = std::fs::read_to_string(path)
                .with_context(|| format!("Failed to read config {}", path.display()))?;
            return Self::from_json(&text)
                .with_context(|| format!("Failed to parse config {}", path.display()));
        }

        for path in candidate_paths() {
            let Ok(text) = std::fs::read_to_string(&path) else {
                continue;
            };
            match Self::from_json(&text) {
                Ok(config) => {
                    log::info!("Loaded config from {}", path.display());
                    return Ok(config);
                }
                Err(e) => log::warn!("Ignoring config {}: {:#}", path.display(), e),
            }
        }

        Ok(Self::default())
    }

    /// Background as a `0x00RRGGBB` pixel.
    pub fn background_pixel(&self) -> u32 {
        let [r, g, b] = self.background;
        (r as u32) << 16 | (g as u32) << 8 | b as u32
    }
}

fn candidate_paths() -> Vec<PathBuf> {
    let mut paths = Vec::new();

    if let Ok(exe_path) = env::current_exe() {
        let mut own = exe_path.clone();
        own.set_extension("json");
        paths.push(own);

        let mut shared = exe_path;
        shared.set_file_name(CONFIG_FILE_NAME);
        paths.push(shared);
    }

    if let Ok(mut cwd) = env::current_dir() {
        cwd.push(CONFIG_FILE_NAME);
        paths.push(cwd);
    }

    paths
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_object_uses_defaults() {
        let config = LoopConfig::from_json("{}").unwrap();
        assert_eq!(config, LoopConfig::default());
    }

    #[test]
    fn partial_object_overrides_only_given_fields() {
        let config =
            LoopConfig::from_json(r#"{ "filtering": "Smooth", "background": [16, 32, 64] }"#)
                .unwrap();
        assert_eq!(config.filtering, FilteringMode::Smooth);
        assert_eq!(config.background_pixel(), 0x0010_2040);
        assert_eq!(config.row_order, RowOrder::TopDown);
        assert_eq!(config.shutdown_poll_ms, 10);
    }

    #[test]
    fn unknown_filter_is_rejected() {
        assert!(LoopConfig::from_json(r#"{ "filtering": "Scanlines" }"#).is_err());
    }

    #[test]
    fn missing_explicit_file_is_an_error() {
        let missing = Path::new("/definitely/not/here/cadence.json");
        assert!(LoopConfig::load(Some(missing)).is_err());
    }
}
