use std::fs;
use std::path::Path;

use pricewatch_core::TrackerConfig;
use pricewatch_logging::{watch_info, watch_warn};

pub(crate) const CONFIG_FILENAME: &str = "pricewatch.ron";

/// Read the tracker configuration, falling back to the built-in defaults when
/// the file is absent or unparsable.
pub(crate) fn load_config(path: &Path) -> TrackerConfig {
    let content = match fs::read_to_string(path) {
        Ok(text) => text,
        Err(err) if err.kind() == std::io::ErrorKind::NotFound => {
            watch_info!("No config at {:?}; using built-in targets", path);
            return TrackerConfig::default();
        }
        Err(err) => {
            watch_warn!("Failed to read config from {:?}: {}", path, err);
            return TrackerConfig::default();
        }
    };

    match ron::from_str(&content) {
        Ok(config) => {
            watch_info!("Loaded config from {:?}", path);
            config
        }
        Err(err) => {
            watch_warn!("Failed to parse config from {:?}: {}", path, err);
            TrackerConfig::default()
        }
    }
}
