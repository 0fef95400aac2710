//! Device identity persistence.
//!
//! A device id is generated on first use and persisted under the engine
//! data directory, so every later session on the same profile reports the
//! same device. Session ids are minted per login and never touch disk
//! outside the session store.

use std::path::Path;

use anyhow::{Context, Result};
use seatlock_protocol::DeviceId;
use tracing::info;

/// File name the device id is persisted under inside the data dir.
pub const DEVICE_ID_FILE: &str = "device.id";

/// Loads the persisted device id, or generates and persists a new one.
pub fn load_or_generate_device_id(path: &Path) -> Result<DeviceId> {
    if path.exists() {
        // Load existing device id
        let contents = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read device id file: {}", path.display()))?;
        DeviceId::parse(&contents)
            .ok_or_else(|| anyhow::anyhow!("Invalid device id file: {}", path.display()))
    } else {
        // Generate new device id
        let device_id = DeviceId::generate();

        // Ensure parent directory exists
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create directory: {}", parent.display()))?;
        }

        std::fs::write(path, device_id.as_str())
            .with_context(|| format!("Failed to write device id file: {}", path.display()))?;

        info!("Generated new device id and saved to {:?}", path);
        Ok(device_id)
    }
}
