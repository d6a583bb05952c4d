//! Per-installation identifier.

use crate::constants::UNKNOWN_AGENT_ID;
use std::fs;
use std::path::Path;
use tracing::debug;

/// Reads the agent identifier from the first line of `path`.
///
/// Falls back to `UnknownAgent` when the file is missing, unreadable or blank.
pub fn load_agent_id(path: &Path) -> String {
    match fs::read_to_string(path) {
        Ok(contents) => match contents.lines().next().map(str::trim) {
            Some(id) if !id.is_empty() => id.to_string(),
            _ => {
                debug!("Agent id file {:?} is empty", path);
                UNKNOWN_AGENT_ID.to_string()
            }
        },
        Err(e) => {
            debug!(error = %e, "Could not read agent id file {:?}", path);
            UNKNOWN_AGENT_ID.to_string()
        }
    }
}
