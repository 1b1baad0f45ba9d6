//! Upload session configuration.

use serde::{Deserialize, Serialize};

/// Resumable upload settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UploadConfig {
    /// Hours an idle upload session survives before the reconciler may
    /// abort and delete it.
    #[serde(default = "default_session_ttl")]
    pub session_ttl_hours: i64,
    /// Maximum size of a single uploaded part in bytes (default 64 MB).
    #[serde(default = "default_max_part_size")]
    pub max_part_size_bytes: u64,
}

impl Default for UploadConfig {
    fn default() -> Self {
        Self {
            session_ttl_hours: default_session_ttl(),
            max_part_size_bytes: default_max_part_size(),
        }
    }
}

fn default_session_ttl() -> i64 {
    24
}

fn default_max_part_size() -> u64 {
    67_108_864 // 64 MB
}
