//! Artifact DTOs

use serde::{Deserialize, Serialize};

/// Result of an artifact upload
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UploadedArtifact {
    /// Stored file name, reduced to its final path component
    pub filename: String,
    pub size: u64,
}
