use std::path::{Path, PathBuf};

use quarry_core::ContainerIdentity;

use crate::error::AgentError;

/// Ensure the per-identity data directory exists and return its path.
///
/// Created once, reused for every later container incarnation with the same
/// identity, never deleted by the agent.
pub async fn ensure(data_root: &Path, identity: &ContainerIdentity) -> Result<PathBuf, AgentError> {
    let path = data_root.join(identity.as_str());
    tokio::fs::create_dir_all(&path)
        .await
        .map_err(|e| AgentError::filesystem(format!("failed to create volume dir {}", path.display()), e))?;
    Ok(path)
}
