use std::net::SocketAddr;
use std::path::PathBuf;

/// Fixed port the game listens on inside every container.
pub const GAME_PORT: u16 = 25565;

/// Host port used when a start request does not name one.
pub const DEFAULT_HOST_PORT: &str = "25565";

/// Agent configuration, built once at startup and handed to every component
/// through the router state. No ambient globals.
#[derive(Debug, Clone)]
pub struct AgentConfig {
    pub listen_addr: SocketAddr,
    /// Bearer token every request must present.
    pub auth_token: String,
    /// Root under which per-identity volume directories live.
    pub data_root: PathBuf,
    /// Image used when `start` has to self-provision a container.
    pub default_image: String,
    /// Container runtime binary, e.g. `docker` or `podman`.
    pub runtime_path: String,
}

fn env_trimmed(name: &str) -> Option<String> {
    std::env::var(name)
        .ok()
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

impl AgentConfig {
    pub fn from_env() -> anyhow::Result<Self> {
        let listen_addr = env_trimmed("QUARRY_LISTEN_ADDR")
            .unwrap_or_else(|| "0.0.0.0:25575".to_string())
            .parse()
            .map_err(|e| anyhow::anyhow!("invalid QUARRY_LISTEN_ADDR: {e}"))?;

        let auth_token = env_trimmed("QUARRY_TOKEN")
            .ok_or_else(|| anyhow::anyhow!("QUARRY_TOKEN is required"))?;

        let data_root =
            PathBuf::from(env_trimmed("QUARRY_DATA_ROOT").unwrap_or_else(|| "./volume".to_string()));

        let default_image =
            env_trimmed("QUARRY_IMAGE").unwrap_or_else(|| "itzg/minecraft-server".to_string());

        let runtime_path = env_trimmed("QUARRY_RUNTIME_PATH").unwrap_or_else(|| "docker".to_string());

        Ok(Self {
            listen_addr,
            auth_token,
            data_root,
            default_image,
            runtime_path,
        })
    }
}
