//! Shared identity and state types for the quarry host agent.

use std::fmt;

/// Canonical container name derived from a (server name, owning user) pair.
///
/// The same inputs always resolve to the same identity; distinct inputs that
/// sanitize to the same string collide, and that is accepted rather than
/// detected here.
#[derive(Debug, Clone, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
pub struct ContainerIdentity(String);

impl ContainerIdentity {
    pub fn resolve(server_name: &str, user_email: &str) -> Self {
        let user_id = user_id_from_email(user_email);
        Self(sanitize(&format!("{server_name}-{user_id}")))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ContainerIdentity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Local part of the email (before the first `@`). Emails without an `@` are
/// used whole so identity derivation stays total.
fn user_id_from_email(email: &str) -> &str {
    let email = email.trim();
    match email.split_once('@') {
        Some((local, _)) => local,
        None => email,
    }
}

/// Strip every character the container runtime would reject in a name.
/// Idempotent: sanitizing an already-sanitized string is a no-op.
fn sanitize(raw: &str) -> String {
    raw.chars()
        .filter(|c| c.is_ascii_alphanumeric() || matches!(c, '.' | '-'))
        .collect()
}

/// Container state as reported by the runtime. Authoritative state lives in
/// the runtime itself; this enum only exists for branching and tests.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub enum ContainerState {
    Absent,
    Created,
    Running,
    Stopped,
}

impl ContainerState {
    /// Map a runtime status string (e.g. `docker inspect .State.Status`) onto
    /// the lifecycle states we branch on. Anything that exists but is not
    /// freshly created or running counts as stopped.
    pub fn from_runtime_status(status: &str) -> Self {
        match status.trim() {
            "" => Self::Absent,
            "created" => Self::Created,
            "running" | "restarting" => Self::Running,
            _ => Self::Stopped,
        }
    }
}
