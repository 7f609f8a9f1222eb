//! Lifecycle orchestration against the container runtime. The agent records
//! no container state of its own; every operation resolves the identity,
//! issues runtime subcommands, and forwards failures verbatim. Concurrent
//! operations on the same identity are not serialized here; the runtime
//! arbitrates races.

use std::path::PathBuf;

use quarry_core::ContainerIdentity;

use crate::config::AgentConfig;
use crate::docker::{ContainerRuntime, CreateSpec, RunSpec, RuntimeOutput};
use crate::error::AgentError;
use crate::volume;

/// Software/resource options for `create`. All opaque strings, validated by
/// the runtime, not here.
#[derive(Debug, Clone)]
pub struct CreateOptions {
    pub software: String,
    pub memory: Option<String>,
    pub storage: Option<String>,
}

pub struct Lifecycle<R> {
    runtime: R,
    data_root: PathBuf,
    default_image: String,
}

impl<R: ContainerRuntime> Lifecycle<R> {
    pub fn new(runtime: R, config: &AgentConfig) -> Self {
        Self {
            runtime,
            data_root: config.data_root.clone(),
            default_image: config.default_image.clone(),
        }
    }

    pub fn runtime(&self) -> &R {
        &self.runtime
    }

    /// Create-if-absent for the identity's volume directory.
    pub async fn provision(&self, identity: &ContainerIdentity) -> Result<PathBuf, AgentError> {
        volume::ensure(&self.data_root, identity).await
    }

    /// Ensure a container definition exists without starting it. A name
    /// conflict from the runtime counts as success; the orchestrator does not
    /// diff or update an existing definition.
    pub async fn create(
        &self,
        identity: &ContainerIdentity,
        opts: &CreateOptions,
    ) -> Result<(), AgentError> {
        let volume = self.provision(identity).await?;
        let spec = CreateSpec {
            name: identity.as_str().to_string(),
            image: self.default_image.clone(),
            volume,
            software: opts.software.clone(),
            memory: opts.memory.clone(),
            storage: opts.storage.clone(),
        };
        let out = run(self.runtime.create(&spec).await)?;
        if !out.success && !is_name_conflict(&out.output) {
            return Err(AgentError::RuntimeCommand(out.output));
        }
        tracing::info!(container = %identity, "container definition ensured");
        Ok(())
    }

    /// Ensure the container is running. Absent containers are provisioned and
    /// launched in one step with the default image; existing ones get a plain
    /// start. Safe to call as the very first operation for an identity.
    pub async fn start(
        &self,
        identity: &ContainerIdentity,
        host_port: &str,
    ) -> Result<(), AgentError> {
        let volume = self.provision(identity).await?;

        let exists = self
            .runtime
            .exists(identity.as_str())
            .await
            .map_err(invoke_failed)?;

        let out = if exists {
            run(self.runtime.start(identity.as_str()).await)?
        } else {
            let spec = RunSpec {
                name: identity.as_str().to_string(),
                image: self.default_image.clone(),
                volume,
                host_port: host_port.to_string(),
            };
            run(self.runtime.run_detached(&spec).await)?
        };
        expect_success(out)?;
        tracing::info!(container = %identity, existed = exists, "container started");
        Ok(())
    }

    /// Stop is not no-op-safe: stopping an absent or already-stopped container
    /// surfaces the runtime's own error.
    pub async fn stop(&self, identity: &ContainerIdentity) -> Result<(), AgentError> {
        expect_success(run(self.runtime.stop(identity.as_str()).await)?)?;
        tracing::info!(container = %identity, "container stopped");
        Ok(())
    }

    pub async fn restart(&self, identity: &ContainerIdentity) -> Result<(), AgentError> {
        expect_success(run(self.runtime.restart(identity.as_str()).await)?)?;
        tracing::info!(container = %identity, "container restarted");
        Ok(())
    }

    /// The runtime's reported state string, trimmed and otherwise unmodified.
    pub async fn status(&self, identity: &ContainerIdentity) -> Result<String, AgentError> {
        let out = expect_success(run(self.runtime.status(identity.as_str()).await)?)?;
        Ok(out.output.trim().to_string())
    }
}

fn invoke_failed(e: std::io::Error) -> AgentError {
    AgentError::RuntimeCommand(format!("failed to invoke container runtime: {e}"))
}

fn run(res: std::io::Result<RuntimeOutput>) -> Result<RuntimeOutput, AgentError> {
    res.map_err(invoke_failed)
}

fn expect_success(out: RuntimeOutput) -> Result<RuntimeOutput, AgentError> {
    if !out.success {
        return Err(AgentError::RuntimeCommand(out.output));
    }
    Ok(out)
}

fn is_name_conflict(output: &str) -> bool {
    let lower = output.to_ascii_lowercase();
    lower.contains("already in use") || lower.contains("conflict")
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io;
    use std::sync::Mutex;

    use crate::docker::{CreateSpec, RunSpec};
    use quarry_core::ContainerState;
    use tokio::process::Child;

    #[derive(Debug, Clone, PartialEq, Eq)]
    enum Call {
        Create(String),
        Run(String, String),
        Start(String),
        Stop(String),
        Restart(String),
        Status(String),
        Exists(String),
    }

    struct FakeRuntime {
        calls: Mutex<Vec<Call>>,
        exists: bool,
        reply: RuntimeOutput,
    }

    impl FakeRuntime {
        fn new(exists: bool) -> Self {
            Self {
                calls: Mutex::new(Vec::new()),
                exists,
                reply: RuntimeOutput {
                    success: true,
                    output: String::new(),
                },
            }
        }

        fn replying(exists: bool, success: bool, output: &str) -> Self {
            Self {
                reply: RuntimeOutput {
                    success,
                    output: output.to_string(),
                },
                ..Self::new(exists)
            }
        }

        fn record(&self, call: Call) {
            self.calls.lock().unwrap().push(call);
        }

        fn calls(&self) -> Vec<Call> {
            self.calls.lock().unwrap().clone()
        }
    }

    impl ContainerRuntime for FakeRuntime {
        async fn create(&self, spec: &CreateSpec) -> io::Result<RuntimeOutput> {
            self.record(Call::Create(spec.name.clone()));
            Ok(self.reply.clone())
        }

        async fn run_detached(&self, spec: &RunSpec) -> io::Result<RuntimeOutput> {
            self.record(Call::Run(spec.name.clone(), spec.host_port.clone()));
            Ok(self.reply.clone())
        }

        async fn start(&self, name: &str) -> io::Result<RuntimeOutput> {
            self.record(Call::Start(name.to_string()));
            Ok(self.reply.clone())
        }

        async fn stop(&self, name: &str) -> io::Result<RuntimeOutput> {
            self.record(Call::Stop(name.to_string()));
            Ok(self.reply.clone())
        }

        async fn restart(&self, name: &str) -> io::Result<RuntimeOutput> {
            self.record(Call::Restart(name.to_string()));
            Ok(self.reply.clone())
        }

        async fn status(&self, name: &str) -> io::Result<RuntimeOutput> {
            self.record(Call::Status(name.to_string()));
            Ok(self.reply.clone())
        }

        async fn exists(&self, name: &str) -> io::Result<bool> {
            self.record(Call::Exists(name.to_string()));
            Ok(self.exists)
        }

        async fn exec(&self, _name: &str, _command: &str) -> io::Result<RuntimeOutput> {
            Ok(self.reply.clone())
        }

        fn follow_logs(&self, _name: &str) -> io::Result<Child> {
            Err(io::Error::other("not used in these tests"))
        }
    }

    fn test_config(data_root: &std::path::Path) -> AgentConfig {
        AgentConfig {
            listen_addr: "127.0.0.1:0".parse().unwrap(),
            auth_token: "secret".to_string(),
            data_root: data_root.to_path_buf(),
            default_image: "itzg/minecraft-server".to_string(),
            runtime_path: "docker".to_string(),
        }
    }

    fn identity() -> ContainerIdentity {
        ContainerIdentity::resolve("lobby", "alice@example.com")
    }

    #[tokio::test]
    async fn start_on_absent_container_runs_detached() {
        let root = tempfile::tempdir().unwrap();
        let lifecycle = Lifecycle::new(FakeRuntime::new(false), &test_config(root.path()));

        lifecycle.start(&identity(), "25566").await.unwrap();

        assert_eq!(
            lifecycle.runtime().calls(),
            vec![
                Call::Exists("lobby-alice".to_string()),
                Call::Run("lobby-alice".to_string(), "25566".to_string()),
            ]
        );
        // The volume must exist regardless of which path start took.
        assert!(root.path().join("lobby-alice").is_dir());
    }

    #[tokio::test]
    async fn start_on_existing_container_issues_plain_start() {
        let root = tempfile::tempdir().unwrap();
        let lifecycle = Lifecycle::new(FakeRuntime::new(true), &test_config(root.path()));

        lifecycle.start(&identity(), "25565").await.unwrap();

        assert_eq!(
            lifecycle.runtime().calls(),
            vec![
                Call::Exists("lobby-alice".to_string()),
                Call::Start("lobby-alice".to_string()),
            ]
        );
    }

    #[tokio::test]
    async fn create_twice_succeeds_on_name_conflict() {
        let root = tempfile::tempdir().unwrap();
        let opts = CreateOptions {
            software: "PAPER".to_string(),
            memory: None,
            storage: None,
        };

        let lifecycle = Lifecycle::new(FakeRuntime::new(false), &test_config(root.path()));
        lifecycle.create(&identity(), &opts).await.unwrap();

        let conflict = FakeRuntime::replying(
            true,
            false,
            "Error response from daemon: Conflict. The container name \"/lobby-alice\" is already in use",
        );
        let lifecycle = Lifecycle::new(conflict, &test_config(root.path()));
        lifecycle.create(&identity(), &opts).await.unwrap();
    }

    #[tokio::test]
    async fn create_surfaces_other_runtime_failures() {
        let root = tempfile::tempdir().unwrap();
        let fake = FakeRuntime::replying(false, false, "no space left on device");
        let lifecycle = Lifecycle::new(fake, &test_config(root.path()));

        let opts = CreateOptions {
            software: "VANILLA".to_string(),
            memory: Some("2g".to_string()),
            storage: None,
        };
        let err = lifecycle.create(&identity(), &opts).await.unwrap_err();
        assert!(matches!(err, AgentError::RuntimeCommand(msg) if msg.contains("no space left")));
    }

    #[tokio::test]
    async fn stop_on_absent_container_forwards_runtime_error() {
        let root = tempfile::tempdir().unwrap();
        let fake = FakeRuntime::replying(false, false, "Error: No such container: lobby-alice");
        let lifecycle = Lifecycle::new(fake, &test_config(root.path()));

        let err = lifecycle.stop(&identity()).await.unwrap_err();
        assert!(matches!(err, AgentError::RuntimeCommand(msg) if msg.contains("No such container")));
    }

    #[tokio::test]
    async fn status_trims_runtime_output() {
        let root = tempfile::tempdir().unwrap();
        let fake = FakeRuntime::replying(true, true, "running\n");
        let lifecycle = Lifecycle::new(fake, &test_config(root.path()));

        let state = lifecycle.status(&identity()).await.unwrap();
        assert_eq!(state, "running");
    }

    #[tokio::test]
    async fn start_converges_to_running_observable_via_status() {
        let root = tempfile::tempdir().unwrap();

        // Both start paths must end with status reporting a running state.
        for exists in [false, true] {
            let fake = FakeRuntime::replying(exists, true, "running\n");
            let lifecycle = Lifecycle::new(fake, &test_config(root.path()));

            lifecycle.start(&identity(), "25565").await.unwrap();
            let status = lifecycle.status(&identity()).await.unwrap();
            assert_eq!(
                ContainerState::from_runtime_status(&status),
                ContainerState::Running
            );
        }
    }

    #[tokio::test]
    async fn status_on_created_container_maps_to_created_state() {
        let root = tempfile::tempdir().unwrap();
        let fake = FakeRuntime::replying(true, true, "created\n");
        let lifecycle = Lifecycle::new(fake, &test_config(root.path()));

        let status = lifecycle.status(&identity()).await.unwrap();
        assert_eq!(
            ContainerState::from_runtime_status(&status),
            ContainerState::Created
        );
    }
}
