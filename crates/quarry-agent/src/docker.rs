//! Container runtime client. Everything the agent asks of the runtime goes
//! through a single narrow trait so the orchestrator never touches process
//! plumbing directly and tests can substitute a fake.

use std::io;
use std::path::{Path, PathBuf};
use std::process::Stdio;

use tokio::process::{Child, Command};

use crate::config::GAME_PORT;

/// Exit status plus the combined stdout/stderr of one runtime invocation.
#[derive(Debug, Clone)]
pub struct RuntimeOutput {
    pub success: bool,
    pub output: String,
}

impl RuntimeOutput {
    fn from_process(out: std::process::Output) -> Self {
        let mut text = String::from_utf8_lossy(&out.stdout).into_owned();
        text.push_str(&String::from_utf8_lossy(&out.stderr));
        Self {
            success: out.status.success(),
            output: text,
        }
    }
}

/// Options for `create`: define the container without starting it.
#[derive(Debug, Clone)]
pub struct CreateSpec {
    pub name: String,
    pub image: String,
    pub volume: PathBuf,
    /// Image variant, passed to the image as its TYPE selector.
    pub software: String,
    /// Opaque memory limit, forwarded to the runtime unvalidated.
    pub memory: Option<String>,
    /// Opaque storage limit, forwarded to the runtime unvalidated.
    pub storage: Option<String>,
}

/// Options for `run_detached`: create and start in one step with port and
/// volume bindings (the self-provisioning path of `start`).
#[derive(Debug, Clone)]
pub struct RunSpec {
    pub name: String,
    pub image: String,
    pub volume: PathBuf,
    /// Host port bound to the fixed in-container game port.
    pub host_port: String,
}

#[allow(async_fn_in_trait)]
pub trait ContainerRuntime {
    async fn create(&self, spec: &CreateSpec) -> io::Result<RuntimeOutput>;
    async fn run_detached(&self, spec: &RunSpec) -> io::Result<RuntimeOutput>;
    async fn start(&self, name: &str) -> io::Result<RuntimeOutput>;
    async fn stop(&self, name: &str) -> io::Result<RuntimeOutput>;
    async fn restart(&self, name: &str) -> io::Result<RuntimeOutput>;
    async fn status(&self, name: &str) -> io::Result<RuntimeOutput>;
    /// Whether a container definition (running or not) exists for `name`.
    async fn exists(&self, name: &str) -> io::Result<bool>;
    /// One-shot in-container command, blocking until it finishes.
    async fn exec(&self, name: &str, command: &str) -> io::Result<RuntimeOutput>;
    /// Spawn a log-follow subprocess with piped stdout/stderr. The caller owns
    /// the child and must kill it on teardown.
    fn follow_logs(&self, name: &str) -> io::Result<Child>;
}

/// Lines of backlog sent when a console session attaches.
const FOLLOW_TAIL_LINES: &str = "100";

/// CLI-backed runtime. Works for any engine with a docker-compatible CLI.
#[derive(Debug, Clone)]
pub struct CliRuntime {
    runtime_path: String,
}

impl CliRuntime {
    pub fn new(runtime_path: impl Into<String>) -> Self {
        Self {
            runtime_path: runtime_path.into(),
        }
    }

    async fn run(&self, args: &[&str]) -> io::Result<RuntimeOutput> {
        tracing::debug!(runtime = %self.runtime_path, ?args, "invoking container runtime");
        let out = Command::new(&self.runtime_path)
            .args(args)
            .stdin(Stdio::null())
            .output()
            .await?;
        Ok(RuntimeOutput::from_process(out))
    }
}

fn volume_binding(volume: &Path) -> String {
    format!("{}:/data", volume.display())
}

/// Anchored name filter for `ps`. A plain name filter substring-matches, and
/// the value is a regex, so the dots identities may contain must be escaped
/// or they match any character.
fn exists_filter(name: &str) -> String {
    format!("name=^{}$", name.replace('.', "\\."))
}

impl ContainerRuntime for CliRuntime {
    async fn create(&self, spec: &CreateSpec) -> io::Result<RuntimeOutput> {
        let volume = volume_binding(&spec.volume);
        let software = format!("TYPE={}", spec.software);
        let mut args = vec![
            "create",
            "--name",
            spec.name.as_str(),
            "-v",
            volume.as_str(),
            "-e",
            "EULA=TRUE",
            "-e",
            software.as_str(),
        ];
        if let Some(memory) = &spec.memory {
            args.extend(["-m", memory.as_str()]);
        }
        let storage_opt = spec.storage.as_ref().map(|s| format!("size={s}"));
        if let Some(opt) = &storage_opt {
            args.extend(["--storage-opt", opt.as_str()]);
        }
        args.push(spec.image.as_str());
        self.run(&args).await
    }

    async fn run_detached(&self, spec: &RunSpec) -> io::Result<RuntimeOutput> {
        let volume = volume_binding(&spec.volume);
        let ports = format!("{}:{GAME_PORT}", spec.host_port);
        self.run(&[
            "run",
            "-d",
            "--name",
            spec.name.as_str(),
            "-p",
            ports.as_str(),
            "-v",
            volume.as_str(),
            "-e",
            "EULA=TRUE",
            spec.image.as_str(),
        ])
        .await
    }

    async fn start(&self, name: &str) -> io::Result<RuntimeOutput> {
        self.run(&["start", name]).await
    }

    async fn stop(&self, name: &str) -> io::Result<RuntimeOutput> {
        self.run(&["stop", name]).await
    }

    async fn restart(&self, name: &str) -> io::Result<RuntimeOutput> {
        self.run(&["restart", name]).await
    }

    async fn status(&self, name: &str) -> io::Result<RuntimeOutput> {
        self.run(&["inspect", "-f", "{{.State.Status}}", name]).await
    }

    async fn exists(&self, name: &str) -> io::Result<bool> {
        let filter = exists_filter(name);
        let out = self.run(&["ps", "-a", "-q", "-f", &filter]).await?;
        Ok(out.success && !out.output.trim().is_empty())
    }

    async fn exec(&self, name: &str, command: &str) -> io::Result<RuntimeOutput> {
        let mut args = vec!["exec", name, "rcon-cli"];
        args.extend(command.split_whitespace());
        self.run(&args).await
    }

    fn follow_logs(&self, name: &str) -> io::Result<Child> {
        // kill_on_drop backstops the explicit kill on session teardown.
        Command::new(&self.runtime_path)
            .args(["logs", "-f", "--tail", FOLLOW_TAIL_LINES, name])
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn exists_filter_is_anchored() {
        assert_eq!(exists_filter("lobby-alice"), "name=^lobby-alice$");
    }

    #[test]
    fn exists_filter_escapes_dots() {
        // Unescaped, `sky.block-alice` would also match `skyxblock-alice`.
        assert_eq!(
            exists_filter("sky.block-alice"),
            "name=^sky\\.block-alice$"
        );
    }
}
