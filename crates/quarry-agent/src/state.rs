use std::sync::Arc;

use crate::config::AgentConfig;
use crate::docker::CliRuntime;
use crate::lifecycle::Lifecycle;

#[derive(Clone)]
pub struct AppState {
    pub config: Arc<AgentConfig>,
    pub lifecycle: Arc<Lifecycle<CliRuntime>>,
}

impl AppState {
    pub fn new(config: AgentConfig) -> Self {
        let runtime = CliRuntime::new(config.runtime_path.clone());
        let lifecycle = Lifecycle::new(runtime, &config);
        Self {
            config: Arc::new(config),
            lifecycle: Arc::new(lifecycle),
        }
    }
}
