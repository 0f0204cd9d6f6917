use std::sync::Arc;

use sibyl_catalog::ActionCatalog;
use sibyl_domain::config::Config;

use crate::engine::Engine;
use crate::invocations::InvocationLog;

/// Shared application state handed to every frontend (REPL, future
/// transports). Everything is behind an `Arc`; cloning is cheap.
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<Config>,
    pub catalog: Arc<ActionCatalog>,
    pub engine: Arc<Engine>,
    /// Concrete log handle, kept alongside the engine's trait object so
    /// diagnostics can read status counts.
    pub invocations: Arc<InvocationLog>,
}
