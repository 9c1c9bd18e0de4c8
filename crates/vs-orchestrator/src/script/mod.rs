//! Script execution
//!
//! Everything that talks to the external automation toolkit lives here. The
//! rest of the orchestrator only sees [`ScriptSessionPool`].

mod live;
mod pool;
mod registry;
mod session;
mod simulated;

pub use live::{LiveRuntime, SESSION_ENV_VAR};
pub use pool::{PoolStats, ScriptSessionPool};
pub use registry::ScriptRegistry;
pub use session::{ScriptSession, SessionFactory};
pub use simulated::{SimulatedRuntime, SIMULATED_VERSION};
