//! Core trait definitions

mod credentials;
mod progress;
mod runtime;

pub use credentials::CredentialProvider;
pub use progress::{NoopProgress, ProgressSink};
pub use runtime::{ScriptInvocation, ScriptOutput, ScriptRuntime};
