//! Runtime components for process supervision and orchestration

pub mod dependency;
pub mod orchestrator;
pub mod output;
pub mod process;
pub mod readiness;
pub mod shutdown;
pub mod tree;

pub use dependency::*;
pub use orchestrator::*;
pub use process::*;
pub use readiness::{Endpoint, ReadinessMatcher, Verdict};
pub use shutdown::{ShutdownCoordinator, ShutdownError};
