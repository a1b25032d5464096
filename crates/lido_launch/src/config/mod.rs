//! Launch profile, substitution and deployment descriptor handling

pub mod descriptor;
mod profile;
mod substitution;

pub use descriptor::{AppInfo, DeploymentDescriptor, DescriptorError};
pub use profile::*;
pub use substitution::*;
