//! Control plane: builds and atomically publishes module configs
//! (`spec.md` §4.12).

pub mod control_plane;
pub mod diagnostics;
pub mod error;
pub mod module_config;

pub use control_plane::ControlPlane;
pub use diagnostics::Diagnostics;
pub use error::{ConfigError, ConfigResult};
pub use module_config::{free_module_config, ModuleConfig};
