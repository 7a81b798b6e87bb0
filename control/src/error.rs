//! Control-plane error kinds (`spec.md` §7). Data-plane errors live next
//! to what raises them (`yanet_arena::AllocError`,
//! `yanet_filter::FilterBuildError`, `yanet_balancer::{SessionError,
//! PacketDrop}`); this crate only needs the kinds that can reject a
//! config update.

use core::fmt;

use yanet_arena::AllocError;
use yanet_filter::FilterBuildError;

#[derive(Debug)]
pub enum ConfigError {
    /// Arena exhausted while building the new config or one of its LPM
    /// tries.
    AllocFailed(AllocError),
    /// The new filter failed to compile.
    FilterBuildFailed(FilterBuildError),
    /// A WLC/real update referenced a real id not present in the config.
    RealNotFound(u32),
    /// A virtual service with this name is already registered.
    VsNameCollision(String),
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConfigError::AllocFailed(err) => write!(f, "arena exhausted while building config: {err}"),
            ConfigError::FilterBuildFailed(e) => write!(f, "filter build failed: {e}"),
            ConfigError::RealNotFound(id) => write!(f, "real {id} not found"),
            ConfigError::VsNameCollision(name) => write!(f, "virtual service name already exists: {name}"),
        }
    }
}

impl std::error::Error for ConfigError {}

impl From<FilterBuildError> for ConfigError {
    fn from(e: FilterBuildError) -> Self {
        match e {
            FilterBuildError::AllocFailed(alloc_err) => ConfigError::AllocFailed(alloc_err),
            other => ConfigError::FilterBuildFailed(other),
        }
    }
}

impl From<AllocError> for ConfigError {
    fn from(e: AllocError) -> Self {
        ConfigError::AllocFailed(e)
    }
}

pub type ConfigResult<T> = Result<T, ConfigError>;
