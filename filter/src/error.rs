use std::fmt;

use yanet_abi::AttrKind;
use yanet_arena::AllocError;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FilterBuildError {
    /// A filter's signature must name at least one attribute kind.
    EmptySignature,
    /// A rule attached an `AttrValue` variant that doesn't match the kind
    /// it was filed under (e.g. a `PortRange` value under `Net4Src`).
    KindMismatch(AttrKind),
    /// The arena ran out of room (or a single table exceeded its largest
    /// bucket) while building one of the filter's tables. The partially
    /// built structure is discarded; the caller's previous filter, if any,
    /// stays in effect.
    AllocFailed(AllocError),
}

impl fmt::Display for FilterBuildError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FilterBuildError::EmptySignature => write!(f, "filter signature must name at least one attribute kind"),
            FilterBuildError::KindMismatch(kind) => write!(f, "rule attribute value doesn't match its kind {kind}"),
            FilterBuildError::AllocFailed(err) => write!(f, "arena exhausted while building filter tables: {err}"),
        }
    }
}

impl std::error::Error for FilterBuildError {}

impl From<AllocError> for FilterBuildError {
    fn from(err: AllocError) -> Self {
        FilterBuildError::AllocFailed(err)
    }
}
