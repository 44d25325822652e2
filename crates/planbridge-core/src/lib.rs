//! Pure building blocks for publishing local test outcomes to a remote
//! test-plan service.
//!
//! Nothing in this crate performs network I/O. The runtime crate wires these
//! helpers to the remote API and the host runner's lifecycle hooks.

pub mod attachment_policy;
pub mod case_ids;
pub mod identity;
pub mod outcome;
pub mod pagination;
pub mod test_points;
pub mod test_result;
pub mod text;

mod error;

pub use error::CoreError;
