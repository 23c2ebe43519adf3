//! Rewind Core - Core types for release rollback
//!
//! This crate provides the foundational types used throughout rewind:
//! - `Release`: One versioned deployment with its status state machine
//! - `ChartRef`: Which chart a release was rendered from
//! - `Values`: Rendered configuration values
//! - `Hook`: Lifecycle hooks bound to a release
//! - `validate_release_name`: Release identifier rules

pub mod error;
pub mod hook;
pub mod name;
pub mod release;
pub mod values;

pub use error::{CoreError, Result};
pub use hook::{Hook, HookCleanupPolicy, HookPhase};
pub use name::{MAX_RELEASE_NAME_LEN, validate_release_name};
pub use release::{ChartRef, Release, ReleaseStatus};
pub use values::Values;
