//! Standard exit codes for CLI operations
//!
//! These exit codes follow Unix conventions and sysexits.h where applicable.

/// General error - unspecified failure
pub const ERROR: i32 = 1;

/// Validation error - invalid release name or revision
pub const VALIDATION_ERROR: i32 = 2;

/// The release or the requested revision does not exist
pub const NOT_FOUND: i32 = 3;

/// The cluster could not be reached or lacks a required capability
pub const CLUSTER_ERROR: i32 = 4;

/// IO error - store directory not readable or writable
pub const IO_ERROR: i32 = 5;

/// The rollback started but did not complete; release statuses were recorded
pub const ROLLBACK_FAILED: i32 = 6;
