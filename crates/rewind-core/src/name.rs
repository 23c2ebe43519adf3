//! Release name validation
//!
//! Release names end up in resource names and labels, so they follow the
//! DNS-1123 subdomain rules with a tighter length cap that leaves room for
//! suffixes added by controllers (e.g. `<release>-<hash>-<pod>`).

use std::sync::LazyLock;

use regex::Regex;

use crate::error::{CoreError, Result};

/// Maximum length of a release name
pub const MAX_RELEASE_NAME_LEN: usize = 53;

static RELEASE_NAME: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^[a-z0-9]([-a-z0-9]*[a-z0-9])?(\.[a-z0-9]([-a-z0-9]*[a-z0-9])?)*$")
        .expect("release name pattern is valid")
});

/// Validate a release name
pub fn validate_release_name(name: &str) -> Result<()> {
    if name.is_empty() {
        return Err(invalid(name, "name is empty"));
    }

    if name.len() > MAX_RELEASE_NAME_LEN {
        return Err(invalid(
            name,
            &format!("name exceeds {} characters", MAX_RELEASE_NAME_LEN),
        ));
    }

    if !RELEASE_NAME.is_match(name) {
        return Err(invalid(
            name,
            "must consist of lower case alphanumeric characters, '-' or '.', and start and end with an alphanumeric character",
        ));
    }

    Ok(())
}

fn invalid(name: &str, reason: &str) -> CoreError {
    CoreError::InvalidReleaseName {
        name: name.to_string(),
        reason: reason.to_string(),
    }
}
