//! Input validation limits.

use std::sync::LazyLock;

use regex::Regex;

use crate::error::{CoreError, CoreResult};

pub const MAX_NAME_LEN: usize = 64;
pub const MIN_MEMORY_MB: u32 = 1;
pub const MAX_MEMORY_MB: u32 = 65_536;
pub const MAX_CPU: f64 = 64.0;
pub const MIN_INSTANCES: u32 = 1;
pub const MAX_INSTANCES: u32 = 100;

static NAME_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^[a-z0-9]([a-z0-9-]*[a-z0-9])?$").expect("static regex")
});

static DOMAIN_LABEL_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^[A-Za-z0-9]([A-Za-z0-9-]*[A-Za-z0-9])?$").expect("static regex")
});

/// Validate an app, database, VPC, or volume name.
///
/// `what` names the entity in the error message ("app", "database", ...).
pub fn validate_name(what: &str, name: &str) -> CoreResult<()> {
    if name.is_empty() {
        return Err(CoreError::Validation(format!("{what} name cannot be empty")));
    }
    if name.len() > MAX_NAME_LEN {
        return Err(CoreError::Validation(format!(
            "{what} name '{name}' is too long (max {MAX_NAME_LEN} characters)"
        )));
    }
    if !NAME_RE.is_match(name) {
        return Err(CoreError::Validation(format!(
            "invalid {what} name '{name}': use lowercase letters, digits, and hyphens, \
             starting and ending with a letter or digit"
        )));
    }
    Ok(())
}

pub fn validate_memory(mb: u32) -> CoreResult<()> {
    if !(MIN_MEMORY_MB..=MAX_MEMORY_MB).contains(&mb) {
        return Err(CoreError::Validation(format!(
            "memory must be between {MIN_MEMORY_MB} and {MAX_MEMORY_MB} MB, got {mb}"
        )));
    }
    Ok(())
}

/// CPU cores may be fractional but must lie in (0, 64].
pub fn validate_cpu(cores: f64) -> CoreResult<()> {
    if !cores.is_finite() || cores <= 0.0 || cores > MAX_CPU {
        return Err(CoreError::Validation(format!(
            "cpu must be greater than 0 and at most {MAX_CPU}, got {cores}"
        )));
    }
    Ok(())
}

pub fn validate_instances(n: u32) -> CoreResult<()> {
    if !(MIN_INSTANCES..=MAX_INSTANCES).contains(&n) {
        return Err(CoreError::Validation(format!(
            "instances must be between {MIN_INSTANCES} and {MAX_INSTANCES}, got {n}"
        )));
    }
    Ok(())
}

/// Health-check paths are absolute URL paths.
pub fn validate_health_path(path: &str) -> CoreResult<()> {
    if !path.is_empty() && !path.starts_with('/') {
        return Err(CoreError::Validation(format!(
            "health check path '{path}' must start with '/'"
        )));
    }
    Ok(())
}

/// A domain needs at least two dot-separated labels, none empty.
pub fn is_valid_domain(domain: &str) -> bool {
    if domain.is_empty() || domain.len() > 253 {
        return false;
    }
    let labels: Vec<&str> = domain.split('.').collect();
    labels.len() >= 2
        && labels
            .iter()
            .all(|l| !l.is_empty() && l.len() <= 63 && DOMAIN_LABEL_RE.is_match(l))
}

pub fn validate_domain(domain: &str) -> CoreResult<()> {
    if is_valid_domain(domain) {
        Ok(())
    } else {
        Err(CoreError::Validation(format!("invalid domain '{domain}'")))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn names() {
        assert!(validate_name("app", "web").is_ok());
        assert!(validate_name("app", "a").is_ok());
        assert!(validate_name("app", "my-api-2").is_ok());
        assert!(validate_name("app", "").is_err());
        assert!(validate_name("app", "-web").is_err());
        assert!(validate_name("app", "web-").is_err());
        assert!(validate_name("app", "Web").is_err());
        assert!(validate_name("app", "web_api").is_err());
        assert!(validate_name("app", &"a".repeat(64)).is_ok());
        assert!(validate_name("app", &"a".repeat(65)).is_err());
    }

    #[test]
    fn resource_limits() {
        assert!(validate_memory(0).is_err());
        assert!(validate_memory(65_536).is_ok());
        assert!(validate_memory(65_537).is_err());
        assert!(validate_cpu(0.0).is_err());
        assert!(validate_cpu(0.25).is_ok());
        assert!(validate_cpu(64.0).is_ok());
        assert!(validate_cpu(64.5).is_err());
        assert!(validate_cpu(f64::NAN).is_err());
        assert!(validate_instances(0).is_err());
        assert!(validate_instances(100).is_ok());
        assert!(validate_instances(101).is_err());
    }

    #[test]
    fn domains() {
        assert!(is_valid_domain("example.com"));
        assert!(is_valid_domain("web.nap.example.com"));
        assert!(!is_valid_domain("localhost"));
        assert!(!is_valid_domain("example..com"));
        assert!(!is_valid_domain(".example.com"));
        assert!(!is_valid_domain("exa mple.com"));
    }

    #[test]
    fn health_paths() {
        assert!(validate_health_path("/health").is_ok());
        assert!(validate_health_path("").is_ok());
        assert!(validate_health_path("health").is_err());
    }
}
