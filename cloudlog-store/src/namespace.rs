//! Environment namespacing for object keys.
//!
//! Every object lives under a root folder named after the application
//! environment (`prod`, `staging`, ...), so several environments can share
//! one bucket without colliding:
//!
//! ```text
//! {environment}/{logical path}
//! ```

use std::env;

use crate::error::ConfigError;
use crate::store::ObjectKey;

/// Environment variable read by [`Namespace::from_env`].
pub const ENVIRONMENT_VAR: &str = "CLOUDLOG_ENVIRONMENT";

/// Application environment used to prefix object keys.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Namespace {
    environment: String,
}

impl Namespace {
    /// Creates a namespace for the given environment.
    ///
    /// # Panics
    ///
    /// Panics if `environment` is empty or contains a `/`.
    #[must_use]
    pub fn new(environment: impl Into<String>) -> Self {
        let environment = environment.into();
        assert!(!environment.is_empty(), "environment must not be empty");
        assert!(
            !environment.contains('/'),
            "environment must be a single path segment"
        );
        Self { environment }
    }

    /// Loads the namespace from `CLOUDLOG_ENVIRONMENT`.
    ///
    /// # Errors
    ///
    /// Returns an error if the variable is unset, empty or contains a `/`.
    pub fn from_env() -> Result<Self, ConfigError> {
        let environment =
            env::var(ENVIRONMENT_VAR).map_err(|_| ConfigError::MissingEnv(ENVIRONMENT_VAR))?;
        if environment.is_empty() || environment.contains('/') {
            return Err(ConfigError::Invalid(format!(
                "{ENVIRONMENT_VAR} must be a single non-empty path segment, got {environment:?}"
            )));
        }
        Ok(Self { environment })
    }

    /// Returns the environment name.
    #[must_use]
    pub fn environment(&self) -> &str {
        &self.environment
    }

    /// Returns the full key for a logical path.
    ///
    /// Leading slashes on `path` are ignored.
    #[must_use]
    pub fn key_for(&self, path: &str) -> ObjectKey {
        ObjectKey::new(format!(
            "{}/{}",
            self.environment,
            path.trim_start_matches('/')
        ))
    }

    /// Returns true if `key` lives under this namespace.
    #[must_use]
    pub fn contains(&self, key: &ObjectKey) -> bool {
        key.as_str()
            .strip_prefix(self.environment.as_str())
            .is_some_and(|rest| rest.len() > 1 && rest.starts_with('/'))
    }
}

impl std::fmt::Display for Namespace {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.environment)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_key_for_prefixes_environment() {
        let ns = Namespace::new("prod");
        assert_eq!(ns.key_for("logs/a.log").as_str(), "prod/logs/a.log");
        assert_eq!(ns.key_for("/logs/a.log").as_str(), "prod/logs/a.log");
    }

    #[test]
    fn test_contains() {
        let ns = Namespace::new("prod");
        assert!(ns.contains(&ObjectKey::new("prod/a.log")));
        assert!(!ns.contains(&ObjectKey::new("staging/a.log")));
        assert!(!ns.contains(&ObjectKey::new("production/a.log")));
        assert!(!ns.contains(&ObjectKey::new("prod/")));
        assert!(!ns.contains(&ObjectKey::new("prod")));
    }

    #[test]
    #[should_panic(expected = "environment must not be empty")]
    fn test_empty_environment_panics() {
        let _ = Namespace::new("");
    }
}
