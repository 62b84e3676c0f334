//! Adapter and notifier configuration.

use crate::types::DEFAULT_NAMESPACE;

/// Configuration for a [`DatabaseAdapter`](crate::DatabaseAdapter).
#[derive(Debug, Clone)]
pub struct AdapterConfig {
    /// Name of the database the adapter is connected to.
    ///
    /// Carried in every change notification so the notifier can resolve
    /// attachment aliases.
    pub db_name: String,

    /// Namespace assigned to unqualified table names.
    pub default_namespace: String,

    /// Whether a write that touches no recognizable table still publishes
    /// an (empty) notification.
    pub notify_empty_writes: bool,
}

impl Default for AdapterConfig {
    fn default() -> Self {
        Self {
            db_name: "main.db".to_string(),
            default_namespace: DEFAULT_NAMESPACE.to_string(),
            notify_empty_writes: false,
        }
    }
}

impl AdapterConfig {
    /// Creates a configuration for the named database.
    #[must_use]
    pub fn new(db_name: impl Into<String>) -> Self {
        Self {
            db_name: db_name.into(),
            ..Self::default()
        }
    }

    /// Sets the namespace for unqualified table names.
    #[must_use]
    pub fn default_namespace(mut self, namespace: impl Into<String>) -> Self {
        self.default_namespace = namespace.into();
        self
    }

    /// Sets whether writes with no recognizable tables publish anyway.
    #[must_use]
    pub const fn notify_empty_writes(mut self, value: bool) -> Self {
        self.notify_empty_writes = value;
        self
    }
}

/// Configuration for an [`EventNotifier`](crate::EventNotifier).
#[derive(Debug, Clone)]
pub struct NotifierConfig {
    /// Name of the database the notifier belongs to.
    ///
    /// Changes reported under this name are never re-namespaced.
    pub db_name: String,
}

impl Default for NotifierConfig {
    fn default() -> Self {
        Self {
            db_name: "main.db".to_string(),
        }
    }
}

impl NotifierConfig {
    /// Creates a configuration for the named database.
    #[must_use]
    pub fn new(db_name: impl Into<String>) -> Self {
        Self {
            db_name: db_name.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn adapter_config_builder() {
        let config = AdapterConfig::new("app.db")
            .default_namespace("aux")
            .notify_empty_writes(true);

        assert_eq!(config.db_name, "app.db");
        assert_eq!(config.default_namespace, "aux");
        assert!(config.notify_empty_writes);
    }

    #[test]
    fn adapter_config_defaults() {
        let config = AdapterConfig::default();
        assert_eq!(config.default_namespace, "main");
        assert!(!config.notify_empty_writes);
    }
}
