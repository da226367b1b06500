use crate::error::ConfigError;
use crate::memory::store::write_atomic;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::{Arc, RwLock};

/// How to check one monitored service.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServiceDefinition {
    pub name: String,
    pub check_command: String,
    /// Substring expected in healthy check output
    pub running_indicator: String,
    /// Free-form category label (web_server, database, ...)
    #[serde(rename = "type", default = "default_service_type")]
    pub kind: String,
}

fn default_service_type() -> String {
    "custom".into()
}

impl ServiceDefinition {
    pub fn new(
        name: impl Into<String>,
        check_command: impl Into<String>,
        running_indicator: impl Into<String>,
        kind: impl Into<String>,
    ) -> Self {
        Self {
            name: name.into(),
            check_command: check_command.into(),
            running_indicator: running_indicator.into(),
            kind: kind.into(),
        }
    }

    /// Whether `output` of the check command indicates a healthy service.
    pub fn is_running(&self, output: &str) -> bool {
        output.contains(&self.running_indicator)
    }
}

pub fn default_services() -> Vec<ServiceDefinition> {
    vec![
        ServiceDefinition::new("nginx", "service nginx status", "is running", "web_server"),
        ServiceDefinition::new(
            "postgresql",
            "service postgresql status",
            "online",
            "database",
        ),
        ServiceDefinition::new("ssh", "service ssh status", "is running", "system"),
    ]
}

/// Registry shared between the engine and the operator surfaces.
pub type SharedRegistry = Arc<RwLock<ServiceRegistry>>;

/// Ordered service registry. Registry order is monitoring order.
#[derive(Debug, Clone)]
pub struct ServiceRegistry {
    path: Option<PathBuf>,
    services: Vec<ServiceDefinition>,
}

impl ServiceRegistry {
    /// In-memory registry, never persisted.
    pub fn from_services(services: Vec<ServiceDefinition>) -> Self {
        Self {
            path: None,
            services,
        }
    }

    /// Load from `path`, falling back to the defaults when the file is
    /// missing or unreadable.
    pub fn load(path: &Path) -> Self {
        let services = match fs::read_to_string(path) {
            Ok(raw) => match serde_json::from_str(&raw) {
                Ok(services) => services,
                Err(e) => {
                    tracing::warn!(
                        path = %path.display(),
                        "service registry unreadable, using defaults: {e}"
                    );
                    default_services()
                }
            },
            Err(_) => default_services(),
        };

        Self {
            path: Some(path.to_path_buf()),
            services,
        }
    }

    pub fn into_shared(self) -> SharedRegistry {
        Arc::new(RwLock::new(self))
    }

    pub fn services(&self) -> &[ServiceDefinition] {
        &self.services
    }

    pub fn names(&self) -> Vec<String> {
        self.services.iter().map(|s| s.name.clone()).collect()
    }

    pub fn get(&self, name: &str) -> Option<&ServiceDefinition> {
        self.services.iter().find(|s| s.name == name)
    }

    pub fn len(&self) -> usize {
        self.services.len()
    }

    pub fn is_empty(&self) -> bool {
        self.services.is_empty()
    }

    /// Add a service, replacing an existing one in place, then persist.
    pub fn upsert(&mut self, service: ServiceDefinition) -> Result<(), ConfigError> {
        if service.name.trim().is_empty() {
            return Err(ConfigError::Validation(
                "service name must not be empty".into(),
            ));
        }
        if service.check_command.trim().is_empty() {
            return Err(ConfigError::Validation(format!(
                "service '{}' needs a check command",
                service.name
            )));
        }

        match self.services.iter_mut().find(|s| s.name == service.name) {
            Some(existing) => *existing = service,
            None => self.services.push(service),
        }
        self.save()
    }

    /// Remove a service by name, then persist.
    pub fn remove(&mut self, name: &str) -> Result<ServiceDefinition, ConfigError> {
        let index = self
            .services
            .iter()
            .position(|s| s.name == name)
            .ok_or_else(|| ConfigError::UnknownService(name.to_string()))?;
        let removed = self.services.remove(index);
        self.save()?;
        Ok(removed)
    }

    pub fn save(&self) -> Result<(), ConfigError> {
        let Some(path) = &self.path else {
            return Ok(());
        };
        let serialized = serde_json::to_string_pretty(&self.services)
            .map_err(|e| ConfigError::Validation(e.to_string()))?;
        write_atomic(path, &serialized)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn missing_file_loads_defaults_in_order() {
        let tmp = TempDir::new().unwrap();
        let registry = ServiceRegistry::load(&tmp.path().join("services.json"));
        assert_eq!(registry.names(), vec!["nginx", "postgresql", "ssh"]);
        assert_eq!(registry.get("postgresql").unwrap().running_indicator, "online");
    }

    #[test]
    fn unreadable_file_loads_defaults() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("services.json");
        fs::write(&path, "not json").unwrap();
        assert_eq!(ServiceRegistry::load(&path).len(), 3);
    }

    #[test]
    fn upsert_appends_and_persists() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("services.json");
        let mut registry = ServiceRegistry::load(&path);
        registry
            .upsert(ServiceDefinition::new(
                "redis",
                "redis-cli ping",
                "PONG",
                "cache",
            ))
            .unwrap();

        let reloaded = ServiceRegistry::load(&path);
        assert_eq!(reloaded.names(), vec!["nginx", "postgresql", "ssh", "redis"]);
        assert_eq!(reloaded.get("redis").unwrap().kind, "cache");
    }

    #[test]
    fn upsert_replaces_in_place() {
        let mut registry = ServiceRegistry::from_services(default_services());
        registry
            .upsert(ServiceDefinition::new(
                "nginx",
                "pgrep nginx",
                "nginx",
                "web_server",
            ))
            .unwrap();
        assert_eq!(registry.names(), vec!["nginx", "postgresql", "ssh"]);
        assert_eq!(registry.get("nginx").unwrap().check_command, "pgrep nginx");
    }

    #[test]
    fn upsert_rejects_blank_fields() {
        let mut registry = ServiceRegistry::from_services(Vec::new());
        assert!(
            registry
                .upsert(ServiceDefinition::new(" ", "x", "y", "z"))
                .is_err()
        );
        assert!(
            registry
                .upsert(ServiceDefinition::new("a", "", "y", "z"))
                .is_err()
        );
    }

    #[test]
    fn remove_unknown_service_fails() {
        let mut registry = ServiceRegistry::from_services(default_services());
        let err = registry.remove("redis").unwrap_err();
        assert!(matches!(err, ConfigError::UnknownService(name) if name == "redis"));
        assert_eq!(registry.remove("ssh").unwrap().name, "ssh");
        assert_eq!(registry.len(), 2);
    }

    #[test]
    fn type_field_uses_wire_name() {
        let json = serde_json::to_value(ServiceDefinition::new("a", "b", "c", "system")).unwrap();
        assert_eq!(json["type"], "system");
        let parsed: ServiceDefinition = serde_json::from_str(
            r#"{"name":"x","check_command":"y","running_indicator":"z"}"#,
        )
        .unwrap();
        assert_eq!(parsed.kind, "custom");
    }

    #[test]
    fn running_indicator_is_a_substring_match() {
        let svc = ServiceDefinition::new("nginx", "service nginx status", "is running", "web");
        assert!(svc.is_running(" * nginx is running\n"));
        assert!(!svc.is_running(" * nginx is not running"));
    }
}
