//! Externally supplied rules
//!
//! A plugin contributes rule descriptors: a name plus a constructor with the same shape as a
//! built-in rule's. Loaders turn configured plugin locations into descriptors.

use crate::domain::violations::{LintError, LintResult};
use crate::rules::{Rule, RuleConstructor, RuleParameters};
use std::collections::HashMap;
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;

/// A rule contributed by a plugin
#[derive(Clone)]
pub struct PluginDescriptor {
    pub rule_name: String,
    pub description: Option<String>,
    pub constructor: RuleConstructor,
}

impl PluginDescriptor {
    pub fn new<F>(rule_name: impl Into<String>, constructor: F) -> Self
    where
        F: Fn(&RuleParameters) -> LintResult<Box<dyn Rule>> + Send + Sync + 'static,
    {
        Self {
            rule_name: rule_name.into(),
            description: None,
            constructor: Arc::new(constructor),
        }
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }
}

impl fmt::Debug for PluginDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PluginDescriptor")
            .field("rule_name", &self.rule_name)
            .field("description", &self.description)
            .finish_non_exhaustive()
    }
}

/// Resolves a plugin location into the rules it provides
pub trait PluginLoader: Send + Sync {
    fn load(&self, location: &Path) -> LintResult<Vec<PluginDescriptor>>;
}

/// Loader over plugins registered in-process by library users
#[derive(Debug, Default, Clone)]
pub struct StaticPluginLoader {
    plugins: HashMap<PathBuf, Vec<PluginDescriptor>>,
}

impl StaticPluginLoader {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make `descriptors` available under `location`
    pub fn register(mut self, location: impl Into<PathBuf>, descriptors: Vec<PluginDescriptor>) -> Self {
        self.plugins.entry(location.into()).or_default().extend(descriptors);
        self
    }
}

impl PluginLoader for StaticPluginLoader {
    fn load(&self, location: &Path) -> LintResult<Vec<PluginDescriptor>> {
        self.plugins.get(location).cloned().ok_or_else(|| {
            LintError::plugin(format!("no plugin registered at '{}'", location.display()))
        })
    }
}

/// Loader for builds without plugin support: every location is an error
#[derive(Debug, Default, Clone, Copy)]
pub struct UnsupportedPluginLoader;

impl PluginLoader for UnsupportedPluginLoader {
    fn load(&self, location: &Path) -> LintResult<Vec<PluginDescriptor>> {
        Err(LintError::plugin(format!(
            "cannot load plugin '{}': this build does not load native plugins",
            location.display()
        )))
    }
}

/// Load every location in order, stopping at the first failure
pub fn load_all(loader: &dyn PluginLoader, locations: &[PathBuf]) -> LintResult<Vec<PluginDescriptor>> {
    let mut descriptors = Vec::new();
    for location in locations {
        let loaded = loader.load(location)?;
        tracing::debug!(
            "Loaded {} rule(s) from plugin '{}'",
            loaded.len(),
            location.display()
        );
        descriptors.extend(loaded);
    }
    Ok(descriptors)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rules::prohibit::PrintStatement;

    fn descriptor(name: &str) -> PluginDescriptor {
        PluginDescriptor::new(name, |_: &RuleParameters| Ok(Box::new(PrintStatement::new()) as Box<dyn Rule>))
    }

    #[test]
    fn test_static_loader_returns_registered_rules() {
        let loader = StaticPluginLoader::new()
            .register("plugins/house.dll", vec![descriptor("house-style")])
            .register("plugins/house.dll", vec![descriptor("house-naming")]);

        let loaded = loader.load(Path::new("plugins/house.dll")).unwrap();
        let names: Vec<_> = loaded.iter().map(|d| d.rule_name.as_str()).collect();
        assert_eq!(names, vec!["house-style", "house-naming"]);

        let err = loader.load(Path::new("plugins/missing.dll")).unwrap_err();
        assert!(matches!(err, LintError::Plugin { .. }));
    }

    #[test]
    fn test_unsupported_loader_rejects_every_location() {
        let err = UnsupportedPluginLoader.load(Path::new("x.so")).unwrap_err();
        assert!(err.is_fatal());
        assert!(err.to_string().contains("x.so"));
    }

    #[test]
    fn test_load_all_keeps_location_order() {
        let loader = StaticPluginLoader::new()
            .register("b", vec![descriptor("rule-b")])
            .register("a", vec![descriptor("rule-a")]);

        let loaded = load_all(&loader, &[PathBuf::from("b"), PathBuf::from("a")]).unwrap();
        let names: Vec<_> = loaded.iter().map(|d| d.rule_name.clone()).collect();
        assert_eq!(names, vec!["rule-b", "rule-a"]);

        assert!(load_all(&UnsupportedPluginLoader, &[PathBuf::from("a")]).is_err());
        assert!(load_all(&UnsupportedPluginLoader, &[]).unwrap().is_empty());
    }
}
