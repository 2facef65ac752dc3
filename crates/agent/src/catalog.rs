//! Name → factory lookup for abilities referenced from configuration.

use std::collections::BTreeMap;
use std::sync::Arc;

use stepwise_core::error::{Error, Result};

use crate::ability::{Ability, ReasoningAbility};

pub type AbilityFactory = Arc<dyn Fn() -> Arc<dyn Ability> + Send + Sync>;

/// Explicit ability registry, passed to agents that resolve abilities
/// by name. Every lookup builds a fresh instance.
#[derive(Clone)]
pub struct AbilityCatalog {
    factories: BTreeMap<String, AbilityFactory>,
}

impl AbilityCatalog {
    /// An empty catalogue.
    pub fn new() -> Self {
        Self {
            factories: BTreeMap::new(),
        }
    }

    /// The catalogue with the built-in `reasoning` (forced) and
    /// `reasoning_optional` entries.
    pub fn with_defaults() -> Self {
        let mut catalog = Self::new();
        catalog.factories.insert(
            "reasoning".into(),
            Arc::new(|| Arc::new(ReasoningAbility::new(true)) as Arc<dyn Ability>),
        );
        catalog.factories.insert(
            "reasoning_optional".into(),
            Arc::new(|| Arc::new(ReasoningAbility::new(false)) as Arc<dyn Ability>),
        );
        catalog
    }

    pub fn register<F>(&mut self, name: impl Into<String>, factory: F) -> Result<()>
    where
        F: Fn() -> Arc<dyn Ability> + Send + Sync + 'static,
    {
        let name = name.into();
        if self.factories.contains_key(&name) {
            return Err(Error::config(format!(
                "Ability with name '{name}' has already been registered"
            )));
        }
        self.factories.insert(name, Arc::new(factory));
        Ok(())
    }

    pub fn lookup(&self, name: &str) -> Result<Arc<dyn Ability>> {
        self.factories
            .get(name)
            .map(|factory| factory())
            .ok_or_else(|| Error::config(format!("Ability with name '{name}' has not been registered")))
    }

    /// Resolve a list of names, failing on the first unknown one.
    pub fn resolve(&self, names: &[String]) -> Result<Vec<Arc<dyn Ability>>> {
        names.iter().map(|name| self.lookup(name)).collect()
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.factories.keys().map(String::as_str)
    }
}

impl Default for AbilityCatalog {
    fn default() -> Self {
        Self::with_defaults()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ability::DynamicAbility;
    use crate::ability::reasoning::REASONING_NAME;

    #[test]
    fn defaults_are_present() {
        let catalog = AbilityCatalog::default();
        let names: Vec<_> = catalog.names().collect();
        assert_eq!(names, vec!["reasoning", "reasoning_optional"]);
        assert_eq!(catalog.lookup("reasoning").unwrap().name(), REASONING_NAME);
    }

    #[test]
    fn duplicate_registration_rejected() {
        let mut catalog = AbilityCatalog::with_defaults();
        let err = catalog
            .register("reasoning", || {
                Arc::new(DynamicAbility::new("x", "x", serde_json::json!({}))) as Arc<dyn Ability>
            })
            .unwrap_err();
        assert!(matches!(err, Error::Config { .. }));
    }

    #[test]
    fn unknown_name_is_config_error() {
        let catalog = AbilityCatalog::new();
        assert!(catalog.resolve(&["reasoning".to_string()]).is_err());
    }

    #[test]
    fn custom_factory_resolves() {
        let mut catalog = AbilityCatalog::new();
        catalog
            .register("ping", || {
                Arc::new(DynamicAbility::new("ping", "pong", serde_json::json!({}))) as Arc<dyn Ability>
            })
            .unwrap();
        let abilities = catalog.resolve(&["ping".to_string()]).unwrap();
        assert_eq!(abilities[0].description(), "pong");
    }
}
