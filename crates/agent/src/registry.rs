//! The set of tools and abilities one run works with.

use std::collections::HashSet;
use std::sync::Arc;

use stepwise_core::error::{Error, Result};
use stepwise_core::tool::Tool;
use tracing::debug;

use crate::ability::{Ability, FinalAnswerAbility, ToolAdapter};

/// Tools (adapted into abilities) and abilities, with the final answer
/// always registered last.
pub struct AbilitiesRegistry {
    tools: Vec<Arc<dyn Ability>>,
    abilities: Vec<Arc<dyn Ability>>,
    final_answer: Arc<FinalAnswerAbility>,
}

impl AbilitiesRegistry {
    pub fn new(
        tools: &[Arc<dyn Tool>],
        abilities: &[Arc<dyn Ability>],
        final_answer: Arc<FinalAnswerAbility>,
    ) -> Result<Self> {
        let mut registry = Self {
            tools: Vec::new(),
            abilities: Vec::new(),
            final_answer,
        };
        registry.update(tools, abilities)?;
        Ok(registry)
    }

    /// Replace everything but the final answer.
    ///
    /// On error the previous contents are kept.
    pub fn update(&mut self, tools: &[Arc<dyn Tool>], abilities: &[Arc<dyn Ability>]) -> Result<()> {
        let tools: Vec<Arc<dyn Ability>> = tools
            .iter()
            .map(|tool| Arc::new(ToolAdapter::new(Arc::clone(tool))) as Arc<dyn Ability>)
            .collect();

        let mut all_abilities = abilities.to_vec();
        all_abilities.push(Arc::clone(&self.final_answer) as Arc<dyn Ability>);

        let mut known = HashSet::new();
        for entry in tools.iter().chain(&all_abilities) {
            if !known.insert(entry.name()) {
                return Err(Error::config(format!(
                    "Duplicate tool or ability name '{}'",
                    entry.name()
                )));
            }
        }

        for ability in &all_abilities {
            ability.verify(&known)?;
        }

        debug!(
            tools = tools.len(),
            abilities = all_abilities.len(),
            "Abilities registry rebuilt"
        );
        self.tools = tools;
        self.abilities = all_abilities;
        Ok(())
    }

    pub fn tools(&self) -> &[Arc<dyn Ability>] {
        &self.tools
    }

    /// Abilities in registration order; the final answer is last.
    pub fn abilities(&self) -> &[Arc<dyn Ability>] {
        &self.abilities
    }

    pub fn final_answer(&self) -> &Arc<FinalAnswerAbility> {
        &self.final_answer
    }

    pub fn get(&self, name: &str) -> Option<&Arc<dyn Ability>> {
        self.tools
            .iter()
            .chain(&self.abilities)
            .find(|entry| entry.name() == name)
    }
}
