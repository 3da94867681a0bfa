//! Agent registry
//!
//! Holds the validated agent tree. The tree is built from a flat list of
//! definitions whose `children` name other definitions; `new` rejects any
//! graph the orchestrator could not route safely.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use super::definition::AgentDefinition;
use crate::core::{OrchestratorError, OrchestratorResult};
use crate::llm::TransferTarget;
use crate::session::has_reserved_prefix;
use crate::tools::ToolRegistry;

/// Validated, immutable agent tree
#[derive(Debug, Clone)]
pub struct AgentRegistry {
    root: String,
    agents: HashMap<String, Arc<AgentDefinition>>,
    parents: HashMap<String, String>,
    /// Definition order, for stable listings
    order: Vec<String>,
}

impl AgentRegistry {
    /// Build and validate the tree rooted at `root`
    pub fn new(root: impl Into<String>, definitions: Vec<AgentDefinition>) -> OrchestratorResult<Self> {
        let root = root.into();
        let mut agents = HashMap::new();
        let mut order = Vec::new();

        for def in definitions {
            if def.name.trim().is_empty() {
                return Err(OrchestratorError::config("Agent name must not be empty"));
            }
            validate_output_key(&def)?;
            if agents.contains_key(&def.name) {
                return Err(OrchestratorError::config(format!(
                    "Duplicate agent name: '{}'",
                    def.name
                )));
            }
            order.push(def.name.clone());
            agents.insert(def.name.clone(), Arc::new(def));
        }

        if !agents.contains_key(&root) {
            return Err(OrchestratorError::config(format!(
                "Root agent '{}' is not defined",
                root
            )));
        }

        let mut parents: HashMap<String, String> = HashMap::new();
        for name in &order {
            let def = &agents[name];
            let mut siblings = HashSet::new();
            for child in &def.children {
                if !agents.contains_key(child) {
                    return Err(OrchestratorError::config(format!(
                        "Agent '{}' declares unknown child '{}'",
                        name, child
                    )));
                }
                if !siblings.insert(child.as_str()) {
                    return Err(OrchestratorError::config(format!(
                        "Agent '{}' lists child '{}' more than once",
                        name, child
                    )));
                }
                if child == &root || child == name {
                    return Err(OrchestratorError::config(format!(
                        "Delegation cycle: '{}' cannot be a child of '{}'",
                        child, name
                    )));
                }
                if let Some(existing) = parents.insert(child.clone(), name.clone()) {
                    return Err(OrchestratorError::config(format!(
                        "Agent '{}' has two parents: '{}' and '{}'",
                        child, existing, name
                    )));
                }
            }
        }

        let registry = Self {
            root,
            agents,
            parents,
            order,
        };

        registry.check_acyclic()?;
        registry.check_descriptions()?;

        for name in &registry.order {
            if !registry.is_reachable(name) {
                tracing::warn!("[AgentRegistry] Agent '{}' is not reachable from the root", name);
            }
        }

        tracing::info!(
            "[AgentRegistry] Loaded {} agent(s), root '{}'",
            registry.len(),
            registry.root
        );
        Ok(registry)
    }

    /// Every parent chain must end at an agent without a parent
    fn check_acyclic(&self) -> OrchestratorResult<()> {
        for start in &self.order {
            let mut seen = HashSet::new();
            let mut current = start.as_str();
            while let Some(parent) = self.parents.get(current) {
                if !seen.insert(current) {
                    return Err(OrchestratorError::config(format!(
                        "Delegation cycle through '{}'",
                        current
                    )));
                }
                current = parent.as_str();
            }
        }
        Ok(())
    }

    /// Anything another agent can route to must say what it does
    fn check_descriptions(&self) -> OrchestratorResult<()> {
        for name in &self.order {
            for target in self.transfer_targets(name) {
                if !target.has_description() {
                    return Err(OrchestratorError::config(format!(
                        "Agent '{}' is a transfer target of '{}' but has no description",
                        target.name, name
                    )));
                }
            }
        }
        Ok(())
    }

    fn is_reachable(&self, name: &str) -> bool {
        let mut current = name;
        loop {
            if current == self.root {
                return true;
            }
            match self.parents.get(current) {
                Some(parent) => current = parent.as_str(),
                None => return false,
            }
        }
    }

    /// Check that every tool an agent names exists in `tools`
    pub fn validate_tools(&self, tools: &ToolRegistry) -> OrchestratorResult<()> {
        for name in &self.order {
            for tool in &self.agents[name].tools {
                if !tools.contains(tool) {
                    return Err(OrchestratorError::config(format!(
                        "Agent '{}' references unregistered tool '{}'",
                        name, tool
                    )));
                }
            }
        }
        Ok(())
    }

    /// The root agent
    pub fn root(&self) -> &Arc<AgentDefinition> {
        &self.agents[&self.root]
    }

    /// Name of the root agent
    pub fn root_name(&self) -> &str {
        &self.root
    }

    /// Look up an agent by name
    pub fn get(&self, name: &str) -> Option<&Arc<AgentDefinition>> {
        self.agents.get(name)
    }

    /// Check if an agent exists
    pub fn contains(&self, name: &str) -> bool {
        self.agents.contains_key(name)
    }

    /// Parent of an agent
    pub fn parent_of(&self, name: &str) -> Option<&str> {
        self.parents.get(name).map(|s| s.as_str())
    }

    /// Children of an agent, in declaration order
    pub fn children(&self, name: &str) -> Vec<&Arc<AgentDefinition>> {
        self.agents
            .get(name)
            .map(|def| def.children.iter().filter_map(|c| self.agents.get(c)).collect())
            .unwrap_or_default()
    }

    /// Agents sharing a parent with `name`
    pub fn peers(&self, name: &str) -> Vec<&Arc<AgentDefinition>> {
        match self.parent_of(name) {
            Some(parent) => self
                .children(parent)
                .into_iter()
                .filter(|d| d.name != name)
                .collect(),
            None => Vec::new(),
        }
    }

    /// Agents `name` may transfer to: children, then parent and peers when allowed
    pub fn transfer_targets(&self, name: &str) -> Vec<&Arc<AgentDefinition>> {
        let Some(def) = self.agents.get(name) else {
            return Vec::new();
        };

        let mut targets = self.children(name);
        if def.allow_transfer_to_parent {
            if let Some(parent) = self.parent_of(name).and_then(|p| self.agents.get(p)) {
                targets.push(parent);
            }
        }
        if def.allow_transfer_to_peers {
            targets.extend(self.peers(name));
        }
        targets
    }

    /// Transfer targets as offered to the model
    pub fn transfer_offers(&self, name: &str) -> Vec<TransferTarget> {
        self.transfer_targets(name)
            .into_iter()
            .map(|d| TransferTarget {
                name: d.name.clone(),
                description: d.description.clone(),
            })
            .collect()
    }

    /// Resolve a transfer from `from` to `to`, failing if `to` is not a valid target
    pub fn resolve_transfer(&self, from: &str, to: &str) -> OrchestratorResult<&Arc<AgentDefinition>> {
        if !self.agents.contains_key(to) {
            return Err(OrchestratorError::routing(from, to, "no such agent"));
        }
        self.transfer_targets(from)
            .into_iter()
            .find(|d| d.name == to)
            .ok_or_else(|| OrchestratorError::routing(from, to, "not a permitted transfer target"))
    }

    /// Agent names in definition order
    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.order.iter().map(|s| s.as_str())
    }

    /// Number of agents
    pub fn len(&self) -> usize {
        self.agents.len()
    }

    /// Check if empty
    pub fn is_empty(&self) -> bool {
        self.agents.is_empty()
    }
}

fn validate_output_key(def: &AgentDefinition) -> OrchestratorResult<()> {
    if let Some(key) = &def.output_key {
        if key.trim().is_empty() {
            return Err(OrchestratorError::config(format!(
                "Agent '{}' has an empty output_key",
                def.name
            )));
        }
        if has_reserved_prefix(key) {
            return Err(OrchestratorError::config(format!(
                "Agent '{}' output_key '{}' collides with a reserved scope prefix; use output_scope",
                def.name, key
            )));
        }
    }
    Ok(())
}
