//! Capability registry.
//!
//! Maps an agent type name to its declared [`AgentCapabilities`] and a
//! constructor. Built during startup with `&mut self`, then frozen behind an
//! `Arc` by the engine; lookups need no locking.

use std::collections::BTreeMap;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::agent::{
    architecture_capabilities, component_capabilities, usage_capabilities, Agent,
    AgentCapabilities, ArchitectureAgent, ComponentAgent, UsageAgent, ARCHITECTURE, COMPONENT,
    USAGE,
};
use crate::analysis::Analyzer;
use crate::error::{RegistryError, RegistryResult};

/// Builds a fresh agent instance.
pub type AgentConstructor = Arc<dyn Fn() -> Arc<dyn Agent> + Send + Sync>;

/// Language tag that matches any language query.
const ANY_LANGUAGE: &str = "any";

struct Entry {
    capabilities: AgentCapabilities,
    constructor: AgentConstructor,
}

/// A registered agent type, as listed by discovery operations.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AgentTypeInfo {
    pub type_name: String,
    pub capabilities: AgentCapabilities,
}

#[derive(Default)]
pub struct CapabilityRegistry {
    entries: BTreeMap<String, Entry>,
}

impl std::fmt::Debug for CapabilityRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CapabilityRegistry")
            .field("types", &self.entries.keys().collect::<Vec<_>>())
            .finish()
    }
}

impl CapabilityRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry holding the `architecture`, `component` and `usage` agents,
    /// all backed by `analyzer`.
    pub fn with_builtin_agents(analyzer: Arc<dyn Analyzer>) -> RegistryResult<Self> {
        let mut registry = Self::new();

        let a = analyzer.clone();
        registry.register(ARCHITECTURE, architecture_capabilities(), move || {
            Arc::new(ArchitectureAgent::new(a.clone())) as Arc<dyn Agent>
        })?;

        let a = analyzer.clone();
        registry.register(COMPONENT, component_capabilities(), move || {
            Arc::new(ComponentAgent::new(a.clone())) as Arc<dyn Agent>
        })?;

        registry.register(USAGE, usage_capabilities(), move || {
            Arc::new(UsageAgent::new(analyzer.clone())) as Arc<dyn Agent>
        })?;

        Ok(registry)
    }

    /// Register `type_name` with its capabilities and constructor.
    ///
    /// Fails with [`RegistryError::DuplicateType`] if the name is taken and
    /// [`RegistryError::InvalidCapabilities`] for zero limits.
    pub fn register<F>(
        &mut self,
        type_name: impl Into<String>,
        capabilities: AgentCapabilities,
        constructor: F,
    ) -> RegistryResult<()>
    where
        F: Fn() -> Arc<dyn Agent> + Send + Sync + 'static,
    {
        let type_name = type_name.into();
        if self.entries.contains_key(&type_name) {
            return Err(RegistryError::DuplicateType { type_name });
        }
        if capabilities.max_parallel_tasks == 0 {
            return Err(RegistryError::InvalidCapabilities {
                type_name,
                reason: "max_parallel_tasks must be at least 1".to_string(),
            });
        }
        if capabilities.timeout_seconds == 0 {
            return Err(RegistryError::InvalidCapabilities {
                type_name,
                reason: "timeout_seconds must be at least 1".to_string(),
            });
        }

        debug!(type_name = %type_name, max_parallel = capabilities.max_parallel_tasks, "registered agent type");
        self.entries.insert(
            type_name,
            Entry {
                capabilities,
                constructor: Arc::new(constructor),
            },
        );
        Ok(())
    }

    /// Register a shared agent instance; its own capabilities are used.
    pub fn register_agent(
        &mut self,
        type_name: impl Into<String>,
        agent: Arc<dyn Agent>,
    ) -> RegistryResult<()> {
        let capabilities = agent.capabilities().clone();
        self.register(type_name, capabilities, move || agent.clone())
    }

    pub fn create(&self, type_name: &str) -> RegistryResult<Arc<dyn Agent>> {
        self.entry(type_name).map(|e| (e.constructor)())
    }

    pub fn capabilities(&self, type_name: &str) -> RegistryResult<&AgentCapabilities> {
        self.entry(type_name).map(|e| &e.capabilities)
    }

    pub fn contains(&self, type_name: &str) -> bool {
        self.entries.contains_key(type_name)
    }

    /// All registered types, sorted by type name.
    pub fn list(&self) -> Vec<AgentTypeInfo> {
        self.filter(|_| true)
    }

    pub fn find_by_input_type(&self, input_type: &str) -> Vec<AgentTypeInfo> {
        self.filter(|c| c.input_types.contains(input_type))
    }

    pub fn find_by_output_type(&self, output_type: &str) -> Vec<AgentTypeInfo> {
        self.filter(|c| c.output_types.contains(output_type))
    }

    /// Types supporting `language`; agents declaring `any` always match.
    pub fn find_by_language(&self, language: &str) -> Vec<AgentTypeInfo> {
        let language = language.to_lowercase();
        self.filter(|c| {
            c.supported_languages
                .iter()
                .any(|l| l.eq_ignore_ascii_case(&language) || l == ANY_LANGUAGE)
        })
    }

    /// Case-insensitive substring search over capability name and description.
    pub fn search(&self, query: &str) -> Vec<AgentTypeInfo> {
        let query = query.to_lowercase();
        self.filter(|c| {
            c.name.to_lowercase().contains(&query) || c.description.to_lowercase().contains(&query)
        })
    }

    fn entry(&self, type_name: &str) -> RegistryResult<&Entry> {
        self.entries
            .get(type_name)
            .ok_or_else(|| RegistryError::UnknownType {
                type_name: type_name.to_string(),
            })
    }

    fn filter(&self, pred: impl Fn(&AgentCapabilities) -> bool) -> Vec<AgentTypeInfo> {
        self.entries
            .iter()
            .filter(|(_, e)| pred(&e.capabilities))
            .map(|(name, e)| AgentTypeInfo {
                type_name: name.clone(),
                capabilities: e.capabilities.clone(),
            })
            .collect()
    }
}
