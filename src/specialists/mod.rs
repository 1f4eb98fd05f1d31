//! Specialist trait objects and registry
//!
//! A specialist exposes a few capabilities under named slots. Which slot answers
//! a plan entry is fixed at construction, so a missing capability is caught
//! when the registry is built instead of when a request arrives.

pub mod builtin;
pub mod portfolio;

pub use builtin::create_default_registry;

use crate::error::OrchestrationError;
use crate::models::{RequestContext, TaskDescriptor};
use crate::Result;
use async_trait::async_trait;
use indexmap::IndexMap;
use serde::Serialize;
use serde_json::Value;
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum CapabilitySlot {
    Fetch,
    Summary,
    Updates,
    Trends,
    Alerts,
}

impl fmt::Display for CapabilitySlot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            CapabilitySlot::Fetch => "fetch",
            CapabilitySlot::Summary => "summary",
            CapabilitySlot::Updates => "updates",
            CapabilitySlot::Trends => "trends",
            CapabilitySlot::Alerts => "alerts",
        };
        f.write_str(name)
    }
}

/// One operation a specialist can perform for a request
#[async_trait]
pub trait Capability: Send + Sync {
    async fn invoke(&self, ctx: &RequestContext) -> Result<Value>;
}

/// Adapts a synchronous function to the async capability contract
pub struct FnCapability<F> {
    f: F,
}

impl<F> FnCapability<F>
where
    F: Fn(&RequestContext) -> Result<Value> + Send + Sync + 'static,
{
    pub fn new(f: F) -> Self {
        Self { f }
    }
}

#[async_trait]
impl<F> Capability for FnCapability<F>
where
    F: Fn(&RequestContext) -> Result<Value> + Send + Sync + 'static,
{
    async fn invoke(&self, ctx: &RequestContext) -> Result<Value> {
        (self.f)(ctx)
    }
}

pub struct Specialist {
    name: String,
    description: String,
    result_key: String,
    capabilities: HashMap<CapabilitySlot, Arc<dyn Capability>>,
    dispatch: CapabilitySlot,
}

impl Specialist {
    pub fn builder(name: impl Into<String>, description: impl Into<String>) -> SpecialistBuilder {
        SpecialistBuilder {
            name: name.into(),
            description: description.into(),
            result_key: None,
            capabilities: HashMap::new(),
            dispatch: None,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn description(&self) -> &str {
        &self.description
    }

    /// Key the dispatched result is stored under
    pub fn result_key(&self) -> &str {
        &self.result_key
    }

    pub fn dispatch_slot(&self) -> CapabilitySlot {
        self.dispatch
    }

    pub fn has_slot(&self, slot: CapabilitySlot) -> bool {
        self.capabilities.contains_key(&slot)
    }

    pub fn capability(&self, slot: CapabilitySlot) -> Result<Arc<dyn Capability>> {
        self.capabilities
            .get(&slot)
            .cloned()
            .ok_or_else(|| OrchestrationError::CapabilityMissing {
                specialist: self.name.clone(),
                slot: slot.to_string(),
            })
    }
}

impl fmt::Debug for Specialist {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut slots: Vec<String> = self.capabilities.keys().map(ToString::to_string).collect();
        slots.sort();
        f.debug_struct("Specialist")
            .field("name", &self.name)
            .field("result_key", &self.result_key)
            .field("dispatch", &self.dispatch)
            .field("slots", &slots)
            .finish()
    }
}

pub struct SpecialistBuilder {
    name: String,
    description: String,
    result_key: Option<String>,
    capabilities: HashMap<CapabilitySlot, Arc<dyn Capability>>,
    dispatch: Option<CapabilitySlot>,
}

impl SpecialistBuilder {
    pub fn result_key(mut self, key: impl Into<String>) -> Self {
        self.result_key = Some(key.into());
        self
    }

    pub fn capability(mut self, slot: CapabilitySlot, capability: Arc<dyn Capability>) -> Self {
        self.capabilities.insert(slot, capability);
        self
    }

    /// Register a synchronous function behind the async contract
    pub fn sync_capability<F>(self, slot: CapabilitySlot, f: F) -> Self
    where
        F: Fn(&RequestContext) -> Result<Value> + Send + Sync + 'static,
    {
        self.capability(slot, Arc::new(FnCapability::new(f)))
    }

    /// Slot invoked when a plan names this specialist
    pub fn dispatch(mut self, slot: CapabilitySlot) -> Self {
        self.dispatch = Some(slot);
        self
    }

    pub fn build(self) -> Result<Specialist> {
        let name = self.name.trim().to_string();
        if name.is_empty() || name.chars().any(|c| c.is_whitespace() || c.is_uppercase()) {
            return Err(OrchestrationError::InvalidRegistry(format!(
                "specialist name {:?} must be non-empty lowercase without spaces",
                self.name
            )));
        }

        let dispatch = self.dispatch.ok_or_else(|| {
            OrchestrationError::InvalidRegistry(format!("specialist {} has no dispatch slot", name))
        })?;

        if !self.capabilities.contains_key(&dispatch) {
            return Err(OrchestrationError::InvalidRegistry(format!(
                "specialist {} dispatches to empty slot {}",
                name, dispatch
            )));
        }

        let result_key = self
            .result_key
            .unwrap_or_else(|| format!("{}_report", name));

        Ok(Specialist {
            name,
            description: self.description,
            result_key,
            capabilities: self.capabilities,
            dispatch,
        })
    }
}

/// Name-ordered set of specialists; order is registration order
#[derive(Default)]
pub struct SpecialistRegistry {
    specialists: IndexMap<String, Arc<Specialist>>,
}

impl SpecialistRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, specialist: Specialist) -> Result<()> {
        let name = specialist.name().to_string();
        if self.specialists.contains_key(&name) {
            return Err(OrchestrationError::InvalidRegistry(format!(
                "specialist {} registered twice",
                name
            )));
        }
        if self
            .specialists
            .values()
            .any(|s| s.result_key() == specialist.result_key())
        {
            return Err(OrchestrationError::InvalidRegistry(format!(
                "result key {} is already used",
                specialist.result_key()
            )));
        }

        self.specialists.insert(name, Arc::new(specialist));
        Ok(())
    }

    pub fn get(&self, name: &str) -> Option<Arc<Specialist>> {
        self.specialists.get(&name.trim().to_lowercase()).cloned()
    }

    pub fn names(&self) -> Vec<&str> {
        self.specialists.keys().map(String::as_str).collect()
    }

    pub fn len(&self) -> usize {
        self.specialists.len()
    }

    pub fn is_empty(&self) -> bool {
        self.specialists.is_empty()
    }

    /// `- name: description` lines for the planning prompt
    pub fn describe(&self) -> String {
        self.specialists
            .values()
            .map(|s| format!("- {}: {}", s.name(), s.description()))
            .collect::<Vec<_>>()
            .join("\n")
    }

    /// Task running `slot` of `name` with the result stored under `key`.
    ///
    /// Unknown specialists and empty slots yield a task that fails immediately,
    /// so the caller still gets an entry for `key`.
    pub fn task_for(
        &self,
        name: &str,
        slot: CapabilitySlot,
        key: impl Into<String>,
        ctx: &RequestContext,
    ) -> TaskDescriptor {
        let key = key.into();
        let capability = match self.get(name) {
            Some(specialist) => specialist.capability(slot),
            None => Err(OrchestrationError::SpecialistNotFound(name.to_string())),
        };

        match capability {
            Ok(capability) => {
                let ctx = ctx.clone();
                TaskDescriptor::new(key, async move { capability.invoke(&ctx).await })
            }
            Err(e) => TaskDescriptor::failed(key, e),
        }
    }

    /// The task a plan entry for `name` turns into, if the name is known
    pub fn dispatch_task(&self, name: &str, ctx: &RequestContext) -> Option<TaskDescriptor> {
        let specialist = self.get(name)?;
        Some(self.task_for(
            specialist.name(),
            specialist.dispatch_slot(),
            specialist.result_key(),
            ctx,
        ))
    }
}
