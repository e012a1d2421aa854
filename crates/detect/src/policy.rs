//! Runtime-editable policy rule table.
//!
//! Copy-on-write: writers rebuild the full vector under a small mutex and
//! publish it atomically; detector snapshots are plain `Arc` loads and
//! never block a writer.

use std::sync::{Arc, Mutex};

use arc_swap::ArcSwap;
use thiserror::Error;

use shadow_core::{PolicyRule, PolicyRuleDraft};

#[derive(Error, Debug)]
pub enum PolicyError {
    #[error("Rule not found: {0}")]
    NotFound(String),

    #[error("Conflicting rule: {0}")]
    Conflict(String),
}

pub struct PolicyStore {
    rules: ArcSwap<Vec<PolicyRule>>,
    writer: Mutex<()>,
}

impl Default for PolicyStore {
    fn default() -> Self {
        Self::new(Vec::new())
    }
}

impl PolicyStore {
    pub fn new(rules: Vec<PolicyRule>) -> Self {
        Self {
            rules: ArcSwap::from_pointee(rules),
            writer: Mutex::new(()),
        }
    }

    /// Immutable snapshot for detectors and API reads.
    pub fn snapshot(&self) -> Arc<Vec<PolicyRule>> {
        self.rules.load_full()
    }

    /// Store a new rule. Rejects a duplicate (same name + service).
    pub fn create(&self, draft: PolicyRuleDraft) -> Result<PolicyRule, PolicyError> {
        let _guard = self.writer.lock().unwrap();
        let current = self.rules.load_full();
        if current
            .iter()
            .any(|r| r.name.eq_ignore_ascii_case(&draft.name) && r.service.eq_ignore_ascii_case(&draft.service))
        {
            return Err(PolicyError::Conflict(draft.name));
        }

        let rule = draft.into_rule();
        let mut next = current.as_ref().clone();
        next.push(rule.clone());
        self.rules.store(Arc::new(next));
        Ok(rule)
    }

    /// Flip `enabled`, returning the stored rule.
    pub fn toggle(&self, id: &str) -> Result<PolicyRule, PolicyError> {
        let _guard = self.writer.lock().unwrap();
        let current = self.rules.load_full();
        let mut next = current.as_ref().clone();
        let rule = next
            .iter_mut()
            .find(|r| r.id == id)
            .ok_or_else(|| PolicyError::NotFound(id.to_string()))?;
        rule.enabled = !rule.enabled;
        let stored = rule.clone();
        self.rules.store(Arc::new(next));
        Ok(stored)
    }

    pub fn delete(&self, id: &str) -> Result<(), PolicyError> {
        let _guard = self.writer.lock().unwrap();
        let current = self.rules.load_full();
        let mut next = current.as_ref().clone();
        let before = next.len();
        next.retain(|r| r.id != id);
        if next.len() == before {
            return Err(PolicyError::NotFound(id.to_string()));
        }
        self.rules.store(Arc::new(next));
        Ok(())
    }

    pub fn len(&self) -> usize {
        self.rules.load().len()
    }

    pub fn is_empty(&self) -> bool {
        self.rules.load().is_empty()
    }
}
