//! Model registry.
//!
//! Descriptors pair a provider with one of its model ids plus display
//! metadata. The registry enforces id uniqueness and only accepts new
//! descriptors for providers whose credential currently validates.
//! Messages record provider/model ids as plain data, so removing a
//! descriptor never touches conversation history.

use serde::{Deserialize, Serialize};

use crate::core::error::GatewayError;
use crate::core::validation::{ValidationSnapshot, ValidationState};

/// Longest short label accepted for the compact selector.
pub const MAX_SHORT_LABEL_CHARS: usize = 3;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ModelDescriptor {
    /// Provider-side model id, unique across the registry.
    pub id: String,
    pub display_label: String,
    pub short_label: String,
    pub provider_id: String,
    #[serde(default)]
    pub quick_access: bool,
}

/// Listing filter; all criteria are conjunctive.
#[derive(Debug, Clone, Copy, Default)]
pub struct ModelFilter<'a> {
    pub quick_access_only: bool,
    pub provider_id: Option<&'a str>,
    /// When set, only models of providers currently `Valid` in the
    /// snapshot are returned.
    pub validated: Option<&'a ValidationSnapshot>,
}

#[derive(Debug, Default)]
pub struct ModelRegistry {
    models: Vec<ModelDescriptor>,
}

impl ModelRegistry {
    pub fn new() -> Self {
        ModelRegistry::default()
    }

    /// Registry seeded with the built-in catalog models.
    pub fn with_builtin_models() -> Self {
        ModelRegistry {
            models: crate::core::catalog::builtin_models(),
        }
    }

    /// Registry restored from previously accepted descriptors.
    pub fn from_models(models: Vec<ModelDescriptor>) -> Self {
        ModelRegistry { models }
    }

    pub fn models(&self) -> &[ModelDescriptor] {
        &self.models
    }

    pub fn find(&self, model_id: &str) -> Option<&ModelDescriptor> {
        self.models.iter().find(|model| model.id == model_id)
    }

    /// Register a descriptor. Blank fields and over-long short labels
    /// are rejected, as is a provider the user has not proven access
    /// to; duplicate ids are a conflict.
    pub fn add(
        &mut self,
        descriptor: ModelDescriptor,
        states: &ValidationSnapshot,
    ) -> Result<(), GatewayError> {
        if descriptor.id.trim().is_empty()
            || descriptor.display_label.trim().is_empty()
            || descriptor.short_label.trim().is_empty()
        {
            return Err(GatewayError::validation(
                "model id, display label, and short label must all be filled in",
            ));
        }
        if descriptor.short_label.chars().count() > MAX_SHORT_LABEL_CHARS {
            return Err(GatewayError::validation(format!(
                "short label '{}' is longer than {MAX_SHORT_LABEL_CHARS} characters",
                descriptor.short_label
            )));
        }
        let provider_state = states
            .get(&descriptor.provider_id)
            .copied()
            .unwrap_or_default();
        if provider_state != ValidationState::Valid {
            return Err(GatewayError::validation(format!(
                "no validated API key for provider '{}'",
                descriptor.provider_id
            )));
        }
        if self.find(&descriptor.id).is_some() {
            return Err(GatewayError::conflict(format!(
                "a model with id '{}' is already registered",
                descriptor.id
            )));
        }

        self.models.push(descriptor);
        Ok(())
    }

    /// Remove a descriptor; unknown ids are a no-op. Returns whether
    /// anything was removed.
    pub fn remove(&mut self, model_id: &str) -> bool {
        let before = self.models.len();
        self.models.retain(|model| model.id != model_id);
        self.models.len() != before
    }

    pub fn toggle_quick_access(&mut self, model_id: &str) -> bool {
        match self.models.iter_mut().find(|model| model.id == model_id) {
            Some(model) => {
                model.quick_access = !model.quick_access;
                true
            }
            None => false,
        }
    }

    pub fn set_short_label(&mut self, model_id: &str, label: &str) -> Result<(), GatewayError> {
        if label.trim().is_empty() {
            return Err(GatewayError::validation("short label must not be blank"));
        }
        if label.chars().count() > MAX_SHORT_LABEL_CHARS {
            return Err(GatewayError::validation(format!(
                "short label '{label}' is longer than {MAX_SHORT_LABEL_CHARS} characters"
            )));
        }
        let model = self
            .models
            .iter_mut()
            .find(|model| model.id == model_id)
            .ok_or_else(|| {
                GatewayError::validation(format!("no model registered with id '{model_id}'"))
            })?;
        model.short_label = label.to_string();
        Ok(())
    }

    /// Filtered listing. Quick-access listings come back in selector
    /// order (see [`sort_for_quick_access`]).
    pub fn list(&self, filter: &ModelFilter) -> Vec<&ModelDescriptor> {
        let mut selected: Vec<&ModelDescriptor> = self
            .models
            .iter()
            .filter(|model| !filter.quick_access_only || model.quick_access)
            .filter(|model| {
                filter
                    .provider_id
                    .map(|id| model.provider_id == id)
                    .unwrap_or(true)
            })
            .filter(|model| {
                filter
                    .validated
                    .map(|snapshot| {
                        snapshot
                            .get(&model.provider_id)
                            .copied()
                            .unwrap_or_default()
                            == ValidationState::Valid
                    })
                    .unwrap_or(true)
            })
            .collect();

        if filter.quick_access_only {
            sort_for_quick_access(&mut selected);
        }
        selected
    }
}

fn pinned_rank(short_label: &str) -> u8 {
    // The thinking-mode variant and the baseline model stay at the end
    // of the selector, in that relative order.
    match short_label {
        "T" => 2,
        "M" => 1,
        _ => 0,
    }
}

/// Ascending by short label with "M" and "T" pinned last.
pub fn sort_for_quick_access(models: &mut [&ModelDescriptor]) {
    models.sort_by(|a, b| {
        pinned_rank(&a.short_label)
            .cmp(&pinned_rank(&b.short_label))
            .then_with(|| a.short_label.cmp(&b.short_label))
    });
}
