//! Quick-pick wiring for choosing a notebook's kernel.
//!
//! Builds the pick list from a [`KernelMatch`] (suggestions ranked first,
//! the current binding pre-checked), shows it through the host's quick-pick
//! service, and applies the choice back through the registry.

use std::sync::Arc;

use async_trait::async_trait;
use log::{info, warn};

use crate::registry::{KernelMatch, KernelRegistry, SelectError};

/// One row in the quick pick.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PickItem {
    pub label: String,
    /// Short annotation rendered next to the label, e.g. "Suggested".
    pub description: Option<String>,
    /// Longer second line, e.g. the kernel's language.
    pub detail: Option<String>,
    /// Whether the row is pre-checked as the current choice.
    pub picked: bool,
}

/// The host window's quick-pick service.
#[async_trait]
pub trait QuickPick: Send + Sync {
    /// Show `items` under `title` and resolve to the index of the chosen
    /// row, or `None` when the user dismissed the pick.
    async fn pick(&self, title: &str, items: Vec<PickItem>) -> Option<usize>;
}

/// Outcome of one kernel-selection interaction.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PickOutcome {
    /// The user chose a kernel and the registry was updated.
    Selected(String),
    /// The pick was shown and dismissed without a choice.
    Dismissed,
    /// Nothing to show: the registry has no kernels for this notebook.
    NoKernelsAvailable,
}

/// Orchestrates the kernel quick pick for notebook editors.
pub struct KernelSelector {
    registry: Arc<dyn KernelRegistry>,
    picker: Arc<dyn QuickPick>,
}

impl KernelSelector {
    pub fn new(registry: Arc<dyn KernelRegistry>, picker: Arc<dyn QuickPick>) -> Self {
        Self { registry, picker }
    }

    /// Run the kernel pick for `notebook_id` and apply the result.
    pub async fn select_for_notebook(&self, notebook_id: &str) -> Result<PickOutcome, SelectError> {
        let kernels = self.registry.kernels_for(notebook_id);
        if kernels.all.is_empty() {
            info!(
                "[kernel-picker] No kernels available for {}",
                notebook_id
            );
            return Ok(PickOutcome::NoKernelsAvailable);
        }

        let (items, kernel_ids) = build_pick_items(&kernels);
        let choice = self.picker.pick("Select Kernel", items).await;

        let kernel_id = match choice {
            Some(index) => match kernel_ids.get(index) {
                Some(kernel_id) => kernel_id.clone(),
                None => {
                    warn!(
                        "[kernel-picker] Pick returned out-of-range index {}, treating as dismissed",
                        index
                    );
                    return Ok(PickOutcome::Dismissed);
                }
            },
            None => return Ok(PickOutcome::Dismissed),
        };

        self.registry.select(notebook_id, &kernel_id)?;
        info!(
            "[kernel-picker] {} now bound to kernel {}",
            notebook_id, kernel_id
        );
        Ok(PickOutcome::Selected(kernel_id))
    }
}

/// Flatten a [`KernelMatch`] into pick rows plus the parallel id list.
///
/// Suggestions lead and carry a "Suggested" annotation; the remaining
/// kernels follow in display order. The currently bound kernel is
/// pre-checked wherever it lands.
fn build_pick_items(kernels: &KernelMatch) -> (Vec<PickItem>, Vec<String>) {
    let selected_id = kernels.selected.as_ref().map(|kernel| kernel.id.as_str());
    let mut items = Vec::new();
    let mut kernel_ids = Vec::new();

    for kernel in &kernels.suggestions {
        items.push(PickItem {
            label: kernel.display_name.clone(),
            description: Some("Suggested".to_string()),
            detail: Some(kernel.language.clone()),
            picked: selected_id == Some(kernel.id.as_str()),
        });
        kernel_ids.push(kernel.id.clone());
    }

    for kernel in &kernels.all {
        if kernels.suggestions.iter().any(|s| s.id == kernel.id) {
            continue;
        }
        items.push(PickItem {
            label: kernel.display_name.clone(),
            description: kernel.description.clone(),
            detail: Some(kernel.language.clone()),
            picked: selected_id == Some(kernel.id.as_str()),
        });
        kernel_ids.push(kernel.id.clone());
    }

    (items, kernel_ids)
}
