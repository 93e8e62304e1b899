//! Kernel registry collaborator surface.
//!
//! The picker and status wiring only ever talk to the registry through the
//! [`KernelRegistry`] trait: which kernels fit a notebook, which one is
//! bound to it, and a broadcast feed of changes. [`LocalKernelRegistry`] is
//! the in-process implementation a notebook window runs against.

use std::collections::{BTreeMap, HashMap};
use std::sync::Mutex;

use log::info;
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;

/// A kernel the registry knows about.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct KernelDescriptor {
    /// Stable id, e.g. `"python3"` or `"deno"`.
    pub id: String,
    pub display_name: String,
    pub language: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

/// The registry's view of which kernels fit one notebook.
#[derive(Debug, Clone, Default)]
pub struct KernelMatch {
    /// The kernel currently bound to the notebook, if any.
    pub selected: Option<KernelDescriptor>,
    /// Kernels whose language matches the notebook, best first.
    pub suggestions: Vec<KernelDescriptor>,
    /// Every registered kernel, display order.
    pub all: Vec<KernelDescriptor>,
}

/// Registry change events for status and picker wiring.
#[derive(Debug, Clone)]
pub enum KernelEvent {
    Added {
        kernel_id: String,
    },
    Removed {
        kernel_id: String,
    },
    SelectionChanged {
        notebook_id: String,
        kernel_id: Option<String>,
    },
}

/// Error type for kernel selection.
#[derive(Debug, thiserror::Error)]
pub enum SelectError {
    #[error("Unknown kernel: {0}")]
    UnknownKernel(String),
}

/// What the UI glue needs from a kernel registry.
pub trait KernelRegistry: Send + Sync {
    /// Kernels matching `notebook_id`, plus the current binding.
    fn kernels_for(&self, notebook_id: &str) -> KernelMatch;

    /// Bind `kernel_id` to `notebook_id`.
    fn select(&self, notebook_id: &str, kernel_id: &str) -> Result<(), SelectError>;

    /// Subscribe to registry changes.
    fn subscribe(&self) -> broadcast::Receiver<KernelEvent>;
}

struct RegistryState {
    /// Keyed by kernel id; BTreeMap keeps listing order stable.
    kernels: BTreeMap<String, KernelDescriptor>,
    /// Notebook id -> language, used to rank suggestions.
    notebook_languages: HashMap<String, String>,
    /// Notebook id -> bound kernel id.
    selections: HashMap<String, String>,
}

/// In-process kernel registry for one notebook window.
pub struct LocalKernelRegistry {
    state: Mutex<RegistryState>,
    events: broadcast::Sender<KernelEvent>,
}

impl LocalKernelRegistry {
    pub fn new() -> Self {
        let (events, _) = broadcast::channel(64);
        Self {
            state: Mutex::new(RegistryState {
                kernels: BTreeMap::new(),
                notebook_languages: HashMap::new(),
                selections: HashMap::new(),
            }),
            events,
        }
    }

    /// Register a kernel and announce it.
    pub fn add_kernel(&self, kernel: KernelDescriptor) {
        let kernel_id = kernel.id.clone();
        self.state.lock().unwrap().kernels.insert(kernel_id.clone(), kernel);
        info!("[kernel-registry] Added kernel {}", kernel_id);
        let _ = self.events.send(KernelEvent::Added { kernel_id });
    }

    /// Remove a kernel. Notebooks bound to it lose their selection.
    pub fn remove_kernel(&self, kernel_id: &str) {
        let orphaned: Vec<String> = {
            let mut state = self.state.lock().unwrap();
            if state.kernels.remove(kernel_id).is_none() {
                return;
            }
            let orphaned: Vec<String> = state
                .selections
                .iter()
                .filter(|(_, selected)| selected.as_str() == kernel_id)
                .map(|(notebook, _)| notebook.clone())
                .collect();
            for notebook in &orphaned {
                state.selections.remove(notebook);
            }
            orphaned
        };

        info!("[kernel-registry] Removed kernel {}", kernel_id);
        let _ = self.events.send(KernelEvent::Removed {
            kernel_id: kernel_id.to_string(),
        });
        for notebook_id in orphaned {
            let _ = self.events.send(KernelEvent::SelectionChanged {
                notebook_id,
                kernel_id: None,
            });
        }
    }

    /// Record the notebook's language so suggestions can be ranked.
    pub fn set_notebook_language(&self, notebook_id: &str, language: &str) {
        self.state
            .lock()
            .unwrap()
            .notebook_languages
            .insert(notebook_id.to_string(), language.to_string());
    }
}

impl Default for LocalKernelRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl KernelRegistry for LocalKernelRegistry {
    fn kernels_for(&self, notebook_id: &str) -> KernelMatch {
        let state = self.state.lock().unwrap();

        let mut all: Vec<KernelDescriptor> = state.kernels.values().cloned().collect();
        all.sort_by(|a, b| a.display_name.cmp(&b.display_name));

        let suggestions = match state.notebook_languages.get(notebook_id) {
            Some(language) => all
                .iter()
                .filter(|kernel| &kernel.language == language)
                .cloned()
                .collect(),
            None => Vec::new(),
        };

        let selected = state
            .selections
            .get(notebook_id)
            .and_then(|kernel_id| state.kernels.get(kernel_id))
            .cloned();

        KernelMatch {
            selected,
            suggestions,
            all,
        }
    }

    fn select(&self, notebook_id: &str, kernel_id: &str) -> Result<(), SelectError> {
        {
            let mut state = self.state.lock().unwrap();
            if !state.kernels.contains_key(kernel_id) {
                return Err(SelectError::UnknownKernel(kernel_id.to_string()));
            }
            state
                .selections
                .insert(notebook_id.to_string(), kernel_id.to_string());
        }
        info!(
            "[kernel-registry] {} bound to kernel {}",
            notebook_id, kernel_id
        );
        let _ = self.events.send(KernelEvent::SelectionChanged {
            notebook_id: notebook_id.to_string(),
            kernel_id: Some(kernel_id.to_string()),
        });
        Ok(())
    }

    fn subscribe(&self) -> broadcast::Receiver<KernelEvent> {
        self.events.subscribe()
    }
}
