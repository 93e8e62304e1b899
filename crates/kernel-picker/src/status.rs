//! Status bar wiring for kernel and cell-selection display.
//!
//! Two independent status bar contributions: the active notebook's kernel
//! (or a "Select Kernel" affordance when nothing is bound) and the cursor's
//! cell position. Each runs an event pump task in the background and keeps
//! its entry current; the entry disappears when no notebook editor is
//! active. Dropping the wiring aborts the pump.

use std::sync::Arc;

use log::warn;
use tokio::sync::{broadcast, watch};
use tokio::task::JoinHandle;

use crate::registry::{KernelEvent, KernelRegistry};

/// Entry id for the kernel status contribution.
pub const KERNEL_STATUS_ID: &str = "notebook.kernel";
/// Entry id for the cell-selection status contribution.
pub const SELECTION_STATUS_ID: &str = "notebook.selection";
/// Command invoked when the kernel entry is activated.
pub const SELECT_KERNEL_COMMAND: &str = "notebook.selectKernel";
/// Command invoked when the selection entry is activated.
pub const GOTO_CELL_COMMAND: &str = "notebook.gotoCell";

/// One status bar entry, as handed to the host's status bar service.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StatusEntry {
    pub id: String,
    pub text: String,
    pub tooltip: Option<String>,
    /// Command to run when the entry is activated.
    pub command: Option<String>,
}

/// The host window's status bar service.
pub trait StatusBar: Send + Sync {
    /// Add the entry, or update it in place if the id is already shown.
    fn upsert(&self, entry: StatusEntry);
    /// Remove the entry with this id; unknown ids are a no-op.
    fn remove(&self, entry_id: &str);
}

/// Cursor position within the active notebook, as reported by the editor.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SelectionSnapshot {
    pub notebook_id: String,
    /// Zero-based index of the focused cell.
    pub cell_index: usize,
    pub cell_count: usize,
}

/// Keeps the kernel status entry in sync with the active editor and the
/// kernel registry.
pub struct KernelStatusBar {
    pump: JoinHandle<()>,
}

impl KernelStatusBar {
    /// Spawn the event pump.
    ///
    /// `active_editor` carries the id of the notebook in the active editor,
    /// or `None` when no notebook editor has focus.
    pub fn spawn(
        registry: Arc<dyn KernelRegistry>,
        status_bar: Arc<dyn StatusBar>,
        mut active_editor: watch::Receiver<Option<String>>,
    ) -> Self {
        let mut events = registry.subscribe();
        let pump = tokio::spawn(async move {
            let mut active = active_editor.borrow().clone();
            render_kernel_entry(&*registry, &*status_bar, active.as_deref());

            loop {
                tokio::select! {
                    changed = active_editor.changed() => {
                        if changed.is_err() {
                            break;
                        }
                        active = active_editor.borrow_and_update().clone();
                        render_kernel_entry(&*registry, &*status_bar, active.as_deref());
                    }
                    event = events.recv() => {
                        match event {
                            Ok(event) => {
                                if event_affects(&event, active.as_deref()) {
                                    render_kernel_entry(&*registry, &*status_bar, active.as_deref());
                                }
                            }
                            Err(broadcast::error::RecvError::Lagged(skipped)) => {
                                warn!(
                                    "[editor-status] Dropped {} kernel events, re-rendering",
                                    skipped
                                );
                                render_kernel_entry(&*registry, &*status_bar, active.as_deref());
                            }
                            Err(broadcast::error::RecvError::Closed) => break,
                        }
                    }
                }
            }
        });
        Self { pump }
    }
}

impl Drop for KernelStatusBar {
    fn drop(&mut self) {
        self.pump.abort();
    }
}

/// Whether a registry event can change what the entry shows for `active`.
fn event_affects(event: &KernelEvent, active: Option<&str>) -> bool {
    match event {
        // Another notebook's binding changed; ours is untouched.
        KernelEvent::SelectionChanged { notebook_id, .. } => Some(notebook_id.as_str()) == active,
        // The kernel set changed, which can flip the entry between a name
        // and the "Select Kernel" affordance.
        KernelEvent::Added { .. } | KernelEvent::Removed { .. } => active.is_some(),
    }
}

fn render_kernel_entry(
    registry: &dyn KernelRegistry,
    status_bar: &dyn StatusBar,
    active: Option<&str>,
) {
    let notebook_id = match active {
        Some(notebook_id) => notebook_id,
        None => {
            status_bar.remove(KERNEL_STATUS_ID);
            return;
        }
    };

    let kernels = registry.kernels_for(notebook_id);
    let entry = match kernels.selected {
        Some(kernel) => StatusEntry {
            id: KERNEL_STATUS_ID.to_string(),
            text: kernel.display_name.clone(),
            tooltip: Some(format!("{} ({})", kernel.display_name, kernel.language)),
            command: Some(SELECT_KERNEL_COMMAND.to_string()),
        },
        None => StatusEntry {
            id: KERNEL_STATUS_ID.to_string(),
            text: "Select Kernel".to_string(),
            tooltip: Some("Choose a kernel for this notebook".to_string()),
            command: Some(SELECT_KERNEL_COMMAND.to_string()),
        },
    };
    status_bar.upsert(entry);
}

/// Keeps the cell-selection entry in sync with the editor's cursor.
pub struct SelectionStatusBar {
    pump: JoinHandle<()>,
}

impl SelectionStatusBar {
    /// Spawn the event pump over a feed of selection snapshots.
    pub fn spawn(
        status_bar: Arc<dyn StatusBar>,
        mut selection: watch::Receiver<Option<SelectionSnapshot>>,
    ) -> Self {
        let pump = tokio::spawn(async move {
            render_selection_entry(&*status_bar, selection.borrow().clone());
            while selection.changed().await.is_ok() {
                let snapshot = selection.borrow_and_update().clone();
                render_selection_entry(&*status_bar, snapshot);
            }
        });
        Self { pump }
    }
}

impl Drop for SelectionStatusBar {
    fn drop(&mut self) {
        self.pump.abort();
    }
}

fn render_selection_entry(status_bar: &dyn StatusBar, snapshot: Option<SelectionSnapshot>) {
    match snapshot {
        Some(snapshot) if snapshot.cell_count > 0 => {
            status_bar.upsert(StatusEntry {
                id: SELECTION_STATUS_ID.to_string(),
                text: format!("Cell {} of {}", snapshot.cell_index + 1, snapshot.cell_count),
                tooltip: Some(snapshot.notebook_id),
                command: Some(GOTO_CELL_COMMAND.to_string()),
            });
        }
        _ => status_bar.remove(SELECTION_STATUS_ID),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::registry::{KernelDescriptor, KernelMatch, LocalKernelRegistry, SelectError};
    use std::collections::HashMap;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;
    use std::time::Duration;

    /// Status bar double recording the currently shown entries.
    struct RecordingStatusBar {
        entries: Mutex<HashMap<String, StatusEntry>>,
    }

    impl RecordingStatusBar {
        fn new() -> Arc<Self> {
            Arc::new(Self {
                entries: Mutex::new(HashMap::new()),
            })
        }

        fn text_of(&self, entry_id: &str) -> Option<String> {
            self.entries
                .lock()
                .unwrap()
                .get(entry_id)
                .map(|entry| entry.text.clone())
        }
    }

    impl StatusBar for RecordingStatusBar {
        fn upsert(&self, entry: StatusEntry) {
            self.entries.lock().unwrap().insert(entry.id.clone(), entry);
        }

        fn remove(&self, entry_id: &str) {
            self.entries.lock().unwrap().remove(entry_id);
        }
    }

    /// Registry wrapper counting `kernels_for` queries.
    struct CountingRegistry {
        inner: LocalKernelRegistry,
        queries: AtomicUsize,
    }

    impl CountingRegistry {
        fn new(inner: LocalKernelRegistry) -> Arc<Self> {
            Arc::new(Self {
                inner,
                queries: AtomicUsize::new(0),
            })
        }
    }

    impl KernelRegistry for CountingRegistry {
        fn kernels_for(&self, notebook_id: &str) -> KernelMatch {
            self.queries.fetch_add(1, Ordering::Relaxed);
            self.inner.kernels_for(notebook_id)
        }

        fn select(&self, notebook_id: &str, kernel_id: &str) -> Result<(), SelectError> {
            self.inner.select(notebook_id, kernel_id)
        }

        fn subscribe(&self) -> broadcast::Receiver<KernelEvent> {
            self.inner.subscribe()
        }
    }

    fn python3() -> KernelDescriptor {
        KernelDescriptor {
            id: "python3".to_string(),
            display_name: "Python 3".to_string(),
            language: "python".to_string(),
            description: None,
        }
    }

    async fn settle() {
        tokio::time::sleep(Duration::from_millis(20)).await;
    }

    #[tokio::test]
    async fn test_kernel_entry_tracks_active_editor() {
        let registry = LocalKernelRegistry::new();
        registry.add_kernel(python3());
        registry.select("nb-1", "python3").unwrap();
        let registry: Arc<dyn KernelRegistry> = Arc::new(registry);

        let status_bar = RecordingStatusBar::new();
        let (editor_tx, editor_rx) = watch::channel(None);
        let _wiring = KernelStatusBar::spawn(registry, status_bar.clone(), editor_rx);
        settle().await;

        // No notebook editor active: no entry.
        assert!(status_bar.text_of(KERNEL_STATUS_ID).is_none());

        editor_tx.send(Some("nb-1".to_string())).unwrap();
        settle().await;
        assert_eq!(
            status_bar.text_of(KERNEL_STATUS_ID),
            Some("Python 3".to_string())
        );

        editor_tx.send(None).unwrap();
        settle().await;
        assert!(status_bar.text_of(KERNEL_STATUS_ID).is_none());
    }

    #[tokio::test]
    async fn test_unbound_notebook_shows_select_affordance() {
        let registry = LocalKernelRegistry::new();
        registry.add_kernel(python3());
        let registry: Arc<dyn KernelRegistry> = Arc::new(registry);

        let status_bar = RecordingStatusBar::new();
        let (editor_tx, editor_rx) = watch::channel(Some("nb-1".to_string()));
        let _wiring = KernelStatusBar::spawn(registry, status_bar.clone(), editor_rx);
        settle().await;

        assert_eq!(
            status_bar.text_of(KERNEL_STATUS_ID),
            Some("Select Kernel".to_string())
        );
        drop(editor_tx);
    }

    #[tokio::test]
    async fn test_kernel_entry_follows_selection_events() {
        let registry = LocalKernelRegistry::new();
        registry.add_kernel(python3());
        let registry = Arc::new(registry);

        let status_bar = RecordingStatusBar::new();
        let (_editor_tx, editor_rx) = watch::channel(Some("nb-1".to_string()));
        let _wiring =
            KernelStatusBar::spawn(registry.clone(), status_bar.clone(), editor_rx);
        settle().await;
        assert_eq!(
            status_bar.text_of(KERNEL_STATUS_ID),
            Some("Select Kernel".to_string())
        );

        registry.select("nb-1", "python3").unwrap();
        settle().await;
        assert_eq!(
            status_bar.text_of(KERNEL_STATUS_ID),
            Some("Python 3".to_string())
        );
    }

    #[tokio::test]
    async fn test_unrelated_notebook_events_do_not_requery() {
        let inner = LocalKernelRegistry::new();
        inner.add_kernel(python3());
        let registry = CountingRegistry::new(inner);

        let status_bar = RecordingStatusBar::new();
        let (_editor_tx, editor_rx) = watch::channel(Some("nb-1".to_string()));
        let _wiring = KernelStatusBar::spawn(
            registry.clone() as Arc<dyn KernelRegistry>,
            status_bar.clone(),
            editor_rx,
        );
        settle().await;
        let queries_after_initial_render = registry.queries.load(Ordering::Relaxed);

        // A different notebook's binding changes; our entry must not
        // trigger a registry query.
        registry.select("nb-other", "python3").unwrap();
        settle().await;
        assert_eq!(
            registry.queries.load(Ordering::Relaxed),
            queries_after_initial_render
        );
    }

    #[tokio::test]
    async fn test_selection_entry_renders_position() {
        let status_bar = RecordingStatusBar::new();
        let (selection_tx, selection_rx) = watch::channel(None);
        let _wiring = SelectionStatusBar::spawn(status_bar.clone(), selection_rx);
        settle().await;

        assert!(status_bar.text_of(SELECTION_STATUS_ID).is_none());

        selection_tx
            .send(Some(SelectionSnapshot {
                notebook_id: "nb-1".to_string(),
                cell_index: 2,
                cell_count: 12,
            }))
            .unwrap();
        settle().await;
        assert_eq!(
            status_bar.text_of(SELECTION_STATUS_ID),
            Some("Cell 3 of 12".to_string())
        );

        selection_tx.send(None).unwrap();
        settle().await;
        assert!(status_bar.text_of(SELECTION_STATUS_ID).is_none());
    }

    #[tokio::test]
    async fn test_empty_notebook_hides_selection_entry() {
        let status_bar = RecordingStatusBar::new();
        let (selection_tx, selection_rx) = watch::channel(Some(SelectionSnapshot {
            notebook_id: "nb-1".to_string(),
            cell_index: 0,
            cell_count: 0,
        }));
        let _wiring = SelectionStatusBar::spawn(status_bar.clone(), selection_rx);
        settle().await;

        assert!(status_bar.text_of(SELECTION_STATUS_ID).is_none());
        drop(selection_tx);
    }

    #[tokio::test]
    async fn test_drop_aborts_pump() {
        let registry: Arc<dyn KernelRegistry> = Arc::new(LocalKernelRegistry::new());
        let status_bar = RecordingStatusBar::new();
        let (editor_tx, editor_rx) = watch::channel(Some("nb-1".to_string()));

        let wiring = KernelStatusBar::spawn(registry, status_bar.clone(), editor_rx);
        settle().await;
        drop(wiring);
        settle().await;

        // Updates after the drop must not re-render. The pump owned the
        // receiver, so the send may fail outright once it is gone.
        let before = status_bar.text_of(KERNEL_STATUS_ID);
        let _ = editor_tx.send(None);
        settle().await;
        assert_eq!(status_bar.text_of(KERNEL_STATUS_ID), before);
    }
}
