//! kernel-picker - Kernel selection and editor status wiring for notebook
//! windows.
//!
//! The heavy lifting lives elsewhere: the kernel registry knows which
//! kernels exist, the host window owns the quick-pick and status bar
//! widgets. This crate is the glue between them. It builds the kernel pick
//! list for a notebook, applies the user's choice, and keeps the kernel
//! and cell-selection status entries current as editors and bindings
//! change.

pub mod picker;
pub mod registry;
pub mod status;

pub use picker::{KernelSelector, PickItem, PickOutcome, QuickPick};
pub use registry::{
    KernelDescriptor, KernelEvent, KernelMatch, KernelRegistry, LocalKernelRegistry, SelectError,
};
pub use status::{
    KernelStatusBar, SelectionSnapshot, SelectionStatusBar, StatusBar, StatusEntry,
};
