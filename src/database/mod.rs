//! # Database Module
//!
//! The user-facing layer: the [`Context`] façade, typed [`TableHandle`]s,
//! shared [`Tracked`] entity handles, and the per-context change tracker
//! that commit drains.

mod change_tracker;
mod context;
mod table;
mod tracked;

pub(crate) use change_tracker::ChangeTracker;

pub use context::{Context, ContextBuilder};
pub use table::TableHandle;
pub use tracked::Tracked;
