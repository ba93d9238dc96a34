//! Container facade.
//!
//! The [`Container`] is what application code holds: it composes the
//! filesystem, process and event clients over one connection, and is the
//! only thing allowed to tear that connection down.
//!
//! # Modules
//!
//! | Module | Description |
//! |--------|-------------|
//! | `builder` | [`ContainerBuilder`] fluent configuration |
//! | `config` | [`ContainerConfig`] and defaults |
//! | `core` | [`Container`] |
//! | `events` | Port / server-ready event bus |

// ============================================================================
// Submodules
// ============================================================================

/// Fluent configuration.
pub mod builder;

/// Boot configuration.
pub mod config;

/// The booted container.
mod core;

/// Container-level event bus.
pub mod events;

// ============================================================================
// Re-exports
// ============================================================================

pub use builder::ContainerBuilder;
pub use config::ContainerConfig;
pub use core::{Container, RemoteContainerFactory};
pub use events::{ContainerEvent, ContainerEventKind};
