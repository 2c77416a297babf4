//! VVStudio - project persistence and media management
//!
//! Re-exports all modules for use by binary targets.

// Engine plumbing (background queue, cancellation)
pub mod core;

// Project document, on-disk packages, media
pub mod entities;
pub mod media;
pub mod store;

// App modules
pub mod cli;
pub mod config;
pub mod coordinator;
pub mod error;
pub mod recent;

pub use coordinator::ProjectCoordinator;
pub use entities::{
    Manifest, MediaPolicy, MediaReference, MediaType, ProjectSession, ProjectTemplate, SharedSession,
};
pub use error::{ProjectError, Result};
pub use media::MediaResolver;
pub use store::{ProjectStore, SaveOutcome};
