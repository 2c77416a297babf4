//! Entities module - the project document and its parts
//!
//! - [`Manifest`]: identity, schema version, media policy
//! - [`MediaReference`]: one copied or linked media asset
//! - [`ProjectSession`]: in-memory document with dirty tracking
//! - [`ProjectTemplate`]: starting layouts for new projects

pub mod manifest;
pub mod media_ref;
pub mod session;
pub mod templates;

pub use manifest::{CURRENT_SCHEMA_VERSION, Manifest, MediaPolicy};
pub use media_ref::{MediaReference, MediaType};
pub use session::{
    Components, ProjectSession, SessionSnapshot, SharedSession, read_session, write_session,
};
pub use templates::ProjectTemplate;
