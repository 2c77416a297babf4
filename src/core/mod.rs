//! Core engine modules - background work and cancellation
//!
//! Independent of any particular project; the store and the media resolver
//! build on these.

pub mod cancel;
pub mod workers;

pub use cancel::CancelToken;
pub use workers::BackgroundQueue;
