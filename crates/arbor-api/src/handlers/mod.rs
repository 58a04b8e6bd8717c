//! HTTP handler modules for arbor-api.

pub mod attachments;
pub mod hierarchy;
pub mod notes;
