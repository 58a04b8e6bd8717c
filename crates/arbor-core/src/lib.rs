//! # arbor-core
//!
//! Core types, traits, and closure-table algorithms for Arbor, a note-taking
//! service over an organisation → team → client → episode hierarchy.
//!
//! This crate provides the data structures, repository traits and error type
//! that the other Arbor crates depend on, plus the database-free parts of the
//! closure-table bookkeeping.

pub mod closure;
pub mod error;
pub mod file_safety;
pub mod logging;
pub mod models;
pub mod traits;
pub mod uuid_utils;

// Re-export commonly used types at crate root
pub use closure::{assemble_tree, edges_for_new_node, verify_closure, ClosureTable};
pub use error::{Error, Result};
pub use file_safety::{check_upload, detect_content_type, is_valid_mime_type, sanitize_filename};
pub use models::*;
pub use traits::*;
pub use uuid_utils::{is_v7, new_v7};
