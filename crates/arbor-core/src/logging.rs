//! Structured logging field name constants for Arbor.
//!
//! All crates use these names for `tracing` fields so log queries can filter
//! on the same keys across subsystems.
//!
//! ## Log Level Contract
//!
//! | Level | Usage |
//! |-------|-------|
//! | ERROR | Degraded service, requires operator attention |
//! | WARN  | Recoverable issue (blob left behind, pool exhausted) |
//! | INFO  | Lifecycle events, hierarchy mutations |
//! | DEBUG | Query results, intermediate counts |
//! | TRACE | Per-row iteration |

// ─── Identity fields ───────────────────────────────────────────────────────

/// Correlation ID propagated from the HTTP request.
pub const REQUEST_ID: &str = "request_id";

/// Subsystem originating the log event.
/// Values: "api", "db", "storage"
pub const SUBSYSTEM: &str = "subsystem";

/// Component within a subsystem.
/// Examples: "hierarchy", "notes", "attachments", "pool"
pub const COMPONENT: &str = "component";

/// Logical operation name.
/// Examples: "create_node", "delete_subtree", "store"
pub const OPERATION: &str = "op";

// ─── Entity fields ─────────────────────────────────────────────────────────

/// Hierarchy node UUID being operated on.
pub const NODE_ID: &str = "node_id";

/// Hierarchy node type.
pub const NODE_TYPE: &str = "node_type";

/// Parent node UUID for creations.
pub const PARENT_ID: &str = "parent_id";

/// Note UUID being operated on.
pub const NOTE_ID: &str = "note_id";

/// Attachment UUID being operated on.
pub const ATTACHMENT_ID: &str = "attachment_id";

// ─── Measurement fields ────────────────────────────────────────────────────

/// Wall-clock duration in milliseconds.
pub const DURATION_MS: &str = "duration_ms";

/// Number of rows returned by a query.
pub const RESULT_COUNT: &str = "result_count";

/// Number of closure edges written or removed.
pub const EDGE_COUNT: &str = "edge_count";

/// Number of hierarchy nodes removed by a cascading delete.
pub const NODES_DELETED: &str = "nodes_deleted";

/// Number of notes removed by a cascading delete.
pub const NOTES_DELETED: &str = "notes_deleted";

/// Blob size in bytes.
pub const SIZE_BYTES: &str = "size_bytes";

// ─── Database fields ───────────────────────────────────────────────────────

/// Number of active connections in the pool.
pub const POOL_SIZE: &str = "pool_size";

/// Number of idle connections in the pool.
pub const POOL_IDLE: &str = "pool_idle";

// ─── Outcome fields ────────────────────────────────────────────────────────

/// Error message when an operation fails.
pub const ERROR_MSG: &str = "error";

#[cfg(test)]
mod tests {
    use super::*;

    const ALL: &[&str] = &[
        REQUEST_ID,
        SUBSYSTEM,
        COMPONENT,
        OPERATION,
        NODE_ID,
        NODE_TYPE,
        PARENT_ID,
        NOTE_ID,
        ATTACHMENT_ID,
        DURATION_MS,
        RESULT_COUNT,
        EDGE_COUNT,
        NODES_DELETED,
        NOTES_DELETED,
        SIZE_BYTES,
        POOL_SIZE,
        POOL_IDLE,
        ERROR_MSG,
    ];

    #[test]
    fn test_field_names_are_snake_case() {
        for name in ALL {
            assert!(
                name.chars().all(|c| c.is_ascii_lowercase() || c == '_'),
                "{} is not snake_case",
                name
            );
        }
    }

    #[test]
    fn test_field_names_are_unique() {
        let mut seen = std::collections::HashSet::new();
        for name in ALL {
            assert!(seen.insert(*name), "duplicate field name {}", name);
        }
    }
}
