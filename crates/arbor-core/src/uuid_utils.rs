//! UUIDv7 identifiers.
//!
//! Every node, note and attachment id is a UUIDv7. The leading 48 bits are a
//! millisecond timestamp, so ids sort by creation time and a freshly
//! allocated id never collides with one handed out earlier, including ids of
//! deleted nodes.

use uuid::Uuid;

/// Generate a new UUIDv7 identifier.
#[inline]
pub fn new_v7() -> Uuid {
    Uuid::now_v7()
}

/// Check if a UUID is version 7.
#[inline]
pub fn is_v7(uuid: &Uuid) -> bool {
    uuid.get_version_num() == 7
}
