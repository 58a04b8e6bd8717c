//! Demo data for a fresh installation: two hospitals with their departments,
//! patients, visits and a handful of notes.

use tracing::info;

use arbor_core::{CreateNoteRequest, NodeType, Result};

use crate::Database;

/// `(key, type, name, parent key)` in creation order.
const DEMO_NODES: &[(&str, NodeType, &str, Option<&str>)] = &[
    ("org-1", NodeType::Organisation, "City General Hospital", None),
    ("org-2", NodeType::Organisation, "Regional Medical Center", None),
    ("team-1", NodeType::Team, "Cardiology Department", Some("org-1")),
    ("team-2", NodeType::Team, "Emergency Department", Some("org-1")),
    ("team-3", NodeType::Team, "Pediatrics", Some("org-2")),
    ("client-1", NodeType::Client, "John Smith", Some("team-1")),
    ("client-2", NodeType::Client, "Sarah Johnson", Some("team-1")),
    ("client-3", NodeType::Client, "Michael Brown", Some("team-2")),
    ("episode-1", NodeType::Episode, "Chest Pain Assessment", Some("client-1")),
    ("episode-2", NodeType::Episode, "Follow-up Consultation", Some("client-1")),
    ("episode-3", NodeType::Episode, "Routine Checkup", Some("client-2")),
];

/// `(node key, content, tags)`.
const DEMO_NOTES: &[(&str, &str, &[&str])] = &[
    (
        "episode-1",
        "Patient presents with chest pain. ECG shows normal sinus rhythm. Vital signs stable.",
        &["Urgent", "Assessment"],
    ),
    (
        "team-1",
        "Cardiology department meeting scheduled for next week to discuss new protocols.",
        &["Follow-up"],
    ),
    (
        "client-1",
        "Patient education provided regarding heart-healthy lifestyle choices.",
        &[],
    ),
    (
        "episode-2",
        "Prescribed Lisinopril 10mg daily for hypertension. Patient advised to monitor blood pressure at home.",
        &["Medication", "Follow-up"],
    ),
    (
        "team-2",
        "Emergency department protocol updated for triage procedures. All staff to review by end of week.",
        &["Urgent"],
    ),
    (
        "client-2",
        "Patient reports improvement in symptoms. Blood pressure readings within normal range.",
        &["Assessment"],
    ),
    (
        "episode-3",
        "Routine checkup completed. All vital signs normal. Next appointment scheduled in 6 months.",
        &[],
    ),
    (
        "client-3",
        "Patient experiencing severe allergic reaction. Administered epinephrine. Monitoring closely.",
        &["Urgent", "Medication"],
    ),
    (
        "team-3",
        "New pediatric guidelines received from health ministry. Training session to be organized.",
        &["Follow-up"],
    ),
    (
        "org-1",
        "Patient discharged with home care instructions. Family members briefed on care procedures.",
        &[],
    ),
];

/// Outcome of [`seed_demo_data`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SeedReport {
    pub nodes_created: usize,
    pub notes_created: usize,
}

impl SeedReport {
    pub fn is_empty(&self) -> bool {
        self.nodes_created == 0 && self.notes_created == 0
    }
}

/// Insert the demo hierarchy and notes when the hierarchy is empty.
///
/// Everything is written in one transaction. The node table is locked against
/// concurrent writers for its duration, so two servers starting at once seed
/// at most once.
pub async fn seed_demo_data(db: &Database) -> Result<SeedReport> {
    let mut tx = db.pool().begin().await?;

    sqlx::query("LOCK TABLE hierarchy_node IN SHARE ROW EXCLUSIVE MODE")
        .execute(&mut *tx)
        .await?;

    let existing: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM hierarchy_node")
        .fetch_one(&mut *tx)
        .await?;
    if existing > 0 {
        info!(
            subsystem = "db",
            component = "seed",
            op = "seed_demo_data",
            existing_nodes = existing,
            "Hierarchy not empty, skipping demo data"
        );
        return Ok(SeedReport::default());
    }

    let mut ids = std::collections::HashMap::with_capacity(DEMO_NODES.len());
    for (key, node_type, name, parent) in DEMO_NODES {
        let parent_id = parent.and_then(|p| ids.get(p).copied());
        let node = db
            .hierarchy
            .create_node_tx(&mut tx, *node_type, name, parent_id)
            .await?;
        ids.insert(*key, node.id);
    }

    let mut notes_created = 0;
    for (key, content, tags) in DEMO_NOTES {
        let Some(node_id) = ids.get(key).copied() else {
            continue;
        };
        db.notes
            .create_tx(
                &mut tx,
                CreateNoteRequest {
                    node_id,
                    content: content.to_string(),
                    tags: Some(tags.iter().map(|t| t.to_string()).collect()),
                },
            )
            .await?;
        notes_created += 1;
    }

    tx.commit().await?;

    let report = SeedReport {
        nodes_created: ids.len(),
        notes_created,
    };
    info!(
        subsystem = "db",
        component = "seed",
        op = "seed_demo_data",
        nodes_created = report.nodes_created,
        notes_created = report.notes_created,
        "Seeded demo data"
    );
    Ok(report)
}
