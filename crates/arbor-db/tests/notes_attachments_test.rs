//! Notes, attachments, and their removal when hierarchy subtrees are deleted.

use arbor_db::test_fixtures::{build_chain, TestDatabase};
use arbor_db::{
    AttachmentRepository, CreateNoteRequest, Error, HierarchyRepository, NoteRepository,
    UpdateNoteRequest,
};
use uuid::Uuid;

async fn setup() -> TestDatabase {
    dotenvy::dotenv().ok();
    TestDatabase::new().await
}

fn note_on(node_id: Uuid, content: &str) -> CreateNoteRequest {
    CreateNoteRequest {
        node_id,
        content: content.to_string(),
        tags: None,
    }
}

fn blob_on_disk(test_db: &TestDatabase, storage_path: &str) -> bool {
    test_db.storage_dir.join(storage_path).exists()
}

#[tokio::test]
#[ignore] // Requires DATABASE_URL
async fn test_note_crud() {
    let test_db = setup().await;
    let notes = &test_db.db.notes;
    let chain = build_chain(&test_db.db).await;

    let note = notes
        .create(CreateNoteRequest {
            node_id: chain.episode.id,
            content: "Patient presents with chest pain.".to_string(),
            tags: Some(vec![
                " Urgent ".to_string(),
                "Assessment".to_string(),
                "Urgent".to_string(),
                "".to_string(),
            ]),
        })
        .await
        .unwrap();
    assert_eq!(note.node_type, chain.episode.node_type);
    assert_eq!(note.tags, vec!["Urgent", "Assessment"]);

    let fetched = notes.get(note.id).await.unwrap().unwrap();
    assert_eq!(fetched, note);

    let updated = notes
        .update(
            note.id,
            UpdateNoteRequest {
                content: None,
                tags: Some(vec!["Follow-up".to_string()]),
            },
        )
        .await
        .unwrap();
    assert_eq!(updated.content, note.content);
    assert_eq!(updated.tags, vec!["Follow-up"]);
    assert!(updated.updated_at >= note.updated_at);

    notes.delete(note.id).await.unwrap();
    assert!(notes.get(note.id).await.unwrap().is_none());
    assert!(matches!(
        notes.delete(note.id).await,
        Err(Error::NoteNotFound(_))
    ));

    test_db.cleanup().await;
}

#[tokio::test]
#[ignore] // Requires DATABASE_URL
async fn test_note_validation() {
    let test_db = setup().await;
    let notes = &test_db.db.notes;
    let chain = build_chain(&test_db.db).await;

    assert!(matches!(
        notes.create(note_on(Uuid::now_v7(), "orphan")).await,
        Err(Error::NodeNotFound(_))
    ));
    assert!(matches!(
        notes.create(note_on(chain.client.id, "   ")).await,
        Err(Error::InvalidArgument(_))
    ));
    assert!(matches!(
        notes
            .update(Uuid::now_v7(), UpdateNoteRequest::default())
            .await,
        Err(Error::NoteNotFound(_))
    ));

    test_db.cleanup().await;
}

#[tokio::test]
#[ignore] // Requires DATABASE_URL
async fn test_list_for_node_newest_first() {
    let test_db = setup().await;
    let notes = &test_db.db.notes;
    let chain = build_chain(&test_db.db).await;

    let first = notes.create(note_on(chain.client.id, "first")).await.unwrap();
    let second = notes.create(note_on(chain.client.id, "second")).await.unwrap();
    notes.create(note_on(chain.team.id, "elsewhere")).await.unwrap();

    let listed: Vec<Uuid> = notes
        .list_for_node(chain.client.id)
        .await
        .unwrap()
        .into_iter()
        .map(|n| n.id)
        .collect();
    assert_eq!(listed, vec![second.id, first.id]);

    assert!(notes.list_for_node(chain.episode.id).await.unwrap().is_empty());
    assert!(notes
        .list_for_node(Uuid::now_v7())
        .await
        .unwrap_err()
        .is_not_found());

    test_db.cleanup().await;
}

#[tokio::test]
#[ignore] // Requires DATABASE_URL
async fn test_attachment_store_and_download() {
    let test_db = setup().await;
    let chain = build_chain(&test_db.db).await;
    let note = test_db
        .db
        .notes
        .create(note_on(chain.episode.id, "ECG attached"))
        .await
        .unwrap();
    let attachments = &test_db.db.attachments;

    let data = b"%PDF-1.7\nECG trace";
    let stored = attachments
        .store(note.id, "../scans/ecg<1>.pdf", None, data)
        .await
        .unwrap();
    assert_eq!(stored.filename, "ecg_1_.pdf");
    assert_eq!(stored.original_filename, "../scans/ecg<1>.pdf");
    assert_eq!(stored.content_type, "application/pdf");
    assert_eq!(stored.size_bytes, data.len() as i64);
    assert!(stored.content_hash.starts_with("blake3:"));
    assert!(blob_on_disk(&test_db, &stored.storage_path));

    let (bytes, content_type, filename) = attachments.download(stored.id).await.unwrap();
    assert_eq!(bytes, data);
    assert_eq!(content_type, "application/pdf");
    assert_eq!(filename, "ecg_1_.pdf");

    let listed = attachments.list_for_note(note.id).await.unwrap();
    assert_eq!(listed, vec![stored.clone()]);

    attachments.delete(stored.id).await.unwrap();
    assert!(!blob_on_disk(&test_db, &stored.storage_path));
    assert!(matches!(
        attachments.download(stored.id).await,
        Err(Error::AttachmentNotFound(_))
    ));

    test_db.cleanup().await;
}

#[tokio::test]
#[ignore] // Requires DATABASE_URL
async fn test_attachment_rejections() {
    let test_db = setup().await;
    let chain = build_chain(&test_db.db).await;
    let note = test_db
        .db
        .notes
        .create(note_on(chain.episode.id, "uploads"))
        .await
        .unwrap();
    let attachments = test_db.db.attachments.clone().with_max_upload_bytes(16);

    assert!(matches!(
        attachments.store(Uuid::now_v7(), "a.txt", None, b"hi").await,
        Err(Error::NoteNotFound(_))
    ));
    assert!(matches!(
        attachments.store(note.id, "big.txt", None, &[b'a'; 32]).await,
        Err(Error::InvalidArgument(_))
    ));
    assert!(matches!(
        attachments.store(note.id, "run.exe", None, b"MZ").await,
        Err(Error::InvalidArgument(_))
    ));
    assert!(attachments.list_for_note(note.id).await.unwrap().is_empty());

    test_db.cleanup().await;
}

#[tokio::test]
#[ignore] // Requires DATABASE_URL
async fn test_note_delete_removes_attachment_blobs() {
    let test_db = setup().await;
    let chain = build_chain(&test_db.db).await;
    let note = test_db
        .db
        .notes
        .create(note_on(chain.client.id, "with files"))
        .await
        .unwrap();
    let stored = test_db
        .db
        .attachments
        .store(note.id, "plan.txt", Some("text/plain"), b"care plan")
        .await
        .unwrap();

    test_db.db.notes.delete(note.id).await.unwrap();
    assert!(test_db.db.attachments.get(stored.id).await.unwrap().is_none());
    assert!(!blob_on_disk(&test_db, &stored.storage_path));

    test_db.cleanup().await;
}

#[tokio::test]
#[ignore] // Requires DATABASE_URL
async fn test_subtree_delete_cascades_to_notes_and_blobs() {
    let test_db = setup().await;
    let db = &test_db.db;
    let chain = build_chain(db).await;

    let kept = db
        .notes
        .create(note_on(chain.organisation.id, "hospital-wide"))
        .await
        .unwrap();
    let doomed = db
        .notes
        .create(note_on(chain.episode.id, "visit note"))
        .await
        .unwrap();
    let kept_file = db
        .attachments
        .store(kept.id, "policy.txt", None, b"policy")
        .await
        .unwrap();
    let doomed_file = db
        .attachments
        .store(doomed.id, "ecg.txt", None, b"trace")
        .await
        .unwrap();

    let deleted = db.hierarchy.delete_subtree(chain.team.id).await.unwrap();
    assert_eq!(deleted, 3);

    assert!(db.notes.get(doomed.id).await.unwrap().is_none());
    assert!(db.attachments.get(doomed_file.id).await.unwrap().is_none());
    assert!(!blob_on_disk(&test_db, &doomed_file.storage_path));

    assert!(db.notes.get(kept.id).await.unwrap().is_some());
    assert!(db.attachments.get(kept_file.id).await.unwrap().is_some());
    assert!(blob_on_disk(&test_db, &kept_file.storage_path));

    test_db.cleanup().await;
}
