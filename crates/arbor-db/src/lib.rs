//! # arbor-db
//!
//! PostgreSQL storage layer for Arbor.
//!
//! This crate provides:
//! - Connection pool management
//! - The closure-table hierarchy repository
//! - Note and attachment repositories
//! - Filesystem blob storage for attachments
//! - Demo seed data
//!
//! ## Example
//!
//! ```rust,ignore
//! use std::sync::Arc;
//! use arbor_db::{Database, FilesystemBackend, HierarchyRepository, NodeType};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let storage = Arc::new(FilesystemBackend::new("/var/lib/arbor"));
//!     let db = Database::connect("postgres://localhost/arbor", storage).await?;
//!     db.migrate().await?;
//!
//!     let org = db.hierarchy.create_node(NodeType::Organisation, "City General", None).await?;
//!     let team = db.hierarchy.create_node(NodeType::Team, "Cardiology", Some(org.id)).await?;
//!     println!("{:?}", db.hierarchy.get_ancestors(team.id).await?);
//!     Ok(())
//! }
//! ```

use std::sync::Arc;

pub mod attachments;
pub mod file_storage;
pub mod hierarchy;
pub mod notes;
pub mod pool;
pub mod seed;

// Always compiled so integration tests (in tests/) can use it.
pub mod test_fixtures;

// Re-export core types
pub use arbor_core::*;

pub use attachments::{PgAttachmentRepository, DEFAULT_MAX_UPLOAD_BYTES};
pub use file_storage::{
    compute_content_hash, generate_storage_path, FilesystemBackend, StorageBackend,
};
pub use hierarchy::{NoteCleanup, PgHierarchyRepository};
pub use notes::PgNoteRepository;
pub use pool::{create_pool, create_pool_with_config, log_pool_metrics, PoolConfig};
pub use seed::{seed_demo_data, SeedReport};

/// Schema migrations under `migrations/` at the workspace root.
pub static MIGRATOR: sqlx::migrate::Migrator = sqlx::migrate!("../../migrations");

/// Combined database context with all repositories.
#[derive(Clone)]
pub struct Database {
    /// The underlying connection pool.
    pub pool: sqlx::Pool<sqlx::Postgres>,
    /// Closure-table hierarchy of organisations, teams, clients, episodes.
    pub hierarchy: PgHierarchyRepository,
    /// Notes hung off hierarchy nodes.
    pub notes: PgNoteRepository,
    /// Note attachments.
    pub attachments: PgAttachmentRepository,
}

impl Database {
    /// Wire the repositories over one pool and one blob backend.
    ///
    /// The note repository doubles as the hierarchy's [`NoteCleanup`], so
    /// deleting a subtree removes its notes, attachment rows and blobs.
    pub fn new(pool: sqlx::Pool<sqlx::Postgres>, storage: Arc<dyn StorageBackend>) -> Self {
        let notes = PgNoteRepository::new(pool.clone(), storage.clone());
        let hierarchy =
            PgHierarchyRepository::new(pool.clone()).with_note_cleanup(Arc::new(notes.clone()));
        Self {
            hierarchy,
            notes,
            attachments: PgAttachmentRepository::new(pool.clone(), storage),
            pool,
        }
    }

    /// Set the attachment upload limit.
    pub fn with_max_upload_bytes(mut self, max_upload_bytes: u64) -> Self {
        self.attachments = self.attachments.with_max_upload_bytes(max_upload_bytes);
        self
    }

    /// Create a new Database instance by connecting to the given URL.
    pub async fn connect(url: &str, storage: Arc<dyn StorageBackend>) -> Result<Self> {
        let pool = create_pool(url).await?;
        Ok(Self::new(pool, storage))
    }

    /// Create with custom pool configuration.
    pub async fn connect_with_config(
        url: &str,
        config: PoolConfig,
        storage: Arc<dyn StorageBackend>,
    ) -> Result<Self> {
        let pool = create_pool_with_config(url, config).await?;
        Ok(Self::new(pool, storage))
    }

    /// Run pending migrations.
    #[cfg(feature = "migrations")]
    pub async fn migrate(&self) -> Result<()> {
        MIGRATOR
            .run(&self.pool)
            .await
            .map_err(|e| Error::Database(sqlx::Error::Migrate(Box::new(e))))?;
        Ok(())
    }

    /// Get the underlying connection pool.
    pub fn pool(&self) -> &sqlx::Pool<sqlx::Postgres> {
        &self.pool
    }

    /// Close every pooled connection. Further operations fail with
    /// `Unavailable`.
    pub async fn close(&self) {
        self.pool.close().await;
    }
}
