//! Application context: configuration plus the capabilities every
//! operation needs (text generation, embeddings, the vector index).
//!
//! The context is constructed explicitly and passed down, never reached
//! for through globals, so tests can assemble one with in-process fake
//! providers and a throwaway store.

use anyhow::{Context as _, Result};
use sqlx::SqlitePool;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use crate::config::{load_config, Config};
use crate::db;
use crate::embedding::{create_embedder, Embedder};
use crate::generation::{create_generator, TextGenerator};
use crate::index::VectorIndex;
use crate::migrate;
use crate::tracker::ChangeTracker;

pub struct AppContext {
    pub config: Config,
    pub project_root: PathBuf,
    pub generator: Arc<dyn TextGenerator>,
    pub embedder: Arc<dyn Embedder>,
    pub index: VectorIndex,
}

impl AppContext {
    /// Load config, open the context store, and instantiate the configured
    /// providers for a project rooted at `project_root`.
    pub async fn initialize(project_root: &Path) -> Result<Self> {
        let project_root = project_root
            .canonicalize()
            .with_context(|| format!("project root not found: {}", project_root.display()))?;

        let config = load_config(&project_root)?;
        let generator: Arc<dyn TextGenerator> = Arc::from(create_generator(&config.generation)?);
        let embedder: Arc<dyn Embedder> = Arc::from(create_embedder(&config.embedding)?);

        let index_dir = project_root.join(&config.index.dir);
        let pool = db::connect(&index_dir).await?;
        migrate::run_migrations(&pool).await?;

        Ok(Self {
            config,
            project_root,
            generator,
            embedder,
            index: VectorIndex::new(pool),
        })
    }

    /// Assemble a context from parts. Used by tests to inject fake
    /// providers and an in-memory store.
    pub fn with_providers(
        project_root: PathBuf,
        config: Config,
        generator: Arc<dyn TextGenerator>,
        embedder: Arc<dyn Embedder>,
        pool: SqlitePool,
    ) -> Self {
        Self {
            config,
            project_root,
            generator,
            embedder,
            index: VectorIndex::new(pool),
        }
    }

    /// Change tracker over the same store as the index, so snapshot commits
    /// and index writes share one database.
    pub fn tracker(&self) -> ChangeTracker {
        ChangeTracker::new(self.index.pool().clone())
    }

    /// Absolute path of the generated-docs directory.
    pub fn docs_dir(&self) -> PathBuf {
        self.project_root.join(&self.config.index.docs_dir)
    }
}
