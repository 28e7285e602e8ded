//! Project id to live connection resolution.
//!
//! Each project gets its own lazily created adapter (and pool), kept for
//! the life of the resolver. The map lock is held only for the lookup, so
//! creating one project's adapter never blocks another project's calls,
//! and no lock is held across a database round trip.

use crate::adapters::{DatabaseAdapter, create_adapter};
use crate::config::{ProjectConfig, ProjectRegistry};
use crate::error::GateError;
use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError};
use thiserror::Error;
use tokio::sync::OnceCell;

/// Builds the adapter for one project.
pub type AdapterFactory =
    Arc<dyn Fn(&ProjectConfig) -> crate::Result<Arc<dyn DatabaseAdapter>> + Send + Sync>;

type AdapterSlot = Arc<OnceCell<Arc<dyn DatabaseAdapter>>>;

/// Why a project id could not be resolved.
#[derive(Debug, Error)]
pub enum ResolveError {
    /// No project id given, or only whitespace
    #[error("No project specified")]
    ProjectMissing { available_projects: Vec<String> },

    #[error("Project '{project}' is not configured")]
    ProjectNotFound {
        project: String,
        available_projects: Vec<String>,
    },

    /// The project's adapter could not be created
    #[error("Failed to open project '{project}'")]
    Connection {
        project: String,
        #[source]
        source: GateError,
    },
}

/// A live handle bound to exactly one project.
#[derive(Clone)]
pub struct ResolvedConnection {
    pub project: Arc<ProjectConfig>,
    pub adapter: Arc<dyn DatabaseAdapter>,
}

impl std::fmt::Debug for ResolvedConnection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ResolvedConnection")
            .field("project", &self.project.id())
            .field("database_type", &self.project.database_type())
            .finish_non_exhaustive()
    }
}

/// Maps project ids to per-project adapters.
pub struct ConnectionResolver {
    registry: Arc<ProjectRegistry>,
    slots: Mutex<HashMap<String, AdapterSlot>>,
    factory: AdapterFactory,
}

impl std::fmt::Debug for ConnectionResolver {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConnectionResolver")
            .field("projects", &self.registry.project_ids())
            .finish_non_exhaustive()
    }
}

impl ConnectionResolver {
    /// Creates a resolver that builds adapters with [`create_adapter`].
    pub fn new(registry: ProjectRegistry) -> Self {
        Self::with_factory(registry, Arc::new(create_adapter))
    }

    /// Creates a resolver with a custom adapter factory.
    pub fn with_factory(registry: ProjectRegistry, factory: AdapterFactory) -> Self {
        Self {
            registry: Arc::new(registry),
            slots: Mutex::new(HashMap::new()),
            factory,
        }
    }

    pub fn registry(&self) -> &ProjectRegistry {
        &self.registry
    }

    /// Known project ids, sorted.
    pub fn list_available_projects(&self) -> Vec<String> {
        self.registry.project_ids()
    }

    /// Resolves `project_id` to its adapter, creating it on first use.
    ///
    /// # Errors
    /// - `ProjectMissing` when the id is absent, empty or whitespace
    /// - `ProjectNotFound` when the id is not configured
    /// - `Connection` when the adapter cannot be created
    pub async fn resolve(
        &self,
        project_id: Option<&str>,
    ) -> Result<ResolvedConnection, ResolveError> {
        let Some(id) = project_id.filter(|id| !id.trim().is_empty()) else {
            return Err(ResolveError::ProjectMissing {
                available_projects: self.list_available_projects(),
            });
        };

        let Some(config) = self.registry.get(id) else {
            tracing::debug!("Rejected unknown project '{}'", id);
            return Err(ResolveError::ProjectNotFound {
                project: id.to_string(),
                available_projects: self.list_available_projects(),
            });
        };

        let slot = self.slot(id);
        let adapter = slot
            .get_or_try_init(|| async {
                tracing::info!("Opening {}", config);
                (self.factory)(&config)
            })
            .await
            .map_err(|source| {
                tracing::error!("Failed to open project '{}': {}", id, source);
                ResolveError::Connection {
                    project: id.to_string(),
                    source,
                }
            })?
            .clone();

        Ok(ResolvedConnection {
            project: config,
            adapter,
        })
    }

    /// Resolves a project and runs its connectivity check.
    ///
    /// # Errors
    /// Returns the resolve failure, or the connection failure as
    /// `ResolveError::Connection`
    pub async fn check(&self, project_id: &str) -> Result<ResolvedConnection, ResolveError> {
        let resolved = self.resolve(Some(project_id)).await?;
        resolved
            .adapter
            .test_connection()
            .await
            .map_err(|source| ResolveError::Connection {
                project: project_id.to_string(),
                source,
            })?;
        Ok(resolved)
    }

    /// Number of projects whose adapter has been created.
    pub fn open_projects(&self) -> usize {
        self.lock_slots()
            .values()
            .filter(|slot| slot.initialized())
            .count()
    }

    /// Closes every created adapter.
    pub async fn close_all(&self) {
        let adapters: Vec<Arc<dyn DatabaseAdapter>> = self
            .lock_slots()
            .values()
            .filter_map(|slot| slot.get().cloned())
            .collect();

        for adapter in adapters {
            adapter.close().await;
        }
    }

    fn slot(&self, id: &str) -> AdapterSlot {
        self.lock_slots().entry(id.to_string()).or_default().clone()
    }

    fn lock_slots(&self) -> std::sync::MutexGuard<'_, HashMap<String, AdapterSlot>> {
        // The map holds no invariants a panicking holder could break
        self.slots.lock().unwrap_or_else(PoisonError::into_inner)
    }
}
