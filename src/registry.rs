//! Session registry: live sessions of one exporter, receiver or manager.
//!
//! Sessions are indexed by numeric id and by canonical destination name. A
//! shadow id-to-name map is kept so a session whose destination can no
//! longer be queried after a peer-side close can still be evicted by id.

use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::RwLock;
use tracing::{debug, info, warn};

use crate::fabric::{FabricApp, FabricError, FabricSession};
use crate::signal::SignalType;

/// Errors surfaced by registry operations. These indicate caller bugs or a
/// completed shutdown and are never swallowed.
#[derive(Debug, Clone, thiserror::Error)]
pub enum RegistryError {
    #[error("session with id {0} already registered")]
    DuplicateId(u32),

    #[error("session with name {0} already registered")]
    DuplicateName(String),

    #[error("session with id {0} not found")]
    IdNotFound(u32),

    #[error("session with name {0} not found")]
    NameNotFound(String),

    /// The registry was emptied by `delete_all` and accepts no lookups.
    #[error("session registry is not initialized")]
    Uninitialized,

    #[error("missing data")]
    MissingData,

    #[error("session id is not set: {0}")]
    MissingId(FabricError),

    #[error("session name is not set: {0}")]
    MissingName(FabricError),
}

impl RegistryError {
    pub fn is_not_found(&self) -> bool {
        matches!(
            self,
            RegistryError::IdNotFound(_) | RegistryError::NameNotFound(_)
        )
    }
}

/// Outcome of a broadcast.
#[derive(Default)]
pub struct PublishReport {
    /// Sessions that reported the closed condition; callers prune these.
    pub closed: Vec<u32>,
    /// First non-closed publish failure, if any. Sessions after the failing
    /// one were not attempted.
    pub failure: Option<FabricError>,
}

struct Indexes {
    by_id: HashMap<u32, Arc<dyn FabricSession>>,
    by_name: HashMap<String, Arc<dyn FabricSession>>,
    names_by_id: HashMap<u32, String>,
}

impl Indexes {
    fn new() -> Self {
        Self {
            by_id: HashMap::new(),
            by_name: HashMap::new(),
            names_by_id: HashMap::new(),
        }
    }
}

/// Thread-safe map of live sessions, doubly indexed.
pub struct SessionRegistry {
    /// Log label only; the receiver and manager registries carry no signal.
    signal: Option<SignalType>,
    // `None` after delete_all: lookups then report Uninitialized instead of
    // NotFound so callers can tell shutdown from a pruning race.
    inner: RwLock<Option<Indexes>>,
}

impl SessionRegistry {
    pub fn new(signal: Option<SignalType>) -> Self {
        Self {
            signal,
            inner: RwLock::new(Some(Indexes::new())),
        }
    }

    fn signal_label(&self) -> &'static str {
        self.signal.map(|s| s.as_str()).unwrap_or("unknown")
    }

    /// Insert a session into both indexes. Rejects duplicates of either the
    /// id or the canonical name.
    pub async fn add(&self, session: Arc<dyn FabricSession>) -> Result<(), RegistryError> {
        let id = session.session_id().map_err(RegistryError::MissingId)?;
        let name = session
            .destination()
            .map_err(RegistryError::MissingName)?
            .to_string();

        let mut inner = self.inner.write().await;
        let indexes = inner.get_or_insert_with(Indexes::new);

        if indexes.by_id.contains_key(&id) {
            return Err(RegistryError::DuplicateId(id));
        }
        if indexes.by_name.contains_key(&name) {
            return Err(RegistryError::DuplicateName(name));
        }

        indexes.by_id.insert(id, session.clone());
        indexes.by_name.insert(name.clone(), session);
        indexes.names_by_id.insert(id, name);
        Ok(())
    }

    pub async fn get_by_id(&self, id: u32) -> Result<Arc<dyn FabricSession>, RegistryError> {
        let inner = self.inner.read().await;
        let indexes = inner.as_ref().ok_or(RegistryError::Uninitialized)?;
        indexes
            .by_id
            .get(&id)
            .cloned()
            .ok_or(RegistryError::IdNotFound(id))
    }

    pub async fn get_by_name(&self, name: &str) -> Result<Arc<dyn FabricSession>, RegistryError> {
        let inner = self.inner.read().await;
        let indexes = inner.as_ref().ok_or(RegistryError::Uninitialized)?;
        indexes
            .by_name
            .get(name)
            .cloned()
            .ok_or_else(|| RegistryError::NameNotFound(name.to_string()))
    }

    /// Remove a session from both indexes, returning it.
    pub async fn remove_by_id(&self, id: u32) -> Result<Arc<dyn FabricSession>, RegistryError> {
        let mut inner = self.inner.write().await;
        let indexes = inner.as_mut().ok_or(RegistryError::Uninitialized)?;

        let session = indexes
            .by_id
            .remove(&id)
            .ok_or(RegistryError::IdNotFound(id))?;
        // The shadow map locates the name entry even when the session's
        // destination can no longer be queried.
        if let Some(name) = indexes.names_by_id.remove(&id) {
            indexes.by_name.remove(&name);
        }
        Ok(session)
    }

    /// Remove a session from both indexes by its canonical name.
    pub async fn remove_by_name(
        &self,
        name: &str,
    ) -> Result<Arc<dyn FabricSession>, RegistryError> {
        let mut inner = self.inner.write().await;
        let indexes = inner.as_mut().ok_or(RegistryError::Uninitialized)?;

        let session = indexes
            .by_name
            .remove(name)
            .ok_or_else(|| RegistryError::NameNotFound(name.to_string()))?;
        if let Some(id) = indexes
            .names_by_id
            .iter()
            .find(|(_, n)| n.as_str() == name)
            .map(|(id, _)| *id)
        {
            indexes.names_by_id.remove(&id);
            indexes.by_id.remove(&id);
        }
        Ok(session)
    }

    /// Snapshot of the name index's keys. The lock is released before the
    /// caller iterates.
    pub async fn list_names(&self) -> Vec<String> {
        let inner = self.inner.read().await;
        match inner.as_ref() {
            Some(indexes) => indexes.by_name.keys().cloned().collect(),
            None => Vec::new(),
        }
    }

    pub async fn len(&self) -> usize {
        let inner = self.inner.read().await;
        inner.as_ref().map(|indexes| indexes.by_id.len()).unwrap_or(0)
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }

    /// Delete every session against the fabric and empty the registry.
    /// Subsequent lookups report `Uninitialized`. Deletion failures are
    /// logged and skipped. With no app there is nothing to delete against
    /// and the registry is left untouched.
    pub async fn delete_all(&self, app: Option<&Arc<dyn FabricApp>>) {
        let Some(app) = app else {
            warn!(
                signal_type = self.signal_label(),
                "cannot delete sessions, app is not available"
            );
            return;
        };

        let mut inner = self.inner.write().await;
        let Some(indexes) = inner.take() else { return };

        for (id, session) in &indexes.by_id {
            if let Err(err) = app.delete_session_and_wait(session).await {
                warn!(session_id = id, error = %err, "failed to delete session");
            }
        }

        info!(
            signal_type = self.signal_label(),
            "all sessions deleted for signal"
        );
    }

    /// Publish a payload to every live session.
    ///
    /// The key set is snapshotted under the read lock and the publish loop
    /// runs unlocked; sessions removed concurrently are skipped. Sessions
    /// that report the closed condition are collected for pruning; the
    /// first other failure stops the loop and is carried in the report.
    pub async fn publish_to_all(&self, payload: &[u8]) -> Result<PublishReport, RegistryError> {
        if payload.is_empty() {
            return Err(RegistryError::MissingData);
        }

        let ids: Vec<u32> = {
            let inner = self.inner.read().await;
            match inner.as_ref() {
                Some(indexes) => indexes.by_id.keys().copied().collect(),
                // Emptied registry: nothing to publish to.
                None => return Ok(PublishReport::default()),
            }
        };

        let mut report = PublishReport::default();
        for id in ids {
            let session = {
                let inner = self.inner.read().await;
                match inner.as_ref().and_then(|indexes| indexes.by_id.get(&id)) {
                    Some(session) => session.clone(),
                    // Removed while we were publishing; skip it.
                    None => continue,
                }
            };

            match session.publish_and_wait(payload).await {
                Ok(()) => {
                    debug!(
                        signal_type = self.signal_label(),
                        session_id = id,
                        "published to session"
                    );
                }
                Err(err) if err.is_closed() => {
                    info!(session_id = id, "session closed, marking for removal");
                    report.closed.push(id);
                }
                Err(err) => {
                    report.failure = Some(err);
                    return Ok(report);
                }
            }
        }

        Ok(report)
    }
}
