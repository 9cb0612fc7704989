//! In-process fabric backend.
//!
//! Apps, channels and sessions live in one process; publishes are delivered
//! to the other members' inboxes directly. This backend drives single-node
//! loopback deployments and the test suite. Multi-node substrates implement
//! the same traits against their own transport.

use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicBool, AtomicU32, AtomicU64, Ordering};
use std::sync::{Arc, Weak};
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::{Mutex, Notify};
use tracing::debug;

use super::auth::{IdentityProviderConfig, IdentityVerifierConfig};
use super::{
    ClientConfig, Direction, Fabric, FabricApp, FabricError, FabricSession, Result, SessionOptions,
};
use crate::name::Name;

/// Shared state between fabric, apps and session handles.
struct Router {
    apps: Mutex<HashMap<Name, Weak<MemoryApp>>>,
    sessions: Mutex<HashMap<u32, Weak<MemorySession>>>,
    next_session: AtomicU32,
}

/// In-process fabric.
pub struct MemoryFabric {
    router: Arc<Router>,
    next_connection: AtomicU64,
    initialized: AtomicBool,
}

impl MemoryFabric {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            router: Arc::new(Router {
                apps: Mutex::new(HashMap::new()),
                sessions: Mutex::new(HashMap::new()),
                next_session: AtomicU32::new(1),
            }),
            next_connection: AtomicU64::new(1),
            initialized: AtomicBool::new(false),
        })
    }

    /// Mark every session of `destination` closed, as a peer dropping the
    /// channel would. Test hook and administrative escape hatch.
    pub async fn close_channel(&self, destination: &Name) {
        let sessions = self.router.sessions.lock().await;
        for session in sessions.values().filter_map(Weak::upgrade) {
            if &session.group.destination == destination {
                session.group.closed.store(true, Ordering::Release);
                session.notify.notify_one();
            }
        }
    }
}

#[async_trait]
impl Fabric for MemoryFabric {
    fn initialize(&self) {
        self.initialized.store(true, Ordering::Release);
    }

    async fn connect(&self, config: &ClientConfig) -> Result<u64> {
        debug!(endpoint = %config.endpoint, "memory fabric connect");
        Ok(self.next_connection.fetch_add(1, Ordering::Relaxed))
    }

    async fn create_app(
        &self,
        name: &Name,
        _provider: IdentityProviderConfig,
        _verifier: IdentityVerifierConfig,
        direction: Direction,
    ) -> Result<Arc<dyn FabricApp>> {
        let app = Arc::new_cyclic(|weak| MemoryApp {
            name: name.clone(),
            direction,
            router: self.router.clone(),
            self_ref: weak.clone(),
            pending: Mutex::new(VecDeque::new()),
            pending_notify: Notify::new(),
            routes: Mutex::new(Vec::new()),
            destroyed: AtomicBool::new(false),
        });
        Ok(app)
    }
}

/// One channel's shared group state.
struct GroupState {
    destination: Name,
    mls_enabled: bool,
    closed: AtomicBool,
    members: Mutex<Vec<Member>>,
}

struct Member {
    name: Name,
    /// Delivery handle. `None` for invited participants with no local app.
    handle: Option<Weak<MemorySession>>,
}

/// In-process app endpoint.
pub struct MemoryApp {
    name: Name,
    direction: Direction,
    router: Arc<Router>,
    self_ref: Weak<MemoryApp>,
    pending: Mutex<VecDeque<Arc<MemorySession>>>,
    pending_notify: Notify,
    routes: Mutex<Vec<(Name, u64)>>,
    destroyed: AtomicBool,
}

impl MemoryApp {
    pub fn direction(&self) -> Direction {
        self.direction
    }
}

#[async_trait]
impl FabricApp for MemoryApp {
    async fn subscribe(&self, name: &Name, _connection_id: u64) -> Result<()> {
        if self.destroyed.load(Ordering::Acquire) {
            return Err(FabricError::Subscribe("app destroyed".to_string()));
        }
        let mut apps = self.router.apps.lock().await;
        apps.insert(name.clone(), self.self_ref.clone());
        Ok(())
    }

    async fn set_route(&self, name: &Name, connection_id: u64) -> Result<()> {
        let mut routes = self.routes.lock().await;
        routes.push((name.clone(), connection_id));
        Ok(())
    }

    async fn create_session_and_wait(
        &self,
        options: SessionOptions,
        destination: &Name,
    ) -> Result<Arc<dyn FabricSession>> {
        if self.destroyed.load(Ordering::Acquire) {
            return Err(FabricError::CreateSession("app destroyed".to_string()));
        }

        let group = Arc::new(GroupState {
            destination: destination.clone(),
            mls_enabled: options.mls_enabled,
            closed: AtomicBool::new(false),
            members: Mutex::new(Vec::new()),
        });

        let session = new_handle(&self.router, group.clone(), self.name.clone()).await;
        group.members.lock().await.push(Member {
            name: self.name.clone(),
            handle: Some(Arc::downgrade(&session)),
        });

        debug!(destination = %destination, session_id = session.id, "created group session");
        Ok(session)
    }

    async fn listen_for_session(&self, timeout: Duration) -> Result<Arc<dyn FabricSession>> {
        let deadline = tokio::time::Instant::now() + timeout;
        loop {
            {
                let mut pending = self.pending.lock().await;
                if let Some(session) = pending.pop_front() {
                    return Ok(session);
                }
            }
            if self.destroyed.load(Ordering::Acquire) {
                return Err(FabricError::Receive("app destroyed".to_string()));
            }
            tokio::select! {
                _ = self.pending_notify.notified() => {}
                _ = tokio::time::sleep_until(deadline) => return Err(FabricError::Timeout),
            }
        }
    }

    async fn delete_session_and_wait(&self, session: &Arc<dyn FabricSession>) -> Result<()> {
        let id = session.session_id()?;
        let handle = {
            let sessions = self.router.sessions.lock().await;
            sessions.get(&id).and_then(Weak::upgrade)
        };

        // Already gone: deletion is idempotent.
        let Some(handle) = handle else { return Ok(()) };

        handle.detach().await;
        self.router.sessions.lock().await.remove(&id);
        Ok(())
    }

    async fn destroy(&self) {
        self.destroyed.store(true, Ordering::Release);
        self.pending_notify.notify_one();

        let mut apps = self.router.apps.lock().await;
        apps.retain(|_, weak| {
            weak.upgrade()
                .map(|app| !std::ptr::eq(Arc::as_ptr(&app), self))
                .unwrap_or(false)
        });
    }
}

async fn new_handle(router: &Arc<Router>, group: Arc<GroupState>, owner: Name) -> Arc<MemorySession> {
    let id = router.next_session.fetch_add(1, Ordering::Relaxed);
    let session = Arc::new(MemorySession {
        id,
        router: router.clone(),
        group,
        owner,
        detached: AtomicBool::new(false),
        inbox: Mutex::new(VecDeque::new()),
        notify: Notify::new(),
    });
    router
        .sessions
        .lock()
        .await
        .insert(id, Arc::downgrade(&session));
    session
}

/// One member's handle onto a group session.
pub struct MemorySession {
    id: u32,
    router: Arc<Router>,
    group: Arc<GroupState>,
    owner: Name,
    detached: AtomicBool,
    inbox: Mutex<VecDeque<Vec<u8>>>,
    notify: Notify,
}

impl std::fmt::Debug for MemorySession {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MemorySession")
            .field("id", &self.id)
            .field("owner", &self.owner)
            .finish()
    }
}

impl MemorySession {
    pub fn mls_enabled(&self) -> bool {
        self.group.mls_enabled
    }

    pub fn owner(&self) -> &Name {
        &self.owner
    }

    fn is_terminal(&self) -> bool {
        self.group.closed.load(Ordering::Acquire) || self.detached.load(Ordering::Acquire)
    }

    async fn detach(&self) {
        self.detached.store(true, Ordering::Release);
        self.notify.notify_one();

        let mut members = self.group.members.lock().await;
        members.retain(|member| {
            member
                .handle
                .as_ref()
                .map(|weak| !std::ptr::eq(weak.as_ptr(), self))
                .unwrap_or(true)
        });
    }
}

#[async_trait]
impl FabricSession for MemorySession {
    fn session_id(&self) -> Result<u32> {
        Ok(self.id)
    }

    fn destination(&self) -> Result<Name> {
        Ok(self.group.destination.clone())
    }

    async fn invite_and_wait(&self, participant: &Name) -> Result<()> {
        if self.is_terminal() {
            return Err(FabricError::SessionClosed);
        }

        let mut members = self.group.members.lock().await;
        if members.iter().any(|member| &member.name == participant) {
            return Err(FabricError::Invite(format!(
                "{participant} is already a participant"
            )));
        }

        let app = {
            let apps = self.router.apps.lock().await;
            apps.get(participant).and_then(Weak::upgrade)
        };

        match app {
            Some(app) => {
                let handle = new_handle(&self.router, self.group.clone(), participant.clone()).await;
                members.push(Member {
                    name: participant.clone(),
                    handle: Some(Arc::downgrade(&handle)),
                });
                app.pending.lock().await.push_back(handle);
                app.pending_notify.notify_one();
            }
            None => {
                // No local app: membership is recorded, delivery starts when
                // the participant attaches through its own substrate node.
                members.push(Member {
                    name: participant.clone(),
                    handle: None,
                });
            }
        }

        Ok(())
    }

    async fn remove_and_wait(&self, participant: &Name) -> Result<()> {
        let removed = {
            let mut members = self.group.members.lock().await;
            let before = members.len();
            let mut detach_handles = Vec::new();
            members.retain(|member| {
                if &member.name == participant {
                    if let Some(handle) = member.handle.as_ref().and_then(Weak::upgrade) {
                        detach_handles.push(handle);
                    }
                    false
                } else {
                    true
                }
            });
            for handle in detach_handles {
                handle.detached.store(true, Ordering::Release);
                handle.notify.notify_one();
            }
            members.len() < before
        };

        if removed {
            Ok(())
        } else {
            Err(FabricError::Remove(format!(
                "{participant} is not a participant"
            )))
        }
    }

    async fn participants(&self) -> Result<Vec<Name>> {
        let members = self.group.members.lock().await;
        Ok(members.iter().map(|member| member.name.clone()).collect())
    }

    async fn publish_and_wait(&self, payload: &[u8]) -> Result<()> {
        if self.is_terminal() {
            return Err(FabricError::SessionClosed);
        }

        let members = self.group.members.lock().await;
        for member in members.iter() {
            let Some(handle) = member.handle.as_ref().and_then(Weak::upgrade) else {
                continue;
            };
            if std::ptr::eq(Arc::as_ptr(&handle), self) {
                continue;
            }
            handle.inbox.lock().await.push_back(payload.to_vec());
            handle.notify.notify_one();
        }
        Ok(())
    }

    async fn get_message(&self, timeout: Duration) -> Result<Vec<u8>> {
        let deadline = tokio::time::Instant::now() + timeout;
        loop {
            {
                let mut inbox = self.inbox.lock().await;
                if let Some(payload) = inbox.pop_front() {
                    return Ok(payload);
                }
            }
            if self.is_terminal() {
                return Err(FabricError::SessionClosed);
            }
            tokio::select! {
                _ = self.notify.notified() => {}
                _ = tokio::time::sleep_until(deadline) => return Err(FabricError::Timeout),
            }
        }
    }
}
