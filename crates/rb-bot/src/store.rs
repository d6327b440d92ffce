//! In-memory session registries with idle eviction.
//!
//! Every entry gets its own timer task that fires once the entry has been
//! idle for the configured duration, and a periodic sweep catches anything a
//! timer missed. Both use [`is_expired`].

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, Weak};
use std::time::Duration;

use tokio::task::{AbortHandle, JoinHandle};
use tokio::time::Instant;
use uuid::Uuid;

use crate::session::{AdminSession, ChatId, DepositSession, ProvisioningSession, Step};

/// Hook run when an entry is destroyed (cleared, replaced or evicted).
pub trait Evictable: Clone + Send + 'static {
    fn on_evict(&self) {}
}

impl Evictable for ProvisioningSession {
    fn on_evict(&self) {
        self.lifetime.cancel();
    }
}

impl Evictable for AdminSession {}

impl Evictable for DepositSession {}

pub fn is_expired(last_activity: Instant, now: Instant, idle: Duration) -> bool {
    now.saturating_duration_since(last_activity) >= idle
}

struct Entry<S> {
    session: S,
    last_activity: Instant,
    generation: u64,
    timer: AbortHandle,
}

struct Inner<S> {
    entries: HashMap<ChatId, Entry<S>>,
    next_generation: u64,
}

/// Sessions of one kind, at most one per chat.
pub struct SessionRegistry<S> {
    name: &'static str,
    idle: Duration,
    inner: Arc<Mutex<Inner<S>>>,
}

impl<S> Clone for SessionRegistry<S> {
    fn clone(&self) -> Self {
        Self {
            name: self.name,
            idle: self.idle,
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<S: Evictable> SessionRegistry<S> {
    pub fn new(name: &'static str, idle: Duration) -> Self {
        Self {
            name,
            idle,
            inner: Arc::new(Mutex::new(Inner {
                entries: HashMap::new(),
                next_generation: 0,
            })),
        }
    }

    pub fn idle_timeout(&self) -> Duration {
        self.idle
    }

    fn lock(&self) -> MutexGuard<'_, Inner<S>> {
        // Entries hold no invariants a panicking holder could break halfway.
        self.inner.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Insert or replace the session for `chat` and arm its idle timer.
    pub fn set(&self, chat: ChatId, session: S) {
        let replaced = {
            let mut inner = self.lock();
            inner.next_generation += 1;
            let generation = inner.next_generation;
            let timer = self.spawn_timer(chat, generation);
            inner.entries.insert(
                chat,
                Entry {
                    session,
                    last_activity: Instant::now(),
                    generation,
                    timer,
                },
            )
        };

        if let Some(old) = replaced {
            old.timer.abort();
            old.session.on_evict();
        }
    }

    /// Insert `session` only if `chat` has no live entry. Returns whether it
    /// was inserted; an existing session is left untouched.
    pub fn insert_if_absent(&self, chat: ChatId, session: S) -> bool {
        let mut inner = self.lock();
        if inner.entries.contains_key(&chat) {
            return false;
        }
        inner.next_generation += 1;
        let generation = inner.next_generation;
        let timer = self.spawn_timer(chat, generation);
        inner.entries.insert(
            chat,
            Entry {
                session,
                last_activity: Instant::now(),
                generation,
                timer,
            },
        );
        true
    }

    /// Current session, refreshing its activity. Never creates an entry.
    pub fn get(&self, chat: ChatId) -> Option<S> {
        let mut inner = self.lock();
        let entry = inner.entries.get_mut(&chat)?;
        entry.last_activity = Instant::now();
        Some(entry.session.clone())
    }

    pub fn contains(&self, chat: ChatId) -> bool {
        self.lock().entries.contains_key(&chat)
    }

    /// Destroy the session for `chat`, returning it if there was one.
    pub fn clear(&self, chat: ChatId) -> Option<S> {
        let removed = self.lock().entries.remove(&chat)?;
        removed.timer.abort();
        removed.session.on_evict();
        Some(removed.session)
    }

    pub fn len(&self) -> usize {
        self.lock().entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn sweep_expired(&self) -> usize {
        self.sweep_expired_at(Instant::now())
    }

    /// Evict every entry idle at `now`. Returns how many were evicted.
    pub fn sweep_expired_at(&self, now: Instant) -> usize {
        let expired: Vec<Entry<S>> = {
            let mut inner = self.lock();
            let chats: Vec<ChatId> = inner
                .entries
                .iter()
                .filter(|(_, e)| is_expired(e.last_activity, now, self.idle))
                .map(|(chat, _)| *chat)
                .collect();
            chats
                .into_iter()
                .filter_map(|chat| inner.entries.remove(&chat))
                .collect()
        };

        for entry in &expired {
            entry.timer.abort();
            entry.session.on_evict();
        }
        if !expired.is_empty() {
            tracing::debug!(registry = self.name, evicted = expired.len(), "swept idle sessions");
        }
        expired.len()
    }

    fn spawn_timer(&self, chat: ChatId, generation: u64) -> AbortHandle {
        let weak: Weak<Mutex<Inner<S>>> = Arc::downgrade(&self.inner);
        let idle = self.idle;
        let name = self.name;

        tokio::spawn(async move {
            loop {
                let deadline = {
                    let Some(shared) = weak.upgrade() else { return };
                    let inner = shared.lock().unwrap_or_else(|e| e.into_inner());
                    match inner.entries.get(&chat) {
                        Some(e) if e.generation == generation => e.last_activity + idle,
                        _ => return,
                    }
                };

                tokio::time::sleep_until(deadline).await;

                let evicted = {
                    let Some(shared) = weak.upgrade() else { return };
                    let mut inner = shared.lock().unwrap_or_else(|e| e.into_inner());
                    let expired = match inner.entries.get(&chat) {
                        Some(e) if e.generation == generation => {
                            is_expired(e.last_activity, Instant::now(), idle)
                        }
                        _ => return,
                    };
                    if expired { inner.entries.remove(&chat) } else { None }
                };

                if let Some(entry) = evicted {
                    entry.session.on_evict();
                    tracing::debug!(registry = name, chat_id = chat, "session expired");
                    return;
                }
            }
        })
        .abort_handle()
    }
}

impl SessionRegistry<ProvisioningSession> {
    fn with_live<T>(
        &self,
        chat: ChatId,
        id: Uuid,
        f: impl FnOnce(&mut Entry<ProvisioningSession>) -> T,
    ) -> Option<T> {
        let mut inner = self.lock();
        match inner.entries.get_mut(&chat) {
            Some(entry) if entry.session.id == id => Some(f(entry)),
            _ => None,
        }
    }

    /// The session for `chat` if it is still the one identified by `id`.
    pub fn get_if(&self, chat: ChatId, id: Uuid) -> Option<ProvisioningSession> {
        self.with_live(chat, id, |entry| {
            entry.last_activity = Instant::now();
            entry.session.clone()
        })
    }

    /// Move the live session `id` from `revision` to `next`.
    ///
    /// Fails when the session was destroyed or another transition already
    /// left `revision`, so each step advances at most once. Returns the new
    /// revision.
    pub fn advance_if(&self, chat: ChatId, id: Uuid, revision: u64, next: Step) -> Option<u64> {
        self.with_live(chat, id, |entry| {
            if entry.session.revision != revision {
                return None;
            }
            entry.last_activity = Instant::now();
            entry.session.step = next;
            entry.session.revision += 1;
            Some(entry.session.revision)
        })
        .flatten()
    }

    /// Record what the session was charged once the deduction went through.
    pub fn record_charge(&self, chat: ChatId, id: Uuid, amount: i64) -> bool {
        self.with_live(chat, id, |entry| entry.session.charged = amount)
            .is_some()
    }

    pub fn touch_if(&self, chat: ChatId, id: Uuid) -> bool {
        self.with_live(chat, id, |entry| entry.last_activity = Instant::now())
            .is_some()
    }

    /// Destroy the session only if it is still `id`.
    pub fn clear_if(&self, chat: ChatId, id: Uuid) -> Option<ProvisioningSession> {
        let removed = {
            let mut inner = self.lock();
            let live = inner.entries.get(&chat).is_some_and(|e| e.session.id == id);
            if live { inner.entries.remove(&chat) } else { None }
        }?;
        removed.timer.abort();
        removed.session.on_evict();
        Some(removed.session)
    }
}

/// The three session registries a chat can have entries in.
#[derive(Clone)]
pub struct SessionStore {
    pub provisioning: SessionRegistry<ProvisioningSession>,
    pub admin: SessionRegistry<AdminSession>,
    pub deposit: SessionRegistry<DepositSession>,
}

impl SessionStore {
    pub fn new(idle: Duration) -> Self {
        Self {
            provisioning: SessionRegistry::new("provisioning", idle),
            admin: SessionRegistry::new("admin", idle),
            deposit: SessionRegistry::new("deposit", idle),
        }
    }

    pub fn clear_all(&self, chat: ChatId) {
        self.provisioning.clear(chat);
        self.admin.clear(chat);
        self.deposit.clear(chat);
    }

    pub fn sweep_expired(&self) -> usize {
        let now = Instant::now();
        self.provisioning.sweep_expired_at(now)
            + self.admin.sweep_expired_at(now)
            + self.deposit.sweep_expired_at(now)
    }
}

/// Spawn the periodic idle sweep.
pub fn spawn_sweeper(store: SessionStore, interval: Duration) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(interval);
        loop {
            interval.tick().await;
            let evicted = store.sweep_expired();
            if evicted > 0 {
                tracing::info!(evicted, "evicted idle sessions");
            }
        }
    })
}
