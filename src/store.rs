use bytes::Bytes;
use std::collections::{BTreeSet, HashMap};
use std::sync::{Arc, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};
use std::time::{SystemTime, UNIX_EPOCH};
use thiserror::Error as ThisError;
use tokio::sync::Notify;
use tokio::time::{sleep_until, Duration, Instant};
use tracing::debug;

use crate::frame::{Frame, TypeTag};
use crate::stream::{Fields, Stream, StreamError, StreamId};

/// The Store is responsible for managing key-value pairs, with optional time-to-live settings for
/// each key. Expired keys are removed the first time they are looked up after their deadline;
/// [`remove_expired_keys`] can additionally be spawned to evict them in the background.
///
/// The store is designed to be thread-safe, allowing it to be shared and cloned cheaply using
/// reference counting. All access goes through a single reader-writer lock which is never held
/// across an `.await`.
#[derive(Clone)]
pub struct Store {
    inner: Arc<InnerStore>,
}

#[derive(Clone, Debug, ThisError, PartialEq)]
pub enum StoreError {
    #[error("WRONGTYPE Operation against a key holding the wrong kind of value")]
    WrongType,
    #[error("ERR value is not an integer or out of range")]
    NotAnInteger,
    #[error(transparent)]
    Stream(#[from] StreamError),
}

impl From<StoreError> for Frame {
    fn from(err: StoreError) -> Frame {
        Frame::Error(err.to_string())
    }
}

struct InnerStore {
    state: RwLock<State>,
    waker: Notify,
}

struct State {
    keys: HashMap<Bytes, Entry>,
    ttls: BTreeSet<(Instant, Bytes)>,
}

struct Entry {
    value: Frame,
    expires_at: Option<Instant>,
}

impl Entry {
    fn is_expired(&self, now: Instant) -> bool {
        self.expires_at.is_some_and(|expires_at| expires_at <= now)
    }
}

impl Store {
    pub fn new() -> Store {
        let state = State {
            keys: HashMap::new(),
            ttls: BTreeSet::new(),
        };

        let inner = Arc::new(InnerStore {
            state: RwLock::new(state),
            waker: Notify::new(),
        });

        Self { inner }
    }

    /// Returns the value stored at `key`. Streams can't be read as plain values.
    pub fn get(&self, key: &[u8]) -> Result<Option<Frame>, StoreError> {
        let now = Instant::now();

        {
            let state = self.read();
            match state.keys.get(key) {
                None => return Ok(None),
                Some(entry) if !entry.is_expired(now) => {
                    return match &entry.value {
                        Frame::Stream(_) => Err(StoreError::WrongType),
                        value => Ok(Some(value.clone())),
                    };
                }
                Some(_) => {}
            }
        }

        self.write().remove_if_expired(key, now);
        Ok(None)
    }

    pub fn type_of(&self, key: &[u8]) -> TypeTag {
        let now = Instant::now();

        {
            let state = self.read();
            match state.keys.get(key) {
                None => return TypeTag::None,
                Some(entry) if !entry.is_expired(now) => return entry.value.type_tag(),
                Some(_) => {}
            }
        }

        self.write().remove_if_expired(key, now);
        TypeTag::None
    }

    /// Stores `value` at `key`, replacing any previous value and its TTL.
    pub fn set(&self, key: Bytes, value: Frame, ttl: Option<Duration>) {
        // A TTL too large to represent never expires.
        let expires_at = ttl.and_then(|ttl| Instant::now().checked_add(ttl));

        let expires_first = self.write().insert(key, Entry { value, expires_at });
        if expires_first {
            self.inner.waker.notify_one();
        }
    }

    /// Increments the integer stored at `key` by one, as a single atomic step. Missing keys
    /// start at zero. The TTL of an existing key is kept.
    pub fn incr(&self, key: Bytes) -> Result<i64, StoreError> {
        let now = Instant::now();
        let mut state = self.write();
        state.remove_if_expired(&key, now);

        let (current, expires_at) = match state.keys.get(&key) {
            None => (0, None),
            Some(Entry {
                value: Frame::Stream(_),
                ..
            }) => return Err(StoreError::WrongType),
            Some(entry) => (
                entry.value.as_number().ok_or(StoreError::NotAnInteger)?,
                entry.expires_at,
            ),
        };

        let value = current.checked_add(1).ok_or(StoreError::NotAnInteger)?;
        let entry = Entry {
            value: Frame::Bulk(Bytes::from(value.to_string())),
            expires_at,
        };
        state.insert(key, entry);

        Ok(value)
    }

    /// Appends an entry to the stream at `key`, creating the stream if the key doesn't exist.
    /// A new stream is only stored once an entry was appended to it.
    pub fn xadd(&self, key: Bytes, id: &str, fields: Fields) -> Result<StreamId, StoreError> {
        let now = Instant::now();
        let now_ms = unix_time_ms();
        let mut state = self.write();
        state.remove_if_expired(&key, now);

        match state.keys.get_mut(&key) {
            Some(Entry {
                value: Frame::Stream(stream),
                ..
            }) => Ok(stream.append(id, fields, now_ms)?),
            Some(_) => Err(StoreError::WrongType),
            None => {
                let mut stream = Stream::new();
                let id = stream.append(id, fields, now_ms)?;
                let entry = Entry {
                    value: Frame::Stream(stream),
                    expires_at: None,
                };
                state.insert(key, entry);

                Ok(id)
            }
        }
    }

    /// Number of stored keys, including expired keys that have not been evicted yet.
    pub fn len(&self) -> usize {
        self.read().keys.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Evicts every expired key and returns when the next one expires.
    pub fn remove_expired_keys(&self) -> Option<Instant> {
        self.write().remove_expired_keys(Instant::now())
    }

    fn read(&self) -> RwLockReadGuard<'_, State> {
        // Every critical section leaves the map consistent, so a poisoned lock is still usable.
        self.inner.state.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write(&self) -> RwLockWriteGuard<'_, State> {
        self.inner
            .state
            .write()
            .unwrap_or_else(PoisonError::into_inner)
    }
}

impl Default for Store {
    fn default() -> Self {
        Self::new()
    }
}

impl State {
    /// Inserts `entry`, keeping the TTL index in sync. Returns whether the entry is now the
    /// first one to expire.
    fn insert(&mut self, key: Bytes, entry: Entry) -> bool {
        let expires_at = entry.expires_at;

        if let Some(previous) = self.keys.insert(key.clone(), entry) {
            if let Some(when) = previous.expires_at {
                self.ttls.remove(&(when, key.clone()));
            }
        }

        match expires_at {
            Some(when) => {
                let expires_first = self.ttls.first().map_or(true, |(next, _)| when < *next);
                self.ttls.insert((when, key));
                expires_first
            }
            None => false,
        }
    }

    fn remove(&mut self, key: &[u8]) -> Option<Entry> {
        let (key, entry) = self.keys.remove_entry(key)?;
        if let Some(when) = entry.expires_at {
            self.ttls.remove(&(when, key));
        }
        Some(entry)
    }

    fn remove_if_expired(&mut self, key: &[u8], now: Instant) {
        if self.keys.get(key).is_some_and(|entry| entry.is_expired(now)) {
            debug!(key = ?String::from_utf8_lossy(key), "Expired key removed on access");
            self.remove(key);
        }
    }

    fn remove_expired_keys(&mut self, now: Instant) -> Option<Instant> {
        let expired_keys: Vec<(Instant, Bytes)> = self
            .ttls
            .iter()
            .take_while(|(expires_at, _)| expires_at <= &now)
            .cloned()
            .collect();

        for (when, key) in expired_keys {
            self.keys.remove(&key);
            self.ttls.remove(&(when, key));
        }

        self.ttls.first().map(|&(expires_at, _)| expires_at)
    }
}

/// Evicts expired keys as they reach their deadline. Runs until the task is dropped.
pub async fn remove_expired_keys(store: Store) {
    loop {
        let next_expiration = store.remove_expired_keys();

        if let Some(next_expiration) = next_expiration {
            tokio::select! {
                _ = sleep_until(next_expiration) => {}
                _ = store.inner.waker.notified() => {}
            }
        } else {
            store.inner.waker.notified().await;
        }
    }
}

fn unix_time_ms() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|elapsed| elapsed.as_millis() as u64)
        .unwrap_or_default()
}
