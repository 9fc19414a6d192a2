use anyhow::{Context, Result};
use redis::Commands;
use serde::Serialize;
use serde::de::DeserializeOwned;
use std::cell::RefCell;
use std::collections::HashMap;
use std::time::{Duration, Instant};

pub const MEMORY_URL: &str = "memory://";

/// Text key-value store with per-entry expiry.
pub trait KvStore {
    fn get(&self, key: &str) -> Result<Option<String>>;
    fn set(&self, key: &str, value: &str, ttl_secs: u64) -> Result<()>;
    fn close(&self);
}

pub struct RedisStore {
    conn: RefCell<Option<redis::Connection>>,
}

impl RedisStore {
    pub fn connect(url: &str) -> Result<Self> {
        let client =
            redis::Client::open(url).with_context(|| format!("invalid redis url {url}"))?;
        let conn = client
            .get_connection()
            .with_context(|| format!("failed to connect to redis at {url}"))?;
        Ok(Self {
            conn: RefCell::new(Some(conn)),
        })
    }
}

impl KvStore for RedisStore {
    fn get(&self, key: &str) -> Result<Option<String>> {
        let mut guard = self.conn.borrow_mut();
        let conn = guard.as_mut().context("redis connection already closed")?;
        let value: Option<String> = conn
            .get(key)
            .with_context(|| format!("redis GET {key} failed"))?;
        Ok(value)
    }

    fn set(&self, key: &str, value: &str, ttl_secs: u64) -> Result<()> {
        let mut guard = self.conn.borrow_mut();
        let conn = guard.as_mut().context("redis connection already closed")?;
        let _: () = conn
            .set_ex(key, value, ttl_secs)
            .with_context(|| format!("redis SETEX {key} failed"))?;
        Ok(())
    }

    fn close(&self) {
        self.conn.borrow_mut().take();
    }
}

/// In-process store selected by `memory://`; contents die with the process.
#[derive(Default)]
pub struct MemoryStore {
    entries: RefCell<HashMap<String, (String, Instant)>>,
    closed: RefCell<bool>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    #[cfg(test)]
    pub fn is_closed(&self) -> bool {
        *self.closed.borrow()
    }

    #[cfg(test)]
    pub fn insert_raw(&self, key: &str, value: &str) {
        self.entries.borrow_mut().insert(
            key.to_string(),
            (value.to_string(), Instant::now() + Duration::from_secs(3600)),
        );
    }
}

impl KvStore for MemoryStore {
    fn get(&self, key: &str) -> Result<Option<String>> {
        let mut entries = self.entries.borrow_mut();
        let live = match entries.get(key) {
            None => return Ok(None),
            Some((value, expires_at)) if *expires_at > Instant::now() => Some(value.clone()),
            Some(_) => None,
        };
        if live.is_none() {
            entries.remove(key);
        }
        Ok(live)
    }

    fn set(&self, key: &str, value: &str, ttl_secs: u64) -> Result<()> {
        self.entries.borrow_mut().insert(
            key.to_string(),
            (
                value.to_string(),
                Instant::now() + Duration::from_secs(ttl_secs),
            ),
        );
        Ok(())
    }

    fn close(&self) {
        *self.closed.borrow_mut() = true;
    }
}

impl<S: KvStore + ?Sized> KvStore for Box<S> {
    fn get(&self, key: &str) -> Result<Option<String>> {
        (**self).get(key)
    }

    fn set(&self, key: &str, value: &str, ttl_secs: u64) -> Result<()> {
        (**self).set(key, value, ttl_secs)
    }

    fn close(&self) {
        (**self).close()
    }
}

impl<S: KvStore + ?Sized> KvStore for &S {
    fn get(&self, key: &str) -> Result<Option<String>> {
        (**self).get(key)
    }

    fn set(&self, key: &str, value: &str, ttl_secs: u64) -> Result<()> {
        (**self).set(key, value, ttl_secs)
    }

    fn close(&self) {
        (**self).close()
    }
}

pub fn open_store(url: &str) -> Result<Box<dyn KvStore>> {
    if url.trim() == MEMORY_URL {
        return Ok(Box::new(MemoryStore::new()));
    }
    Ok(Box::new(RedisStore::connect(url)?))
}

#[derive(Debug, Clone, PartialEq)]
pub enum CacheLookup<T> {
    Hit(T),
    Miss,
}

/// JSON values over a [`KvStore`]. Anything unreadable is a miss.
pub struct JsonCache<S: KvStore> {
    store: S,
}

impl<S: KvStore> JsonCache<S> {
    pub fn new(store: S) -> Self {
        Self { store }
    }

    pub fn get_json<T: DeserializeOwned>(&self, key: &str) -> CacheLookup<T> {
        let raw = match self.store.get(key) {
            Ok(Some(raw)) => raw,
            Ok(None) => return CacheLookup::Miss,
            Err(err) => {
                tracing::warn!(key, error = %format!("{err:#}"), "cache read failed");
                return CacheLookup::Miss;
            }
        };
        match serde_json::from_str::<T>(&raw) {
            Ok(value) => CacheLookup::Hit(value),
            Err(err) => {
                tracing::debug!(key, error = %err, "ignoring malformed cache entry");
                CacheLookup::Miss
            }
        }
    }

    pub fn set_json<T: Serialize + ?Sized>(
        &self,
        key: &str,
        value: &T,
        ttl_secs: u64,
    ) -> Result<()> {
        let text = serde_json::to_string(value)?;
        self.store.set(key, &text, ttl_secs)
    }

    #[cfg(test)]
    pub fn store(&self) -> &S {
        &self.store
    }

    pub fn close(self) {
        self.store.close();
    }
}
