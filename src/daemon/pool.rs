//! Keyed pool of live MCP sessions.
//!
//! Entries are keyed by server name. An entry is reused while the config
//! hash of an incoming acquire matches the one stored at connect time; a
//! mismatch closes the old session and reconnects. The pool is owned by
//! the daemon's serialized request loop, which is what makes acquire
//! single-flight per key; the eviction sweep runs in the same loop.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use anyhow::Result;

use crate::config::{config_hash, ServerConfig};
use crate::daemon::protocol::PooledServerInfo;
use crate::mcp::session::{Session, SessionFactory};

pub struct PoolEntry {
    pub session: Arc<dyn Session>,
    pub config: ServerConfig,
    pub config_source: String,
    pub config_hash: String,
    pub started_at: Instant,
    pub last_used: Instant,
}

pub struct AcquireOutcome {
    pub session: Arc<dyn Session>,
    /// The existing session was reused as-is.
    pub already_connected: bool,
    /// A previous session with a different config hash was replaced.
    pub reconnected: bool,
}

pub struct ConnectionPool {
    factory: Arc<dyn SessionFactory>,
    entries: HashMap<String, PoolEntry>,
    idle_timeout: Duration,
}

impl ConnectionPool {
    pub fn new(factory: Arc<dyn SessionFactory>, idle_timeout: Duration) -> Self {
        Self {
            factory,
            entries: HashMap::new(),
            idle_timeout,
        }
    }

    /// Get-or-create the session for `name`. A hash match reuses the
    /// entry and stamps `last_used`; a mismatch closes the old session
    /// before opening a fresh one.
    pub async fn acquire(
        &mut self,
        name: &str,
        config: &ServerConfig,
        source: &str,
    ) -> Result<AcquireOutcome> {
        let hash = config_hash(config);

        let mut reconnected = false;
        if let Some(entry) = self.entries.get_mut(name) {
            if entry.config_hash == hash {
                entry.last_used = Instant::now();
                return Ok(AcquireOutcome {
                    session: entry.session.clone(),
                    already_connected: true,
                    reconnected: false,
                });
            }
            tracing::info!("config changed for '{name}', reconnecting");
            if let Some(old) = self.entries.remove(name) {
                if let Err(e) = old.session.close().await {
                    tracing::debug!("error closing stale session '{name}': {e:#}");
                }
            }
            reconnected = true;
        }

        let session = self.factory.open(name, config).await?;
        let now = Instant::now();
        self.entries.insert(
            name.to_string(),
            PoolEntry {
                session: session.clone(),
                config: config.clone(),
                config_source: source.to_string(),
                config_hash: hash,
                started_at: now,
                last_used: now,
            },
        );
        tracing::info!("connected '{name}' ({} pooled)", self.entries.len());

        Ok(AcquireOutcome {
            session,
            already_connected: false,
            reconnected,
        })
    }

    /// The pooled session for `name`, if any, stamping `last_used`.
    pub fn session(&mut self, name: &str) -> Option<Arc<dyn Session>> {
        self.entries.get_mut(name).map(|entry| {
            entry.last_used = Instant::now();
            entry.session.clone()
        })
    }

    /// Close and remove. Returns whether the server was present.
    pub async fn release(&mut self, name: &str) -> bool {
        match self.entries.remove(name) {
            Some(entry) => {
                if let Err(e) = entry.session.close().await {
                    tracing::debug!("error closing session '{name}': {e:#}");
                }
                tracing::info!("disconnected '{name}'");
                true
            }
            None => false,
        }
    }

    /// Close everything; returns the names that were held.
    pub async fn release_all(&mut self) -> Vec<String> {
        let mut names: Vec<String> = self.entries.keys().cloned().collect();
        names.sort();
        for (name, entry) in self.entries.drain() {
            if let Err(e) = entry.session.close().await {
                tracing::debug!("error closing session '{name}': {e:#}");
            }
        }
        names
    }

    pub fn has(&self, name: &str) -> bool {
        self.entries.contains_key(name)
    }

    pub fn list(&self) -> Vec<String> {
        let mut names: Vec<String> = self.entries.keys().cloned().collect();
        names.sort();
        names
    }

    pub fn list_detailed(&self) -> Vec<PooledServerInfo> {
        let mut detailed: Vec<PooledServerInfo> = self
            .entries
            .iter()
            .map(|(name, entry)| PooledServerInfo {
                name: name.clone(),
                transport: entry.config.transport_kind().to_string(),
                config_source: entry.config_source.clone(),
                idle_seconds: entry.last_used.elapsed().as_secs(),
            })
            .collect();
        detailed.sort_by(|a, b| a.name.cmp(&b.name));
        detailed
    }

    pub fn size(&self) -> usize {
        self.entries.len()
    }

    /// Release entries idle past the timeout. Best-effort: close failures
    /// are logged at debug, never raised.
    pub async fn evict_idle(&mut self) {
        let expired: Vec<String> = self
            .entries
            .iter()
            .filter(|(_, entry)| entry.last_used.elapsed() > self.idle_timeout)
            .map(|(name, _)| name.clone())
            .collect();

        for name in expired {
            tracing::info!("evicting idle server '{name}'");
            self.release(&name).await;
        }
    }
}
