//! Session-scoped storage of uploads and parsed selections
//!
//! Nothing here touches disk. A session lives until it is ended, idles past
//! its TTL, or is evicted as least recently used.

use crate::archive::ArchiveUpload;
use crate::error::{Result, TokLensError};
use crate::parse::{Engagement, load_engagement};
use chrono::{DateTime, Utc};
use lru::LruCache;
use std::num::NonZeroUsize;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;
use tokio::sync::RwLock;
use tracing::{debug, info};
use uuid::Uuid;

pub type SessionId = Uuid;

const PARSED_PER_SESSION: usize = 8;

type SelectionKey = (String, String);

struct Session {
    upload: ArchiveUpload,
    created_at: DateTime<Utc>,
    last_seen: Instant,
    parsed: LruCache<SelectionKey, Arc<Engagement>>,
}

/// Cheap view of a live session
#[derive(Debug, Clone)]
pub struct SessionHandle {
    pub id: SessionId,
    pub upload: ArchiveUpload,
    pub created_at: DateTime<Utc>,
}

pub struct SessionStore {
    sessions: RwLock<LruCache<SessionId, Session>>,
    ttl: Duration,
}

impl SessionStore {
    pub fn new(max_sessions: usize, ttl: Duration) -> Self {
        let cap = NonZeroUsize::new(max_sessions).unwrap_or(NonZeroUsize::MIN);
        Self {
            sessions: RwLock::new(LruCache::new(cap)),
            ttl,
        }
    }

    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    /// Register an upload and return the new session id
    pub async fn create(&self, upload: ArchiveUpload) -> SessionId {
        let id = Uuid::new_v4();
        let session = Session {
            upload,
            created_at: Utc::now(),
            last_seen: Instant::now(),
            parsed: LruCache::new(
                NonZeroUsize::new(PARSED_PER_SESSION).unwrap_or(NonZeroUsize::MIN),
            ),
        };
        let mut sessions = self.sessions.write().await;
        if let Some((evicted, _)) = sessions.push(id, session)
            && evicted != id
        {
            info!("Session {} evicted (store full)", evicted);
        }
        info!("Session {} created ({} active)", id, sessions.len());
        id
    }

    /// Fetch a live session and mark it as used
    pub async fn get(&self, id: SessionId) -> Result<SessionHandle> {
        let mut sessions = self.sessions.write().await;
        let expired = match sessions.get_mut(&id) {
            None => true,
            Some(s) if s.last_seen.elapsed() > self.ttl => true,
            Some(s) => {
                s.last_seen = Instant::now();
                return Ok(SessionHandle {
                    id,
                    upload: s.upload.clone(),
                    created_at: s.created_at,
                });
            }
        };
        if expired && sessions.pop(&id).is_some() {
            debug!("Session {} expired on access", id);
        }
        Err(TokLensError::SessionNotFound { id: id.to_string() })
    }

    /// Parsed selection for a session, memoized by entry paths
    pub async fn engagement(
        &self,
        id: SessionId,
        watch_path: &str,
        likes_path: &str,
    ) -> Result<Arc<Engagement>> {
        let handle = self.get(id).await?;
        let key: SelectionKey = (watch_path.to_string(), likes_path.to_string());
        {
            let mut sessions = self.sessions.write().await;
            if let Some(s) = sessions.get_mut(&id)
                && let Some(hit) = s.parsed.get(&key)
            {
                return Ok(Arc::clone(hit));
            }
        }

        let upload = handle.upload;
        let (w, l) = key.clone();
        let parsed = tokio::task::spawn_blocking(move || load_engagement(&upload, &w, &l)).await??;
        let parsed = Arc::new(parsed);

        let mut sessions = self.sessions.write().await;
        if let Some(s) = sessions.get_mut(&id) {
            s.parsed.put(key, Arc::clone(&parsed));
        }
        Ok(parsed)
    }

    /// End a session; returns whether it existed
    pub async fn remove(&self, id: SessionId) -> bool {
        let removed = self.sessions.write().await.pop(&id).is_some();
        if removed {
            info!("Session {} ended", id);
        }
        removed
    }

    /// Drop every session idle past the TTL
    pub async fn sweep(&self) -> usize {
        let mut sessions = self.sessions.write().await;
        let expired: Vec<SessionId> = sessions
            .iter()
            .filter(|(_, s)| s.last_seen.elapsed() > self.ttl)
            .map(|(id, _)| *id)
            .collect();
        for id in &expired {
            sessions.pop(id);
        }
        if !expired.is_empty() {
            info!(
                "Swept {} expired sessions ({} active)",
                expired.len(),
                sessions.len()
            );
        }
        expired.len()
    }

    pub async fn len(&self) -> usize {
        self.sessions.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }

    /// Run `sweep` on a fixed interval until the store is dropped
    pub fn spawn_sweeper(self: &Arc<Self>, every: Duration) -> tokio::task::JoinHandle<()> {
        let weak = Arc::downgrade(self);
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(every);
            ticker.tick().await;
            loop {
                ticker.tick().await;
                match weak.upgrade() {
                    Some(store) => {
                        store.sweep().await;
                    }
                    None => break,
                }
            }
        })
    }
}
