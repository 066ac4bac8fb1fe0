//! # Chat Session State
//!
//! One logical chat session is active at a time across the whole process. The
//! session is an explicit value object held by [`ChatRegistry`] rather than an
//! ambient flag: the coordinator starts it lazily on the first transaction and
//! appends a turn per completed exchange, and the `/api/v1/chat/end` control
//! command persists the transcript and resets the registry to "not started".

use crate::error::ExchangeError;
use crate::storage::{ArtifactKind, MediaStore};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::RwLock;
use uuid::Uuid;

/// One user/assistant exchange inside a chat session.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatTurn {
    pub transcript: String,
    pub reply: String,
    pub timestamp: DateTime<Utc>,
}

/// A live chat session and its accumulated turns.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatSession {
    pub id: Uuid,
    pub started_at: DateTime<Utc>,
    pub turns: Vec<ChatTurn>,
}

impl ChatSession {
    fn new() -> Self {
        Self {
            id: Uuid::new_v4(),
            started_at: Utc::now(),
            turns: Vec::new(),
        }
    }
}

/// Process-wide registry holding at most one active session.
#[derive(Debug, Default)]
pub struct ChatRegistry {
    active: RwLock<Option<ChatSession>>,
}

impl ChatRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Start a session if none is active; returns the active session id.
    pub fn ensure_started(&self) -> Uuid {
        let mut active = self.active.write().unwrap();
        match active.as_ref() {
            Some(session) => session.id,
            None => {
                let session = ChatSession::new();
                let id = session.id;
                tracing::info!(chat_id = %id, "chat session started");
                *active = Some(session);
                id
            }
        }
    }

    /// Append a completed turn to the active session, if any.
    pub fn record_turn(&self, transcript: &str, reply: &str) {
        if let Some(session) = self.active.write().unwrap().as_mut() {
            session.turns.push(ChatTurn {
                transcript: transcript.to_string(),
                reply: reply.to_string(),
                timestamp: Utc::now(),
            });
        }
    }

    pub fn is_started(&self) -> bool {
        self.active.read().unwrap().is_some()
    }

    pub fn turn_count(&self) -> usize {
        self.active
            .read()
            .unwrap()
            .as_ref()
            .map_or(0, |s| s.turns.len())
    }

    /// Take the active session out of the registry, resetting it to
    /// "not started". Returns None when there was nothing to end.
    pub fn take(&self) -> Option<ChatSession> {
        self.active.write().unwrap().take()
    }

    /// End the active session and persist its history through the store.
    pub async fn end(&self, store: &MediaStore) -> Result<Option<ChatSession>, ExchangeError> {
        let Some(session) = self.take() else {
            return Ok(None);
        };

        let json = serde_json::to_vec_pretty(&session)
            .map_err(|e| ExchangeError::Storage(format!("serializing chat history: {}", e)))?;
        let path = store
            .save(ArtifactKind::ChatLog, &session.id.to_string(), &json)
            .await?;
        tracing::info!(chat_id = %session.id, turns = session.turns.len(),
            path = %path.display(), "chat session ended and saved");
        Ok(Some(session))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_lazy_start_is_idempotent() {
        let registry = ChatRegistry::new();
        assert!(!registry.is_started());

        let first = registry.ensure_started();
        let second = registry.ensure_started();
        assert_eq!(first, second);
        assert!(registry.is_started());
    }

    #[test]
    fn test_turns_accumulate() {
        let registry = ChatRegistry::new();
        registry.ensure_started();
        registry.record_turn("what is this", "a plant");
        registry.record_turn("which kind", "a fern");
        assert_eq!(registry.turn_count(), 2);
    }

    #[tokio::test]
    async fn test_end_persists_and_resets() {
        let tmp = tempfile::tempdir().unwrap();
        let store = MediaStore::bootstrap(tmp.path()).await.unwrap();

        let registry = ChatRegistry::new();
        registry.ensure_started();
        registry.record_turn("hello", "hi there");

        let ended = registry.end(&store).await.unwrap().unwrap();
        assert_eq!(ended.turns.len(), 1);
        assert!(!registry.is_started());
        assert_eq!(store.count(ArtifactKind::ChatLog).await, 1);

        // A fresh session starts with a new id afterwards
        let next = registry.ensure_started();
        assert_ne!(next, ended.id);
    }

    #[tokio::test]
    async fn test_end_without_session_is_noop() {
        let tmp = tempfile::tempdir().unwrap();
        let store = MediaStore::bootstrap(tmp.path()).await.unwrap();

        let registry = ChatRegistry::new();
        assert!(registry.end(&store).await.unwrap().is_none());
        assert_eq!(store.count(ArtifactKind::ChatLog).await, 0);
    }
}
