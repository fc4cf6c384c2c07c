//! 内存会话存储
//!
//! RwLock<HashMap> 实现，进程退出即丢失；用于测试与无持久化需求的场景。

use std::collections::HashMap;

use async_trait::async_trait;
use tokio::sync::RwLock;

use crate::session::SessionState;
use crate::store::{SessionStore, StoreError};

/// 内存存储：版本号直接取自条目内的 state.version
#[derive(Debug, Default)]
pub struct MemoryStore {
    sessions: RwLock<HashMap<String, SessionState>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn len(&self) -> usize {
        self.sessions.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.sessions.read().await.is_empty()
    }
}

#[async_trait]
impl SessionStore for MemoryStore {
    async fn get(&self, session_id: &str) -> Result<Option<(SessionState, u64)>, StoreError> {
        let sessions = self.sessions.read().await;
        Ok(sessions
            .get(session_id)
            .map(|state| (state.clone(), state.version)))
    }

    async fn put(
        &self,
        session_id: &str,
        state: &SessionState,
        expected: u64,
    ) -> Result<u64, StoreError> {
        let mut sessions = self.sessions.write().await;
        let stored = sessions.get(session_id).map(|s| s.version).unwrap_or(0);

        let exists = sessions.contains_key(session_id);
        let accept = if exists { stored == expected } else { expected == 0 };
        if !accept {
            return Err(StoreError::VersionConflict { expected, stored });
        }

        sessions.insert(session_id.to_string(), state.clone());
        Ok(state.version)
    }
}
