//! SQLite 会话存储（嵌入式，rusqlite bundled）
//!
//! 每个会话一行：JSON 序列化的状态加版本列。条件写用
//! `UPDATE ... WHERE id = ? AND version = ?` 的受影响行数判定，版本竞争不依赖任何进程内锁。

use std::path::Path;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use chrono::Utc;
use rusqlite::{params, Connection, OptionalExtension};

use crate::session::SessionState;
use crate::store::{SessionStore, StoreError};

const SCHEMA: &str = "
CREATE TABLE IF NOT EXISTS sessions (
    id         TEXT PRIMARY KEY,
    state      TEXT NOT NULL,
    version    INTEGER NOT NULL,
    updated_at TEXT NOT NULL
);
CREATE INDEX IF NOT EXISTS idx_sessions_updated_at ON sessions(updated_at);
";

/// SQLite 存储：单连接加互斥；会话读写都是短事务
#[derive(Clone)]
pub struct SqliteStore {
    conn: Arc<Mutex<Connection>>,
}

impl SqliteStore {
    /// 打开（或创建）数据库文件并建表
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self, StoreError> {
        let conn = Connection::open(path)?;
        let store = Self {
            conn: Arc::new(Mutex::new(conn)),
        };
        store.init_tables()?;
        Ok(store)
    }

    /// 内存数据库（测试用）
    pub fn open_in_memory() -> Result<Self, StoreError> {
        let conn = Connection::open_in_memory()?;
        let store = Self {
            conn: Arc::new(Mutex::new(conn)),
        };
        store.init_tables()?;
        Ok(store)
    }

    fn init_tables(&self) -> Result<(), StoreError> {
        let conn = self.conn.lock().unwrap();
        conn.execute_batch(SCHEMA)?;
        Ok(())
    }

    /// 存量会话数（启动时打日志用）
    pub fn session_count(&self) -> Result<usize, StoreError> {
        let conn = self.conn.lock().unwrap();
        let count: i64 = conn.query_row("SELECT COUNT(*) FROM sessions", [], |row| row.get(0))?;
        Ok(count as usize)
    }
}

#[async_trait]
impl SessionStore for SqliteStore {
    async fn get(&self, session_id: &str) -> Result<Option<(SessionState, u64)>, StoreError> {
        let conn = self.conn.lock().unwrap();
        let row: Option<(String, i64)> = conn
            .query_row(
                "SELECT state, version FROM sessions WHERE id = ?1",
                params![session_id],
                |row| Ok((row.get(0)?, row.get(1)?)),
            )
            .optional()?;

        match row {
            Some((blob, version)) => {
                let state: SessionState = serde_json::from_str(&blob)?;
                Ok(Some((state, version as u64)))
            }
            None => Ok(None),
        }
    }

    async fn put(
        &self,
        session_id: &str,
        state: &SessionState,
        expected: u64,
    ) -> Result<u64, StoreError> {
        let blob = serde_json::to_string(state)?;
        let now = Utc::now().to_rfc3339();

        let conn = self.conn.lock().unwrap();
        let updated = conn.execute(
            "UPDATE sessions SET state = ?1, version = ?2, updated_at = ?3
             WHERE id = ?4 AND version = ?5",
            params![blob, state.version as i64, now, session_id, expected as i64],
        )?;
        if updated == 1 {
            return Ok(state.version);
        }

        if expected == 0 {
            // 新会话：行已存在说明被并发写入抢先
            let inserted = conn.execute(
                "INSERT OR IGNORE INTO sessions (id, state, version, updated_at)
                 VALUES (?1, ?2, ?3, ?4)",
                params![session_id, blob, state.version as i64, now],
            )?;
            if inserted == 1 {
                return Ok(state.version);
            }
        }

        let stored: i64 = conn
            .query_row(
                "SELECT version FROM sessions WHERE id = ?1",
                params![session_id],
                |row| row.get(0),
            )
            .optional()?
            .unwrap_or(0);
        Err(StoreError::VersionConflict {
            expected,
            stored: stored as u64,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    use crate::llm::ChatMessage;
    use crate::session::{DayPlan, SessionState};

    fn sample_state(version: u64) -> SessionState {
        let mut state = SessionState::new();
        state.current_topic = Some("rust".into());
        state.pending_curriculum = Some(vec![DayPlan {
            day: 1,
            title: "Ownership".into(),
            tasks: vec!["read the book chapter".into()],
        }]);
        state.awaiting_confirmation = true;
        state
            .conversation_history
            .push(ChatMessage::user("teach me rust"));
        state.version = version;
        state
    }

    #[tokio::test]
    async fn test_state_survives_reopen() {
        let temp_dir = TempDir::new().unwrap();
        let db_path = temp_dir.path().join("owl_test.db");

        let store = SqliteStore::open(&db_path).unwrap();
        store.put("session_a", &sample_state(1), 0).await.unwrap();
        drop(store);

        let store2 = SqliteStore::open(&db_path).unwrap();
        assert_eq!(store2.session_count().unwrap(), 1);

        let (state, version) = store2.get("session_a").await.unwrap().unwrap();
        assert_eq!(version, 1);
        assert_eq!(state.current_topic.as_deref(), Some("rust"));
        assert!(state.awaiting_confirmation);
        assert_eq!(state.conversation_history.len(), 1);
    }

    #[tokio::test]
    async fn test_conditional_write_rejects_stale_version() {
        let store = SqliteStore::open_in_memory().unwrap();
        store.put("s", &sample_state(1), 0).await.unwrap();
        store.put("s", &sample_state(2), 1).await.unwrap();

        let err = store.put("s", &sample_state(2), 1).await.unwrap_err();
        assert!(matches!(
            err,
            StoreError::VersionConflict {
                expected: 1,
                stored: 2
            }
        ));
    }

    #[tokio::test]
    async fn test_insert_race_is_reported_as_conflict() {
        let store = SqliteStore::open_in_memory().unwrap();
        store.put("s", &sample_state(1), 0).await.unwrap();

        // 第二个「首次写入」必须失败而不是覆盖
        let err = store.put("s", &sample_state(1), 0).await.unwrap_err();
        assert!(matches!(err, StoreError::VersionConflict { stored: 1, .. }));
    }
}
