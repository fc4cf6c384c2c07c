//! 会话存储抽象层
//!
//! 统一的 get/put 接口加乐观并发控制：put 带上读取时的版本号，
//! 版本不匹配即拒绝，由引擎决定重试或上报冲突。内存与 SQLite 两种实现可互换。

use std::sync::Arc;

use async_trait::async_trait;
use thiserror::Error;

use crate::config::AppConfig;
use crate::session::SessionState;

pub mod memory;
pub mod sqlite;

pub use memory::MemoryStore;
pub use sqlite::SqliteStore;

/// 存储层错误
#[derive(Error, Debug)]
pub enum StoreError {
    /// 条件写失败：存储中的版本与期望不符（并发回合竞争或重放）
    #[error("Version conflict: expected {expected}, stored {stored}")]
    VersionConflict { expected: u64, stored: u64 },

    #[error("Database error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    #[error("Serialization failed: {0}")]
    Serde(#[from] serde_json::Error),
}

/// 会话存储接口
///
/// 约定：新会话从版本 0 开始（get 返回 None），首次 put 的 expected 为 0；
/// 写入的 state.version 应为 expected + 1，成功时返回该新版本。
#[async_trait]
pub trait SessionStore: Send + Sync {
    /// 读取 (状态, 版本)；会话不存在时返回 None
    async fn get(&self, session_id: &str) -> Result<Option<(SessionState, u64)>, StoreError>;

    /// 条件写：仅当存储中的版本等于 expected 时生效，返回新版本号
    async fn put(
        &self,
        session_id: &str,
        state: &SessionState,
        expected: u64,
    ) -> Result<u64, StoreError>;
}

/// 创建会话存储
///
/// backend = sqlite 时打开（或新建）数据库文件；打开失败降级为内存存储并告警
pub fn create_session_store(cfg: &AppConfig) -> Arc<dyn SessionStore> {
    match cfg.store.backend.to_lowercase().as_str() {
        "sqlite" => match SqliteStore::open(&cfg.store.path) {
            Ok(store) => {
                tracing::info!("Using SQLite session store: {:?}", cfg.store.path);
                Arc::new(store)
            }
            Err(e) => {
                tracing::warn!("Failed to open SQLite store, falling back to memory: {}", e);
                Arc::new(MemoryStore::new())
            }
        },
        "memory" => {
            tracing::info!("Using in-memory session store");
            Arc::new(MemoryStore::new())
        }
        other => {
            tracing::warn!("Unknown store backend '{}', using memory store", other);
            Arc::new(MemoryStore::new())
        }
    }
}
