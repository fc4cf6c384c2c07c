//! 回合级错误类型
//!
//! 意图分类失败不在此列——分类器内部降级为 unknown 意图。
//! Conflict / Timeout / Cancelled 属于可重试错误，Handler 表示本回合已放弃且未写入任何状态。

use thiserror::Error;

use crate::store::StoreError;

/// 一次用户回合可能出现的错误（处理器、存储、超时等）
#[derive(Error, Debug)]
pub enum OwlError {
    #[error("Handler '{0}' failed: {1}")]
    Handler(&'static str, String),

    #[error("Turn timed out after {0}s")]
    Timeout(u64),

    #[error("Turn cancelled before commit")]
    Cancelled,

    /// 两次条件写都失败：并发回合竞争同一会话，调用方可原样重试
    #[error("Concurrent update on session '{0}', please retry")]
    Conflict(String),

    #[error(transparent)]
    Store(#[from] StoreError),

    #[error("Config error: {0}")]
    Config(String),
}

impl OwlError {
    /// 调用方重发同一输入即可能成功的错误（会话状态未被改动）
    pub fn is_retryable(&self) -> bool {
        matches!(self, OwlError::Timeout(_) | OwlError::Conflict(_) | OwlError::Cancelled)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_retryable_partition() {
        assert!(OwlError::Timeout(30).is_retryable());
        assert!(OwlError::Conflict("session_1".into()).is_retryable());
        assert!(!OwlError::Handler("quiz", "boom".into()).is_retryable());
    }
}
