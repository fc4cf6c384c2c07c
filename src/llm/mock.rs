//! Mock LLM 客户端（用于测试，无需 API）
//!
//! 可预置一组应答依次返回；队列耗尽后回落到固定应答，便于本地跑通完整回合。

use std::collections::VecDeque;
use std::sync::Mutex;

use async_trait::async_trait;

use crate::llm::{ChatMessage, LlmClient};

/// Mock 客户端：按预置顺序出队应答，队列空时返回固定文本
#[derive(Debug, Default)]
pub struct MockLlmClient {
    scripted: Mutex<VecDeque<String>>,
}

impl MockLlmClient {
    pub fn new() -> Self {
        Self::default()
    }

    /// 预置应答序列，测试中按调用顺序消费
    pub fn with_responses<I, S>(responses: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            scripted: Mutex::new(responses.into_iter().map(Into::into).collect()),
        }
    }
}

#[async_trait]
impl LlmClient for MockLlmClient {
    async fn complete(&self, _messages: &[ChatMessage]) -> Result<String, String> {
        let next = self
            .scripted
            .lock()
            .map_err(|_| "mock queue poisoned".to_string())?
            .pop_front();

        Ok(next.unwrap_or_else(|| "(mock reply)".to_string()))
    }
}
