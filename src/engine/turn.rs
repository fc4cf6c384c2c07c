//! 回合结果与会话摘要类型

use serde::Serialize;

use crate::session::{SessionState, SessionStatus};

/// 一次成功提交的回合
#[derive(Debug, Clone)]
pub struct TurnResult {
    /// 用户可见回复
    pub output: String,
    /// 提交后的持久状态
    pub status: SessionStatus,
    pub summary: StateSummary,
}

/// 会话状态摘要，恢复会话与外层展示用
#[derive(Debug, Clone, Serialize)]
pub struct StateSummary {
    pub session_id: String,
    pub topic: Option<String>,
    pub status: SessionStatus,
    pub plan_days: usize,
    pub pending_days: usize,
    pub days_done: usize,
    pub quiz_open: bool,
    pub version: u64,
}

impl StateSummary {
    pub fn of(session_id: &str, state: &SessionState) -> Self {
        Self {
            session_id: session_id.to_string(),
            topic: state.current_topic.clone(),
            status: state.status(),
            plan_days: state.curriculum.as_ref().map(Vec::len).unwrap_or(0),
            pending_days: state.pending_curriculum.as_ref().map(Vec::len).unwrap_or(0),
            days_done: state.days_done(),
            quiz_open: state.quiz_state.is_some(),
            version: state.version,
        }
    }
}
