//! 会话状态：编排引擎的中心实体
//!
//! 按会话 ID 持久化；除 version 外的所有字段只能经由引擎的 apply-delta 路径变更。
//! 两个持久状态：Idle 与 AwaitingConfirmation（课程提案等待用户确认）。

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::content::{Category, ContentItem};
use crate::llm::ChatMessage;

/// 状态机的持久状态：空闲，或有课程提案等待用户确认
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionStatus {
    Idle,
    AwaitingConfirmation,
}

/// 单日计划：日序号、标题与任务列表；课程确认后不再改动
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DayPlan {
    pub day: u32,
    pub title: String,
    pub tasks: Vec<String>,
}

/// 某一天的完成状态
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DayStatus {
    NotStarted,
    InProgress,
    Done,
}

/// 测验单题：题干、选项（a-d 顺序）、正确选项字母与解析
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QuizQuestion {
    pub question: String,
    pub options: Vec<String>,
    pub correct_answer: String,
    pub explanation: String,
}

/// 进行中的测验：题目与已提交的答案（允许部分作答，未答为 None）
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QuizState {
    pub topic: String,
    pub questions: Vec<QuizQuestion>,
    pub answers: Vec<Option<String>>,
}

impl QuizState {
    pub fn new(topic: impl Into<String>, questions: Vec<QuizQuestion>) -> Self {
        let answers = vec![None; questions.len()];
        Self {
            topic: topic.into(),
            questions,
            answers,
        }
    }

    /// 所有题目都已作答
    pub fn fully_answered(&self) -> bool {
        self.answers.iter().all(|a| a.is_some())
    }
}

/// 某一天拆解出的待办项
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChecklistItem {
    pub text: String,
    pub done: bool,
}

/// 最近一次抓取的学习资源缓存：按类目分组，记录失败类目与抓取时间
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResourceCache {
    pub items: BTreeMap<Category, Vec<ContentItem>>,
    pub missing: Vec<Category>,
    pub fetched_at: DateTime<Utc>,
}

/// 学习统计：问答次数、测验次数与平均分
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct LearningStats {
    pub questions_asked: u32,
    pub quizzes_taken: u32,
    pub average_quiz_score: f32,
}

/// 会话状态全量结构
///
/// 不变量：
/// - `version` 只增不减，条件写必须带上读取时的版本号；
/// - `awaiting_confirmation == true` 当且仅当 `pending_curriculum` 非空且尚未晋升；
/// - `progress` 与 `day_checklists` 的键都是 `curriculum` 中存在的日序号；
/// - `conversation_history` 有长度上限，超出时淘汰最旧条目。
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SessionState {
    #[serde(default)]
    pub current_topic: Option<String>,
    #[serde(default)]
    pub skill_level: Option<String>,
    /// 已确认的课程，确认后不可编辑
    #[serde(default)]
    pub curriculum: Option<Vec<DayPlan>>,
    /// 等待确认的课程提案，与已确认课程的再编辑互斥
    #[serde(default)]
    pub pending_curriculum: Option<Vec<DayPlan>>,
    #[serde(default)]
    pub awaiting_confirmation: bool,
    #[serde(default)]
    pub progress: BTreeMap<u32, DayStatus>,
    /// 拆解出的每日待办清单（课程本体保持不变）
    #[serde(default)]
    pub day_checklists: BTreeMap<u32, Vec<ChecklistItem>>,
    #[serde(default)]
    pub quiz_state: Option<QuizState>,
    #[serde(default)]
    pub last_resources: Option<ResourceCache>,
    #[serde(default)]
    pub conversation_history: Vec<ChatMessage>,
    #[serde(default)]
    pub stats: LearningStats,
    /// 每次成功提交递增；用于检测并拒绝过期的并发写
    #[serde(default)]
    pub version: u64,
}

impl SessionState {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn status(&self) -> SessionStatus {
        if self.awaiting_confirmation {
            SessionStatus::AwaitingConfirmation
        } else {
            SessionStatus::Idle
        }
    }

    /// 追加一条历史并按上限淘汰最旧条目
    pub fn push_history(&mut self, msg: ChatMessage, cap: usize) {
        self.conversation_history.push(msg);
        if self.conversation_history.len() > cap {
            let drop = self.conversation_history.len() - cap;
            self.conversation_history.drain(..drop);
        }
    }

    /// 最近 n 条历史，供分类器与问答处理器做上下文
    pub fn recent_history(&self, n: usize) -> &[ChatMessage] {
        let len = self.conversation_history.len();
        &self.conversation_history[len.saturating_sub(n)..]
    }

    /// 已确认课程里是否存在该日
    pub fn has_day(&self, day: u32) -> bool {
        self.curriculum
            .as_ref()
            .is_some_and(|plan| plan.iter().any(|d| d.day == day))
    }

    pub fn day_plan(&self, day: u32) -> Option<&DayPlan> {
        self.curriculum
            .as_ref()
            .and_then(|plan| plan.iter().find(|d| d.day == day))
    }

    pub fn days_done(&self) -> usize {
        self.progress
            .values()
            .filter(|s| **s == DayStatus::Done)
            .count()
    }

    /// 第一个未完成的日序号（全部完成时为 None）
    pub fn next_open_day(&self) -> Option<u32> {
        let plan = self.curriculum.as_ref()?;
        plan.iter()
            .map(|d| d.day)
            .find(|day| self.progress.get(day) != Some(&DayStatus::Done))
    }
}
