//! 处理器集合：每个意图一个独立单元
//!
//! 共同契约：handle(只读状态视图, 回合输入) -> (状态增量, 回复文本)。
//! 处理器不碰存储也不含控制流——强制路由、提交、重试全部在引擎里；
//! 所有状态变更必须写进增量，由引擎原子应用。

use async_trait::async_trait;

use crate::error::OwlError;
use crate::intent::Intent;
use crate::session::{SessionState, StateDelta};

pub mod breakdown;
pub mod confirm;
pub mod curriculum;
pub mod progress;
pub mod qa;
pub mod quiz;
pub mod resources;
pub mod unknown;

pub use breakdown::BreakdownHandler;
pub use confirm::ConfirmHandler;
pub use curriculum::CurriculumHandler;
pub use progress::ProgressHandler;
pub use qa::QaHandler;
pub use quiz::{QuizGenerateHandler, QuizGradeHandler};
pub use resources::ResourcesHandler;
pub use unknown::UnknownHandler;

/// 一次回合的输入：原始文本与路由意图
#[derive(Debug, Clone)]
pub struct TurnInput {
    pub text: String,
    pub intent: Intent,
}

/// 处理器产出
#[derive(Debug, Clone, Default)]
pub struct HandlerOutcome {
    pub delta: StateDelta,
    pub reply: String,
}

impl HandlerOutcome {
    pub fn new(delta: StateDelta, reply: impl Into<String>) -> Self {
        Self {
            delta,
            reply: reply.into(),
        }
    }

    /// 只回话不改状态（历史追加由引擎负责）
    pub fn reply_only(reply: impl Into<String>) -> Self {
        Self {
            delta: StateDelta::default(),
            reply: reply.into(),
        }
    }
}

/// 处理器 trait：对状态视图只读，变更全部经由增量表达
#[async_trait]
pub trait Handler: Send + Sync {
    fn name(&self) -> &'static str;

    async fn handle(
        &self,
        view: &SessionState,
        input: &TurnInput,
    ) -> Result<HandlerOutcome, OwlError>;
}

/// 从 LLM 输出中取 JSON 块：```json 围栏优先；裸文本里数组优先于对象，
/// 这样 `{"questions": [...]}` 式的信封也能剥出数组本体
pub(crate) fn extract_json(output: &str) -> Option<&str> {
    let trimmed = output.trim();

    if let Some(start) = trimmed.find("```json") {
        let rest = &trimmed[start + 7..];
        return Some(
            rest.find("```")
                .map(|end| rest[..end].trim())
                .unwrap_or_else(|| rest.trim()),
        );
    }

    let arr = trimmed.find('[');
    let obj = trimmed.find('{');
    match (arr, obj) {
        (Some(a), Some(o)) if a < o => bracket_slice(trimmed, a, ']'),
        (Some(a), _) => bracket_slice(trimmed, a, ']'),
        (None, Some(o)) => bracket_slice(trimmed, o, '}'),
        (None, None) => None,
    }
}

fn bracket_slice(s: &str, open: usize, close: char) -> Option<&str> {
    let end = s.rfind(close)?;
    if end < open {
        return None;
    }
    Some(&s[open..=end])
}

static DAY_RE: std::sync::OnceLock<regex::Regex> = std::sync::OnceLock::new();

/// 文本里的 "day N" 引用
pub(crate) fn find_day_number(text: &str) -> Option<u32> {
    let re = DAY_RE.get_or_init(|| regex::Regex::new(r"(?i)day\s*(\d+)").unwrap());
    re.captures(text)?.get(1)?.as_str().parse().ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_extract_json_fenced() {
        let raw = "Sure, here you go:\n```json\n[{\"day\": 1}]\n```\nHope it helps";
        assert_eq!(extract_json(raw), Some("[{\"day\": 1}]"));
    }

    #[test]
    fn test_extract_json_bare_array() {
        let raw = "plan: [1, 2, 3] done";
        assert_eq!(extract_json(raw), Some("[1, 2, 3]"));
    }

    #[test]
    fn test_extract_json_object_inside_prose() {
        let raw = "the result {\"ok\": true} as requested";
        assert_eq!(extract_json(raw), Some("{\"ok\": true}"));
    }

    #[test]
    fn test_extract_json_unwraps_envelope_object() {
        let raw = r#"{"questions": [{"q": 1}]}"#;
        assert_eq!(extract_json(raw), Some(r#"[{"q": 1}]"#));
    }

    #[test]
    fn test_extract_json_none() {
        assert_eq!(extract_json("no structured data here"), None);
    }

    #[test]
    fn test_find_day_number() {
        assert_eq!(find_day_number("break down day 3 please"), Some(3));
        assert_eq!(find_day_number("Day12"), Some(12));
        assert_eq!(find_day_number("no day mentioned"), None);
    }
}
