//! 意图分类：两级结构
//!
//! 一级是确定性规则表（廉价、可审计，命中即定）；二级才调用 LLM，
//! 且其输出必须落在封闭意图集合内——校验失败一律归入 Unknown，绝不把自由文本当控制信号。

use std::sync::Arc;

use fuzzy_matcher::skim::SkimMatcherV2;
use fuzzy_matcher::FuzzyMatcher;
use serde::{Deserialize, Serialize};

use crate::llm::{ChatMessage, LlmClient};

pub mod rules;

/// 封闭意图集合：每个意图对应一个处理器
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Intent {
    StartCurriculum,
    ConfirmCurriculum,
    RejectCurriculum,
    GenerateQuiz,
    SubmitQuizAnswer,
    FetchResources,
    ShowProgress,
    AskQuestion,
    BreakdownDay,
    Unknown,
}

impl Intent {
    pub const ALL: [Intent; 10] = [
        Intent::StartCurriculum,
        Intent::ConfirmCurriculum,
        Intent::RejectCurriculum,
        Intent::GenerateQuiz,
        Intent::SubmitQuizAnswer,
        Intent::FetchResources,
        Intent::ShowProgress,
        Intent::AskQuestion,
        Intent::BreakdownDay,
        Intent::Unknown,
    ];

    pub fn as_token(&self) -> &'static str {
        match self {
            Intent::StartCurriculum => "start_curriculum",
            Intent::ConfirmCurriculum => "confirm_curriculum",
            Intent::RejectCurriculum => "reject_curriculum",
            Intent::GenerateQuiz => "generate_quiz",
            Intent::SubmitQuizAnswer => "submit_quiz_answer",
            Intent::FetchResources => "fetch_resources",
            Intent::ShowProgress => "show_progress",
            Intent::AskQuestion => "ask_question",
            Intent::BreakdownDay => "breakdown_day",
            Intent::Unknown => "unknown",
        }
    }

    pub fn from_token(token: &str) -> Option<Intent> {
        Intent::ALL.iter().copied().find(|i| i.as_token() == token)
    }
}

/// 意图分类器：规则表优先，LLM 兜底
pub struct IntentClassifier {
    llm: Arc<dyn LlmClient>,
    /// 启用一级规则匹配（不调用 LLM）
    enable_fast_match: bool,
}

impl IntentClassifier {
    pub fn new(llm: Arc<dyn LlmClient>) -> Self {
        Self {
            llm,
            enable_fast_match: true,
        }
    }

    /// 分类用户输入；纯函数语义，重复调用结果一致
    ///
    /// 规则命中永远优先于 LLM；LLM 调用失败或输出不在集合内时降级为 Unknown。
    pub async fn classify(&self, text: &str, history: &[ChatMessage]) -> Intent {
        if self.enable_fast_match {
            if let Some(intent) = rules::rule_match(text) {
                tracing::debug!(intent = intent.as_token(), "Rule table matched intent");
                return intent;
            }
        }

        match self.llm_classify(text, history).await {
            Ok(intent) => intent,
            Err(e) => {
                tracing::warn!("Intent classification call failed: {}", e);
                Intent::Unknown
            }
        }
    }

    /// 使用 LLM 识别意图，输出约束在封闭集合内
    async fn llm_classify(&self, text: &str, history: &[ChatMessage]) -> Result<Intent, String> {
        let system_prompt = r#"You are an intent classifier for a personal learning assistant.
Classify the user's latest message into exactly one intent.

Output ONLY one of these intent tokens (no explanation):
- start_curriculum: user wants a new learning plan for some topic
- confirm_curriculum: user approves a proposed plan
- reject_curriculum: user declines a proposed plan
- generate_quiz: user wants to be quizzed on the topic
- submit_quiz_answer: the message contains answers to an open quiz
- fetch_resources: user wants videos, articles or code repositories
- show_progress: user asks how far along they are, or marks days/tasks done
- ask_question: a free-form question about the topic
- breakdown_day: user wants one day of the plan split into smaller tasks
- unknown: none of the above fits

Output format: just the intent token, nothing else."#;

        let mut messages = vec![ChatMessage::system(system_prompt)];
        messages.extend(history.iter().cloned());
        messages.push(ChatMessage::user(format!("User input: {}", text)));

        let response = self.llm.complete(&messages).await?;
        Ok(parse_intent_token(&response).unwrap_or(Intent::Unknown))
    }
}

/// 把 LLM 的原始输出规整为意图 token：
/// 取最后一行，去引号 / 反引号 / 标点，去 "intent:" 一类前缀，空格折成下划线；
/// 仍不匹配时对集合做一次子序列贴合，失败即 None。
fn parse_intent_token(raw: &str) -> Option<Intent> {
    let line = raw.trim().lines().last()?.trim().to_lowercase();
    let line = line
        .trim_matches(|c: char| matches!(c, '`' | '"' | '\'' | '.' | '!' | '*'))
        .trim();

    let stripped = line
        .strip_prefix("intent:")
        .or_else(|| line.strip_prefix("action:"))
        .or_else(|| line.strip_prefix("the intent is"))
        .unwrap_or(line)
        .trim();

    let token: String = stripped
        .chars()
        .map(|c| if c == ' ' || c == '-' { '_' } else { c })
        .collect();

    if let Some(intent) = Intent::from_token(&token) {
        return Some(intent);
    }

    let matcher = SkimMatcherV2::default();
    for intent in Intent::ALL {
        let needle = intent.as_token();
        if let Some((_, indices)) = matcher.fuzzy_indices(&token, needle) {
            if let (Some(first), Some(last)) = (indices.first(), indices.last()) {
                if last - first + 1 <= needle.len() + 2 {
                    return Some(intent);
                }
            }
        }
    }
    None
}
