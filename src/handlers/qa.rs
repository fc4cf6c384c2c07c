//! 问答处理器：带会话上下文的自由提问
//!
//! 回复直接来自 LLM，没有确定性回退；LLM 失败时整个回合失败，
//! 引擎保证此时不写任何状态。

use std::sync::Arc;

use async_trait::async_trait;

use crate::error::OwlError;
use crate::handlers::{Handler, HandlerOutcome, TurnInput};
use crate::llm::{ChatMessage, LlmClient};
use crate::session::{SessionState, StateDelta};

/// 带进问答上下文的历史条数
const QA_CONTEXT: usize = 8;

pub struct QaHandler {
    llm: Arc<dyn LlmClient>,
}

impl QaHandler {
    pub fn new(llm: Arc<dyn LlmClient>) -> Self {
        Self { llm }
    }

    fn system_prompt(view: &SessionState) -> String {
        let mut prompt = String::from(
            "You are a patient, encouraging tutor. Answer the learner's question clearly and \
             concisely. Prefer small concrete examples over abstract theory.",
        );
        if let Some(topic) = &view.current_topic {
            prompt.push_str(&format!(" The learner is studying {}.", topic));
        }
        if let Some(level) = &view.skill_level {
            prompt.push_str(&format!(" Their level: {}.", level));
        }
        if let Some(day) = view.next_open_day().and_then(|d| view.day_plan(d)) {
            prompt.push_str(&format!(" They are currently on: {}.", day.title));
        }
        prompt
    }
}

#[async_trait]
impl Handler for QaHandler {
    fn name(&self) -> &'static str {
        "qa"
    }

    async fn handle(
        &self,
        view: &SessionState,
        input: &TurnInput,
    ) -> Result<HandlerOutcome, OwlError> {
        let mut messages = vec![ChatMessage::system(Self::system_prompt(view))];
        messages.extend_from_slice(view.recent_history(QA_CONTEXT));
        messages.push(ChatMessage::user(&input.text));

        let answer = self
            .llm
            .complete(&messages)
            .await
            .map_err(|e| OwlError::Handler("qa", e))?;

        let delta = StateDelta {
            question_asked: true,
            ..Default::default()
        };
        Ok(HandlerOutcome::new(delta, answer))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::intent::Intent;
    use crate::llm::MockLlmClient;

    fn input(text: &str) -> TurnInput {
        TurnInput {
            text: text.to_string(),
            intent: Intent::AskQuestion,
        }
    }

    #[tokio::test]
    async fn test_answer_comes_from_llm_and_counts_question() {
        let llm = Arc::new(MockLlmClient::with_responses([
            "A closure captures its environment.",
        ]));
        let handler = QaHandler::new(llm);
        let mut state = SessionState::new();
        state.current_topic = Some("rust".to_string());

        let outcome = handler
            .handle(&state, &input("what is a closure?"))
            .await
            .unwrap();
        assert_eq!(outcome.reply, "A closure captures its environment.");
        assert!(outcome.delta.question_asked);
    }

    #[tokio::test]
    async fn test_llm_failure_propagates() {
        struct FailingLlm;
        #[async_trait]
        impl LlmClient for FailingLlm {
            async fn complete(&self, _messages: &[ChatMessage]) -> Result<String, String> {
                Err("connection refused".to_string())
            }
        }

        let handler = QaHandler::new(Arc::new(FailingLlm));
        let err = handler
            .handle(&SessionState::new(), &input("why is the sky blue?"))
            .await
            .unwrap_err();
        assert!(matches!(err, OwlError::Handler("qa", _)));
    }
}
