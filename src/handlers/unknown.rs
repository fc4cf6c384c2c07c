//! 兜底处理器：分类不出意图时给上下文相关的用法提示

use async_trait::async_trait;

use crate::error::OwlError;
use crate::handlers::{Handler, HandlerOutcome, TurnInput};
use crate::session::SessionState;

#[derive(Default)]
pub struct UnknownHandler;

impl UnknownHandler {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl Handler for UnknownHandler {
    fn name(&self) -> &'static str {
        "unknown"
    }

    async fn handle(
        &self,
        view: &SessionState,
        _input: &TurnInput,
    ) -> Result<HandlerOutcome, OwlError> {
        let mut reply = String::from("I didn't quite catch that. Here's what I can do:\n");
        reply.push_str("  - teach me <topic> in <n> days — propose a study plan\n");
        reply.push_str("  - quiz me — test what you've learned\n");
        reply.push_str("  - find resources — videos, articles and repositories\n");
        reply.push_str("  - show progress — where you are in the plan\n");
        reply.push_str("  - break down day <n> — split a day into small steps\n");
        match &view.current_topic {
            Some(topic) => {
                reply.push_str(&format!("  - or just ask me anything about {}\n", topic))
            }
            None => reply.push_str("  - or just ask me a question\n"),
        }
        if view.quiz_state.is_some() {
            reply.push_str("\nYou have an open quiz — answer like '1. a  2. b  3. c'.");
        }
        Ok(HandlerOutcome::reply_only(reply))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::intent::Intent;
    use crate::session::{QuizQuestion, QuizState};

    #[tokio::test]
    async fn test_help_mentions_open_quiz() {
        let mut state = SessionState::new();
        state.quiz_state = Some(QuizState::new(
            "rust",
            vec![QuizQuestion {
                question: "Q?".into(),
                options: vec!["a".into(), "b".into()],
                correct_answer: "a".into(),
                explanation: String::new(),
            }],
        ));

        let outcome = UnknownHandler::new()
            .handle(
                &state,
                &TurnInput {
                    text: "blergh".into(),
                    intent: Intent::Unknown,
                },
            )
            .await
            .unwrap();
        assert!(outcome.reply.contains("open quiz"));
        assert!(outcome.reply.contains("teach me <topic>"));
    }
}
