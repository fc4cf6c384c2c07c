//! 确认处理器：挂起计划的接受 / 放弃 / 再询问
//!
//! 会话挂起时引擎无条件路由到这里，所以决定从原始文本重新判读，
//! 不依赖分类器给的意图。既非肯定也非否定时复述计划等下一回合，
//! 挂起不变。纯确定性，不调 LLM。

use async_trait::async_trait;

use crate::error::OwlError;
use crate::handlers::curriculum::format_plan;
use crate::handlers::{Handler, HandlerOutcome, TurnInput};
use crate::session::{PlanDecision, SessionState, StateDelta};

pub struct ConfirmHandler;

impl ConfirmHandler {
    pub fn new() -> Self {
        Self
    }

    /// 文本 -> 决定；模糊时 None
    fn decide(text: &str) -> Option<PlanDecision> {
        let lower = text.trim().to_lowercase();

        const ACCEPT: &[&str] = &[
            "yes",
            "yeah",
            "yep",
            "y",
            "ok",
            "okay",
            "sure",
            "confirm",
            "confirmed",
            "accept",
            "approve",
            "sounds good",
            "looks good",
            "lgtm",
            "go ahead",
            "let's do it",
            "do it",
        ];
        const DISCARD: &[&str] = &["no", "nope", "nah", "n", "reject", "discard", "cancel"];

        if ACCEPT.contains(&lower.as_str()) {
            return Some(PlanDecision::Accept);
        }
        if DISCARD.contains(&lower.as_str()) {
            return Some(PlanDecision::Discard);
        }

        for prefix in ["yes", "ok,", "ok ", "okay", "sure", "confirm", "accept"] {
            if lower.starts_with(prefix) {
                return Some(PlanDecision::Accept);
            }
        }
        for prefix in ["no,", "no ", "no.", "nope", "nah", "reject", "discard", "cancel"] {
            if lower.starts_with(prefix) {
                return Some(PlanDecision::Discard);
            }
        }
        if lower.contains("start over") || lower.contains("something else") {
            return Some(PlanDecision::Discard);
        }
        None
    }
}

impl Default for ConfirmHandler {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Handler for ConfirmHandler {
    fn name(&self) -> &'static str {
        "confirm"
    }

    async fn handle(
        &self,
        view: &SessionState,
        input: &TurnInput,
    ) -> Result<HandlerOutcome, OwlError> {
        let Some(pending) = &view.pending_curriculum else {
            return Ok(HandlerOutcome::reply_only(
                "There's no plan waiting for confirmation. Say 'teach me <topic>' to propose one.",
            ));
        };
        let topic = view.current_topic.as_deref().unwrap_or("your topic");

        match Self::decide(&input.text) {
            Some(PlanDecision::Accept) => {
                let first = pending
                    .first()
                    .map(|d| d.title.as_str())
                    .unwrap_or("getting started");
                let reply = format!(
                    "Great — your {}-day plan for {} is confirmed. Start with Day 1: {}.\n\
                     Say 'break down day 1' for smaller steps, 'quiz me' to test yourself, or just ask questions.",
                    pending.len(),
                    topic,
                    first
                );
                let delta = StateDelta {
                    decision: Some(PlanDecision::Accept),
                    ..Default::default()
                };
                Ok(HandlerOutcome::new(delta, reply))
            }
            Some(PlanDecision::Discard) => {
                let delta = StateDelta {
                    decision: Some(PlanDecision::Discard),
                    ..Default::default()
                };
                Ok(HandlerOutcome::new(
                    delta,
                    format!(
                        "No problem, I've discarded the {} plan. Tell me what you'd like to learn instead.",
                        topic
                    ),
                ))
            }
            None => {
                // 决定悬而未决，复述计划，下一回合仍强制路由到这里
                let reply = format!(
                    "I still need your decision on the proposed plan for {}:\n\n{}\nPlease reply 'yes' to confirm it or 'no' to discard it.",
                    topic,
                    format_plan(pending)
                );
                Ok(HandlerOutcome::reply_only(reply))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::intent::Intent;
    use crate::session::DayPlan;

    fn awaiting_state() -> SessionState {
        let mut state = SessionState::new();
        state.current_topic = Some("Python".to_string());
        state.pending_curriculum = Some(vec![
            DayPlan {
                day: 1,
                title: "Basics".to_string(),
                tasks: vec!["Install Python".to_string()],
            },
            DayPlan {
                day: 2,
                title: "Functions".to_string(),
                tasks: vec!["Write a function".to_string()],
            },
        ]);
        state.awaiting_confirmation = true;
        state
    }

    fn input(text: &str) -> TurnInput {
        TurnInput {
            text: text.to_string(),
            intent: Intent::ConfirmCurriculum,
        }
    }

    #[tokio::test]
    async fn test_accept_promotes_pending_plan() {
        let outcome = ConfirmHandler::new()
            .handle(&awaiting_state(), &input("yes please"))
            .await
            .unwrap();
        assert!(matches!(outcome.delta.decision, Some(PlanDecision::Accept)));
        assert!(outcome.reply.contains("Day 1: Basics"));
    }

    #[tokio::test]
    async fn test_reject_discards_pending_plan() {
        let outcome = ConfirmHandler::new()
            .handle(&awaiting_state(), &input("no thanks"))
            .await
            .unwrap();
        assert!(matches!(outcome.delta.decision, Some(PlanDecision::Discard)));
        assert!(outcome.reply.contains("discarded"));
    }

    #[tokio::test]
    async fn test_ambiguous_input_reprompts_without_decision() {
        let outcome = ConfirmHandler::new()
            .handle(&awaiting_state(), &input("can you also add exercises?"))
            .await
            .unwrap();
        assert!(outcome.delta.decision.is_none());
        assert!(outcome.reply.contains("Day 1: Basics"));
        assert!(outcome.reply.contains("'yes'"));
    }

    #[tokio::test]
    async fn test_nothing_pending() {
        let outcome = ConfirmHandler::new()
            .handle(&SessionState::new(), &input("yes"))
            .await
            .unwrap();
        assert!(outcome.delta.decision.is_none());
        assert!(outcome.reply.contains("no plan waiting"));
    }
}
