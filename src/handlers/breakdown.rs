//! 拆解处理器：把某一天展开成可勾选的细步骤清单
//!
//! 已确认课程保持不动，清单写进 day_checklists；LLM 不可用时
//! 直接用该日的原任务当清单。

use std::sync::{Arc, OnceLock};

use async_trait::async_trait;
use regex::Regex;

use crate::error::OwlError;
use crate::handlers::{find_day_number, Handler, HandlerOutcome, TurnInput};
use crate::llm::{ChatMessage, LlmClient};
use crate::session::{DayPlan, SessionState, StateDelta};

const MAX_STEPS: usize = 8;

static BULLET_RE: OnceLock<Regex> = OnceLock::new();

pub struct BreakdownHandler {
    llm: Arc<dyn LlmClient>,
}

impl BreakdownHandler {
    pub fn new(llm: Arc<dyn LlmClient>) -> Self {
        Self { llm }
    }

    fn build_prompt(topic: Option<&str>, day: &DayPlan) -> Vec<ChatMessage> {
        let system = "You split a study day into 4-6 small, concrete, checkable steps. \
                      Output one step per line, no numbering, no prose around them.";
        let user = format!(
            "Topic: {}\nDay {}: {}\nPlanned tasks:\n{}",
            topic.unwrap_or("general"),
            day.day,
            day.title,
            day.tasks
                .iter()
                .map(|t| format!("- {}", t))
                .collect::<Vec<_>>()
                .join("\n")
        );
        vec![ChatMessage::system(system), ChatMessage::user(user)]
    }

    /// 逐行收集步骤，剥掉项目符号 / 序号前缀；不足两条视为不可用
    fn parse_steps(raw: &str) -> Vec<String> {
        let re = BULLET_RE
            .get_or_init(|| Regex::new(r"^\s*(?:[-*•·]|\[\s?\]|\d+[\.\)])\s*").unwrap());
        let steps: Vec<String> = raw
            .lines()
            .map(|line| re.replace(line, "").trim().to_string())
            .filter(|line| !line.is_empty() && !line.starts_with("```"))
            .take(MAX_STEPS)
            .collect();
        if steps.len() < 2 {
            Vec::new()
        } else {
            steps
        }
    }
}

#[async_trait]
impl Handler for BreakdownHandler {
    fn name(&self) -> &'static str {
        "breakdown"
    }

    async fn handle(
        &self,
        view: &SessionState,
        input: &TurnInput,
    ) -> Result<HandlerOutcome, OwlError> {
        if view.curriculum.is_none() {
            let reply = if view.pending_curriculum.is_some() {
                "Confirm your plan first ('yes' or 'no'), then I can break days down."
            } else {
                "There's no plan to break down yet. Say 'teach me <topic>' to create one."
            };
            return Ok(HandlerOutcome::reply_only(reply));
        }

        let day = match find_day_number(&input.text).or_else(|| view.next_open_day()) {
            Some(day) => day,
            None => {
                return Ok(HandlerOutcome::reply_only(
                    "Every day in your plan is already complete — nothing left to break down.",
                ))
            }
        };
        let Some(day_plan) = view.day_plan(day) else {
            let total = view.curriculum.as_ref().map(|p| p.len()).unwrap_or(0);
            return Ok(HandlerOutcome::reply_only(format!(
                "Day {} isn't in your plan (it has {} days).",
                day, total
            )));
        };

        let prompt = Self::build_prompt(view.current_topic.as_deref(), day_plan);
        let steps = match self.llm.complete(&prompt).await {
            Ok(raw) => {
                let parsed = Self::parse_steps(&raw);
                if parsed.is_empty() {
                    tracing::warn!("Unusable breakdown output, falling back to planned tasks");
                    day_plan.tasks.clone()
                } else {
                    parsed
                }
            }
            Err(e) => {
                tracing::warn!("Breakdown generation failed ({}), using planned tasks", e);
                day_plan.tasks.clone()
            }
        };

        let mut reply = format!("Day {} ({}) broken down into steps:\n", day, day_plan.title);
        for (i, step) in steps.iter().enumerate() {
            reply.push_str(&format!("  {}. {}\n", i + 1, step));
        }
        reply.push_str(&format!(
            "Say 'task 1 of day {} done' as you finish each step.",
            day
        ));

        let delta = StateDelta {
            checklist_set: Some((day, steps)),
            ..Default::default()
        };
        Ok(HandlerOutcome::new(delta, reply))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::intent::Intent;
    use crate::llm::MockLlmClient;
    use crate::session::PlanDecision;

    fn input(text: &str) -> TurnInput {
        TurnInput {
            text: text.to_string(),
            intent: Intent::BreakdownDay,
        }
    }

    fn confirmed_state() -> SessionState {
        let mut state = SessionState::new();
        state.current_topic = Some("rust".to_string());
        state.apply(&StateDelta {
            proposed_curriculum: Some(vec![
                DayPlan {
                    day: 1,
                    title: "Ownership".into(),
                    tasks: vec!["read chapter".into(), "do exercises".into()],
                },
                DayPlan {
                    day: 2,
                    title: "Traits".into(),
                    tasks: vec!["impl a trait".into()],
                },
            ]),
            ..Default::default()
        });
        state.apply(&StateDelta {
            decision: Some(PlanDecision::Accept),
            ..Default::default()
        });
        state
    }

    #[test]
    fn test_parse_steps_strips_bullets_and_numbering() {
        let raw = "- Read the ownership chapter\n2) Try the examples\n  * Move semantics drill\n\n";
        let steps = BreakdownHandler::parse_steps(raw);
        assert_eq!(
            steps,
            vec![
                "Read the ownership chapter".to_string(),
                "Try the examples".to_string(),
                "Move semantics drill".to_string(),
            ]
        );
    }

    #[test]
    fn test_parse_steps_rejects_single_line() {
        assert!(BreakdownHandler::parse_steps("I cannot help with that").is_empty());
    }

    #[tokio::test]
    async fn test_breakdown_writes_checklist_for_named_day() {
        let llm = Arc::new(MockLlmClient::with_responses([
            "Skim the traits chapter\nWrite a Shape trait\nImplement it for two types\nRun the tests",
        ]));
        let handler = BreakdownHandler::new(llm);

        let outcome = handler
            .handle(&confirmed_state(), &input("break down day 2"))
            .await
            .unwrap();

        let (day, steps) = outcome.delta.checklist_set.unwrap();
        assert_eq!(day, 2);
        assert_eq!(steps.len(), 4);
        assert!(outcome.reply.contains("Day 2 (Traits)"));
        assert!(outcome.reply.contains("task 1 of day 2"));
    }

    #[tokio::test]
    async fn test_breakdown_defaults_to_next_open_day() {
        let llm = Arc::new(MockLlmClient::with_responses(["Step one\nStep two"]));
        let handler = BreakdownHandler::new(llm);

        let outcome = handler
            .handle(&confirmed_state(), &input("break it down for me"))
            .await
            .unwrap();
        let (day, _) = outcome.delta.checklist_set.unwrap();
        assert_eq!(day, 1);
    }

    #[tokio::test]
    async fn test_breakdown_falls_back_to_planned_tasks() {
        let llm = Arc::new(MockLlmClient::with_responses(["nope"]));
        let handler = BreakdownHandler::new(llm);

        let outcome = handler
            .handle(&confirmed_state(), &input("break down day 1"))
            .await
            .unwrap();
        let (_, steps) = outcome.delta.checklist_set.unwrap();
        assert_eq!(steps, vec!["read chapter".to_string(), "do exercises".to_string()]);
    }

    #[tokio::test]
    async fn test_breakdown_without_plan() {
        let handler = BreakdownHandler::new(Arc::new(MockLlmClient::new()));
        let outcome = handler
            .handle(&SessionState::new(), &input("break down day 1"))
            .await
            .unwrap();
        assert!(outcome.delta.checklist_set.is_none());
        assert!(outcome.reply.contains("no plan"));
    }
}
