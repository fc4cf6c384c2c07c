//! 课程计划处理器：解析主题 / 时长 / 水平，生成待确认计划
//!
//! 生成的计划只进 pending_curriculum，确认前不生效。LLM 不可用或输出
//! 不可解析时退回确定性模板计划，回合不失败。

use std::sync::{Arc, OnceLock};

use async_trait::async_trait;
use regex::Regex;
use serde::Deserialize;

use crate::error::OwlError;
use crate::handlers::{extract_json, Handler, HandlerOutcome, TurnInput};
use crate::llm::{ChatMessage, LlmClient};
use crate::session::{DayPlan, SessionState, StateDelta};

const MAX_PLAN_DAYS: u32 = 30;

static DURATION_RE: OnceLock<Regex> = OnceLock::new();
static CLAUSE_RE: OnceLock<Regex> = OnceLock::new();

pub struct CurriculumHandler {
    llm: Arc<dyn LlmClient>,
    default_days: u32,
}

#[derive(Debug, Deserialize)]
struct PlanDayJson {
    #[serde(default)]
    #[allow(dead_code)]
    day: Option<u32>,
    title: String,
    #[serde(default)]
    tasks: Vec<String>,
}

impl CurriculumHandler {
    pub fn new(llm: Arc<dyn LlmClient>, default_days: u32) -> Self {
        Self { llm, default_days }
    }

    /// "in 5 days" / "over 2 weeks" -> 天数，缺省用配置值
    fn parse_duration(&self, text: &str) -> u32 {
        let re = DURATION_RE.get_or_init(|| Regex::new(r"(?i)(\d+)\s*(day|week)s?\b").unwrap());
        if let Some(caps) = re.captures(text) {
            if let Ok(n) = caps[1].parse::<u32>() {
                let days = if caps[2].eq_ignore_ascii_case("week") {
                    n.saturating_mul(7)
                } else {
                    n
                };
                return days.clamp(1, MAX_PLAN_DAYS);
            }
        }
        self.default_days.clamp(1, MAX_PLAN_DAYS)
    }

    fn parse_skill_level(text: &str) -> Option<String> {
        let lower = text.to_lowercase();
        if lower.contains("beginner")
            || lower.contains("from scratch")
            || lower.contains("new to")
            || lower.contains("never")
        {
            Some("beginner".to_string())
        } else if lower.contains("advanced") || lower.contains("expert") {
            Some("advanced".to_string())
        } else if lower.contains("intermediate") || lower.contains("some experience") {
            Some("intermediate".to_string())
        } else {
            None
        }
    }

    /// 剥掉请求套话和时长 / 水平从句，剩下的就是主题
    fn parse_topic(text: &str) -> Option<String> {
        let mut topic = text.trim().to_string();
        let lower = topic.to_lowercase();

        let prefixes = [
            "i want to learn",
            "i'd like to learn",
            "i would like to learn",
            "help me learn",
            "teach me about",
            "teach me",
            "create a study plan for",
            "create a plan for",
            "make me a plan for",
            "make a plan for",
            "study plan for",
            "plan for",
            "learn about",
            "learn",
        ];
        for prefix in prefixes {
            if lower.starts_with(prefix) {
                topic = topic[prefix.len()..].to_string();
                break;
            }
        }

        let strip = CLAUSE_RE.get_or_init(|| {
            Regex::new(
                r"(?i)\s*(?:(?:in|over|for|within)\s+)?\d+\s*(?:day|week)s?\b|\s*(?:as|for)\s+(?:a\s+|an\s+)?(?:complete\s+|total\s+)?(?:beginner|intermediate|advanced)s?\b|\s*from\s+scratch\b",
            )
            .unwrap()
        });
        let topic = strip.replace_all(&topic, "");
        let topic = topic.trim().trim_matches(|c: char| ",.!?:;".contains(c));
        let topic = topic.trim();

        if topic.is_empty() {
            None
        } else {
            Some(topic.to_string())
        }
    }

    fn build_prompt(topic: &str, days: u32, level: Option<&str>) -> Vec<ChatMessage> {
        let system = "You are a curriculum planner. Output ONLY a JSON array with one object \
                      per day, shaped like {\"day\": 1, \"title\": \"...\", \"tasks\": [\"...\"]}. \
                      Give each day a concrete title and 3-4 short actionable tasks. No prose.";
        let user = format!(
            "Topic: {}\nDays: {}\nLearner level: {}",
            topic,
            days,
            level.unwrap_or("unspecified")
        );
        vec![ChatMessage::system(system), ChatMessage::user(user)]
    }

    /// 解析 LLM 计划；天数不符则补齐 / 截断，完全不可解析则整体回退模板
    fn parse_plan(&self, raw: &str, topic: &str, days: u32) -> Vec<DayPlan> {
        let parsed: Option<Vec<PlanDayJson>> =
            extract_json(raw).and_then(|json| serde_json::from_str(json).ok());

        let Some(entries) = parsed else {
            tracing::warn!("Unparseable plan output, falling back to template");
            return Self::fallback_plan(topic, days);
        };

        let mut plan: Vec<DayPlan> = entries
            .into_iter()
            .filter(|e| !e.title.trim().is_empty())
            .take(days as usize)
            .enumerate()
            .map(|(i, e)| DayPlan {
                day: i as u32 + 1,
                title: e.title.trim().to_string(),
                tasks: if e.tasks.is_empty() {
                    vec![format!("Work through: {}", e.title.trim())]
                } else {
                    e.tasks
                },
            })
            .collect();

        if plan.is_empty() {
            tracing::warn!("Plan output had no usable days, falling back to template");
            return Self::fallback_plan(topic, days);
        }
        if (plan.len() as u32) < days {
            let filler = Self::fallback_plan(topic, days);
            plan.extend(filler.into_iter().skip(plan.len()));
        }
        plan
    }

    fn fallback_plan(topic: &str, days: u32) -> Vec<DayPlan> {
        (1..=days)
            .map(|day| {
                if day == 1 {
                    DayPlan {
                        day,
                        title: format!("Getting started with {}", topic),
                        tasks: vec![
                            format!("Read an overview of {}", topic),
                            "Set up your environment or materials".to_string(),
                            "Work through a first small example".to_string(),
                        ],
                    }
                } else if day == days {
                    DayPlan {
                        day,
                        title: "Review and mini project".to_string(),
                        tasks: vec![
                            "Revisit the trickiest concept so far".to_string(),
                            format!("Build a small project applying {}", topic),
                            "Write down what to learn next".to_string(),
                        ],
                    }
                } else {
                    DayPlan {
                        day,
                        title: format!("Core concepts of {}, part {}", topic, day - 1),
                        tasks: vec![
                            format!("Study the next core area of {}", topic),
                            "Do 2-3 practice exercises".to_string(),
                            "Note open questions for later".to_string(),
                        ],
                    }
                }
            })
            .collect()
    }
}

/// 计划的用户可见渲染，确认处理器复述时也用它
pub(crate) fn format_plan(plan: &[DayPlan]) -> String {
    let mut out = String::new();
    for day in plan {
        out.push_str(&format!("Day {}: {}\n", day.day, day.title));
        for task in &day.tasks {
            out.push_str(&format!("  - {}\n", task));
        }
    }
    out
}

#[async_trait]
impl Handler for CurriculumHandler {
    fn name(&self) -> &'static str {
        "curriculum"
    }

    async fn handle(
        &self,
        _view: &SessionState,
        input: &TurnInput,
    ) -> Result<HandlerOutcome, OwlError> {
        let Some(topic) = Self::parse_topic(&input.text) else {
            return Ok(HandlerOutcome::reply_only(
                "What would you like to learn? Try something like 'teach me Python in 5 days'.",
            ));
        };
        let days = self.parse_duration(&input.text);
        let level = Self::parse_skill_level(&input.text);

        let messages = Self::build_prompt(&topic, days, level.as_deref());
        let plan = match self.llm.complete(&messages).await {
            Ok(raw) => self.parse_plan(&raw, &topic, days),
            Err(e) => {
                tracing::warn!("Plan generation failed ({}), using template plan", e);
                Self::fallback_plan(&topic, days)
            }
        };

        let reply = format!(
            "Here's a proposed {}-day plan for {}:\n\n{}\nReply 'yes' to confirm it, or 'no' to discard and start over.",
            days,
            topic,
            format_plan(&plan)
        );

        let delta = StateDelta {
            topic: Some(topic),
            skill_level: level,
            proposed_curriculum: Some(plan),
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

    fn input(text: &str) -> TurnInput {
        TurnInput {
            text: text.to_string(),
            intent: Intent::StartCurriculum,
        }
    }

    #[test]
    fn test_parse_topic_strips_request_phrasing() {
        assert_eq!(
            CurriculumHandler::parse_topic("teach me Python in 5 days"),
            Some("Python".to_string())
        );
        assert_eq!(
            CurriculumHandler::parse_topic("I want to learn rust as a complete beginner"),
            Some("rust".to_string())
        );
        assert_eq!(
            CurriculumHandler::parse_topic("create a study plan for linear algebra over 2 weeks"),
            Some("linear algebra".to_string())
        );
        assert_eq!(CurriculumHandler::parse_topic("teach me"), None);
    }

    #[test]
    fn test_parse_duration_days_weeks_and_default() {
        let handler = CurriculumHandler::new(Arc::new(MockLlmClient::new()), 7);
        assert_eq!(handler.parse_duration("teach me Go in 5 days"), 5);
        assert_eq!(handler.parse_duration("learn sql over 2 weeks"), 14);
        assert_eq!(handler.parse_duration("teach me chess"), 7);
        // 超长请求被钳制
        assert_eq!(handler.parse_duration("learn piano in 90 days"), 30);
    }

    #[test]
    fn test_parse_skill_level() {
        assert_eq!(
            CurriculumHandler::parse_skill_level("I'm new to this"),
            Some("beginner".to_string())
        );
        assert_eq!(
            CurriculumHandler::parse_skill_level("advanced kubernetes please"),
            Some("advanced".to_string())
        );
        assert_eq!(CurriculumHandler::parse_skill_level("teach me Go"), None);
    }

    #[tokio::test]
    async fn test_handle_parses_llm_plan() {
        let llm = Arc::new(MockLlmClient::with_responses([
            r#"[{"day": 1, "title": "Syntax basics", "tasks": ["Install toolchain", "Hello world"]},
                {"day": 2, "title": "Ownership", "tasks": ["Read the book chapter"]},
                {"day": 3, "title": "Project", "tasks": ["Build a CLI"]}]"#,
        ]));
        let handler = CurriculumHandler::new(llm, 7);

        let outcome = handler
            .handle(&SessionState::new(), &input("teach me Rust in 3 days"))
            .await
            .unwrap();

        let plan = outcome.delta.proposed_curriculum.unwrap();
        assert_eq!(plan.len(), 3);
        assert_eq!(plan[0].title, "Syntax basics");
        assert_eq!(plan[2].day, 3);
        assert_eq!(outcome.delta.topic, Some("Rust".to_string()));
        assert!(outcome.reply.contains("Reply 'yes' to confirm"));
    }

    #[tokio::test]
    async fn test_handle_falls_back_on_garbage_output() {
        let llm = Arc::new(MockLlmClient::with_responses(["sorry, I cannot do that"]));
        let handler = CurriculumHandler::new(llm, 7);

        let outcome = handler
            .handle(&SessionState::new(), &input("teach me Python in 5 days"))
            .await
            .unwrap();

        let plan = outcome.delta.proposed_curriculum.unwrap();
        assert_eq!(plan.len(), 5);
        assert!(plan[0].title.contains("Python"));
    }

    #[tokio::test]
    async fn test_handle_pads_short_plan_to_requested_days() {
        let llm = Arc::new(MockLlmClient::with_responses([
            r#"[{"title": "Only day", "tasks": ["one task"]}]"#,
        ]));
        let handler = CurriculumHandler::new(llm, 7);

        let outcome = handler
            .handle(&SessionState::new(), &input("teach me Git in 4 days"))
            .await
            .unwrap();

        let plan = outcome.delta.proposed_curriculum.unwrap();
        assert_eq!(plan.len(), 4);
        assert_eq!(plan[0].title, "Only day");
        assert_eq!(plan[3].day, 4);
    }

    #[tokio::test]
    async fn test_handle_without_topic_asks_for_one() {
        let handler = CurriculumHandler::new(Arc::new(MockLlmClient::new()), 7);
        let outcome = handler
            .handle(&SessionState::new(), &input("teach me"))
            .await
            .unwrap();
        assert!(outcome.delta.proposed_curriculum.is_none());
        assert!(outcome.reply.contains("What would you like to learn"));
    }
}
