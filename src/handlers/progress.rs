//! 进度处理器：进度报告、标记完成、勾清单项
//!
//! 纯确定性，不调 LLM。带拆解清单的日子要么清单全勾要么明确 force
//! 才能整日标记完成；不在课程里的日序号直接拒绝，不写任何状态。

use std::sync::OnceLock;

use async_trait::async_trait;
use regex::Regex;

use crate::error::OwlError;
use crate::handlers::{find_day_number, Handler, HandlerOutcome, TurnInput};
use crate::session::{DayStatus, SessionState, StateDelta};

static TASK_RE: OnceLock<Regex> = OnceLock::new();
static START_RE: OnceLock<Regex> = OnceLock::new();
static MARK_RE: OnceLock<Regex> = OnceLock::new();

#[derive(Debug, PartialEq)]
enum ProgressOp {
    MarkDone { day: u32, force: bool },
    StartDay { day: u32 },
    TickTask { task: usize, day: Option<u32> },
}

/// 文本 -> 进度操作；不带操作动词的输入归为报告请求
fn parse_progress_op(text: &str) -> Option<ProgressOp> {
    let lower = text.to_lowercase();

    let task_re = TASK_RE.get_or_init(|| Regex::new(r"(?i)task\s+(\d+)").unwrap());
    if let Some(caps) = task_re.captures(text) {
        let has_verb = ["done", "complete", "finish", "check", "tick"]
            .iter()
            .any(|v| lower.contains(v));
        if has_verb {
            let task = caps.get(1)?.as_str().parse().ok()?;
            return Some(ProgressOp::TickTask {
                task,
                day: find_day_number(text),
            });
        }
    }

    let start_re =
        START_RE.get_or_init(|| Regex::new(r"(?i)(?:start|begin|work\s+on)\s+day\s+(\d+)").unwrap());
    if let Some(caps) = start_re.captures(text) {
        let day = caps.get(1)?.as_str().parse().ok()?;
        return Some(ProgressOp::StartDay { day });
    }

    let mark_re = MARK_RE.get_or_init(|| {
        Regex::new(
            r"(?i)(?:mark|complete|completed|finish|finished|done\s+with)\s+day\s+(\d+)|day\s+(\d+)\s+(?:is\s+)?(?:done|complete|completed|finished)",
        )
        .unwrap()
    });
    if let Some(caps) = mark_re.captures(text) {
        let day = caps
            .get(1)
            .or_else(|| caps.get(2))?
            .as_str()
            .parse()
            .ok()?;
        return Some(ProgressOp::MarkDone {
            day,
            force: lower.contains("force"),
        });
    }

    None
}

#[derive(Default)]
pub struct ProgressHandler;

impl ProgressHandler {
    pub fn new() -> Self {
        Self
    }

    fn mark_done(view: &SessionState, day: u32, force: bool) -> HandlerOutcome {
        let Some(plan) = &view.curriculum else {
            return HandlerOutcome::reply_only(
                "There's no confirmed plan yet. Say 'teach me <topic>' to create one.",
            );
        };
        if !view.has_day(day) {
            return HandlerOutcome::reply_only(format!(
                "Day {} isn't in your plan (it has {} days).",
                day,
                plan.len()
            ));
        }
        if view.progress.get(&day) == Some(&DayStatus::Done) {
            return HandlerOutcome::reply_only(format!("Day {} is already done.", day));
        }

        if !force {
            if let Some(items) = view.day_checklists.get(&day) {
                let open = items.iter().filter(|i| !i.done).count();
                if open > 0 {
                    return HandlerOutcome::reply_only(format!(
                        "Day {} still has {} open task{}. Check them off first, or say 'force complete day {}'.",
                        day,
                        open,
                        if open == 1 { "" } else { "s" },
                        day
                    ));
                }
            }
        }

        let done_after = view.days_done() + 1;
        let next = plan
            .iter()
            .map(|d| d.day)
            .find(|d| *d != day && view.progress.get(d) != Some(&DayStatus::Done));
        let mut reply = format!("Day {} marked done — nice work.", day);
        if done_after == plan.len() {
            reply.push_str(" That completes your whole plan!");
        } else if let Some(next_day) = next {
            if let Some(next_plan) = view.day_plan(next_day) {
                reply.push_str(&format!(" Next up: Day {}: {}.", next_day, next_plan.title));
            }
        }

        HandlerOutcome::new(
            StateDelta {
                day_updates: vec![(day, DayStatus::Done)],
                ..Default::default()
            },
            reply,
        )
    }

    fn start_day(view: &SessionState, day: u32) -> HandlerOutcome {
        if view.curriculum.is_none() {
            return HandlerOutcome::reply_only(
                "There's no confirmed plan yet. Say 'teach me <topic>' to create one.",
            );
        }
        let Some(day_plan) = view.day_plan(day) else {
            return HandlerOutcome::reply_only(format!("Day {} isn't in your plan.", day));
        };
        if view.progress.get(&day) == Some(&DayStatus::Done) {
            return HandlerOutcome::reply_only(format!("Day {} is already done.", day));
        }

        let mut reply = format!("Day {}: {}\n", day, day_plan.title);
        for task in &day_plan.tasks {
            reply.push_str(&format!("  - {}\n", task));
        }
        reply.push_str("Good luck! Tell me when you're done or ask questions as you go.");

        HandlerOutcome::new(
            StateDelta {
                day_updates: vec![(day, DayStatus::InProgress)],
                ..Default::default()
            },
            reply,
        )
    }

    fn tick_task(view: &SessionState, task: usize, day: Option<u32>) -> HandlerOutcome {
        if view.curriculum.is_none() {
            return HandlerOutcome::reply_only(
                "There's no confirmed plan yet. Say 'teach me <topic>' to create one.",
            );
        }

        // 未点名日期时，仅当恰好一个日子的清单还有未勾项才可推断
        let day = match day {
            Some(d) => d,
            None => {
                let open_days: Vec<u32> = view
                    .day_checklists
                    .iter()
                    .filter(|(_, items)| items.iter().any(|i| !i.done))
                    .map(|(d, _)| *d)
                    .collect();
                match open_days.as_slice() {
                    [single] => *single,
                    _ => {
                        return HandlerOutcome::reply_only(
                            "Which day is that task on? Say 'task 2 of day 3 done'.",
                        )
                    }
                }
            }
        };

        let Some(items) = view.day_checklists.get(&day) else {
            return HandlerOutcome::reply_only(format!(
                "Day {} has no task breakdown yet — say 'break down day {}' first.",
                day, day
            ));
        };
        if task == 0 || task > items.len() {
            return HandlerOutcome::reply_only(format!(
                "Day {} has tasks 1 to {}.",
                day,
                items.len()
            ));
        }
        let idx = task - 1;
        if items[idx].done {
            return HandlerOutcome::reply_only(format!(
                "Task {} of day {} is already checked off.",
                task, day
            ));
        }

        let remaining = items.iter().filter(|i| !i.done).count();
        let mut reply = format!("Checked off task {} of day {}: {}.", task, day, items[idx].text);
        if remaining == 1 {
            reply.push_str(&format!(" That completes day {}!", day));
        }

        HandlerOutcome::new(
            StateDelta {
                checklist_ticks: vec![(day, idx)],
                ..Default::default()
            },
            reply,
        )
    }

    fn report(view: &SessionState) -> String {
        let Some(plan) = &view.curriculum else {
            if view.pending_curriculum.is_some() {
                return "Your proposed plan is still awaiting confirmation — reply 'yes' or 'no' first.".to_string();
            }
            return "No plan yet. Say 'teach me <topic>' to get started.".to_string();
        };

        let topic = view.current_topic.as_deref().unwrap_or("your plan");
        let total = plan.len();
        let done = view.days_done();
        let pct = if total == 0 { 0 } else { done * 100 / total };
        let filled = if total == 0 { 0 } else { done * 10 / total };
        let bar: String = "█".repeat(filled) + &"░".repeat(10 - filled);

        let mut out = format!("Progress on {}: {}/{} days ({}%)\n[{}]\n\n", topic, done, total, pct, bar);
        for day in plan {
            let marker = match view.progress.get(&day.day) {
                Some(DayStatus::Done) => "[x]",
                Some(DayStatus::InProgress) => "[~]",
                _ => "[ ]",
            };
            out.push_str(&format!("{} Day {}: {}", marker, day.day, day.title));
            if let Some(items) = view.day_checklists.get(&day.day) {
                let ticked = items.iter().filter(|i| i.done).count();
                out.push_str(&format!(" ({}/{} tasks)", ticked, items.len()));
            }
            out.push('\n');
        }

        let streak = plan
            .iter()
            .map(|d| d.day)
            .take_while(|d| view.progress.get(d) == Some(&DayStatus::Done))
            .count();
        if streak >= 2 {
            out.push_str(&format!("\nYou've finished the first {} days in a row.", streak));
        }

        if done == total && total > 0 {
            out.push_str("\nPlan complete — congratulations!");
        } else if let Some(next) = view.next_open_day() {
            if let Some(next_plan) = view.day_plan(next) {
                out.push_str(&format!("\nNext up: Day {}: {}.", next, next_plan.title));
            }
        }

        let stats = &view.stats;
        if stats.questions_asked > 0 || stats.quizzes_taken > 0 {
            out.push_str(&format!(
                "\nQuestions asked: {}, quizzes taken: {}",
                stats.questions_asked, stats.quizzes_taken
            ));
            if stats.quizzes_taken > 0 {
                out.push_str(&format!(" (average score {:.0}%)", stats.average_quiz_score));
            }
            out.push('.');
        }
        if view.quiz_state.is_some() {
            out.push_str("\nYou still have an unfinished quiz — send your answers any time.");
        }

        out
    }
}

#[async_trait]
impl Handler for ProgressHandler {
    fn name(&self) -> &'static str {
        "progress"
    }

    async fn handle(
        &self,
        view: &SessionState,
        input: &TurnInput,
    ) -> Result<HandlerOutcome, OwlError> {
        let outcome = match parse_progress_op(&input.text) {
            Some(ProgressOp::MarkDone { day, force }) => Self::mark_done(view, day, force),
            Some(ProgressOp::StartDay { day }) => Self::start_day(view, day),
            Some(ProgressOp::TickTask { task, day }) => Self::tick_task(view, task, day),
            None => HandlerOutcome::reply_only(Self::report(view)),
        };
        Ok(outcome)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::intent::Intent;
    use crate::session::{DayPlan, PlanDecision};

    fn input(text: &str) -> TurnInput {
        TurnInput {
            text: text.to_string(),
            intent: Intent::ShowProgress,
        }
    }

    fn confirmed_state() -> SessionState {
        let mut state = SessionState::new();
        state.current_topic = Some("python".to_string());
        state.apply(&StateDelta {
            proposed_curriculum: Some(vec![
                DayPlan {
                    day: 1,
                    title: "Basics".into(),
                    tasks: vec!["install".into(), "hello world".into()],
                },
                DayPlan {
                    day: 2,
                    title: "Functions".into(),
                    tasks: vec!["def".into()],
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
    fn test_parse_progress_ops() {
        assert_eq!(
            parse_progress_op("mark day 2 done"),
            Some(ProgressOp::MarkDone { day: 2, force: false })
        );
        assert_eq!(
            parse_progress_op("force complete day 3"),
            Some(ProgressOp::MarkDone { day: 3, force: true })
        );
        assert_eq!(
            parse_progress_op("I'm done with day 1"),
            Some(ProgressOp::MarkDone { day: 1, force: false })
        );
        assert_eq!(
            parse_progress_op("start day 2"),
            Some(ProgressOp::StartDay { day: 2 })
        );
        assert_eq!(
            parse_progress_op("task 2 of day 1 done"),
            Some(ProgressOp::TickTask { task: 2, day: Some(1) })
        );
        assert_eq!(
            parse_progress_op("finished task 1"),
            Some(ProgressOp::TickTask { task: 1, day: None })
        );
        assert_eq!(parse_progress_op("how am I doing?"), None);
    }

    #[tokio::test]
    async fn test_mark_day_done() {
        let outcome = ProgressHandler::new()
            .handle(&confirmed_state(), &input("mark day 1 done"))
            .await
            .unwrap();
        assert_eq!(outcome.delta.day_updates, vec![(1, DayStatus::Done)]);
        assert!(outcome.reply.contains("Day 1 marked done"));
        assert!(outcome.reply.contains("Day 2: Functions"));
    }

    #[tokio::test]
    async fn test_mark_day_outside_plan_rejected() {
        let outcome = ProgressHandler::new()
            .handle(&confirmed_state(), &input("mark day 9 done"))
            .await
            .unwrap();
        assert!(outcome.delta.day_updates.is_empty());
        assert!(outcome.reply.contains("isn't in your plan"));
    }

    #[tokio::test]
    async fn test_open_checklist_blocks_completion_unless_forced() {
        let mut state = confirmed_state();
        state.apply(&StateDelta {
            checklist_set: Some((1, vec!["read".into(), "code".into()])),
            ..Default::default()
        });
        state.apply(&StateDelta {
            checklist_ticks: vec![(1, 0)],
            ..Default::default()
        });

        let handler = ProgressHandler::new();
        let blocked = handler
            .handle(&state, &input("mark day 1 done"))
            .await
            .unwrap();
        assert!(blocked.delta.day_updates.is_empty());
        assert!(blocked.reply.contains("1 open task"));
        assert!(blocked.reply.contains("force complete day 1"));

        let forced = handler
            .handle(&state, &input("force complete day 1"))
            .await
            .unwrap();
        assert_eq!(forced.delta.day_updates, vec![(1, DayStatus::Done)]);
    }

    #[tokio::test]
    async fn test_tick_task_infers_single_open_day() {
        let mut state = confirmed_state();
        state.apply(&StateDelta {
            checklist_set: Some((2, vec!["write def".into()])),
            ..Default::default()
        });

        let outcome = ProgressHandler::new()
            .handle(&state, &input("task 1 done"))
            .await
            .unwrap();
        assert_eq!(outcome.delta.checklist_ticks, vec![(2, 0)]);
        assert!(outcome.reply.contains("completes day 2"));
    }

    #[tokio::test]
    async fn test_tick_task_out_of_range() {
        let mut state = confirmed_state();
        state.apply(&StateDelta {
            checklist_set: Some((1, vec!["only one".into()])),
            ..Default::default()
        });
        let outcome = ProgressHandler::new()
            .handle(&state, &input("task 5 of day 1 done"))
            .await
            .unwrap();
        assert!(outcome.delta.checklist_ticks.is_empty());
        assert!(outcome.reply.contains("tasks 1 to 1"));
    }

    #[tokio::test]
    async fn test_report_shows_bar_and_days() {
        let mut state = confirmed_state();
        state.apply(&StateDelta {
            day_updates: vec![(1, DayStatus::Done)],
            ..Default::default()
        });

        let outcome = ProgressHandler::new()
            .handle(&state, &input("show my progress"))
            .await
            .unwrap();
        assert!(outcome.reply.contains("1/2 days (50%)"));
        assert!(outcome.reply.contains("[x] Day 1: Basics"));
        assert!(outcome.reply.contains("[ ] Day 2: Functions"));
        assert!(outcome.reply.contains("Next up: Day 2"));
    }

    #[tokio::test]
    async fn test_report_without_plan() {
        let outcome = ProgressHandler::new()
            .handle(&SessionState::new(), &input("progress"))
            .await
            .unwrap();
        assert!(outcome.reply.contains("No plan yet"));
    }
}
