//! 测验处理器：出题与判分
//!
//! 出题走 LLM（不可解析则退回模板题）；判分纯确定性，按存储的正确答案比对。
//! 答案切分同时接受带题号（"1. a 2. b"）、裸字母序列（"a b c"）与选项原文；
//! 答不全时记录部分答案并追问，测验保持打开。

use std::sync::{Arc, OnceLock};

use async_trait::async_trait;
use regex::Regex;
use serde::Deserialize;

use crate::error::OwlError;
use crate::handlers::{extract_json, Handler, HandlerOutcome, TurnInput};
use crate::llm::{ChatMessage, LlmClient};
use crate::session::{QuizQuestion, QuizState, SessionState, StateDelta};

static ANSWER_TOKEN_RE: OnceLock<Regex> = OnceLock::new();

fn letter(idx: usize) -> char {
    (b'a' + idx as u8) as char
}

/// 答案字符串 -> 选项字母（取第一个字母字符）
fn normalize_letter(raw: &str, option_count: usize) -> Option<char> {
    let c = raw
        .trim()
        .chars()
        .find(|c| c.is_ascii_alphabetic())?
        .to_ascii_lowercase();
    let max = letter(option_count.saturating_sub(1));
    if ('a'..=max).contains(&c) {
        Some(c)
    } else {
        None
    }
}

/// 把一段文本切成逐题答案，叠加在已有的部分答案之上
///
/// 带题号的赋值覆盖对应槽位；裸字母按顺序填进第一个空槽；
/// 都没命中的题再尝试选项原文包含匹配。
fn segment_answers(
    text: &str,
    questions: &[QuizQuestion],
    existing: &[Option<String>],
) -> Vec<Option<String>> {
    let mut merged: Vec<Option<String>> = existing.to_vec();
    merged.resize(questions.len(), None);

    let re = ANSWER_TOKEN_RE
        .get_or_init(|| Regex::new(r"(?i)(?:(\d+)\s*[\.\):-]?\s*)?\b([a-d])\b").unwrap());

    for caps in re.captures_iter(text) {
        let Some(raw_letter) = caps.get(2) else {
            continue;
        };
        let ans = raw_letter.as_str().to_ascii_lowercase();

        if let Some(idx) = caps.get(1).and_then(|m| m.as_str().parse::<usize>().ok()) {
            if (1..=questions.len()).contains(&idx) {
                merged[idx - 1] = Some(ans);
            }
            continue;
        }
        if let Some(slot) = merged.iter().position(|a| a.is_none()) {
            merged[slot] = Some(ans);
        }
    }

    // 选项原文匹配兜底（只填仍空的槽）
    let lower = text.to_lowercase();
    for (i, question) in questions.iter().enumerate() {
        if merged[i].is_some() {
            continue;
        }
        for (j, option) in question.options.iter().enumerate() {
            if option.len() >= 4 && lower.contains(&option.to_lowercase()) {
                merged[i] = Some(letter(j).to_string());
                break;
            }
        }
    }

    merged
}

// ---------- 出题 ----------

pub struct QuizGenerateHandler {
    llm: Arc<dyn LlmClient>,
    question_count: usize,
}

#[derive(Debug, Deserialize)]
struct QuizQuestionJson {
    question: String,
    #[serde(default)]
    options: Vec<String>,
    #[serde(default)]
    correct_answer: String,
    #[serde(default)]
    explanation: String,
}

impl QuizGenerateHandler {
    pub fn new(llm: Arc<dyn LlmClient>, question_count: usize) -> Self {
        Self {
            llm,
            question_count: question_count.max(1),
        }
    }

    /// "quiz me on X" 的显式主题优先，否则沿用会话主题
    fn pick_topic(text: &str, view: &SessionState) -> Option<String> {
        let lower = text.to_lowercase();
        for marker in [" on ", " about "] {
            if let Some(pos) = lower.find(marker) {
                let topic = text[pos + marker.len()..]
                    .trim()
                    .trim_matches(|c: char| ",.!?".contains(c));
                if !topic.is_empty() {
                    return Some(topic.to_string());
                }
            }
        }
        view.current_topic.clone()
    }

    fn build_prompt(&self, topic: &str, day_title: Option<&str>) -> Vec<ChatMessage> {
        let system = "You are a quiz writer. Output ONLY a JSON array of question objects shaped \
                      like {\"question\": \"...\", \"options\": [\"...\", \"...\", \"...\", \"...\"], \
                      \"correct_answer\": \"a\", \"explanation\": \"...\"}. Four options each, \
                      exactly one correct. No prose.";
        let mut user = format!("Write {} multiple-choice questions about {}.", self.question_count, topic);
        if let Some(title) = day_title {
            user.push_str(&format!(" The learner is currently on: {}.", title));
        }
        vec![ChatMessage::system(system), ChatMessage::user(user)]
    }

    fn parse_questions(&self, raw: &str) -> Vec<QuizQuestion> {
        let parsed: Option<Vec<QuizQuestionJson>> =
            extract_json(raw).and_then(|json| serde_json::from_str(json).ok());
        let Some(entries) = parsed else {
            return Vec::new();
        };

        entries
            .into_iter()
            .filter_map(|e| {
                let mut options = e.options;
                options.truncate(4);
                if e.question.trim().is_empty() || options.len() < 2 {
                    return None;
                }
                let correct = normalize_letter(&e.correct_answer, options.len()).or_else(|| {
                    options
                        .iter()
                        .position(|o| o.eq_ignore_ascii_case(e.correct_answer.trim()))
                        .map(letter)
                })?;
                Some(QuizQuestion {
                    question: e.question.trim().to_string(),
                    options,
                    correct_answer: correct.to_string(),
                    explanation: e.explanation.trim().to_string(),
                })
            })
            .take(self.question_count)
            .collect()
    }

    fn fallback_questions(topic: &str) -> Vec<QuizQuestion> {
        vec![
            QuizQuestion {
                question: format!("Which habit helps most when learning {}?", topic),
                options: vec![
                    "Regular hands-on practice".to_string(),
                    "Only reading about it".to_string(),
                    "Memorizing without context".to_string(),
                    "Skipping the fundamentals".to_string(),
                ],
                correct_answer: "a".to_string(),
                explanation: "Active practice beats passive consumption for retention.".to_string(),
            },
            QuizQuestion {
                question: format!("You're stuck on a {} problem. What's the best first move?", topic),
                options: vec![
                    "Break it into smaller pieces".to_string(),
                    "Give up and switch topics".to_string(),
                    "Copy a solution without reading it".to_string(),
                    "Wait for motivation".to_string(),
                ],
                correct_answer: "a".to_string(),
                explanation: "Decomposing a problem makes each piece tractable.".to_string(),
            },
            QuizQuestion {
                question: format!("How is progress in {} best measured?", topic),
                options: vec![
                    "Applying it in small projects".to_string(),
                    "Hours spent reading".to_string(),
                    "Number of bookmarked tutorials".to_string(),
                    "Memorized terminology".to_string(),
                ],
                correct_answer: "a".to_string(),
                explanation: "Applied work shows what you can actually do.".to_string(),
            },
        ]
    }

    fn format_quiz(quiz: &QuizState) -> String {
        let mut out = format!(
            "Quiz on {} — {} questions:\n\n",
            quiz.topic,
            quiz.questions.len()
        );
        for (i, q) in quiz.questions.iter().enumerate() {
            out.push_str(&format!("{}. {}\n", i + 1, q.question));
            for (j, option) in q.options.iter().enumerate() {
                out.push_str(&format!("   {}) {}\n", letter(j), option));
            }
            out.push('\n');
        }
        out.push_str("Answer like '1. a  2. c  3. b' — partial answers are fine.");
        out
    }
}

#[async_trait]
impl Handler for QuizGenerateHandler {
    fn name(&self) -> &'static str {
        "quiz_generate"
    }

    async fn handle(
        &self,
        view: &SessionState,
        input: &TurnInput,
    ) -> Result<HandlerOutcome, OwlError> {
        let Some(topic) = Self::pick_topic(&input.text, view) else {
            return Ok(HandlerOutcome::reply_only(
                "What should I quiz you on? Start a topic first ('teach me Python') or say 'quiz me on <topic>'.",
            ));
        };

        let day_title = view
            .next_open_day()
            .and_then(|d| view.day_plan(d))
            .map(|d| d.title.clone());

        let questions = match self
            .llm
            .complete(&self.build_prompt(&topic, day_title.as_deref()))
            .await
        {
            Ok(raw) => {
                let parsed = self.parse_questions(&raw);
                if parsed.is_empty() {
                    tracing::warn!("Unparseable quiz output, using template questions");
                    Self::fallback_questions(&topic)
                } else {
                    parsed
                }
            }
            Err(e) => {
                tracing::warn!("Quiz generation failed ({}), using template questions", e);
                Self::fallback_questions(&topic)
            }
        };

        let quiz = QuizState::new(topic, questions);
        let mut reply = Self::format_quiz(&quiz);
        if view.quiz_state.is_some() {
            reply = format!("(Replacing your previous unfinished quiz.)\n\n{}", reply);
        }

        let delta = StateDelta {
            quiz_opened: Some(quiz),
            ..Default::default()
        };
        Ok(HandlerOutcome::new(delta, reply))
    }
}

// ---------- 判分 ----------

#[derive(Default)]
pub struct QuizGradeHandler;

impl QuizGradeHandler {
    pub fn new() -> Self {
        Self
    }

    fn grade(quiz: &QuizState, answers: &[Option<String>]) -> (u32, String) {
        let mut correct = 0u32;
        let mut lines = String::new();
        for (i, q) in quiz.questions.iter().enumerate() {
            let given = answers
                .get(i)
                .and_then(|a| a.as_deref())
                .unwrap_or("-");
            let expected = normalize_letter(&q.correct_answer, q.options.len()).unwrap_or('a');
            let expected_text = q
                .options
                .get((expected as u8 - b'a') as usize)
                .map(String::as_str)
                .unwrap_or("");
            if given.starts_with(expected) {
                correct += 1;
                lines.push_str(&format!(
                    "{}. ✓ Correct — {}) {}\n",
                    i + 1,
                    expected,
                    expected_text
                ));
            } else {
                lines.push_str(&format!(
                    "{}. ✗ You answered {}); correct was {}) {}.",
                    i + 1,
                    given,
                    expected,
                    expected_text
                ));
                if !q.explanation.is_empty() {
                    lines.push_str(&format!(" {}", q.explanation));
                }
                lines.push('\n');
            }
        }
        (correct, lines)
    }
}

#[async_trait]
impl Handler for QuizGradeHandler {
    fn name(&self) -> &'static str {
        "quiz_grade"
    }

    async fn handle(
        &self,
        view: &SessionState,
        input: &TurnInput,
    ) -> Result<HandlerOutcome, OwlError> {
        let Some(quiz) = &view.quiz_state else {
            return Ok(HandlerOutcome::reply_only(
                "There's no quiz open right now. Say 'quiz me' to start one.",
            ));
        };

        let merged = segment_answers(&input.text, &quiz.questions, &quiz.answers);
        let newly_parsed = merged
            .iter()
            .zip(quiz.answers.iter())
            .filter(|(new, old)| new.is_some() && new != old)
            .count();

        if newly_parsed == 0 {
            return Ok(HandlerOutcome::reply_only(
                "I couldn't find any answers in that. Reply with option letters, e.g. '1. a  2. c'.",
            ));
        }

        let open: Vec<String> = merged
            .iter()
            .enumerate()
            .filter(|(_, a)| a.is_none())
            .map(|(i, _)| (i + 1).to_string())
            .collect();

        if !open.is_empty() {
            let answered = merged.iter().filter(|a| a.is_some()).count();
            let reply = format!(
                "Recorded {} answer{} so far. Still open: question{} {}. Reply like '{}. a' to finish.",
                answered,
                if answered == 1 { "" } else { "s" },
                if open.len() == 1 { "" } else { "s" },
                open.join(", "),
                open[0]
            );
            let delta = StateDelta {
                quiz_answers: Some(merged),
                ..Default::default()
            };
            return Ok(HandlerOutcome::new(delta, reply));
        }

        let total = quiz.questions.len() as u32;
        let (correct, detail) = Self::grade(quiz, &merged);
        let score = correct as f32 / total as f32 * 100.0;
        let reply = format!(
            "Results for your {} quiz:\n\n{}\nScore: {}/{} ({:.0}%).",
            quiz.topic, detail, correct, total, score
        );

        let delta = StateDelta {
            quiz_answers: Some(merged),
            quiz_result: Some(score),
            ..Default::default()
        };
        Ok(HandlerOutcome::new(delta, reply))
    }
}
