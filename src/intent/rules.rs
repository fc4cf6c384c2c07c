//! 一级规则表：确定性关键词 / 短语 / 模式匹配
//!
//! 命中即短路，不调用 LLM；同时用子序列匹配吸收手误（多打 / 重复字符），
//! 匹配跨度超过短语长度 + 2 视为噪声不算命中。

use std::sync::OnceLock;

use fuzzy_matcher::skim::SkimMatcherV2;
use fuzzy_matcher::FuzzyMatcher;
use regex::Regex;

use crate::intent::Intent;

/// 整句等值表（小写、去首尾空白后整句比对）
const EXACT: &[(&str, Intent)] = &[
    ("yes", Intent::ConfirmCurriculum),
    ("yeah", Intent::ConfirmCurriculum),
    ("yep", Intent::ConfirmCurriculum),
    ("ok", Intent::ConfirmCurriculum),
    ("okay", Intent::ConfirmCurriculum),
    ("confirm", Intent::ConfirmCurriculum),
    ("sure", Intent::ConfirmCurriculum),
    ("sounds good", Intent::ConfirmCurriculum),
    ("looks good", Intent::ConfirmCurriculum),
    ("no", Intent::RejectCurriculum),
    ("nope", Intent::RejectCurriculum),
    ("nah", Intent::RejectCurriculum),
    ("reject", Intent::RejectCurriculum),
    ("cancel", Intent::RejectCurriculum),
    ("quiz", Intent::GenerateQuiz),
    ("quiz me", Intent::GenerateQuiz),
    ("test me", Intent::GenerateQuiz),
    ("progress", Intent::ShowProgress),
    ("my progress", Intent::ShowProgress),
    ("show progress", Intent::ShowProgress),
    ("resources", Intent::FetchResources),
    ("materials", Intent::FetchResources),
    ("help", Intent::Unknown),
];

/// 课程规划短语（前缀）
const CURRICULUM_PREFIXES: &[&str] = &[
    "teach me",
    "i want to learn",
    "i'd like to learn",
    "help me learn",
    "learn ",
    "create a study plan",
    "make me a plan",
];

/// 课程规划短语（包含）
const CURRICULUM_PHRASES: &[&str] = &["study plan", "curriculum", "learning plan"];

/// 进度操作短语（查看与标记都会路由到进度处理器）
const PROGRESS_PHRASES: &[&str] = &[
    "how am i doing",
    "my progress",
    "show progress",
    "mark day",
    "complete day",
    "completed day",
    "finish day",
    "finished day",
    "force complete",
    "start day",
    "begin day",
    "done with",
];

const QUIZ_PHRASES: &[&str] = &["quiz me", "test me", "give me a quiz", "test my knowledge"];

const RESOURCE_PHRASES: &[&str] = &[
    "resource",
    "video",
    "article",
    "repositories",
    "repos",
    "recommend",
    "find me",
];

/// 问句前缀，命中即走问答
const QUESTION_PREFIXES: &[&str] = &[
    "what", "why", "how", "when", "where", "who", "which", "can ", "does ", "is ", "are ",
    "explain",
];

/// 容错层短语表（子序列匹配，吸收重复 / 多打字符）
const FUZZY_PHRASES: &[(&str, Intent)] = &[
    ("teach me", Intent::StartCurriculum),
    ("study plan", Intent::StartCurriculum),
    ("confirm", Intent::ConfirmCurriculum),
    ("quiz me", Intent::GenerateQuiz),
    ("progress", Intent::ShowProgress),
    ("resources", Intent::FetchResources),
    ("break down", Intent::BreakdownDay),
];

static ANSWER_RE: OnceLock<Regex> = OnceLock::new();

/// 短消息是否是一串测验答案（如 "a b c"、"1. a 2. b"、"answers: a, c"）
fn is_answer_pattern(text: &str) -> bool {
    let re = ANSWER_RE.get_or_init(|| {
        Regex::new(r"(?i)^\s*(?:(?:my\s+)?answers?\s*(?:are|:)?\s*)?(?:\d+\s*[\.\):]\s*)?[a-d][\.\)]?(?:\s*[,;]?\s*(?:\d+\s*[\.\):]\s*)?[a-d][\.\)]?)*\s*$").unwrap()
    });
    re.is_match(text)
}

/// 子序列命中且跨度不超过短语长度 + 2
fn loose_contains(matcher: &SkimMatcherV2, haystack: &str, phrase: &str) -> bool {
    match matcher.fuzzy_indices(haystack, phrase) {
        Some((_, indices)) => match (indices.first(), indices.last()) {
            (Some(first), Some(last)) => last - first + 1 <= phrase.len() + 2,
            _ => false,
        },
        None => false,
    }
}

/// 规则匹配入口：命中返回意图，未命中交给二级 LLM 分类
pub fn rule_match(text: &str) -> Option<Intent> {
    let lower = text.trim().to_lowercase();
    if lower.is_empty() {
        return None;
    }

    for (phrase, intent) in EXACT {
        if lower == *phrase {
            return Some(*intent);
        }
    }

    if is_answer_pattern(&lower) {
        return Some(Intent::SubmitQuizAnswer);
    }

    if CURRICULUM_PREFIXES.iter().any(|p| lower.starts_with(p))
        || CURRICULUM_PHRASES.iter().any(|p| lower.contains(p))
    {
        return Some(Intent::StartCurriculum);
    }

    if lower.contains("break down") || lower.contains("breakdown") {
        return Some(Intent::BreakdownDay);
    }

    if PROGRESS_PHRASES.iter().any(|p| lower.contains(p)) {
        return Some(Intent::ShowProgress);
    }

    if QUIZ_PHRASES.iter().any(|p| lower.contains(p)) {
        return Some(Intent::GenerateQuiz);
    }

    if RESOURCE_PHRASES.iter().any(|p| lower.contains(p)) {
        return Some(Intent::FetchResources);
    }

    if QUESTION_PREFIXES.iter().any(|p| lower.starts_with(p)) || lower.ends_with('?') {
        return Some(Intent::AskQuestion);
    }

    let matcher = SkimMatcherV2::default();
    for (phrase, intent) in FUZZY_PHRASES {
        if loose_contains(&matcher, &lower, phrase) {
            return Some(*intent);
        }
    }

    None
}
