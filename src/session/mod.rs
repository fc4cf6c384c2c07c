//! 会话层：状态结构与状态增量

pub mod delta;
pub mod state;

pub use delta::{PlanDecision, StateDelta};
pub use state::{
    ChecklistItem, DayPlan, DayStatus, LearningStats, QuizQuestion, QuizState, ResourceCache,
    SessionState, SessionStatus,
};
