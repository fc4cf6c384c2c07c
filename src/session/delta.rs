//! 状态增量：处理器对会话状态的唯一表达方式
//!
//! 处理器对状态只读，所有变更打包进 StateDelta；引擎在提交路径上一次性应用，
//! 保证整回合原子生效或完全不生效，也便于重放与测试。

use serde::{Deserialize, Serialize};

use crate::session::state::{
    ChecklistItem, DayPlan, DayStatus, QuizState, ResourceCache, SessionState,
};

/// 对课程提案的裁决
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PlanDecision {
    /// 晋升 pending_curriculum 为正式课程并初始化进度
    Accept,
    /// 丢弃提案，回到 Idle
    Discard,
}

/// 一次回合产生的全部状态变更；未设置的字段保持原状
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct StateDelta {
    pub topic: Option<String>,
    pub skill_level: Option<String>,
    /// 提出新课程提案，置 awaiting_confirmation
    pub proposed_curriculum: Option<Vec<DayPlan>>,
    pub decision: Option<PlanDecision>,
    pub quiz_opened: Option<QuizState>,
    /// 记录（可能不完整的）已提交答案，测验保持打开
    pub quiz_answers: Option<Vec<Option<String>>>,
    /// 判分结果（百分制）；关闭测验并更新统计
    pub quiz_result: Option<f32>,
    pub question_asked: bool,
    pub day_updates: Vec<(u32, DayStatus)>,
    /// 为某一天写入拆解清单（覆盖旧清单）
    pub checklist_set: Option<(u32, Vec<String>)>,
    /// 勾掉某天清单里的第 idx 项（0 起）
    pub checklist_ticks: Vec<(u32, usize)>,
    pub resources: Option<ResourceCache>,
}

impl SessionState {
    /// 应用一个状态增量；不在课程内的日序号被确定性忽略
    ///
    /// 顺序固定：先处理提案与裁决，再处理测验、进度与资源，
    /// 保证同一增量重放得到同一结果。
    pub fn apply(&mut self, delta: &StateDelta) {
        if let Some(topic) = &delta.topic {
            self.current_topic = Some(topic.clone());
        }
        if let Some(level) = &delta.skill_level {
            self.skill_level = Some(level.clone());
        }

        if let Some(plan) = &delta.proposed_curriculum {
            self.pending_curriculum = Some(plan.clone());
            self.awaiting_confirmation = !plan.is_empty();
        }

        match delta.decision {
            Some(PlanDecision::Accept) => {
                if let Some(plan) = self.pending_curriculum.take() {
                    self.progress = plan
                        .iter()
                        .map(|day| (day.day, DayStatus::NotStarted))
                        .collect();
                    self.day_checklists.clear();
                    self.curriculum = Some(plan);
                }
                self.awaiting_confirmation = false;
            }
            Some(PlanDecision::Discard) => {
                self.pending_curriculum = None;
                self.awaiting_confirmation = false;
            }
            None => {}
        }

        if let Some(quiz) = &delta.quiz_opened {
            self.quiz_state = Some(quiz.clone());
        }
        if let Some(answers) = &delta.quiz_answers {
            if let Some(quiz) = &mut self.quiz_state {
                quiz.answers = answers.clone();
            }
        }
        if let Some(score) = delta.quiz_result {
            let taken = self.stats.quizzes_taken + 1;
            self.stats.average_quiz_score =
                (self.stats.average_quiz_score * self.stats.quizzes_taken as f32 + score)
                    / taken as f32;
            self.stats.quizzes_taken = taken;
            self.quiz_state = None;
        }
        if delta.question_asked {
            self.stats.questions_asked += 1;
        }

        for (day, status) in &delta.day_updates {
            if self.has_day(*day) {
                self.progress.insert(*day, *status);
            }
        }

        if let Some((day, items)) = &delta.checklist_set {
            if self.has_day(*day) {
                self.day_checklists.insert(
                    *day,
                    items
                        .iter()
                        .map(|text| ChecklistItem {
                            text: text.clone(),
                            done: false,
                        })
                        .collect(),
                );
                if self.progress.get(day) != Some(&DayStatus::Done) {
                    self.progress.insert(*day, DayStatus::InProgress);
                }
            }
        }

        for (day, idx) in &delta.checklist_ticks {
            if let Some(items) = self.day_checklists.get_mut(day) {
                if let Some(item) = items.get_mut(*idx) {
                    item.done = true;
                }
                // 清单全勾则该日自动完成
                if !items.is_empty() && items.iter().all(|i| i.done) {
                    self.progress.insert(*day, DayStatus::Done);
                }
            }
        }

        if let Some(cache) = &delta.resources {
            self.last_resources = Some(cache.clone());
        }
    }
}
