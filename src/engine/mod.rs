//! 编排引擎：意图路由状态机的驱动器
//!
//! 每回合固定走：读状态 → 路由（会话挂起时无视分类，强制确认处理器）→
//! 处理器执行 → 应用增量 + 追加历史 + 版本 +1 → 条件写。
//! 版本冲突重读重试一次，再冲突上报；处理器失败或超时不落任何状态。

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use tokio_util::sync::CancellationToken;

use crate::config::AppConfig;
use crate::content::ContentGateway;
use crate::error::OwlError;
use crate::handlers::{
    BreakdownHandler, ConfirmHandler, CurriculumHandler, Handler, HandlerOutcome, ProgressHandler,
    QaHandler, QuizGenerateHandler, QuizGradeHandler, ResourcesHandler, TurnInput, UnknownHandler,
};
use crate::intent::{Intent, IntentClassifier};
use crate::llm::{ChatMessage, LlmClient};
use crate::session::{SessionState, SessionStatus};
use crate::store::{SessionStore, StoreError};

pub mod turn;

pub use turn::{StateSummary, TurnResult};

/// 分类器可见的历史条数
const CLASSIFIER_CONTEXT: usize = 6;

pub struct Engine {
    store: Arc<dyn SessionStore>,
    classifier: IntentClassifier,
    handlers: HashMap<Intent, Arc<dyn Handler>>,
    fallback: Arc<dyn Handler>,
    history_cap: usize,
    turn_timeout: Duration,
}

impl Engine {
    pub fn new(
        cfg: &AppConfig,
        store: Arc<dyn SessionStore>,
        llm: Arc<dyn LlmClient>,
        gateway: Arc<dyn ContentGateway>,
    ) -> Self {
        let confirm: Arc<dyn Handler> = Arc::new(ConfirmHandler::new());
        let fallback: Arc<dyn Handler> = Arc::new(UnknownHandler::new());

        let mut handlers: HashMap<Intent, Arc<dyn Handler>> = HashMap::new();
        handlers.insert(
            Intent::StartCurriculum,
            Arc::new(CurriculumHandler::new(
                llm.clone(),
                cfg.app.default_plan_days,
            )),
        );
        // 接受与拒绝共用确认处理器，决定从文本判读
        handlers.insert(Intent::ConfirmCurriculum, confirm.clone());
        handlers.insert(Intent::RejectCurriculum, confirm);
        handlers.insert(
            Intent::GenerateQuiz,
            Arc::new(QuizGenerateHandler::new(
                llm.clone(),
                cfg.app.quiz_questions,
            )),
        );
        handlers.insert(Intent::SubmitQuizAnswer, Arc::new(QuizGradeHandler::new()));
        handlers.insert(
            Intent::FetchResources,
            Arc::new(ResourcesHandler::new(gateway, cfg.app.resource_limit)),
        );
        handlers.insert(Intent::ShowProgress, Arc::new(ProgressHandler::new()));
        handlers.insert(Intent::AskQuestion, Arc::new(QaHandler::new(llm.clone())));
        handlers.insert(Intent::BreakdownDay, Arc::new(BreakdownHandler::new(llm.clone())));
        handlers.insert(Intent::Unknown, fallback.clone());

        Self {
            store,
            classifier: IntentClassifier::new(llm),
            handlers,
            fallback,
            history_cap: cfg.app.max_history_entries,
            turn_timeout: Duration::from_secs(cfg.app.turn_timeout_secs),
        }
    }

    /// 提交一回合用户输入
    pub async fn submit_turn(&self, session_id: &str, text: &str) -> Result<TurnResult, OwlError> {
        self.submit_turn_cancellable(session_id, text, CancellationToken::new())
            .await
    }

    /// 带取消令牌的回合提交；取消发生在提交前则不落任何状态
    pub async fn submit_turn_cancellable(
        &self,
        session_id: &str,
        text: &str,
        cancel: CancellationToken,
    ) -> Result<TurnResult, OwlError> {
        if cancel.is_cancelled() {
            return Err(OwlError::Cancelled);
        }

        let (state, read_version) = match self.store.get(session_id).await? {
            Some((state, version)) => (state, version),
            None => (SessionState::new(), 0),
        };

        let (intent, outcome) = self.run_routed(&state, text, &cancel).await?;
        let (new_state, new_version) = self
            .commit(session_id, state, read_version, &outcome, text)
            .await?;

        tracing::info!(
            session_id = %session_id,
            intent = intent.as_token(),
            version = new_version,
            status = ?new_state.status(),
            "Turn committed"
        );

        Ok(TurnResult {
            output: outcome.reply,
            status: new_state.status(),
            summary: StateSummary::of(session_id, &new_state),
        })
    }

    /// 读取会话摘要（不产生回合）
    pub async fn session_summary(
        &self,
        session_id: &str,
    ) -> Result<Option<StateSummary>, OwlError> {
        Ok(self
            .store
            .get(session_id)
            .await?
            .map(|(state, _)| StateSummary::of(session_id, &state)))
    }

    /// 路由并执行处理器，整体受回合超时与取消约束
    async fn run_routed(
        &self,
        state: &SessionState,
        text: &str,
        cancel: &CancellationToken,
    ) -> Result<(Intent, HandlerOutcome), OwlError> {
        let work = async {
            // 挂起的确认决定阻塞其他一切操作：跳过分类，强制走确认处理器
            let intent = if state.status() == SessionStatus::AwaitingConfirmation {
                tracing::debug!("Session awaiting confirmation, forcing confirm route");
                Intent::ConfirmCurriculum
            } else {
                self.classifier
                    .classify(text, state.recent_history(CLASSIFIER_CONTEXT))
                    .await
            };

            let handler = self.route(intent);
            tracing::debug!(intent = intent.as_token(), handler = handler.name(), "Routed");
            let input = TurnInput {
                text: text.to_string(),
                intent,
            };
            let outcome = handler.handle(state, &input).await?;
            Ok::<_, OwlError>((intent, outcome))
        };

        tokio::select! {
            _ = cancel.cancelled() => Err(OwlError::Cancelled),
            result = tokio::time::timeout(self.turn_timeout, work) => match result {
                Err(_) => Err(OwlError::Timeout(self.turn_timeout.as_secs())),
                Ok(Err(e)) => {
                    tracing::error!("Turn aborted, no state written: {}", e);
                    Err(e)
                }
                Ok(Ok(routed)) => Ok(routed),
            },
        }
    }

    fn route(&self, intent: Intent) -> Arc<dyn Handler> {
        match self.handlers.get(&intent) {
            Some(handler) => handler.clone(),
            None => self.fallback.clone(),
        }
    }

    /// 合并增量与历史、版本 +1、条件写；版本冲突时重读合并重试一次
    async fn commit(
        &self,
        session_id: &str,
        state: SessionState,
        read_version: u64,
        outcome: &HandlerOutcome,
        user_text: &str,
    ) -> Result<(SessionState, u64), OwlError> {
        let merged = self.merge(state, read_version, outcome, user_text);
        match self.store.put(session_id, &merged, read_version).await {
            Ok(version) => Ok((merged, version)),
            Err(StoreError::VersionConflict { expected, stored }) => {
                tracing::warn!(
                    session_id = %session_id,
                    expected,
                    stored,
                    "Version conflict, reloading and retrying once"
                );
                let (fresh, fresh_version) = self
                    .store
                    .get(session_id)
                    .await?
                    .ok_or_else(|| OwlError::Conflict(session_id.to_string()))?;
                let merged = self.merge(fresh, fresh_version, outcome, user_text);
                match self.store.put(session_id, &merged, fresh_version).await {
                    Ok(version) => Ok((merged, version)),
                    Err(StoreError::VersionConflict { .. }) => {
                        Err(OwlError::Conflict(session_id.to_string()))
                    }
                    Err(e) => Err(e.into()),
                }
            }
            Err(e) => Err(e.into()),
        }
    }

    fn merge(
        &self,
        mut state: SessionState,
        read_version: u64,
        outcome: &HandlerOutcome,
        user_text: &str,
    ) -> SessionState {
        state.apply(&outcome.delta);
        state.push_history(ChatMessage::user(user_text), self.history_cap);
        state.push_history(ChatMessage::assistant(outcome.reply.as_str()), self.history_cap);
        state.version = read_version + 1;
        state
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::content::StubGateway;
    use crate::llm::MockLlmClient;
    use crate::store::MemoryStore;

    fn engine_with_mock(responses: Vec<&str>) -> Engine {
        let cfg = AppConfig::default();
        Engine::new(
            &cfg,
            Arc::new(MemoryStore::new()),
            Arc::new(MockLlmClient::with_responses(responses)),
            Arc::new(StubGateway::new()),
        )
    }

    #[tokio::test]
    async fn test_route_falls_back_to_unknown_handler() {
        let engine = engine_with_mock(vec![]);
        assert_eq!(engine.route(Intent::Unknown).name(), "unknown");
        assert_eq!(engine.route(Intent::ShowProgress).name(), "progress");
    }

    #[tokio::test]
    async fn test_merge_appends_history_and_bumps_version() {
        let engine = engine_with_mock(vec![]);
        let outcome = HandlerOutcome::reply_only("hello there");
        let merged = engine.merge(SessionState::new(), 4, &outcome, "hi");

        assert_eq!(merged.version, 5);
        assert_eq!(merged.conversation_history.len(), 2);
        assert_eq!(merged.conversation_history[0].content, "hi");
        assert_eq!(merged.conversation_history[1].content, "hello there");
    }

    #[tokio::test]
    async fn test_pre_cancelled_token_writes_nothing() {
        let engine = engine_with_mock(vec![]);
        let token = CancellationToken::new();
        token.cancel();

        let err = engine
            .submit_turn_cancellable("s1", "show progress", token)
            .await
            .unwrap_err();
        assert!(matches!(err, OwlError::Cancelled));
        assert!(engine.session_summary("s1").await.unwrap().is_none());
    }
}
