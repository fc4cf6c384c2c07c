//! Owl - 个性化学习编排器
//!
//! 核心是一个意图路由状态机：每回合对用户输入做两级意图分类（规则表优先、
//! LLM 兜底），路由到对应处理器；处理器对会话状态只读，变更以增量表达，
//! 由引擎原子提交（乐观并发，版本冲突重试一次）。课程提案需要用户确认，
//! 挂起期间所有输入强制路由到确认处理器。
//!
//! 模块划分：
//! - `config`: 配置加载（TOML + OWL__* 环境变量）
//! - `error`: 统一错误类型
//! - `session`: 会话状态、增量与应用规则
//! - `store`: 会话存储（内存 / SQLite，乐观并发）
//! - `intent`: 两级意图分类
//! - `llm`: LLM 客户端抽象（OpenAI 兼容 / Mock）
//! - `content`: 外部内容网关（视频 / 百科 / 代码仓库）
//! - `handlers`: 各意图的处理器
//! - `engine`: 回合编排引擎

pub mod config;
pub mod content;
pub mod engine;
pub mod error;
pub mod handlers;
pub mod intent;
pub mod llm;
pub mod session;
pub mod store;

pub use engine::{Engine, StateSummary, TurnResult};
pub use error::OwlError;
