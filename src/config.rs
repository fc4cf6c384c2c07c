//! 应用配置：从 config/default.toml 与环境变量加载
//!
//! 加载顺序：先读 TOML 文件，再用环境变量 `OWL__*` 覆盖（双下划线表示嵌套，如 `OWL__LLM__MODEL=gpt-4o`）。

use std::path::PathBuf;

use serde::Deserialize;

/// 应用配置根（对应 config/default.toml 的顶层）
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    #[serde(default)]
    pub app: AppSection,
    #[serde(default)]
    pub llm: LlmSection,
    #[serde(default)]
    pub store: StoreSection,
    #[serde(default)]
    pub content: ContentSection,
}

/// [app] 段：历史上限、默认计划天数、测验题数、回合超时
#[derive(Debug, Clone, Deserialize)]
pub struct AppSection {
    pub name: Option<String>,
    /// 会话历史保留条数（FIFO 淘汰）
    #[serde(default = "default_max_history_entries")]
    pub max_history_entries: usize,
    /// 未指定时长时的课程天数
    #[serde(default = "default_plan_days")]
    pub default_plan_days: u32,
    /// 每次测验的题目数
    #[serde(default = "default_quiz_questions")]
    pub quiz_questions: usize,
    /// 每类学习资源的返回条数上限
    #[serde(default = "default_resource_limit")]
    pub resource_limit: usize,
    /// 单回合超时（秒），覆盖分类与处理器内的外部调用
    #[serde(default = "default_turn_timeout_secs")]
    pub turn_timeout_secs: u64,
}

fn default_max_history_entries() -> usize {
    50
}

fn default_plan_days() -> u32 {
    7
}

fn default_quiz_questions() -> usize {
    3
}

fn default_resource_limit() -> usize {
    3
}

fn default_turn_timeout_secs() -> u64 {
    60
}

impl Default for AppSection {
    fn default() -> Self {
        Self {
            name: None,
            max_history_entries: default_max_history_entries(),
            default_plan_days: default_plan_days(),
            quiz_questions: default_quiz_questions(),
            resource_limit: default_resource_limit(),
            turn_timeout_secs: default_turn_timeout_secs(),
        }
    }
}

/// [llm] 段：后端选择
#[derive(Debug, Clone, Deserialize)]
pub struct LlmSection {
    /// 后端：openai / mock；无 API Key 时自动回落 mock
    #[serde(default = "default_provider")]
    pub provider: String,
    #[serde(default = "default_model")]
    pub model: String,
    pub base_url: Option<String>,
    pub api_key: Option<String>,
}

fn default_provider() -> String {
    "openai".to_string()
}

fn default_model() -> String {
    "gpt-4o-mini".to_string()
}

impl Default for LlmSection {
    fn default() -> Self {
        Self {
            provider: default_provider(),
            model: default_model(),
            base_url: None,
            api_key: None,
        }
    }
}

/// [store] 段：会话存储后端
#[derive(Debug, Clone, Deserialize)]
pub struct StoreSection {
    /// 后端：memory / sqlite
    #[serde(default = "default_store_backend")]
    pub backend: String,
    /// sqlite 数据库路径
    #[serde(default = "default_store_path")]
    pub path: PathBuf,
}

fn default_store_backend() -> String {
    "sqlite".to_string()
}

fn default_store_path() -> PathBuf {
    PathBuf::from("owl_sessions.db")
}

impl Default for StoreSection {
    fn default() -> Self {
        Self {
            backend: default_store_backend(),
            path: default_store_path(),
        }
    }
}

/// [content] 段：外部内容网关（视频 / 百科 / 代码仓库）
#[derive(Debug, Clone, Deserialize)]
pub struct ContentSection {
    /// 关闭后使用本地桩结果，不发任何网络请求
    #[serde(default = "default_content_enabled")]
    pub enabled: bool,
    /// 单个内容请求超时（秒）
    #[serde(default = "default_content_timeout_secs")]
    pub timeout_secs: u64,
    /// 视频搜索 API Key；未设置时读 YOUTUBE_API_KEY 环境变量
    pub video_api_key: Option<String>,
    /// 代码仓库搜索令牌；未设置时读 GITHUB_TOKEN 环境变量
    pub repository_token: Option<String>,
}

fn default_content_enabled() -> bool {
    true
}

fn default_content_timeout_secs() -> u64 {
    10
}

impl Default for ContentSection {
    fn default() -> Self {
        Self {
            enabled: default_content_enabled(),
            timeout_secs: default_content_timeout_secs(),
            video_api_key: None,
            repository_token: None,
        }
    }
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            app: AppSection::default(),
            llm: LlmSection::default(),
            store: StoreSection::default(),
            content: ContentSection::default(),
        }
    }
}

/// 从 config 目录加载配置，环境变量 OWL__* 可覆盖
///
/// 1. 按顺序查找 config/default.toml、../config/default.toml、default.toml，找到则作为第一源
/// 2. 若传入 config_path 且文件存在，则追加该文件（可覆盖前面的键）
/// 3. 最后叠加环境变量 OWL__*（双下划线表示嵌套键）
pub fn load_config(config_path: Option<PathBuf>) -> Result<AppConfig, config::ConfigError> {
    let mut builder = config::Config::builder();

    let default_names = ["config/default", "../config/default", "default"];
    for name in default_names {
        let path = format!("{}.toml", name);
        if std::path::Path::new(&path).exists() {
            builder = builder.add_source(config::File::with_name(name).required(false));
            break;
        }
    }

    if let Some(ref path) = config_path {
        if path.exists() {
            builder = builder.add_source(config::File::from(path.clone()).required(false));
        }
    }

    builder = builder.add_source(
        config::Environment::with_prefix("OWL")
            .separator("__")
            .try_parsing(true),
    );

    let c = builder.build()?;
    c.try_deserialize()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_sections() {
        let cfg = AppConfig::default();
        assert_eq!(cfg.app.max_history_entries, 50);
        assert_eq!(cfg.app.default_plan_days, 7);
        assert_eq!(cfg.store.backend, "sqlite");
        assert!(cfg.content.enabled);
    }
}
