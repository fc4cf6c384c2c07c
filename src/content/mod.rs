//! 外部内容网关：资源处理器的唯一出口
//!
//! 三类内容（视频 / 百科文章 / 代码仓库）各自独立失败；
//! 某一类失败只会让该类缺席，绝不让整个回合失败。

use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::config::{AppConfig, ContentSection};

pub mod article;
pub mod repository;
pub mod stub;
pub mod video;

pub use article::ArticleProvider;
pub use repository::RepositoryProvider;
pub use stub::StubGateway;
pub use video::VideoProvider;

/// 请求外部服务时使用的 UA（百科与代码仓库接口要求可识别的 UA）
pub(crate) const USER_AGENT: &str = "owl-learning-assistant/0.1";

/// 内容类目
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(rename_all = "snake_case")]
pub enum Category {
    Videos,
    Articles,
    Repositories,
}

impl Category {
    pub const ALL: [Category; 3] = [Category::Videos, Category::Articles, Category::Repositories];

    pub fn label(&self) -> &'static str {
        match self {
            Category::Videos => "videos",
            Category::Articles => "articles",
            Category::Repositories => "repositories",
        }
    }
}

impl fmt::Display for Category {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// 单条内容：标题、定位地址、可选热度指标（星标数等）与摘要
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ContentItem {
    pub title: String,
    pub url: String,
    #[serde(default)]
    pub score: Option<u64>,
    #[serde(default)]
    pub snippet: Option<String>,
}

/// 网关错误（按类目独立上报）
#[derive(Error, Debug)]
pub enum GatewayError {
    #[error("Request failed: {0}")]
    Request(String),

    #[error("HTTP {0}")]
    Status(u16),

    #[error("Invalid response: {0}")]
    InvalidResponse(String),

    #[error("Provider not configured")]
    Unavailable,
}

/// 内容网关接口
#[async_trait]
pub trait ContentGateway: Send + Sync {
    async fn search(
        &self,
        category: Category,
        query: &str,
        limit: usize,
    ) -> Result<Vec<ContentItem>, GatewayError>;
}

/// REST 网关：三个提供方各持独立 HTTP 客户端与超时
pub struct RestContentGateway {
    videos: VideoProvider,
    articles: ArticleProvider,
    repositories: RepositoryProvider,
}

impl RestContentGateway {
    pub fn new(cfg: &ContentSection) -> Self {
        let video_key = cfg
            .video_api_key
            .clone()
            .or_else(|| std::env::var("YOUTUBE_API_KEY").ok());
        let repo_token = cfg
            .repository_token
            .clone()
            .or_else(|| std::env::var("GITHUB_TOKEN").ok());

        Self {
            videos: VideoProvider::new(video_key, cfg.timeout_secs),
            articles: ArticleProvider::new(cfg.timeout_secs),
            repositories: RepositoryProvider::new(repo_token, cfg.timeout_secs),
        }
    }
}

#[async_trait]
impl ContentGateway for RestContentGateway {
    async fn search(
        &self,
        category: Category,
        query: &str,
        limit: usize,
    ) -> Result<Vec<ContentItem>, GatewayError> {
        match category {
            Category::Videos => self.videos.search(query, limit).await,
            Category::Articles => self.articles.search(query, limit).await,
            Category::Repositories => self.repositories.search(query, limit).await,
        }
    }
}

/// 创建内容网关；关闭时使用本地桩，不发网络请求
pub fn create_content_gateway(cfg: &AppConfig) -> Arc<dyn ContentGateway> {
    if !cfg.content.enabled {
        tracing::info!("Content gateway disabled, serving stub results");
        return Arc::new(StubGateway::new());
    }
    tracing::info!("Using REST content gateway");
    Arc::new(RestContentGateway::new(&cfg.content))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_category_labels() {
        assert_eq!(Category::Videos.to_string(), "videos");
        assert_eq!(Category::Repositories.label(), "repositories");
    }

    #[test]
    fn test_category_serde_tokens() {
        let json = serde_json::to_string(&Category::Articles).unwrap();
        assert_eq!(json, "\"articles\"");
    }
}
