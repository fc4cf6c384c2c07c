//! 视频搜索提供方（YouTube Data API v3）
//!
//! 未配置 API Key 时直接报 Unavailable，让资源处理器把该类目标记为缺失。

use reqwest::Client;
use serde_json::Value;

use crate::content::{ContentItem, GatewayError, USER_AGENT};

const SEARCH_ENDPOINT: &str = "https://www.googleapis.com/youtube/v3/search";

pub struct VideoProvider {
    client: Client,
    api_key: Option<String>,
}

impl VideoProvider {
    pub fn new(api_key: Option<String>, timeout_secs: u64) -> Self {
        let client = Client::builder()
            .timeout(std::time::Duration::from_secs(timeout_secs))
            .user_agent(USER_AGENT)
            .build()
            .unwrap_or_default();
        Self { client, api_key }
    }

    pub async fn search(&self, query: &str, limit: usize) -> Result<Vec<ContentItem>, GatewayError> {
        let key = self.api_key.as_deref().ok_or(GatewayError::Unavailable)?;

        let resp = self
            .client
            .get(SEARCH_ENDPOINT)
            .query(&[
                ("part", "snippet"),
                ("q", query),
                ("type", "video"),
                ("maxResults", &limit.to_string()),
                ("key", key),
            ])
            .send()
            .await
            .map_err(|e| GatewayError::Request(e.to_string()))?;

        if !resp.status().is_success() {
            return Err(GatewayError::Status(resp.status().as_u16()));
        }

        let body: Value = resp
            .json()
            .await
            .map_err(|e| GatewayError::InvalidResponse(e.to_string()))?;

        let items = body["items"]
            .as_array()
            .map(|arr| {
                arr.iter()
                    .filter_map(|item| {
                        let id = item["id"]["videoId"].as_str()?;
                        let title = item["snippet"]["title"].as_str()?;
                        Some(ContentItem {
                            title: title.to_string(),
                            url: format!("https://www.youtube.com/watch?v={}", id),
                            score: None,
                            snippet: item["snippet"]["description"]
                                .as_str()
                                .filter(|s| !s.is_empty())
                                .map(ToString::to_string),
                        })
                    })
                    .take(limit)
                    .collect()
            })
            .unwrap_or_default();

        Ok(items)
    }
}
