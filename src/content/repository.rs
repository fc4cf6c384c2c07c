//! 代码仓库提供方（GitHub Search API）
//!
//! 匿名可用（受限流），配置令牌后走 Bearer 认证；按星标数降序。

use reqwest::Client;
use serde_json::Value;

use crate::content::{ContentItem, GatewayError, USER_AGENT};

const SEARCH_ENDPOINT: &str = "https://api.github.com/search/repositories";

pub struct RepositoryProvider {
    client: Client,
    token: Option<String>,
}

impl RepositoryProvider {
    pub fn new(token: Option<String>, timeout_secs: u64) -> Self {
        let client = Client::builder()
            .timeout(std::time::Duration::from_secs(timeout_secs))
            .user_agent(USER_AGENT)
            .build()
            .unwrap_or_default();
        Self { client, token }
    }

    pub async fn search(&self, query: &str, limit: usize) -> Result<Vec<ContentItem>, GatewayError> {
        let mut request = self
            .client
            .get(SEARCH_ENDPOINT)
            .query(&[
                // 过滤掉几乎无人问津的仓库
                ("q", format!("{} stars:>10", query)),
                ("sort", "stars".to_string()),
                ("order", "desc".to_string()),
                ("per_page", limit.to_string()),
            ])
            .header("Accept", "application/vnd.github+json");

        if let Some(token) = &self.token {
            request = request.bearer_auth(token);
        }

        let resp = request
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
                    .filter_map(|repo| {
                        let name = repo["full_name"].as_str()?;
                        let url = repo["html_url"].as_str()?;
                        Some(ContentItem {
                            title: name.to_string(),
                            url: url.to_string(),
                            score: repo["stargazers_count"].as_u64(),
                            snippet: repo["description"]
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
