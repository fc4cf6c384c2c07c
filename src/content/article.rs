//! 百科文章提供方（Wikipedia REST）
//!
//! 先按消歧后的标题取摘要页，取不到再退到全文搜索接口；
//! 两条路都失败才向上报错。该站点要求请求必须带可识别的 User-Agent。

use reqwest::Client;
use serde_json::Value;

use crate::content::{ContentItem, GatewayError, USER_AGENT};

const SUMMARY_ENDPOINT: &str = "https://en.wikipedia.org/api/rest_v1/page/summary";
const SEARCH_ENDPOINT: &str = "https://en.wikipedia.org/w/api.php";

/// 摘要截断长度（字符）
const MAX_SNIPPET_CHARS: usize = 280;

/// 一词多义的技术名词直接映射到消歧标题，避免落到水果 / 咖啡页面
fn disambiguate(topic: &str) -> String {
    let key = topic.trim().to_lowercase();
    let mapped = match key.as_str() {
        "python" => "Python (programming language)",
        "java" => "Java (programming language)",
        "rust" => "Rust (programming language)",
        "go" | "golang" => "Go (programming language)",
        "ruby" => "Ruby (programming language)",
        "swift" => "Swift (programming language)",
        "c" => "C (programming language)",
        "r" => "R (programming language)",
        "scala" => "Scala (programming language)",
        "react" => "React (software)",
        "spring" => "Spring Framework",
        _ => return topic.trim().to_string(),
    };
    mapped.to_string()
}

/// 去掉搜索接口摘要里的高亮标签
fn strip_tags(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    let mut in_tag = false;
    for c in text.chars() {
        match c {
            '<' => in_tag = true,
            '>' => in_tag = false,
            _ if !in_tag => out.push(c),
            _ => {}
        }
    }
    out.replace("&quot;", "\"").replace("&amp;", "&")
}

fn truncate_chars(text: &str, max: usize) -> String {
    if text.chars().count() <= max {
        return text.to_string();
    }
    let cut: String = text.chars().take(max).collect();
    format!("{}...", cut.trim_end())
}

pub struct ArticleProvider {
    client: Client,
}

impl ArticleProvider {
    pub fn new(timeout_secs: u64) -> Self {
        let client = Client::builder()
            .timeout(std::time::Duration::from_secs(timeout_secs))
            .user_agent(USER_AGENT)
            .build()
            .unwrap_or_default();
        Self { client }
    }

    pub async fn search(&self, query: &str, limit: usize) -> Result<Vec<ContentItem>, GatewayError> {
        let mut items = Vec::new();

        let summary_err = match self.summary(&disambiguate(query)).await {
            Ok(Some(item)) => {
                items.push(item);
                None
            }
            Ok(None) => None,
            Err(e) => Some(e),
        };

        if items.len() < limit {
            match self.search_titles(query, limit).await {
                Ok(more) => {
                    for item in more {
                        if items.len() >= limit {
                            break;
                        }
                        if !items.iter().any(|existing| existing.url == item.url) {
                            items.push(item);
                        }
                    }
                }
                Err(e) => {
                    if items.is_empty() {
                        return Err(summary_err.unwrap_or(e));
                    }
                }
            }
        }

        Ok(items)
    }

    /// 摘要页：命中返回单条；404 表示无此标题，交给搜索兜底
    async fn summary(&self, title: &str) -> Result<Option<ContentItem>, GatewayError> {
        let url = format!("{}/{}", SUMMARY_ENDPOINT, title.replace(' ', "_"));
        let resp = self
            .client
            .get(&url)
            .send()
            .await
            .map_err(|e| GatewayError::Request(e.to_string()))?;

        if resp.status().as_u16() == 404 {
            return Ok(None);
        }
        if !resp.status().is_success() {
            return Err(GatewayError::Status(resp.status().as_u16()));
        }

        let body: Value = resp
            .json()
            .await
            .map_err(|e| GatewayError::InvalidResponse(e.to_string()))?;

        let page_title = body["title"].as_str().unwrap_or(title);
        let page_url = body["content_urls"]["desktop"]["page"]
            .as_str()
            .map(ToString::to_string)
            .unwrap_or_else(|| {
                format!("https://en.wikipedia.org/wiki/{}", page_title.replace(' ', "_"))
            });

        Ok(Some(ContentItem {
            title: page_title.to_string(),
            url: page_url,
            score: None,
            snippet: body["extract"]
                .as_str()
                .map(|s| truncate_chars(s, MAX_SNIPPET_CHARS)),
        }))
    }

    async fn search_titles(
        &self,
        query: &str,
        limit: usize,
    ) -> Result<Vec<ContentItem>, GatewayError> {
        let resp = self
            .client
            .get(SEARCH_ENDPOINT)
            .query(&[
                ("action", "query"),
                ("list", "search"),
                ("srsearch", query),
                ("format", "json"),
                ("srlimit", &limit.to_string()),
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

        let items = body["query"]["search"]
            .as_array()
            .map(|arr| {
                arr.iter()
                    .filter_map(|hit| {
                        let title = hit["title"].as_str()?;
                        Some(ContentItem {
                            title: title.to_string(),
                            url: format!(
                                "https://en.wikipedia.org/wiki/{}",
                                title.replace(' ', "_")
                            ),
                            score: None,
                            snippet: hit["snippet"]
                                .as_str()
                                .map(|s| truncate_chars(&strip_tags(s), MAX_SNIPPET_CHARS)),
                        })
                    })
                    .take(limit)
                    .collect()
            })
            .unwrap_or_default();

        Ok(items)
    }
}
