//! 资源处理器：按类目并发抓取学习资源
//!
//! 三类内容并发请求、独立失败；成功类目照常返回，失败类目在回复里
//! 显式标注缺席并记入缓存的 missing 列表，整个回合不会因此出错。

use std::collections::BTreeMap;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;
use futures_util::future::join_all;

use crate::content::{Category, ContentGateway, ContentItem};
use crate::error::OwlError;
use crate::handlers::{Handler, HandlerOutcome, TurnInput};
use crate::session::{ResourceCache, SessionState, StateDelta};

pub struct ResourcesHandler {
    gateway: Arc<dyn ContentGateway>,
    limit: usize,
}

impl ResourcesHandler {
    pub fn new(gateway: Arc<dyn ContentGateway>, limit: usize) -> Self {
        Self {
            gateway,
            limit: limit.max(1),
        }
    }

    /// 文本点名的类目；一个都没点则全要
    fn requested_categories(text: &str) -> Vec<Category> {
        let lower = text.to_lowercase();
        let mut cats = Vec::new();
        if ["video", "watch", "youtube"].iter().any(|w| lower.contains(w)) {
            cats.push(Category::Videos);
        }
        if ["article", "read", "wiki", "encyclopedia"]
            .iter()
            .any(|w| lower.contains(w))
        {
            cats.push(Category::Articles);
        }
        if ["repo", "github", "code", "project", "example"]
            .iter()
            .any(|w| lower.contains(w))
        {
            cats.push(Category::Repositories);
        }
        if cats.is_empty() {
            cats.extend(Category::ALL);
        }
        cats
    }

    /// "resources for X" 的显式主题优先，否则沿用会话主题
    fn pick_topic(text: &str, view: &SessionState) -> Option<String> {
        let lower = text.to_lowercase();
        for marker in [" for ", " about ", " on "] {
            if let Some(pos) = lower.find(marker) {
                let topic = text[pos + marker.len()..]
                    .trim()
                    .trim_matches(|c: char| ",.!?".contains(c));
                if !topic.is_empty() && topic.len() > 1 {
                    return Some(topic.to_string());
                }
            }
        }
        view.current_topic.clone()
    }

    fn format_items(out: &mut String, items: &[ContentItem]) {
        for item in items {
            out.push_str(&format!("  - {}", item.title));
            if let Some(score) = item.score {
                out.push_str(&format!(" (★ {})", score));
            }
            out.push_str(&format!("\n    {}\n", item.url));
        }
    }
}

#[async_trait]
impl Handler for ResourcesHandler {
    fn name(&self) -> &'static str {
        "resources"
    }

    async fn handle(
        &self,
        view: &SessionState,
        input: &TurnInput,
    ) -> Result<HandlerOutcome, OwlError> {
        let Some(topic) = Self::pick_topic(&input.text, view) else {
            return Ok(HandlerOutcome::reply_only(
                "What topic should I find resources for? Start a plan first, or say 'find resources for <topic>'.",
            ));
        };

        let categories = Self::requested_categories(&input.text);
        let lookups = categories.iter().map(|&category| {
            let topic = topic.clone();
            async move {
                (
                    category,
                    self.gateway.search(category, &topic, self.limit).await,
                )
            }
        });

        let mut items: BTreeMap<Category, Vec<ContentItem>> = BTreeMap::new();
        let mut missing: Vec<Category> = Vec::new();
        for (category, result) in join_all(lookups).await {
            match result {
                Ok(found) if !found.is_empty() => {
                    items.insert(category, found);
                }
                Ok(_) => {
                    tracing::info!(category = %category, topic = %topic, "No results");
                    missing.push(category);
                }
                Err(e) => {
                    tracing::warn!(category = %category, "Resource lookup failed: {}", e);
                    missing.push(category);
                }
            }
        }

        let mut reply = format!("Learning resources for {}:\n", topic);
        for (category, found) in &items {
            reply.push_str(&format!("\n{}:\n", capitalize(category.label())));
            Self::format_items(&mut reply, found);
        }
        if items.is_empty() {
            reply = format!(
                "I couldn't reach any content source for {} right now — try again in a bit.",
                topic
            );
        } else if !missing.is_empty() {
            let labels: Vec<&str> = missing.iter().map(|c| c.label()).collect();
            reply.push_str(&format!(
                "\nNote: {} unavailable right now.",
                labels.join(" and ")
            ));
        }

        let delta = StateDelta {
            resources: Some(ResourceCache {
                items,
                missing,
                fetched_at: Utc::now(),
            }),
            ..Default::default()
        };
        Ok(HandlerOutcome::new(delta, reply))
    }
}

fn capitalize(s: &str) -> String {
    let mut chars = s.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().collect::<String>() + chars.as_str(),
        None => String::new(),
    }
}
