//! 本地桩网关（测试与离线模式用，不发网络请求）
//!
//! 结果确定可预期；可标记某些类目为故障，用于演练部分失败路径。

use std::collections::HashSet;

use async_trait::async_trait;

use crate::content::{Category, ContentGateway, ContentItem, GatewayError};

#[derive(Debug, Default)]
pub struct StubGateway {
    failing: HashSet<Category>,
}

impl StubGateway {
    pub fn new() -> Self {
        Self::default()
    }

    /// 标记某类目为故障：对它的查询固定返回错误
    pub fn with_failure(mut self, category: Category) -> Self {
        self.failing.insert(category);
        self
    }
}

#[async_trait]
impl ContentGateway for StubGateway {
    async fn search(
        &self,
        category: Category,
        query: &str,
        limit: usize,
    ) -> Result<Vec<ContentItem>, GatewayError> {
        if self.failing.contains(&category) {
            return Err(GatewayError::Request(format!(
                "stub outage for {}",
                category
            )));
        }

        let items = (1..=limit)
            .map(|i| ContentItem {
                title: format!("{} {} #{}", category.label(), query, i),
                url: format!("https://{}.example.com/{}/{}", category.label(), query, i),
                score: Some((limit - i + 1) as u64 * 100),
                snippet: None,
            })
            .collect();
        Ok(items)
    }
}
