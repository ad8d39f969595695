//! 从源集群的状态端口导出表的统计信息

use async_trait::async_trait;
use log::debug;

use crate::core::error::{ClusterError, ClusterResult};

/// 统计信息来源
#[async_trait]
pub trait StatsSource: Send + Sync {
    /// 返回统计信息的 JSON 文本，没有统计信息时为 `null`
    async fn dump(&self, db: &str, table: &str) -> ClusterResult<String>;
}

/// 通过 `GET /stats/dump/{db}/{table}` 读取统计信息
pub struct HttpStatsClient {
    client: reqwest::Client,
    status_addr: String,
}

impl HttpStatsClient {
    pub fn new(status_addr: impl Into<String>) -> Self {
        Self {
            client: reqwest::Client::new(),
            status_addr: status_addr.into(),
        }
    }

    pub fn dump_url(&self, db: &str, table: &str) -> String {
        format!("http://{}/stats/dump/{}/{}", self.status_addr, db, table)
    }
}

#[async_trait]
impl StatsSource for HttpStatsClient {
    async fn dump(&self, db: &str, table: &str) -> ClusterResult<String> {
        let url = self.dump_url(db, table);
        debug!(target: "pcc::source", "请求统计信息: {}", url);

        let resp = self
            .client
            .get(&url)
            .send()
            .await
            .map_err(|e| ClusterError::Http(format!("请求 {} 失败: {}", url, e)))?;
        let status = resp.status();
        if !status.is_success() {
            return Err(ClusterError::Http(format!(
                "请求 {} 失败: HTTP 状态码为 {}",
                url,
                status.as_u16()
            )));
        }
        resp.text()
            .await
            .map_err(|e| ClusterError::Http(format!("读取 {} 的响应失败: {}", url, e)))
    }
}
