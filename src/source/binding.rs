//! 执行计划绑定
//!
//! 源集群上生效的全局绑定会影响执行计划，比较前需要在目标集群上重建

use std::collections::HashMap;

use log::{info, warn};
use serde::{Deserialize, Serialize};

use crate::cluster::{query_string_rows, SqlCluster};
use crate::core::error::{PccError, PccResult};

const SHOW_BINDINGS: &str = "SHOW GLOBAL BINDINGS";
const ENABLED_STATUSES: [&str; 2] = ["enabled", "using"];

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Binding {
    pub original_sql: String,
    pub bind_sql: String,
    pub default_db: String,
    pub sql_digest: String,
}

impl Binding {
    /// 在目标集群上重建绑定的语句
    pub fn create_statement(&self) -> String {
        format!("CREATE GLOBAL BINDING USING {}", self.bind_sql)
    }
}

/// 读取源集群上所有生效的全局绑定，按 SQL digest 索引
pub async fn read_bindings(cluster: &dyn SqlCluster) -> PccResult<HashMap<String, Binding>> {
    let rows = cluster
        .query(None, SHOW_BINDINGS)
        .await
        .map_err(|e| PccError::from(e).context("读取全局绑定失败"))?;

    let mut bindings = HashMap::new();
    for row in query_string_rows(&rows) {
        let field = |name: &str| row.get(name).and_then(|v| v.clone()).unwrap_or_default();

        let status = field("STATUS");
        if !ENABLED_STATUSES.iter().any(|s| s.eq_ignore_ascii_case(&status)) {
            continue;
        }
        let binding = Binding {
            original_sql: field("ORIGINAL_SQL"),
            bind_sql: field("BIND_SQL"),
            default_db: field("DEFAULT_DB"),
            sql_digest: field("SQL_DIGEST"),
        };
        if binding.sql_digest.is_empty() || binding.bind_sql.is_empty() {
            warn!(target: "pcc::source", "忽略不完整的绑定: {:?}", binding);
            continue;
        }
        bindings.insert(binding.sql_digest.clone(), binding);
    }

    info!(target: "pcc::source", "读取到 {} 条生效的全局绑定", bindings.len());
    Ok(bindings)
}
