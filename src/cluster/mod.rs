//! 集群访问
//!
//! 源集群和目标集群都通过 `SqlCluster` 访问，生产环境使用 `MySqlCluster`，
//! 测试中可以替换为脚本化的实现

use async_trait::async_trait;

use crate::core::error::ClusterResult;

pub mod helpers;
pub mod local_file;
pub mod mysql;

pub use helpers::{
    explain, query_string_rows, read_create_database, read_create_object, ObjectKind, SchemaObject,
};
pub use local_file::{LocalFileGuard, LocalFileHandler, LocalFileRegistry};
pub use mysql::MySqlCluster;

/// 文本协议返回的结果集，NULL 为 `None`
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct QueryRows {
    pub columns: Vec<String>,
    pub rows: Vec<Vec<Option<String>>>,
}

impl QueryRows {
    pub fn new(columns: Vec<String>, rows: Vec<Vec<Option<String>>>) -> Self {
        Self { columns, rows }
    }

    /// 按列名（不区分大小写）查找列下标
    pub fn column_index(&self, name: &str) -> Option<usize> {
        self.columns.iter().position(|c| c.eq_ignore_ascii_case(name))
    }

    /// 取第 `row` 行名为 `column` 的值，NULL 和不存在的列都返回 `None`
    pub fn get(&self, row: usize, column: &str) -> Option<&str> {
        let idx = self.column_index(column)?;
        self.rows.get(row)?.get(idx)?.as_deref()
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }
}

/// SQL 集群接口
///
/// `schema` 不为空时，语句在切换到该数据库的同一个会话上执行
#[async_trait]
pub trait SqlCluster: Send + Sync {
    async fn execute(&self, schema: Option<&str>, sql: &str) -> ClusterResult<()>;

    async fn query(&self, schema: Option<&str>, sql: &str) -> ClusterResult<QueryRows>;

    /// 允许服务端通过 `LOAD ... LOCAL` 协议读取的本地文件
    fn local_files(&self) -> &LocalFileRegistry;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_query_rows_get() {
        let rows = QueryRows::new(
            vec!["Database".to_string(), "Create Database".to_string()],
            vec![vec![Some("test".to_string()), None]],
        );
        assert_eq!(rows.get(0, "database"), Some("test"));
        assert_eq!(rows.get(0, "Create Database"), None);
        assert_eq!(rows.get(1, "Database"), None);
        assert_eq!(rows.get(0, "missing"), None);
        assert_eq!(rows.len(), 1);
    }
}
