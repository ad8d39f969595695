//! 常用的元数据查询

use serde::{Deserialize, Serialize};

use crate::cluster::{QueryRows, SqlCluster};
use crate::core::error::{ClusterError, ClusterResult, ER_NO_SUCH_TABLE};
use crate::sql::escape_identifier;

/// 表级对象的类型，对应 `INFORMATION_SCHEMA.TABLES.TABLE_TYPE`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ObjectKind {
    Table,
    View,
    Sequence,
}

impl ObjectKind {
    fn from_table_type(table_type: &str) -> Option<Self> {
        match table_type.to_ascii_uppercase().as_str() {
            "BASE TABLE" | "SYSTEM VIEW" => Some(ObjectKind::Table),
            "VIEW" => Some(ObjectKind::View),
            "SEQUENCE" => Some(ObjectKind::Sequence),
            _ => None,
        }
    }

    fn show_create_keyword(&self) -> &'static str {
        match self {
            ObjectKind::Table => "TABLE",
            ObjectKind::View => "VIEW",
            ObjectKind::Sequence => "SEQUENCE",
        }
    }
}

/// 表、视图或序列的定义
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SchemaObject {
    pub kind: ObjectKind,
    pub ddl: String,
}

/// 转义 SQL 字符串字面量
pub fn quote_string(s: &str) -> String {
    format!("'{}'", s.replace('\\', "\\\\").replace('\'', "''"))
}

/// `SHOW CREATE ...` 的结果中第二列为定义语句
fn second_column(rows: &QueryRows, what: &str) -> ClusterResult<String> {
    rows.rows
        .first()
        .and_then(|r| r.get(1))
        .and_then(|v| v.clone())
        .ok_or_else(|| ClusterError::UnexpectedResult(format!("{} 没有返回定义语句", what)))
}

/// 读取建库语句
pub async fn read_create_database(cluster: &dyn SqlCluster, db: &str) -> ClusterResult<String> {
    let sql = format!("SHOW CREATE DATABASE {}", escape_identifier(db));
    let rows = cluster.query(None, &sql).await?;
    second_column(&rows, &sql)
}

/// 读取表、视图或序列的定义
///
/// 先从 `INFORMATION_SCHEMA.TABLES` 判断对象类型，再执行对应的 `SHOW CREATE`
pub async fn read_create_object(
    cluster: &dyn SqlCluster,
    db: &str,
    table: &str,
) -> ClusterResult<SchemaObject> {
    let kind_sql = format!(
        "SELECT TABLE_TYPE FROM INFORMATION_SCHEMA.TABLES WHERE TABLE_SCHEMA = {} AND TABLE_NAME = {}",
        quote_string(db),
        quote_string(table)
    );
    let rows = cluster.query(None, &kind_sql).await?;
    let table_type = rows
        .rows
        .first()
        .and_then(|r| r.first())
        .and_then(|v| v.as_deref())
        .ok_or_else(|| ClusterError::Sql {
            code: ER_NO_SUCH_TABLE,
            message: format!("Table '{}.{}' doesn't exist", db, table),
        })?;
    let kind = ObjectKind::from_table_type(table_type).ok_or_else(|| {
        ClusterError::UnexpectedResult(format!(
            "{}.{} 的类型 {} 无法识别",
            db, table, table_type
        ))
    })?;

    let sql = format!(
        "SHOW CREATE {} {}.{}",
        kind.show_create_keyword(),
        escape_identifier(db),
        escape_identifier(table)
    );
    let rows = cluster.query(None, &sql).await?;
    Ok(SchemaObject {
        kind,
        ddl: second_column(&rows, &sql)?,
    })
}

/// 在 `schema` 下执行 `EXPLAIN`
pub async fn explain(
    cluster: &dyn SqlCluster,
    schema: Option<&str>,
    sql: &str,
) -> ClusterResult<QueryRows> {
    cluster.query(schema, &format!("EXPLAIN {}", sql)).await
}

/// 把结果集按列名转换为字符串映射，便于读取宽表
pub fn query_string_rows(rows: &QueryRows) -> Vec<std::collections::HashMap<String, Option<String>>> {
    rows.rows
        .iter()
        .map(|row| {
            rows.columns
                .iter()
                .map(|c| c.to_ascii_uppercase())
                .zip(row.iter().cloned())
                .collect()
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_quote_string() {
        assert_eq!(quote_string("test"), "'test'");
        assert_eq!(quote_string("it's"), "'it''s'");
        assert_eq!(quote_string("a\\b"), "'a\\\\b'");
    }

    #[test]
    fn test_object_kind() {
        assert_eq!(ObjectKind::from_table_type("BASE TABLE"), Some(ObjectKind::Table));
        assert_eq!(ObjectKind::from_table_type("view"), Some(ObjectKind::View));
        assert_eq!(ObjectKind::from_table_type("SEQUENCE"), Some(ObjectKind::Sequence));
        assert_eq!(ObjectKind::from_table_type("UNKNOWN"), None);
    }

    #[test]
    fn test_query_string_rows() {
        let rows = QueryRows::new(
            vec!["Schema_Name".to_string(), "Exec_Count".to_string()],
            vec![vec![Some("test".to_string()), Some("3".to_string())]],
        );
        let maps = query_string_rows(&rows);
        assert_eq!(maps.len(), 1);
        assert_eq!(maps[0].get("SCHEMA_NAME"), Some(&Some("test".to_string())));
        assert_eq!(maps[0].get("EXEC_COUNT"), Some(&Some("3".to_string())));
    }
}
