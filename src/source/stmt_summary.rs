//! 从源集群读取语句摘要
//!
//! 数据来自 `INFORMATION_SCHEMA.CLUSTER_STATEMENTS_SUMMARY_HISTORY`，
//! 每一行是一个实例在一个时间窗口内某条语句某个执行计划的汇总

use std::sync::LazyLock;
use std::time::Duration;

use chrono::NaiveDateTime;
use log::{debug, error, info, warn};
use regex::Regex;
use serde::{Deserialize, Serialize};
use sqlparser::ast::{SetExpr, Statement};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use crate::cluster::{query_string_rows, SqlCluster};
use crate::core::error::{ClusterError, PccError, PccResult};
use crate::source::binding::Binding;
use crate::sql::{extract_table_names, interpolate_arguments, is_mem_or_sys_table, parse_one, TableName};

const STMT_SUMMARY_QUERY: &str = "SELECT \
    SCHEMA_NAME, \
    QUERY_SAMPLE_TEXT, \
    TABLE_NAMES, \
    PLAN, \
    DIGEST, \
    PLAN_DIGEST, \
    CAST(EXEC_COUNT AS CHAR) AS EXEC_COUNT, \
    CAST(SUM_LATENCY AS CHAR) AS SUM_LATENCY, \
    INSTANCE, \
    CAST(SUMMARY_BEGIN_TIME AS CHAR) AS SUMMARY_BEGIN_TIME \
    FROM INFORMATION_SCHEMA.CLUSTER_STATEMENTS_SUMMARY_HISTORY \
    WHERE EXEC_COUNT > 1 AND STMT_TYPE IN ('Select', 'Insert', 'Replace', 'Update', 'Delete')";

const TRUNCATED_MARKER: &str = "(len:";
const BEGIN_TIME_FORMAT: &str = "%Y-%m-%d %H:%M:%S%.f";

static DML_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)^\s*(?:INSERT|REPLACE|UPDATE|DELETE)\b").expect("DML 正则无效")
});

/// 语句摘要
///
/// `instance + summary_begin_time + sql_digest + plan_digest` 唯一标识一条记录
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StmtSummary {
    pub schema: String,
    /// 回填参数后的 SQL
    pub sql: String,
    pub table_names_need_to_sync: Vec<TableName>,
    pub plan_str: String,
    pub sql_digest: String,
    pub plan_digest: String,
    pub exec_count: u64,
    /// 累计延迟，单位纳秒
    pub sum_latency: u64,
    pub instance: String,
    pub summary_begin_time: NaiveDateTime,
    /// SQL 无法被解析，此时表名来自摘要表的 `TABLE_NAMES` 列
    pub has_parse_error: bool,
    pub binding: Option<Binding>,
}

impl StmtSummary {
    pub fn sum_latency(&self) -> Duration {
        Duration::from_nanos(self.sum_latency)
    }

    pub fn avg_latency(&self) -> Duration {
        if self.exec_count == 0 {
            return Duration::ZERO;
        }
        Duration::from_nanos(self.sum_latency / self.exec_count)
    }

    /// 用于日志的简短标识
    pub fn id(&self) -> String {
        format!(
            "{}/{}@{}#{}",
            self.sql_digest,
            self.plan_digest,
            self.instance,
            self.summary_begin_time.format("%Y%m%d%H%M%S")
        )
    }
}

/// 根据记录的 SQL 填充 `sql`、`table_names_need_to_sync` 和 `has_parse_error`，
/// 返回 true 表示该记录应当跳过
///
/// 调用前需要先设置 `schema`
pub fn fill_from_sql_recorded(sql_recorded: &str, s: &mut StmtSummary) -> bool {
    if sql_recorded.contains(TRUNCATED_MARKER) {
        warn!(target: "pcc::source", "SQL 已被截断，跳过: {}", sql_recorded);
        return true;
    }

    s.sql = match parse_one(sql_recorded) {
        Ok(_) => sql_recorded.to_string(),
        Err(_) => interpolate_arguments(sql_recorded),
    };

    let stmt = match parse_one(&s.sql) {
        Ok(stmt) => stmt,
        Err(_) => {
            // DML 的解析失败多为方言差异，直接跳过以减少噪音
            if DML_RE.is_match(&s.sql) {
                return true;
            }
            s.has_parse_error = true;
            return false;
        }
    };

    match &stmt {
        Statement::Insert(insert) => {
            let Some(source) = insert.source.as_ref() else {
                return true;
            };
            if matches!(source.body.as_ref(), SetExpr::Values(_)) {
                return true;
            }
            let select = Statement::Query(source.clone());
            if extract_table_names(&select, &s.schema).is_empty() {
                return true;
            }
        }
        Statement::Update { selection: None, .. } => return true,
        Statement::Delete(delete) if delete.selection.is_none() => return true,
        _ => {}
    }

    s.table_names_need_to_sync = extract_table_names(&stmt, &s.schema);
    false
}

/// 解析 `TABLE_NAMES` 列，格式为 `db1.t1,db2.t2`
///
/// 返回解析出的表名以及是否存在无法拆分的项
fn split_table_names(table_names: &str, s: &StmtSummary) -> (Vec<TableName>, bool) {
    let mut names = Vec::new();
    let mut failed = false;
    for item in table_names.split(',').filter(|t| !t.is_empty()) {
        match item.split_once('.') {
            Some((db, table)) if !db.is_empty() && !table.is_empty() && !table.contains('.') => {
                names.push(TableName::new(db.to_lowercase(), table.to_lowercase()));
            }
            _ => {
                failed = true;
                error!(
                    target: "pcc::source",
                    "无法拆分库名和表名，后续可能出错: item={}, all={}, sql_digest={}, plan_digest={}",
                    item, table_names, s.sql_digest, s.plan_digest
                );
            }
        }
    }
    (names, failed)
}

fn required<'a>(
    row: &'a std::collections::HashMap<String, Option<String>>,
    column: &str,
) -> PccResult<&'a str> {
    row.get(column)
        .and_then(|v| v.as_deref())
        .ok_or_else(|| {
            ClusterError::UnexpectedResult(format!("语句摘要缺少列 {} 或为 NULL", column)).into()
        })
}

fn parse_number(row: &std::collections::HashMap<String, Option<String>>, column: &str) -> PccResult<u64> {
    let value = required(row, column)?;
    value.trim().parse::<u64>().map_err(|e| {
        ClusterError::UnexpectedResult(format!("列 {} 的值 {} 不是整数: {}", column, value, e)).into()
    })
}

/// 把一行结果转换为语句摘要，返回 `None` 表示应当跳过
fn summary_from_row(
    row: &std::collections::HashMap<String, Option<String>>,
) -> PccResult<Option<StmtSummary>> {
    let mut s = StmtSummary {
        schema: row
            .get("SCHEMA_NAME")
            .and_then(|v| v.clone())
            .unwrap_or_default(),
        plan_str: required(row, "PLAN")?.to_string(),
        sql_digest: required(row, "DIGEST")?.to_string(),
        plan_digest: row.get("PLAN_DIGEST").and_then(|v| v.clone()).unwrap_or_default(),
        exec_count: parse_number(row, "EXEC_COUNT")?,
        sum_latency: parse_number(row, "SUM_LATENCY")?,
        instance: required(row, "INSTANCE")?.to_string(),
        ..Default::default()
    };
    let begin_time = required(row, "SUMMARY_BEGIN_TIME")?;
    s.summary_begin_time = NaiveDateTime::parse_from_str(begin_time, BEGIN_TIME_FORMAT)
        .map_err(|e| {
            PccError::from(ClusterError::UnexpectedResult(format!(
                "无法解析 SUMMARY_BEGIN_TIME {}: {}",
                begin_time, e
            )))
        })?;

    let sql_recorded = required(row, "QUERY_SAMPLE_TEXT")?;
    if fill_from_sql_recorded(sql_recorded, &mut s) {
        return Ok(None);
    }

    let mut failed_to_split = false;
    if s.has_parse_error {
        if let Some(table_names) = row.get("TABLE_NAMES").and_then(|v| v.as_deref()) {
            let (names, failed) = split_table_names(table_names, &s);
            s.table_names_need_to_sync = names;
            failed_to_split = failed;
        }
    }

    // 不同步系统表
    s.table_names_need_to_sync.retain(|t| !is_mem_or_sys_table(t));
    // 不访问用户表的简单查询没有比较的意义
    if s.table_names_need_to_sync.is_empty() && !failed_to_split {
        return Ok(None);
    }
    Ok(Some(s))
}

/// 读取语句摘要并逐条发送到 `tx`
///
/// 完成时返回发送的条数；不会关闭通道。取消时返回 `PccError::Cancelled`
pub async fn read_stmt_summaries(
    cluster: &dyn SqlCluster,
    tx: &mpsc::Sender<StmtSummary>,
    cancel: &CancellationToken,
) -> PccResult<usize> {
    let rows = tokio::select! {
        _ = cancel.cancelled() => return Err(PccError::Cancelled),
        rows = cluster.query(None, STMT_SUMMARY_QUERY) => rows
            .map_err(PccError::from)
            .map_err(|e| e.context(format!("执行查询失败: {}", STMT_SUMMARY_QUERY)))?,
    };
    info!(target: "pcc::source", "读取到 {} 条语句摘要", rows.len());

    let mut sent = 0;
    for row in query_string_rows(&rows) {
        let Some(summary) = summary_from_row(&row)? else {
            continue;
        };
        debug!(target: "pcc::source", "语句摘要 {}", summary.id());

        tokio::select! {
            _ = cancel.cancelled() => return Err(PccError::Cancelled),
            res = tx.send(summary) => {
                res.map_err(|_| PccError::Internal("语句摘要通道已关闭".to_string()))?;
            }
        }
        sent += 1;
    }
    Ok(sent)
}
