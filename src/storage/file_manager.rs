//! 工作目录下的文件布局
//!
//! ```text
//! {work_dir}/
//!   stmt-summary/{sql_digest}/{plan_digest}/{instance}/{timestamp}.json
//!   result/{sql_digest}/{plan_digest}/{instance}/{timestamp}.json
//!   schema/{db}/create.sql
//!   schema/{db}/{table}/create.sql
//!   table-stats/{db}/{table}/table-stats.json
//!   report.json
//! ```
//!
//! 所有路径分量都经过 `escape_path` 编码，所有写入都是原子的

use std::path::{Path, PathBuf};

use log::debug;
use serde::Serialize;

use crate::compare::PlanCmpResult;
use crate::core::error::{PccError, PccResult};
use crate::source::StmtSummary;
use crate::utils::{atomic_write, escape_path};

const STMT_SUMMARY_DIR: &str = "stmt-summary";
const RESULT_DIR: &str = "result";
const SCHEMA_DIR: &str = "schema";
const TABLE_STATS_DIR: &str = "table-stats";
const CREATE_FILE: &str = "create.sql";
const TABLE_STATS_FILE: &str = "table-stats.json";
const REPORT_FILE: &str = "report.json";
const TIMESTAMP_FORMAT: &str = "%Y%m%d%H%M%S";

#[derive(Debug, Clone)]
pub struct FileManager {
    work_dir: PathBuf,
}

impl FileManager {
    pub fn new(work_dir: impl Into<PathBuf>) -> Self {
        Self {
            work_dir: work_dir.into(),
        }
    }

    pub fn work_dir(&self) -> &Path {
        &self.work_dir
    }

    /// 语句摘要和比较结果共用的相对路径
    fn summary_relative_path(summary: &StmtSummary) -> PathBuf {
        let mut path = PathBuf::new();
        path.push(escape_path(&summary.sql_digest));
        path.push(escape_path(&summary.plan_digest));
        path.push(escape_path(&summary.instance));
        path.push(format!(
            "{}.json",
            summary.summary_begin_time.format(TIMESTAMP_FORMAT)
        ));
        path
    }

    pub fn stmt_summary_path(&self, summary: &StmtSummary) -> PathBuf {
        self.work_dir
            .join(STMT_SUMMARY_DIR)
            .join(Self::summary_relative_path(summary))
    }

    pub fn result_path(&self, result: &PlanCmpResult) -> PathBuf {
        self.work_dir
            .join(RESULT_DIR)
            .join(Self::summary_relative_path(&result.old_version_info))
    }

    pub fn database_structure_path(&self, db: &str) -> PathBuf {
        self.work_dir
            .join(SCHEMA_DIR)
            .join(escape_path(db))
            .join(CREATE_FILE)
    }

    pub fn table_structure_path(&self, db: &str, table: &str) -> PathBuf {
        self.work_dir
            .join(SCHEMA_DIR)
            .join(escape_path(db))
            .join(escape_path(table))
            .join(CREATE_FILE)
    }

    pub fn table_stats_path(&self, db: &str, table: &str) -> PathBuf {
        self.work_dir
            .join(TABLE_STATS_DIR)
            .join(escape_path(db))
            .join(escape_path(table))
            .join(TABLE_STATS_FILE)
    }

    pub fn report_path(&self) -> PathBuf {
        self.work_dir.join(REPORT_FILE)
    }

    pub async fn write_stmt_summary(&self, summary: &StmtSummary) -> PccResult<PathBuf> {
        let path = self.stmt_summary_path(summary);
        write_json(&path, summary).await?;
        Ok(path)
    }

    pub async fn write_result(&self, result: &PlanCmpResult) -> PccResult<PathBuf> {
        let path = self.result_path(result);
        write_json(&path, result).await?;
        Ok(path)
    }

    pub async fn write_database_structure(&self, db: &str, ddl: &str) -> PccResult<PathBuf> {
        let path = self.database_structure_path(db);
        atomic_write(&path, ddl.as_bytes()).await?;
        Ok(path)
    }

    pub async fn write_table_structure(
        &self,
        db: &str,
        table: &str,
        ddl: &str,
    ) -> PccResult<PathBuf> {
        let path = self.table_structure_path(db, table);
        atomic_write(&path, ddl.as_bytes()).await?;
        Ok(path)
    }

    pub async fn write_table_stats(&self, db: &str, table: &str, stats: &str) -> PccResult<PathBuf> {
        let path = self.table_stats_path(db, table);
        atomic_write(&path, stats.as_bytes()).await?;
        Ok(path)
    }

    pub async fn write_report<T: Serialize>(&self, report: &T) -> PccResult<PathBuf> {
        let path = self.report_path();
        write_json(&path, report).await?;
        Ok(path)
    }

    /// 读取之前保存的比较结果，文件不存在时返回 `None`
    pub async fn read_result(&self, summary: &StmtSummary) -> PccResult<Option<PlanCmpResult>> {
        let path = self
            .work_dir
            .join(RESULT_DIR)
            .join(Self::summary_relative_path(summary));
        match tokio::fs::read(&path).await {
            Ok(content) => Ok(Some(serde_json::from_slice(&content)?)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(PccError::Io(format!("读取 {} 失败: {}", path.display(), e))),
        }
    }
}

async fn write_json<T: Serialize + ?Sized>(path: &Path, value: &T) -> PccResult<()> {
    let content = serde_json::to_vec_pretty(value)?;
    atomic_write(path, &content).await?;
    debug!(target: "pcc::storage", "已写入 {}", path.display());
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::compare::CmpVerdict;
    use chrono::NaiveDate;
    use tempfile::TempDir;

    fn sample_summary() -> StmtSummary {
        StmtSummary {
            schema: "test".to_string(),
            sql: "select * from t".to_string(),
            sql_digest: "sqldigest".to_string(),
            plan_digest: "plandigest".to_string(),
            exec_count: 3,
            sum_latency: 300,
            instance: "127.0.0.1:10080".to_string(),
            summary_begin_time: NaiveDate::from_ymd_opt(2024, 5, 1)
                .and_then(|d| d.and_hms_opt(10, 30, 0))
                .expect("valid time"),
            ..Default::default()
        }
    }

    #[test]
    fn test_layout() {
        let files = FileManager::new("/work");
        let summary = sample_summary();
        assert_eq!(
            files.stmt_summary_path(&summary),
            PathBuf::from("/work/stmt-summary/sqldigest/plandigest/127%2E0%2E0%2E1%3A10080/20240501103000.json")
        );
        assert_eq!(
            files.database_structure_path("test"),
            PathBuf::from("/work/schema/test/create.sql")
        );
        assert_eq!(
            files.table_structure_path("test", "t1"),
            PathBuf::from("/work/schema/test/t1/create.sql")
        );
        assert_eq!(
            files.table_stats_path("test", "t1"),
            PathBuf::from("/work/table-stats/test/t1/table-stats.json")
        );
        assert_eq!(files.report_path(), PathBuf::from("/work/report.json"));
    }

    #[tokio::test]
    async fn test_write_and_read_result() {
        let dir = TempDir::new().expect("Failed to create temp dir");
        let files = FileManager::new(dir.path());

        let summary = sample_summary();
        assert!(files
            .read_result(&summary)
            .await
            .expect("read missing result")
            .is_none());

        let mut result = PlanCmpResult::new(summary.clone());
        result.result = CmpVerdict::Diff;
        result.old_plan = "TableReader_5".to_string();
        let path = files.write_result(&result).await.expect("write result");
        assert!(path.starts_with(dir.path().join("result")));

        let loaded = files
            .read_result(&summary)
            .await
            .expect("read result")
            .expect("result exists");
        assert_eq!(loaded, result);
    }

    #[tokio::test]
    async fn test_write_schema_files() {
        let dir = TempDir::new().expect("Failed to create temp dir");
        let files = FileManager::new(dir.path());

        let path = files
            .write_table_structure("test", "t1", "CREATE TABLE t1 (a INT)")
            .await
            .expect("write table");
        let content = std::fs::read_to_string(path).expect("read back");
        assert_eq!(content, "CREATE TABLE t1 (a INT)");
    }
}
