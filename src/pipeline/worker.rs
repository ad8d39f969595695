//! 单条语句摘要的比较流程
//!
//! 解析旧计划 → 同步语句所在的库 → 同步引用的表 → 同步绑定 →
//! 在目标集群上获取新计划 → 比较 → 分类。任意一步失败都直接进入分类

use std::fmt;
use std::sync::Arc;

use log::{debug, error, info, warn};

use crate::cluster::{explain, SqlCluster};
use crate::compare::{cmp_plan, CmpVerdict, PlanCmpResult};
use crate::core::error::{PccError, PccResult};
use crate::plan::{plan_from_explain, plan_from_stmt_summary, ParsedPlan, PlanNode};
use crate::schema::SchemaReplicator;
use crate::source::StmtSummary;

/// 比较流程的阶段，用于日志
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    ParseOldPlan,
    SyncSchema,
    SyncTables,
    SyncBinding,
    FetchNewPlan,
    Compare,
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Stage::ParseOldPlan => "parse-old-plan",
            Stage::SyncSchema => "sync-schema",
            Stage::SyncTables => "sync-tables",
            Stage::SyncBinding => "sync-binding",
            Stage::FetchNewPlan => "fetch-new-plan",
            Stage::Compare => "compare",
        };
        f.write_str(name)
    }
}

pub struct CmpWorker {
    replicator: Arc<SchemaReplicator>,
    target: Arc<dyn SqlCluster>,
    strict_alias_resolution: bool,
}

impl CmpWorker {
    pub fn new(
        replicator: Arc<SchemaReplicator>,
        target: Arc<dyn SqlCluster>,
        strict_alias_resolution: bool,
    ) -> Self {
        Self {
            replicator,
            target,
            strict_alias_resolution,
        }
    }

    /// 比较一条语句摘要，错误记录在返回的结果中
    pub async fn compare(&self, summary: StmtSummary) -> PlanCmpResult {
        let mut result = PlanCmpResult::new(summary);
        if let Err((stage, err)) = self.run_stages(&mut result).await {
            classify(&mut result, stage, err);
        }
        result
    }

    async fn run_stages(&self, result: &mut PlanCmpResult) -> Result<(), (Stage, PccError)> {
        let s = &result.old_version_info;

        let parsed_old =
            plan_from_stmt_summary(&s.plan_str).map_err(|e| (Stage::ParseOldPlan, PccError::from(e)))?;

        self.replicator
            .sync_database(&s.schema)
            .await
            .map_err(|e| (Stage::SyncSchema, e))?;
        self.replicator
            .sync_tables(&s.table_names_need_to_sync)
            .await
            .map_err(|e| (Stage::SyncTables, e))?;
        if let Some(binding) = &s.binding {
            self.replicator
                .sync_binding(binding)
                .await
                .map_err(|e| (Stage::SyncBinding, e))?;
        }

        let parsed_new = self
            .fetch_new_plan(s)
            .await
            .map_err(|e| (Stage::FetchNewPlan, e))?;

        let sql = if s.has_parse_error { "" } else { s.sql.as_str() };
        let (mut old_root, mut new_root) = (parsed_old.root, parsed_new.root);
        let verdict = self
            .compare_trees(sql, &mut old_root, &mut new_root)
            .map_err(|e| (Stage::Compare, e))?;

        info!(target: "pcc::worker", "比较结果 {}: {}", verdict, s.sql);
        result.old_plan = parsed_old.text;
        result.new_diff_plan = if verdict == CmpVerdict::Same {
            String::new()
        } else {
            parsed_new.text
        };
        result.result = verdict;
        Ok(())
    }

    async fn fetch_new_plan(&self, s: &StmtSummary) -> PccResult<ParsedPlan> {
        if self.replicator.is_cancelled() {
            return Err(PccError::Cancelled);
        }
        let schema = Some(s.schema.as_str()).filter(|db| !db.is_empty());
        let rows = explain(self.target.as_ref(), schema, &s.sql).await?;
        Ok(plan_from_explain(&rows.columns, &rows.rows)?)
    }

    /// 解析 SQL 失败时，宽松模式下退化为不做别名归一化的比较
    fn compare_trees(
        &self,
        sql: &str,
        old_root: &mut PlanNode,
        new_root: &mut PlanNode,
    ) -> PccResult<CmpVerdict> {
        match cmp_plan(sql, old_root, new_root) {
            Ok(verdict) => Ok(verdict),
            Err(e) if !self.strict_alias_resolution && !sql.is_empty() => {
                warn!(
                    target: "pcc::worker",
                    "别名解析失败，忽略别名比较: {}, sql: {}",
                    e, sql
                );
                cmp_plan("", old_root, new_root)
            }
            Err(e) => Err(e),
        }
    }
}

/// 不可重试的错误写入 `err_msg`；其余错误保持 `err_msg` 为空，等待下次运行重试
fn classify(result: &mut PlanCmpResult, stage: Stage, err: PccError) {
    result.result = CmpVerdict::Unknown;
    let id = result.old_version_info.id();
    if err.is_cancelled() {
        debug!(target: "pcc::worker", "{} 在 {} 阶段被取消", id, stage);
        return;
    }
    if err.is_unretryable() {
        error!(target: "pcc::worker", "{} 在 {} 阶段失败: {}", id, stage, err);
        result.err_msg = err.to_string();
    } else {
        warn!(target: "pcc::worker", "{} 在 {} 阶段遇到可重试错误: {}", id, stage, err);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::error::{ClusterError, PlanError, SyncError};

    #[test]
    fn test_classify() {
        let mut result = PlanCmpResult::new(StmtSummary::default());
        classify(&mut result, Stage::ParseOldPlan, PlanError::EmptyInput.into());
        assert!(result.is_error());

        let mut result = PlanCmpResult::new(StmtSummary::default());
        classify(
            &mut result,
            Stage::SyncTables,
            PccError::from(ClusterError::Connection("reset".to_string())),
        );
        assert!(result.is_retryable());

        let mut result = PlanCmpResult::new(StmtSummary::default());
        classify(
            &mut result,
            Stage::SyncSchema,
            PccError::from_source_cluster(ClusterError::Sql {
                code: 1146,
                message: "Table 'test.t' doesn't exist".to_string(),
            }),
        );
        assert!(result.is_error());
        assert!(result.err_msg.contains("1146"));

        let mut result = PlanCmpResult::new(StmtSummary::default());
        classify(
            &mut result,
            Stage::SyncTables,
            PccError::from(SyncError::IdempotencyMismatch {
                ddl: "CREATE TABLE t (a INT)".to_string(),
                cause: ClusterError::Sql {
                    code: 1050,
                    message: "exists".to_string(),
                },
            })
            .context("同步表失败"),
        );
        assert!(result.is_error());

        let mut result = PlanCmpResult::new(StmtSummary::default());
        classify(&mut result, Stage::FetchNewPlan, PccError::Cancelled);
        assert!(result.is_retryable());
    }

    #[test]
    fn test_stage_display() {
        assert_eq!(Stage::FetchNewPlan.to_string(), "fetch-new-plan");
    }
}
