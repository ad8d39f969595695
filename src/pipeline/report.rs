//! 运行报告
//!
//! 以 JSON 形式写入工作目录下的 `report.json`

use chrono::{DateTime, Local, SecondsFormat};
use serde::{Deserialize, Serialize};

use crate::compare::PlanCmpResult;
use crate::config::Config;
use crate::pipeline::aggregate::{top_n_sum_latency_plans, Aggregate, ChangeCount};

const CAPTURE_METHOD: &str = "Statement Summary";

/// 运行状态
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum RunStatus {
    Completed,
    Cancelled,
    Failed,
}

impl RunStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            RunStatus::Completed => "Completed",
            RunStatus::Cancelled => "Cancelled",
            RunStatus::Failed => "Failed",
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Summary {
    pub overall: ChangeCount,
    pub unchanged: ChangeCount,
    pub may_degraded: ChangeCount,
    /// 不可重试的错误与待重试之和
    pub errors: ChangeCount,
    pub error: ChangeCount,
    /// 待下次运行重试
    pub retry_pending: ChangeCount,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Table {
    pub header: Vec<String>,
    pub data: Vec<Vec<String>>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlanText {
    pub text: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Details {
    pub header: String,
    pub labels: Vec<[String; 2]>,
    pub source: PlanText,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub target: Option<PlanText>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Report {
    pub task_info: Vec<[String; 2]>,
    pub workload_info: Vec<[String; 2]>,
    pub execution_info: Vec<[String; 2]>,
    pub summary: Summary,
    pub top_sqls: Table,
    pub details: Vec<Details>,
}

fn item(key: &str, value: impl Into<String>) -> [String; 2] {
    [key.to_string(), value.into()]
}

/// 运行报告的主机名，取不到时为 `unknown`
fn hostname() -> String {
    std::env::var("HOSTNAME")
        .ok()
        .filter(|h| !h.is_empty())
        .or_else(|| {
            std::fs::read_to_string("/etc/hostname")
                .ok()
                .map(|h| h.trim().to_string())
                .filter(|h| !h.is_empty())
        })
        .unwrap_or_else(|| "unknown".to_string())
}

fn avg_latency(result: &PlanCmpResult) -> String {
    format!("{:?}", result.old_version_info.avg_latency())
}

impl Report {
    pub fn build(
        config: &Config,
        aggregate: &Aggregate,
        started: DateTime<Local>,
        status: RunStatus,
    ) -> Self {
        let errors = aggregate.errors_and_retries();
        let succeeded = aggregate.same().plan + aggregate.diff().plan;

        let task_info = vec![
            item("Task Name", config.task_name.as_str()),
            item("Task Owner", std::env::var("USER").unwrap_or_default()),
            item("Task Host", hostname()),
            item("Description", config.description.as_str()),
        ];
        let workload_info = vec![
            item("Old Version Address", config.old.addr()),
            item("Old Version User", config.old.user.as_str()),
            item("Capture Method", CAPTURE_METHOD),
            item("Total SQL Statement Count", aggregate.len().to_string()),
        ];
        let execution_info = vec![
            item("Started", started.to_rfc3339_opts(SecondsFormat::Secs, false)),
            item(
                "Last Updated",
                Local::now().to_rfc3339_opts(SecondsFormat::Secs, false),
            ),
            item("Status", status.as_str()),
            item("Number of Error", errors.plan.to_string()),
            item("Number of Retry Pending", aggregate.retry().plan.to_string()),
            item("Number of Successful", succeeded.to_string()),
        ];

        let top = top_n_sum_latency_plans(aggregate.results(), config.pipeline.top_n);
        let top_sqls = Table {
            header: ["DIGEST", "DIGEST_TEXT", "AVG_LATENCY", "EXEC_COUNT", "Plan change"]
                .iter()
                .map(|h| h.to_string())
                .collect(),
            data: top
                .iter()
                .map(|r| {
                    let s = &r.old_version_info;
                    vec![
                        s.sql_digest.clone(),
                        s.sql.clone(),
                        avg_latency(r),
                        s.exec_count.to_string(),
                        r.result.to_string(),
                    ]
                })
                .collect(),
        };

        let details = aggregate.results().iter().map(Details::from_result).collect();

        Self {
            task_info,
            workload_info,
            execution_info,
            summary: Summary {
                overall: aggregate.overall(),
                unchanged: aggregate.same(),
                may_degraded: aggregate.diff(),
                errors,
                error: aggregate.error(),
                retry_pending: aggregate.retry(),
            },
            top_sqls,
            details,
        }
    }
}

impl Details {
    fn from_result(result: &PlanCmpResult) -> Self {
        let s = &result.old_version_info;
        let mut labels = vec![
            item("Schema Name", s.schema.as_str()),
            item("SQL Text", s.sql.as_str()),
            item("AVG_LATENCY", avg_latency(result)),
            item("EXEC_COUNT", s.exec_count.to_string()),
            item("Plan Change", result.result.as_str()),
        ];
        if !result.err_msg.is_empty() {
            labels.push(item("Error", result.err_msg.as_str()));
        }
        Self {
            header: format!("SQL Digest: {} Plan Digest: {}", s.sql_digest, s.plan_digest),
            labels,
            source: PlanText {
                text: result.old_plan.clone(),
            },
            target: (!result.new_diff_plan.is_empty()).then(|| PlanText {
                text: result.new_diff_plan.clone(),
            }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::compare::CmpVerdict;
    use crate::source::StmtSummary;
    use serde_json::Value;

    fn result(digest: &str, verdict: CmpVerdict, sum_latency: u64) -> PlanCmpResult {
        let mut r = PlanCmpResult::new(StmtSummary {
            schema: "test".to_string(),
            sql: format!("select {}", digest),
            sql_digest: digest.to_string(),
            plan_digest: "p".to_string(),
            exec_count: 2,
            sum_latency,
            ..Default::default()
        });
        r.result = verdict;
        r.old_plan = "TableReader_5".to_string();
        if verdict == CmpVerdict::Diff {
            r.new_diff_plan = "IndexReader_6".to_string();
        }
        r
    }

    #[test]
    fn test_build_report() {
        let mut config = Config::default();
        config.task_name = "nightly".to_string();
        config.pipeline.top_n = 1;

        let mut agg = Aggregate::new();
        agg.add(result("a", CmpVerdict::Same, 100));
        agg.add(result("b", CmpVerdict::Diff, 4000));

        let report = Report::build(&config, &agg, Local::now(), RunStatus::Completed);
        assert_eq!(report.task_info[0], item("Task Name", "nightly"));
        assert_eq!(report.summary.overall, ChangeCount { sql: 4, plan: 2 });
        assert_eq!(report.summary.may_degraded, ChangeCount { sql: 2, plan: 1 });

        assert_eq!(report.top_sqls.data.len(), 1);
        assert_eq!(report.top_sqls.data[0][0], "b");
        assert_eq!(report.top_sqls.data[0][2], "2µs");

        assert_eq!(report.details.len(), 2);
        assert!(report.details[0].target.is_none());
        assert_eq!(
            report.details[1].target,
            Some(PlanText {
                text: "IndexReader_6".to_string()
            })
        );

        let json = serde_json::to_string(&report).expect("serialize report");
        assert!(json.contains("\"may_degraded\""));
    }

    #[test]
    fn test_report_separates_errors_and_retries() {
        let config = Config::default();

        let mut failed = result("failed", CmpVerdict::Unknown, 100);
        failed.err_msg = "Table 'test.t' doesn't exist".to_string();
        let pending = result("pending", CmpVerdict::Unknown, 100);

        let mut agg = Aggregate::new();
        agg.add(failed);
        agg.add(pending);

        let report = Report::build(&config, &agg, Local::now(), RunStatus::Completed);
        assert_eq!(report.summary.errors, ChangeCount { sql: 4, plan: 2 });
        assert_eq!(report.summary.error, ChangeCount { sql: 2, plan: 1 });
        assert_eq!(report.summary.retry_pending, ChangeCount { sql: 2, plan: 1 });

        let json: Value = serde_json::to_value(&report).expect("serialize report");
        assert_eq!(json["summary"]["error"]["plan"], 1);
        assert_eq!(json["summary"]["retry_pending"]["plan"], 1);
        assert!(report
            .execution_info
            .contains(&item("Number of Retry Pending", "1")));
    }
}
