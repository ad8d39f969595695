//! 比较结果

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::source::StmtSummary;

/// 计划比较结论
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum CmpVerdict {
    #[serde(rename = "same")]
    Same,
    #[serde(rename = "different")]
    Diff,
    #[serde(rename = "unknown")]
    Unknown,
}

impl CmpVerdict {
    pub fn as_str(&self) -> &'static str {
        match self {
            CmpVerdict::Same => "same",
            CmpVerdict::Diff => "different",
            CmpVerdict::Unknown => "unknown",
        }
    }
}

impl fmt::Display for CmpVerdict {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// 一条语句摘要的比较结果，标识与语句摘要相同
///
/// `result` 为 `Unknown` 时，`err_msg` 为空表示可以在下次运行时重试，
/// 非空表示不可重试的错误
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlanCmpResult {
    pub result: CmpVerdict,
    pub err_msg: String,
    pub old_version_info: StmtSummary,
    pub old_plan: String,
    pub new_diff_plan: String,
}

impl PlanCmpResult {
    pub fn new(summary: StmtSummary) -> Self {
        Self {
            result: CmpVerdict::Unknown,
            err_msg: String::new(),
            old_version_info: summary,
            old_plan: String::new(),
            new_diff_plan: String::new(),
        }
    }

    pub fn is_retryable(&self) -> bool {
        self.result == CmpVerdict::Unknown && self.err_msg.is_empty()
    }

    pub fn is_error(&self) -> bool {
        self.result == CmpVerdict::Unknown && !self.err_msg.is_empty()
    }
}
