//! 执行计划解析错误类型
//!
//! 涵盖 EXPLAIN 结果、语句摘要中的计划文本以及访问对象的解析错误

use thiserror::Error;

/// 执行计划解析结果类型
pub type PlanResult<T> = Result<T, PlanError>;

/// 执行计划解析错误
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum PlanError {
    #[error("输入为空")]
    EmptyInput,

    #[error("`id` 列为空")]
    EmptyId,

    #[error("缩进长度应为 2 的倍数: {0}")]
    OddIndent(String),

    #[error("缩进层级 ({level}) 大于栈深度 ({depth}): {id}")]
    LevelOvershoot { level: usize, depth: usize, id: String },

    #[error("存在多个根节点: {0}")]
    MultipleRoots(String),

    #[error("无效的算子名: {0}")]
    InvalidOperator(String),

    #[error("访问对象中的括号不匹配: {0}")]
    UnmatchedParenthesis(String),

    #[error("无效的执行计划文本: {0}")]
    InvalidPlanText(String),

    #[error("表头中找不到列 `{column}`: {header}")]
    MissingColumn { column: String, header: String },

    #[error("第 {line} 行列数不匹配\n表头: {header}\n该行: {row}")]
    ColumnCountMismatch {
        line: usize,
        header: String,
        row: String,
    },
}
