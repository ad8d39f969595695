//! 执行计划模型与解析

pub mod access_object;
pub mod op;
pub mod parser;
pub mod texttree;

pub use access_object::parse_access_object;
pub use op::{AccessObject, PlanNode, TYPE_PROJECTION};
pub use parser::{plan_from_explain, plan_from_rows, plan_from_stmt_summary, ParsedPlan, PlanRow};
