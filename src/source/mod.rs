//! 源集群上的工作负载信息：语句摘要、全局绑定和统计信息

pub mod binding;
pub mod stats;
pub mod stmt_summary;

pub use binding::{read_bindings, Binding};
pub use stats::{HttpStatsClient, StatsSource};
pub use stmt_summary::{fill_from_sql_recorded, read_stmt_summaries, StmtSummary};
