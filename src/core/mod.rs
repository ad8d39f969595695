pub mod error;

// 错误和结果类型
pub use error::{
    ClusterError, ClusterResult, PccError, PccResult, PlanError, PlanResult, ResultExt, SyncError,
    SyncResult,
};
