//! 元数据同步错误类型

use thiserror::Error;

use crate::core::error::cluster::ClusterError;

/// 同步结果类型
pub type SyncResult<T> = Result<T, SyncError>;

/// 同步错误
///
/// 同步结果会被缓存并分发给同一个键的所有调用方，因此必须可克隆
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SyncError {
    #[error("创建失败且目标端已有的定义与之不同, sql: {ddl}, 原因: {cause}")]
    IdempotencyMismatch { ddl: String, cause: ClusterError },

    #[error("{context}: {cause}")]
    Cluster { context: String, cause: ClusterError },

    #[error("读取统计信息文件 {path} 失败: {message}")]
    StatsFile { path: String, message: String },

    #[error("从 {path} 导入统计信息失败: {cause}")]
    LoadStats { path: String, cause: ClusterError },
}

impl SyncError {
    /// 只有定义冲突不可重试，目标端已经存在不同的对象，重试不会改变结果
    pub fn is_unretryable(&self) -> bool {
        matches!(self, SyncError::IdempotencyMismatch { .. })
    }
}
