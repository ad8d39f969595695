//! 统一错误处理系统
//!
//! ## 设计理念
//!
//! 1. **按来源分层**：执行计划解析、集群访问、元数据同步各有独立的错误枚举，
//!    通过 `#[from]` 汇聚到 `PccError`
//! 2. **可克隆**：错误需要被同步器缓存并分发给所有等待者，所以全部携带字符串负载
//! 3. **重试分类**：`PccError::is_unretryable` 决定一条比较结果是"错误"还是"待重试"

use thiserror::Error;

pub mod cluster;
pub mod codes;
pub mod plan;
pub mod sync;

pub use cluster::{ClusterError, ClusterResult};
pub use codes::{is_unretryable_source_code, ER_BAD_DB_ERROR, ER_NO_SUCH_TABLE, ER_PARSE_ERROR};
pub use plan::{PlanError, PlanResult};
pub use sync::{SyncError, SyncResult};

/// 统一的错误类型
#[derive(Error, Debug, Clone)]
pub enum PccError {
    #[error("执行计划解析错误: {0}")]
    Plan(#[from] PlanError),

    #[error("执行计划比较错误: {0}")]
    Compare(String),

    #[error("SQL 解析错误: {0}")]
    SqlParse(String),

    #[error("集群访问错误: {0}")]
    Cluster(#[from] ClusterError),

    #[error("同步错误: {0}")]
    Sync(#[from] SyncError),

    #[error("表依赖存在环: {0}")]
    CyclicDependency(String),

    #[error("配置错误: {0}")]
    Config(String),

    #[error("IO错误: {0}")]
    Io(String),

    #[error("序列化错误: {0}")]
    Serialization(String),

    #[error("任务已取消")]
    Cancelled,

    #[error("内部错误: {0}")]
    Internal(String),

    #[error("{context}: {source}")]
    Context {
        context: String,
        #[source]
        source: Box<PccError>,
    },

    /// 标记为不可重试的错误，重新运行也不会得到不同的结果
    #[error("{0}")]
    Unretryable(Box<PccError>),
}

/// 统一的结果类型
pub type PccResult<T> = Result<T, PccError>;

impl PccError {
    /// 包装为不可重试错误
    pub fn unretryable(self) -> Self {
        match self {
            PccError::Unretryable(_) => self,
            other => PccError::Unretryable(Box::new(other)),
        }
    }

    /// 附加上下文描述
    pub fn context(self, context: impl Into<String>) -> Self {
        PccError::Context {
            context: context.into(),
            source: Box::new(self),
        }
    }

    /// 判断错误是否不可重试
    ///
    /// 解析类错误、比较错误、幂等性冲突和显式标记的错误都不可重试；
    /// 其余来自网络或数据库的错误默认可重试，由下一次运行再尝试。
    pub fn is_unretryable(&self) -> bool {
        match self {
            PccError::Plan(_)
            | PccError::Compare(_)
            | PccError::SqlParse(_)
            | PccError::CyclicDependency(_)
            | PccError::Unretryable(_) => true,
            PccError::Sync(e) => e.is_unretryable(),
            PccError::Context { source, .. } => source.is_unretryable(),
            PccError::Cluster(_)
            | PccError::Config(_)
            | PccError::Io(_)
            | PccError::Serialization(_)
            | PccError::Cancelled
            | PccError::Internal(_) => false,
        }
    }

    /// 判断错误链中是否包含取消
    pub fn is_cancelled(&self) -> bool {
        match self {
            PccError::Cancelled => true,
            PccError::Context { source, .. } => source.is_cancelled(),
            PccError::Unretryable(inner) => inner.is_cancelled(),
            _ => false,
        }
    }

    /// 把源集群的 SQL 错误按错误码分类，命中拒绝列表的标记为不可重试
    pub fn from_source_cluster(err: ClusterError) -> Self {
        let unretryable = err.code().is_some_and(is_unretryable_source_code);
        let err = PccError::Cluster(err);
        if unretryable {
            err.unretryable()
        } else {
            err
        }
    }
}

/// 为 `Result` 附加上下文的扩展方法
pub trait ResultExt<T> {
    fn context(self, context: impl Into<String>) -> PccResult<T>;

    fn with_context<F, C>(self, f: F) -> PccResult<T>
    where
        F: FnOnce() -> C,
        C: Into<String>;
}

impl<T, E> ResultExt<T> for Result<T, E>
where
    E: Into<PccError>,
{
    fn context(self, context: impl Into<String>) -> PccResult<T> {
        self.map_err(|e| e.into().context(context))
    }

    fn with_context<F, C>(self, f: F) -> PccResult<T>
    where
        F: FnOnce() -> C,
        C: Into<String>,
    {
        self.map_err(|e| e.into().context(f()))
    }
}

// ==================== 外部错误转换实现 ====================

impl From<std::io::Error> for PccError {
    fn from(err: std::io::Error) -> Self {
        PccError::Io(err.to_string())
    }
}

impl From<serde_json::Error> for PccError {
    fn from(err: serde_json::Error) -> Self {
        PccError::Serialization(err.to_string())
    }
}

impl From<toml::de::Error> for PccError {
    fn from(err: toml::de::Error) -> Self {
        PccError::Config(err.to_string())
    }
}

impl From<toml::ser::Error> for PccError {
    fn from(err: toml::ser::Error) -> Self {
        PccError::Config(err.to_string())
    }
}

impl From<sqlparser::parser::ParserError> for PccError {
    fn from(err: sqlparser::parser::ParserError) -> Self {
        PccError::SqlParse(err.to_string())
    }
}

impl From<tokio::task::JoinError> for PccError {
    fn from(err: tokio::task::JoinError) -> Self {
        PccError::Internal(err.to_string())
    }
}
