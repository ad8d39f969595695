//! 集群访问错误类型
//!
//! 涵盖 MySQL 协议访问和统计信息 HTTP 接口的错误

use mysql_async::LocalInfileError;
use thiserror::Error;

/// 集群访问结果类型
pub type ClusterResult<T> = Result<T, ClusterError>;

/// 集群访问错误
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ClusterError {
    #[error("连接错误: {0}")]
    Connection(String),

    #[error("SQL 执行失败 (错误码 {code}): {message}")]
    Sql { code: u16, message: String },

    #[error("驱动错误: {0}")]
    Driver(String),

    #[error("结果集不符合预期: {0}")]
    UnexpectedResult(String),

    #[error("HTTP 请求失败: {0}")]
    Http(String),

    #[error("本地文件未注册，拒绝读取: {0}")]
    LocalFileNotRegistered(String),
}

impl ClusterError {
    /// MySQL 错误码，非 SQL 错误返回 `None`
    pub fn code(&self) -> Option<u16> {
        match self {
            ClusterError::Sql { code, .. } => Some(*code),
            _ => None,
        }
    }
}

impl From<mysql_async::Error> for ClusterError {
    fn from(err: mysql_async::Error) -> Self {
        match err {
            mysql_async::Error::Server(e) => ClusterError::Sql {
                code: e.code,
                message: e.message,
            },
            mysql_async::Error::Io(e) => ClusterError::Connection(e.to_string()),
            other => ClusterError::Driver(other.to_string()),
        }
    }
}

impl From<LocalInfileError> for ClusterError {
    fn from(err: LocalInfileError) -> Self {
        match err {
            LocalInfileError::PathIsNotInTheWhiteList(path) => {
                ClusterError::LocalFileNotRegistered(path)
            }
            other => ClusterError::Driver(other.to_string()),
        }
    }
}

impl From<reqwest::Error> for ClusterError {
    fn from(err: reqwest::Error) -> Self {
        ClusterError::Http(err.to_string())
    }
}
