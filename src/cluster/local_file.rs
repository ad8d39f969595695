//! 允许服务端读取的本地文件登记表
//!
//! `LOAD STATS` 会让服务端通过 LOCAL INFILE 协议向客户端索取本地文件，
//! 连接上的处理器只提供登记过的路径。同一路径可以被多个任务同时登记，按引用计数管理

use std::sync::Arc;

use dashmap::DashMap;
use futures::future::{BoxFuture, FutureExt};
use log::{debug, warn};
use mysql_async::prelude::GlobalHandler;
use mysql_async::{InfileData, LocalInfileError};
use tokio_util::io::ReaderStream;

#[derive(Debug, Default, Clone)]
pub struct LocalFileRegistry {
    paths: Arc<DashMap<String, usize>>,
}

impl LocalFileRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// 登记路径，返回的守卫在析构时注销
    pub fn register(&self, path: impl Into<String>) -> LocalFileGuard {
        let path = path.into();
        *self.paths.entry(path.clone()).or_insert(0) += 1;
        LocalFileGuard {
            paths: Arc::clone(&self.paths),
            path,
        }
    }

    pub fn is_registered(&self, path: &str) -> bool {
        self.paths.contains_key(path)
    }

    pub fn len(&self) -> usize {
        self.paths.len()
    }

    pub fn is_empty(&self) -> bool {
        self.paths.is_empty()
    }

    /// 共享本登记表的 LOCAL INFILE 处理器
    pub fn handler(&self) -> LocalFileHandler {
        LocalFileHandler {
            registry: self.clone(),
        }
    }
}

/// 本地文件登记守卫
#[derive(Debug)]
pub struct LocalFileGuard {
    paths: Arc<DashMap<String, usize>>,
    path: String,
}

impl LocalFileGuard {
    pub fn path(&self) -> &str {
        &self.path
    }
}

impl Drop for LocalFileGuard {
    fn drop(&mut self) {
        self.paths.remove_if_mut(&self.path, |_, count| {
            *count -= 1;
            *count == 0
        });
    }
}

/// LOCAL INFILE 请求的处理器，只读取登记表中的文件
#[derive(Debug, Clone)]
pub struct LocalFileHandler {
    registry: LocalFileRegistry,
}

impl GlobalHandler for LocalFileHandler {
    fn handle(&self, file_name: &[u8]) -> BoxFuture<'static, Result<InfileData, LocalInfileError>> {
        let path = String::from_utf8_lossy(file_name).into_owned();
        let registered = self.registry.is_registered(&path);
        async move {
            if !registered {
                warn!(target: "pcc::cluster", "服务端请求未登记的本地文件 {}", path);
                return Err(LocalInfileError::PathIsNotInTheWhiteList(path));
            }
            let file = tokio::fs::File::open(&path)
                .await
                .map_err(LocalInfileError::ReadError)?;
            debug!(target: "pcc::cluster", "向服务端发送本地文件 {}", path);
            Ok(Box::pin(ReaderStream::new(file)) as InfileData)
        }
        .boxed()
    }
}
