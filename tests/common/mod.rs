//! 集成测试共享工具模块
//!
//! 提供脚本化的集群和统计信息来源，供所有集成测试使用

#![allow(dead_code)]

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{LazyLock, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use futures::TryStreamExt;
use mysql_async::prelude::GlobalHandler;
use regex::Regex;

use plan_change_capturer::cluster::{LocalFileRegistry, QueryRows, SqlCluster};
use plan_change_capturer::core::{ClusterError, ClusterResult};
use plan_change_capturer::source::StatsSource;

static LOAD_STATS_PATH_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)^\s*LOAD\s+STATS\s+'(.*)'\s*$").expect("正则无效"));

/// 处理一条语句：参数为会话库名和语句
pub type Handler = Box<dyn Fn(Option<&str>, &str) -> ClusterResult<QueryRows> + Send + Sync>;

/// 执行过的一条语句
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Executed {
    pub schema: Option<String>,
    pub sql: String,
}

/// 按脚本应答的集群
///
/// `execute` 和 `query` 都交给同一个处理函数；`LOAD STATS` 像服务端一样
/// 通过 LOCAL INFILE 处理器读取文件，未登记的文件会被拒绝
pub struct MockCluster {
    handler: Handler,
    delay: Duration,
    executed: Mutex<Vec<Executed>>,
    queried: Mutex<Vec<Executed>>,
    loaded: Mutex<Vec<(String, Vec<u8>)>>,
    local_files: LocalFileRegistry,
}

impl MockCluster {
    pub fn new<F>(handler: F) -> Self
    where
        F: Fn(Option<&str>, &str) -> ClusterResult<QueryRows> + Send + Sync + 'static,
    {
        Self {
            handler: Box::new(handler),
            delay: Duration::ZERO,
            executed: Mutex::new(Vec::new()),
            queried: Mutex::new(Vec::new()),
            loaded: Mutex::new(Vec::new()),
            local_files: LocalFileRegistry::new(),
        }
    }

    /// 每条语句执行前等待，放大并发窗口
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    pub fn executed(&self) -> Vec<Executed> {
        self.executed.lock().expect("lock poisoned").clone()
    }

    pub fn queried(&self) -> Vec<Executed> {
        self.queried.lock().expect("lock poisoned").clone()
    }

    /// 以 `prefix` 开头（不区分大小写）的已执行语句数量
    pub fn exec_count(&self, prefix: &str) -> usize {
        count_prefix(&self.executed(), prefix)
    }

    pub fn query_count(&self, prefix: &str) -> usize {
        count_prefix(&self.queried(), prefix)
    }

    /// 通过 `LOAD STATS` 读取到的文件路径和内容
    pub fn loaded(&self) -> Vec<(String, Vec<u8>)> {
        self.loaded.lock().expect("lock poisoned").clone()
    }

    async fn serve_local_file(&self, sql: &str) -> ClusterResult<()> {
        let Some(path) = LOAD_STATS_PATH_RE
            .captures(sql)
            .map(|caps| caps[1].replace("''", "'").replace("\\\\", "\\"))
        else {
            return Ok(());
        };
        let mut data = self
            .local_files
            .handler()
            .handle(path.as_bytes())
            .await
            .map_err(ClusterError::from)?;
        let mut content = Vec::new();
        while let Some(chunk) = data
            .try_next()
            .await
            .map_err(|e| ClusterError::Driver(e.to_string()))?
        {
            content.extend_from_slice(&chunk);
        }
        self.loaded.lock().expect("lock poisoned").push((path, content));
        Ok(())
    }
}

fn count_prefix(list: &[Executed], prefix: &str) -> usize {
    let prefix = prefix.to_ascii_uppercase();
    list.iter()
        .filter(|e| e.sql.to_ascii_uppercase().starts_with(&prefix))
        .count()
}

#[async_trait]
impl SqlCluster for MockCluster {
    async fn execute(&self, schema: Option<&str>, sql: &str) -> ClusterResult<()> {
        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }
        self.executed.lock().expect("lock poisoned").push(Executed {
            schema: schema.map(str::to_string),
            sql: sql.to_string(),
        });
        self.serve_local_file(sql).await?;
        (self.handler)(schema, sql).map(|_| ())
    }

    async fn query(&self, schema: Option<&str>, sql: &str) -> ClusterResult<QueryRows> {
        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }
        self.queried.lock().expect("lock poisoned").push(Executed {
            schema: schema.map(str::to_string),
            sql: sql.to_string(),
        });
        (self.handler)(schema, sql)
    }

    fn local_files(&self) -> &LocalFileRegistry {
        &self.local_files
    }
}

/// 构造结果集
pub fn rows(columns: &[&str], data: &[&[&str]]) -> QueryRows {
    QueryRows::new(
        columns.iter().map(|c| c.to_string()).collect(),
        data.iter()
            .map(|row| row.iter().map(|v| Some(v.to_string())).collect())
            .collect(),
    )
}

pub fn sql_error(code: u16, message: &str) -> ClusterError {
    ClusterError::Sql {
        code,
        message: message.to_string(),
    }
}

/// 按 `db.table` 返回预设统计信息的来源，未设置的表返回 `null`
#[derive(Default)]
pub struct MockStats {
    stats: HashMap<String, String>,
    calls: AtomicUsize,
}

impl MockStats {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_stats(mut self, db: &str, table: &str, json: &str) -> Self {
        self.stats.insert(format!("{}.{}", db, table), json.to_string());
        self
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl StatsSource for MockStats {
    async fn dump(&self, db: &str, table: &str) -> ClusterResult<String> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Ok(self
            .stats
            .get(&format!("{}.{}", db, table))
            .cloned()
            .unwrap_or_else(|| "null".to_string()))
    }
}
