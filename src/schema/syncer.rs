//! 目标集群上的幂等元数据同步
//!
//! 每个数据库、表和统计信息文件在一次运行中最多执行一次，
//! 同一个键的所有调用方都会得到相同的结果（包括失败）

use std::path::Path;
use std::sync::Arc;

use log::{debug, info, warn};

use crate::cluster::helpers::quote_string;
use crate::cluster::{read_create_database, read_create_object, SqlCluster};
use crate::core::error::{ClusterError, SyncError, SyncResult};
use crate::schema::once_map::OnceMap;
use crate::source::Binding;
use crate::sql::escape_identifier;

/// 统计信息文件中表示没有统计信息的内容
const NULL_STATS: &str = "null";

pub struct Syncer {
    target: Arc<dyn SqlCluster>,
    databases: OnceMap<SyncResult<()>>,
    tables: OnceMap<SyncResult<()>>,
    stats: OnceMap<SyncResult<()>>,
    bindings: OnceMap<SyncResult<()>>,
}

impl Syncer {
    pub fn new(target: Arc<dyn SqlCluster>) -> Self {
        Self {
            target,
            databases: OnceMap::new(),
            tables: OnceMap::new(),
            stats: OnceMap::new(),
            bindings: OnceMap::new(),
        }
    }

    pub fn target(&self) -> &Arc<dyn SqlCluster> {
        &self.target
    }

    /// 在目标集群上创建数据库
    ///
    /// 创建失败时重新读取目标端的建库语句，与 `ddl` 完全相同视为成功。
    /// 库名不区分大小写
    pub async fn create_database(&self, name: &str, ddl: &str) -> SyncResult<()> {
        self.databases
            .get_or_init(&name.to_lowercase(), || async move {
                let err = match self.target.execute(None, ddl).await {
                    Ok(()) => {
                        info!(target: "pcc::syncer", "已创建数据库 {}", name);
                        return Ok(());
                    }
                    Err(e) => e,
                };

                let existing = read_create_database(self.target.as_ref(), name)
                    .await
                    .map_err(|cause| SyncError::Cluster {
                        context: format!("创建数据库 {} 失败后读取建库语句", name),
                        cause,
                    })?;
                check_same_definition(ddl, &existing, err)?;
                debug!(target: "pcc::syncer", "数据库 {} 已存在且定义相同", name);
                Ok(())
            })
            .await
    }

    /// 在目标集群的 `db` 下创建表、视图或序列
    pub async fn create_table(&self, db: &str, table: &str, ddl: &str) -> SyncResult<()> {
        let key = format!(
            "{}.{}",
            escape_identifier(&db.to_lowercase()),
            escape_identifier(&table.to_lowercase())
        );
        self.tables
            .get_or_init(&key, || async move {
                let err = match self.target.execute(Some(db), ddl).await {
                    Ok(()) => {
                        info!(target: "pcc::syncer", "已创建 {}.{}", db, table);
                        return Ok(());
                    }
                    Err(e) => e,
                };

                let existing = read_create_object(self.target.as_ref(), db, table)
                    .await
                    .map_err(|cause| SyncError::Cluster {
                        context: format!("创建 {}.{} 失败后读取定义", db, table),
                        cause,
                    })?;
                check_same_definition(ddl, &existing.ddl, err)?;
                debug!(target: "pcc::syncer", "{}.{} 已存在且定义相同", db, table);
                Ok(())
            })
            .await
    }

    /// 把统计信息文件导入目标集群
    ///
    /// 文件内容为 `null` 时什么也不做；导入期间路径登记为允许读取的本地文件
    pub async fn load_stats(&self, path: &Path) -> SyncResult<()> {
        let path = path.to_string_lossy().into_owned();
        self.stats
            .get_or_init(&path, || async {
                let content =
                    tokio::fs::read(&path)
                        .await
                        .map_err(|e| SyncError::StatsFile {
                            path: path.clone(),
                            message: e.to_string(),
                        })?;
                if content.trim_ascii() == NULL_STATS.as_bytes() {
                    debug!(target: "pcc::syncer", "{} 没有统计信息，跳过导入", path);
                    return Ok(());
                }

                let _guard = self.target.local_files().register(path.clone());
                let sql = format!("LOAD STATS {}", quote_string(&path));
                self.target
                    .execute(None, &sql)
                    .await
                    .map_err(|cause| SyncError::LoadStats {
                        path: path.clone(),
                        cause,
                    })?;
                info!(target: "pcc::syncer", "已导入统计信息 {}", path);
                Ok(())
            })
            .await
    }

    /// 在目标集群上重建全局绑定
    pub async fn create_binding(&self, binding: &Binding) -> SyncResult<()> {
        self.bindings
            .get_or_init(&binding.sql_digest, || async {
                let schema = Some(binding.default_db.as_str()).filter(|db| !db.is_empty());
                self.target
                    .execute(schema, &binding.create_statement())
                    .await
                    .map_err(|cause| SyncError::Cluster {
                        context: format!("创建绑定 {} 失败", binding.sql_digest),
                        cause,
                    })?;
                info!(target: "pcc::syncer", "已创建绑定 {}", binding.sql_digest);
                Ok(())
            })
            .await
    }

    /// 已尝试同步的数据库数量
    pub fn database_count(&self) -> usize {
        self.databases.len()
    }

    pub fn table_count(&self) -> usize {
        self.tables.len()
    }
}

/// 创建失败时，目标端已有定义与待执行的语句完全相同才视为成功
fn check_same_definition(ddl: &str, existing: &str, cause: ClusterError) -> SyncResult<()> {
    if existing == ddl {
        return Ok(());
    }
    warn!(
        target: "pcc::syncer",
        "目标端定义不同: 期望 {}, 实际 {}",
        ddl, existing
    );
    Err(SyncError::IdempotencyMismatch {
        ddl: ddl.to_string(),
        cause,
    })
}
