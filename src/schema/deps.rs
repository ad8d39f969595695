//! 按依赖顺序把表结构和统计信息从源集群复制到目标集群
//!
//! 表、视图的定义可能引用其他对象（`LIKE`、`AS SELECT`、视图查询体、序列函数），
//! 被引用的对象先于引用方创建，深度优先

use std::sync::Arc;

use futures::future::{BoxFuture, FutureExt};
use log::debug;
use tokio_util::sync::CancellationToken;

use crate::cluster::{read_create_database, read_create_object, ObjectKind, SqlCluster};
use crate::core::error::{PccError, PccResult, ResultExt};
use crate::schema::syncer::Syncer;
use crate::source::{Binding, StatsSource};
use crate::sql::{extract_ddl_dependencies, is_mem_or_sys_db, TableName};
use crate::storage::FileManager;

pub struct SchemaReplicator {
    source: Arc<dyn SqlCluster>,
    stats: Arc<dyn StatsSource>,
    syncer: Arc<Syncer>,
    files: FileManager,
    cancel: CancellationToken,
}

impl SchemaReplicator {
    pub fn new(
        source: Arc<dyn SqlCluster>,
        stats: Arc<dyn StatsSource>,
        syncer: Arc<Syncer>,
        files: FileManager,
        cancel: CancellationToken,
    ) -> Self {
        Self {
            source,
            stats,
            syncer,
            files,
            cancel,
        }
    }

    pub fn syncer(&self) -> &Arc<Syncer> {
        &self.syncer
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancel.is_cancelled()
    }

    fn check_cancelled(&self) -> PccResult<()> {
        if self.is_cancelled() {
            return Err(PccError::Cancelled);
        }
        Ok(())
    }

    /// 读取源集群的建库语句，保存后在目标集群上创建
    ///
    /// 空库名和系统库直接跳过；库名按小写处理，与表名中的库名一致
    pub async fn sync_database(&self, db: &str) -> PccResult<()> {
        if db.is_empty() || is_mem_or_sys_db(db) {
            return Ok(());
        }
        let db = db.to_lowercase();
        let ddl = self.read_database_ddl(&db).await?;
        self.syncer.create_database(&db, &ddl).await?;
        Ok(())
    }

    async fn read_database_ddl(&self, db: &str) -> PccResult<String> {
        self.check_cancelled()?;
        let ddl = read_create_database(self.source.as_ref(), db)
            .await
            .map_err(PccError::from_source_cluster)
            .with_context(|| format!("读取数据库 {} 的定义失败", db))?;
        self.files.write_database_structure(db, &ddl).await?;
        Ok(ddl)
    }

    /// 依次同步语句引用的所有表
    pub async fn sync_tables(&self, tables: &[TableName]) -> PccResult<()> {
        for table in tables {
            let mut chain = Vec::new();
            self.sync_table(table, &mut chain).await?;
        }
        Ok(())
    }

    /// 同步一个表、视图或序列及其依赖
    ///
    /// `chain` 是当前正在解析的依赖链，依赖出现在链上时报告循环依赖
    pub fn sync_table<'a>(
        &'a self,
        table: &'a TableName,
        chain: &'a mut Vec<TableName>,
    ) -> BoxFuture<'a, PccResult<()>> {
        async move {
            if is_mem_or_sys_db(&table.db) {
                return Ok(());
            }
            if chain.contains(table) {
                let path: Vec<String> = chain
                    .iter()
                    .chain(std::iter::once(table))
                    .map(ToString::to_string)
                    .collect();
                return Err(PccError::CyclicDependency(path.join(" -> ")));
            }

            let db_ddl = self.read_database_ddl(&table.db).await?;

            self.check_cancelled()?;
            let object = read_create_object(self.source.as_ref(), &table.db, &table.table)
                .await
                .map_err(PccError::from_source_cluster)
                .with_context(|| format!("读取 {} 的定义失败", table))?;
            self.files
                .write_table_structure(&table.db, &table.table, &object.ddl)
                .await?;

            if object.kind != ObjectKind::Sequence {
                let deps = extract_ddl_dependencies(&object.ddl, table);
                if !deps.is_empty() {
                    debug!(target: "pcc::schema", "{} 依赖 {:?}", table, deps);
                }
                chain.push(table.clone());
                for dep in &deps {
                    self.sync_table(dep, chain).await?;
                }
                chain.pop();
            }

            let stats_path = if object.kind == ObjectKind::Table {
                self.check_cancelled()?;
                let stats = self
                    .stats
                    .dump(&table.db, &table.table)
                    .await
                    .with_context(|| format!("获取 {} 的统计信息失败", table))?;
                Some(
                    self.files
                        .write_table_stats(&table.db, &table.table, &stats)
                        .await?,
                )
            } else {
                None
            };

            self.syncer.create_database(&table.db, &db_ddl).await?;
            self.syncer
                .create_table(&table.db, &table.table, &object.ddl)
                .await?;
            if let Some(path) = stats_path {
                self.syncer.load_stats(&path).await?;
            }
            Ok(())
        }
        .boxed()
    }

    /// 在目标集群上重建语句的绑定
    pub async fn sync_binding(&self, binding: &Binding) -> PccResult<()> {
        self.check_cancelled()?;
        self.syncer
            .create_binding(binding)
            .await
            .context("同步绑定失败")
    }
}
