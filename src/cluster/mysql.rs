//! 基于 mysql_async 连接池的 MySQL 协议集群客户端
//!
//! 连接池注册了由 `LocalFileRegistry` 支撑的 LOCAL INFILE 处理器，
//! `LOAD STATS` 执行期间服务端只能读取到已登记的文件

use async_trait::async_trait;
use log::{debug, warn};
use mysql_async::prelude::Queryable;
use mysql_async::{Conn, Opts, OptsBuilder, Pool, PoolConstraints, PoolOpts, Row, Value};

use crate::cluster::{LocalFileRegistry, QueryRows, SqlCluster};
use crate::config::ClusterConfig;
use crate::core::error::{ClusterError, ClusterResult};
use crate::sql::escape_identifier;

/// MySQL 协议集群
///
/// 所有语句走文本协议，结果值统一按字符串读取
pub struct MySqlCluster {
    pool: Pool,
    addr: String,
    local_files: LocalFileRegistry,
}

impl MySqlCluster {
    /// 建立连接池，连接数上限为 `config.max_conn`
    pub async fn connect(config: &ClusterConfig) -> ClusterResult<Self> {
        let max_conn = usize::try_from(config.max_conn).unwrap_or(usize::MAX).max(1);
        let constraints = PoolConstraints::new(0, max_conn).ok_or_else(|| {
            ClusterError::Connection(format!("无效的连接数上限: {}", config.max_conn))
        })?;

        let local_files = LocalFileRegistry::new();
        let opts = OptsBuilder::default()
            .ip_or_hostname(config.host.as_str())
            .tcp_port(config.port)
            .user(Some(config.user.as_str()))
            .pass(Some(config.password.as_str()).filter(|p| !p.is_empty()))
            .pool_opts(PoolOpts::default().with_constraints(constraints))
            .local_infile_handler(Some(local_files.handler()));
        let pool = Pool::new(Opts::from(opts));

        // 连接池按需建连，先取一个连接确认集群可达
        if let Err(e) = pool.get_conn().await {
            let _ = pool.disconnect().await;
            return Err(ClusterError::Connection(format!(
                "连接 {} 失败: {}",
                config.addr(),
                e
            )));
        }

        Ok(Self {
            pool,
            addr: config.addr(),
            local_files,
        })
    }

    pub fn addr(&self) -> &str {
        &self.addr
    }

    pub async fn close(&self) {
        if let Err(e) = self.pool.clone().disconnect().await {
            warn!(target: "pcc::cluster", "关闭 {} 的连接池失败: {}", self.addr, e);
        }
    }

    /// 取一个连接，`schema` 不为空时先切换数据库
    async fn conn(&self, schema: Option<&str>) -> ClusterResult<Conn> {
        let mut conn = self.pool.get_conn().await?;
        if let Some(schema) = schema.filter(|s| !s.is_empty()) {
            conn.query_drop(format!("USE {}", escape_identifier(schema)))
                .await?;
        }
        Ok(conn)
    }
}

fn row_values(row: &Row) -> Vec<Option<String>> {
    (0..row.len())
        .map(|i| match row.as_ref(i) {
            None | Some(Value::NULL) => None,
            Some(Value::Bytes(bytes)) => Some(String::from_utf8_lossy(bytes).into_owned()),
            Some(other) => Some(other.as_sql(true)),
        })
        .collect()
}

#[async_trait]
impl SqlCluster for MySqlCluster {
    async fn execute(&self, schema: Option<&str>, sql: &str) -> ClusterResult<()> {
        debug!(target: "pcc::cluster", "[{}] 执行: {}", self.addr, sql);

        let mut conn = self.conn(schema).await?;
        conn.query_drop(sql).await?;
        Ok(())
    }

    async fn query(&self, schema: Option<&str>, sql: &str) -> ClusterResult<QueryRows> {
        debug!(target: "pcc::cluster", "[{}] 查询: {}", self.addr, sql);

        let mut conn = self.conn(schema).await?;
        let rows: Vec<Row> = conn.query(sql).await?;

        let columns = rows
            .first()
            .map(|r| {
                r.columns_ref()
                    .iter()
                    .map(|c| c.name_str().into_owned())
                    .collect()
            })
            .unwrap_or_default();
        let rows = rows.iter().map(row_values).collect();

        Ok(QueryRows::new(columns, rows))
    }

    fn local_files(&self) -> &LocalFileRegistry {
        &self.local_files
    }
}
