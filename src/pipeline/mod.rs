//! 捕获流程的编排
//!
//! ```text
//! reader ──► persist ──► worker × N ──► collector
//!               ▲
//!         binding loader
//! ```
//!
//! 各阶段之间用有界通道连接，共享一个取消令牌；
//! 任一阶段失败会取消其余阶段，并作为整次运行的错误返回

use std::collections::HashMap;
use std::future::Future;
use std::path::PathBuf;
use std::sync::Arc;

use chrono::Local;
use log::{debug, error, info, warn};
use tokio::sync::{mpsc, oneshot, Mutex};
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;

use crate::cluster::SqlCluster;
use crate::compare::PlanCmpResult;
use crate::config::Config;
use crate::core::error::{PccError, PccResult};
use crate::schema::{SchemaReplicator, Syncer};
use crate::source::{read_bindings, read_stmt_summaries, Binding, StatsSource, StmtSummary};
use crate::storage::FileManager;

pub mod aggregate;
pub mod report;
pub mod worker;

pub use aggregate::{top_n_sum_latency_plans, Aggregate, ChangeCount};
pub use report::{Report, RunStatus};
pub use worker::{CmpWorker, Stage};

const DISABLE_AUTO_ANALYZE: &str = "SET @@global.tidb_enable_auto_analyze='OFF'";

/// 关闭目标集群的自动统计，避免导入的统计信息在运行期间被覆盖
pub async fn prepare_target(target: &dyn SqlCluster) -> PccResult<()> {
    target
        .execute(None, DISABLE_AUTO_ANALYZE)
        .await
        .map_err(|e| PccError::from(e).context("关闭目标集群的自动统计失败"))
}

/// 一次运行的结果概要
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunSummary {
    pub total: usize,
    pub same: usize,
    pub diff: usize,
    pub errors: usize,
    pub retries: usize,
    pub report_path: PathBuf,
}

pub struct Pipeline {
    config: Arc<Config>,
    source: Arc<dyn SqlCluster>,
    target: Arc<dyn SqlCluster>,
    stats: Arc<dyn StatsSource>,
    files: FileManager,
    cancel: CancellationToken,
}

impl Pipeline {
    pub fn new(
        config: Config,
        source: Arc<dyn SqlCluster>,
        target: Arc<dyn SqlCluster>,
        stats: Arc<dyn StatsSource>,
        cancel: CancellationToken,
    ) -> Self {
        let files = FileManager::new(&config.work_dir);
        Self {
            config: Arc::new(config),
            source,
            target,
            stats,
            files,
            cancel,
        }
    }

    pub fn files(&self) -> &FileManager {
        &self.files
    }

    /// 运行完整的捕获流程并写出报告
    ///
    /// 运行失败或被取消时仍会写出包含已完成结果的报告，然后返回错误
    pub async fn run(&self) -> PccResult<RunSummary> {
        let started = Local::now();
        let capacity = self.config.pipeline.channel_capacity.max(1);
        info!(
            target: "pcc::pipeline",
            "开始运行 {}, 工作目录 {}",
            self.config.task_name,
            self.files.work_dir().display()
        );

        let (summary_tx, summary_rx) = mpsc::channel::<StmtSummary>(capacity);
        let (persisted_tx, persisted_rx) = mpsc::channel::<StmtSummary>(capacity);
        let (result_tx, result_rx) = mpsc::channel::<PlanCmpResult>(capacity);
        let (bindings_tx, bindings_rx) = oneshot::channel::<HashMap<String, Binding>>();

        let mut stages: JoinSet<PccResult<()>> = JoinSet::new();

        stages.spawn(stage(
            "binding-loader",
            self.cancel.clone(),
            load_bindings(Arc::clone(&self.source), bindings_tx),
        ));

        {
            let source = Arc::clone(&self.source);
            let cancel = self.cancel.clone();
            stages.spawn(stage("reader", self.cancel.clone(), async move {
                let sent = read_stmt_summaries(source.as_ref(), &summary_tx, &cancel).await?;
                info!(target: "pcc::pipeline", "共读取 {} 条待比较的语句摘要", sent);
                Ok(())
            }));
        }

        stages.spawn(stage(
            "persist",
            self.cancel.clone(),
            persist(
                self.files.clone(),
                bindings_rx,
                summary_rx,
                persisted_tx,
                self.cancel.clone(),
            ),
        ));

        let syncer = Arc::new(Syncer::new(Arc::clone(&self.target)));
        let replicator = Arc::new(SchemaReplicator::new(
            Arc::clone(&self.source),
            Arc::clone(&self.stats),
            syncer,
            self.files.clone(),
            self.cancel.clone(),
        ));
        let worker = Arc::new(CmpWorker::new(
            replicator,
            Arc::clone(&self.target),
            self.config.pipeline.strict_alias_resolution,
        ));
        let persisted_rx = Arc::new(Mutex::new(persisted_rx));
        let worker_count = self.config.worker_count();
        info!(target: "pcc::pipeline", "启动 {} 个比较任务", worker_count);
        for _ in 0..worker_count {
            stages.spawn(stage(
                "worker",
                self.cancel.clone(),
                compare_loop(
                    Arc::clone(&worker),
                    self.files.clone(),
                    Arc::clone(&persisted_rx),
                    result_tx.clone(),
                    self.cancel.clone(),
                ),
            ));
        }
        // 所有 worker 退出后结果通道才会关闭
        drop(result_tx);

        let mut aggregate = Aggregate::new();
        let collected = stage(
            "collector",
            self.cancel.clone(),
            collect(&self.files, result_rx, &mut aggregate, self.cancel.clone()),
        )
        .await;

        let mut first_err = collected.err();
        while let Some(joined) = stages.join_next().await {
            let res = joined.map_err(PccError::from).and_then(|r| r);
            if let Err(e) = res {
                first_err = Some(pick_error(first_err, e));
            }
        }

        let status = match &first_err {
            None => RunStatus::Completed,
            Some(e) if e.is_cancelled() => RunStatus::Cancelled,
            Some(_) => RunStatus::Failed,
        };
        let report = Report::build(&self.config, &aggregate, started, status);
        let report_path = self.files.write_report(&report).await?;
        info!(
            target: "pcc::pipeline",
            "运行结束: {}, 共 {} 条, 相同 {}, 不同 {}, 错误 {}, 待重试 {}, 报告 {}",
            status.as_str(),
            aggregate.len(),
            aggregate.same().plan,
            aggregate.diff().plan,
            aggregate.error().plan,
            aggregate.retry().plan,
            report_path.display()
        );

        if let Some(err) = first_err {
            return Err(err);
        }
        Ok(RunSummary {
            total: aggregate.len(),
            same: aggregate.same().plan,
            diff: aggregate.diff().plan,
            errors: aggregate.error().plan,
            retries: aggregate.retry().plan,
            report_path,
        })
    }
}

/// 阶段失败时取消其余阶段
async fn stage<F>(name: &'static str, cancel: CancellationToken, fut: F) -> PccResult<()>
where
    F: Future<Output = PccResult<()>>,
{
    let res = fut.await;
    if let Err(e) = &res {
        if !e.is_cancelled() {
            error!(target: "pcc::pipeline", "{} 阶段失败: {}", name, e);
        }
        cancel.cancel();
    }
    res
}

/// 优先保留真正导致失败的错误，而不是随后的取消
fn pick_error(current: Option<PccError>, new: PccError) -> PccError {
    match current {
        Some(current) if !current.is_cancelled() || new.is_cancelled() => current,
        _ => new,
    }
}

async fn load_bindings(
    source: Arc<dyn SqlCluster>,
    tx: oneshot::Sender<HashMap<String, Binding>>,
) -> PccResult<()> {
    let bindings = match read_bindings(source.as_ref()).await {
        Ok(bindings) => bindings,
        Err(e) => {
            warn!(target: "pcc::pipeline", "读取全局绑定失败，按没有绑定处理: {}", e);
            HashMap::new()
        }
    };
    // persist 阶段提前退出时接收端已关闭，无需处理
    let _ = tx.send(bindings);
    Ok(())
}

/// 等待绑定读取完成后，逐条保存语句摘要并附加对应的绑定
async fn persist(
    files: FileManager,
    bindings_rx: oneshot::Receiver<HashMap<String, Binding>>,
    mut rx: mpsc::Receiver<StmtSummary>,
    tx: mpsc::Sender<StmtSummary>,
    cancel: CancellationToken,
) -> PccResult<()> {
    let bindings = tokio::select! {
        _ = cancel.cancelled() => return Err(PccError::Cancelled),
        res = bindings_rx => res.map_err(|_| PccError::Internal("绑定读取阶段异常退出".to_string()))?,
    };

    loop {
        let mut summary = tokio::select! {
            _ = cancel.cancelled() => return Err(PccError::Cancelled),
            s = rx.recv() => match s {
                Some(s) => s,
                None => return Ok(()),
            },
        };
        summary.binding = bindings.get(&summary.sql_digest).cloned();
        files.write_stmt_summary(&summary).await?;

        tokio::select! {
            _ = cancel.cancelled() => return Err(PccError::Cancelled),
            res = tx.send(summary) => {
                res.map_err(|_| PccError::Internal("比较任务通道已关闭".to_string()))?;
            }
        }
    }
}

/// 之前的运行已经得到最终结果的语句摘要直接复用该结果，不再比较
async fn compare_loop(
    worker: Arc<CmpWorker>,
    files: FileManager,
    rx: Arc<Mutex<mpsc::Receiver<StmtSummary>>>,
    tx: mpsc::Sender<PlanCmpResult>,
    cancel: CancellationToken,
) -> PccResult<()> {
    loop {
        let summary = {
            let mut rx = rx.lock().await;
            tokio::select! {
                _ = cancel.cancelled() => return Err(PccError::Cancelled),
                s = rx.recv() => match s {
                    Some(s) => s,
                    None => return Ok(()),
                },
            }
        };

        let result = match files.read_result(&summary).await {
            Ok(Some(previous)) if !previous.is_retryable() => {
                debug!(
                    target: "pcc::pipeline",
                    "{} 已有比较结果，跳过",
                    summary.id()
                );
                previous
            }
            Ok(_) => worker.compare(summary).await,
            Err(e) => {
                warn!(
                    target: "pcc::pipeline",
                    "读取 {} 之前的比较结果失败，重新比较: {}",
                    summary.id(),
                    e
                );
                worker.compare(summary).await
            }
        };

        tokio::select! {
            _ = cancel.cancelled() => return Err(PccError::Cancelled),
            res = tx.send(result) => {
                res.map_err(|_| PccError::Internal("结果通道已关闭".to_string()))?;
            }
        }
    }
}

/// 汇总结果；可重试的结果不保存，下次运行时会重新比较
async fn collect(
    files: &FileManager,
    mut rx: mpsc::Receiver<PlanCmpResult>,
    aggregate: &mut Aggregate,
    cancel: CancellationToken,
) -> PccResult<()> {
    loop {
        let result = tokio::select! {
            _ = cancel.cancelled() => return Err(PccError::Cancelled),
            r = rx.recv() => match r {
                Some(r) => r,
                None => return Ok(()),
            },
        };
        if !result.is_retryable() {
            files.write_result(&result).await?;
        }
        aggregate.add(result);
    }
}
