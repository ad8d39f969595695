use std::process::ExitCode;
use std::sync::Arc;

use clap::Parser;
use log::{error, info, warn};
use tokio::signal;
use tokio_util::sync::CancellationToken;

use plan_change_capturer::cluster::{MySqlCluster, SqlCluster};
use plan_change_capturer::config::Config;
use plan_change_capturer::core::{PccError, PccResult};
use plan_change_capturer::pipeline::{prepare_target, Pipeline};
use plan_change_capturer::source::HttpStatsClient;
use plan_change_capturer::utils::logging;

/// 捕获数据库升级后执行计划的变化
#[derive(Parser, Debug)]
#[command(name = "pcc", version, about)]
struct Cli {
    /// TOML 配置文件
    #[arg(short, long)]
    config: Option<String>,

    #[arg(long)]
    work_dir: Option<String>,

    #[arg(long)]
    task_name: Option<String>,

    #[arg(long)]
    old_host: Option<String>,
    #[arg(long)]
    old_port: Option<u16>,
    #[arg(long)]
    old_status_port: Option<u16>,
    #[arg(long)]
    old_user: Option<String>,
    #[arg(long)]
    old_password: Option<String>,
    #[arg(long)]
    old_max_conn: Option<u32>,

    #[arg(long)]
    new_host: Option<String>,
    #[arg(long)]
    new_port: Option<u16>,
    #[arg(long)]
    new_user: Option<String>,
    #[arg(long)]
    new_password: Option<String>,
    #[arg(long)]
    new_max_conn: Option<u32>,

    /// 日志级别，例如 `info` 或 `info,pcc::syncer=debug`
    #[arg(long)]
    log_level: Option<String>,
}

impl Cli {
    fn load_config(&self) -> PccResult<Config> {
        let mut config = match &self.config {
            Some(path) => Config::load(path)?,
            None => Config::default(),
        };

        set(&mut config.work_dir, &self.work_dir);
        set(&mut config.task_name, &self.task_name);
        set(&mut config.old.host, &self.old_host);
        set(&mut config.old.port, &self.old_port);
        set(&mut config.old.status_port, &self.old_status_port);
        set(&mut config.old.user, &self.old_user);
        set(&mut config.old.password, &self.old_password);
        set(&mut config.old.max_conn, &self.old_max_conn);
        set(&mut config.new.host, &self.new_host);
        set(&mut config.new.port, &self.new_port);
        set(&mut config.new.user, &self.new_user);
        set(&mut config.new.password, &self.new_password);
        set(&mut config.new.max_conn, &self.new_max_conn);
        set(&mut config.log.level, &self.log_level);

        config.ensure_defaults();
        config.validate()?;
        Ok(config)
    }
}

fn set<T: Clone>(target: &mut T, value: &Option<T>) {
    if let Some(value) = value {
        *target = value.clone();
    }
}

/// 收到 Ctrl+C 或 SIGTERM 时返回
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            error!("无法监听 Ctrl+C: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sig) => {
                sig.recv().await;
            }
            Err(e) => {
                error!("无法监听 SIGTERM: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }

    warn!("收到退出信号，正在取消运行");
}

async fn run(config: Config) -> PccResult<()> {
    info!(
        "旧版本集群 {}, 新版本集群 {}, 工作目录 {}",
        config.old.addr(),
        config.new.addr(),
        config.work_dir
    );

    let old = Arc::new(MySqlCluster::connect(&config.old).await?);
    let new = match MySqlCluster::connect(&config.new).await {
        Ok(new) => Arc::new(new),
        Err(e) => {
            old.close().await;
            return Err(e.into());
        }
    };

    let result = async {
        prepare_target(&*new).await?;

        let cancel = CancellationToken::new();
        let signal_cancel = cancel.clone();
        tokio::spawn(async move {
            shutdown_signal().await;
            signal_cancel.cancel();
        });

        let stats = Arc::new(HttpStatsClient::new(config.old.status_addr()));
        let source: Arc<dyn SqlCluster> = old.clone();
        let target: Arc<dyn SqlCluster> = new.clone();
        let pipeline = Pipeline::new(config, source, target, stats, cancel);
        let summary = pipeline.run().await?;
        info!(
            "完成: 共 {} 条, 相同 {}, 不同 {}, 错误 {}, 待重试 {}, 报告 {}",
            summary.total,
            summary.same,
            summary.diff,
            summary.errors,
            summary.retries,
            summary.report_path.display()
        );
        Ok::<(), PccError>(())
    }
    .await;

    old.close().await;
    new.close().await;
    result
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    let config = match cli.load_config() {
        Ok(config) => config,
        Err(e) => {
            eprintln!("pcc: {}", e);
            return ExitCode::FAILURE;
        }
    };
    if let Err(e) = logging::init(&config.log) {
        eprintln!("pcc: {}", e);
        return ExitCode::FAILURE;
    }

    let code = match run(config).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!("运行失败: {}", e);
            ExitCode::FAILURE
        }
    };
    logging::shutdown();
    code
}
