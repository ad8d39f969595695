use serde::{Deserialize, Serialize};
use std::env;
use std::fs;
use std::path::Path;
use thiserror::Error;

use crate::core::error::PccError;

/// 未指定工作目录时，在系统临时目录下使用的子目录
pub const DEFAULT_WORK_SUB_DIR: &str = "plan-change-capturer";

const DEFAULT_OLD_PORT: u16 = 4000;
const DEFAULT_NEW_PORT: u16 = 4001;
const DEFAULT_STATUS_PORT: u16 = 10080;
const DEFAULT_OLD_MAX_CONN: u32 = 4;
const DEFAULT_NEW_MAX_CONN: u32 = 128;

/// 配置错误
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ConfigError {
    #[error("读取配置文件 {path} 失败: {message}")]
    Read { path: String, message: String },

    #[error("解析配置文件失败: {0}")]
    Parse(String),

    #[error("序列化配置失败: {0}")]
    Serialize(String),

    #[error("写入配置文件 {path} 失败: {message}")]
    Write { path: String, message: String },

    #[error("配置项 {field} 无效: {reason}")]
    Invalid { field: String, reason: String },
}

impl From<ConfigError> for PccError {
    fn from(err: ConfigError) -> Self {
        PccError::Config(err.to_string())
    }
}

/// 集群连接配置
#[derive(Debug, Deserialize, Serialize, Clone, PartialEq, Eq)]
#[serde(default)]
pub struct ClusterConfig {
    pub host: String,
    /// 0 表示使用该角色的默认端口
    pub port: u16,
    pub user: String,
    pub password: String,
    /// 统计信息 HTTP 接口端口，只有源集群需要
    pub status_port: u16,
    /// 连接池上限，0 表示使用该角色的默认值
    pub max_conn: u32,
}

impl Default for ClusterConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 0,
            user: "root".to_string(),
            password: String::new(),
            status_port: 0,
            max_conn: 0,
        }
    }
}

impl ClusterConfig {
    pub fn addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    pub fn status_addr(&self) -> String {
        format!("{}:{}", self.host, self.status_port)
    }

    fn fill_defaults(&mut self, port: u16, max_conn: u32) {
        if self.port == 0 {
            self.port = port;
        }
        if self.status_port == 0 {
            self.status_port = DEFAULT_STATUS_PORT;
        }
        if self.max_conn == 0 {
            self.max_conn = max_conn;
        }
    }
}

/// 日志配置
#[derive(Debug, Deserialize, Serialize, Clone, PartialEq, Eq)]
#[serde(default)]
pub struct LogConfig {
    /// 日志级别描述，例如 `info` 或 `info,pcc::cluster=debug`
    pub level: String,
    /// 日志目录，为空时输出到标准输出
    pub dir: String,
    pub file: String,
    pub max_file_size: u64,
    pub max_files: usize,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            dir: String::new(),
            file: "pcc".to_string(),
            max_file_size: 100 * 1024 * 1024, // 100MB
            max_files: 5,
        }
    }
}

/// 流水线配置
#[derive(Debug, Deserialize, Serialize, Clone, PartialEq, Eq)]
#[serde(default)]
pub struct PipelineConfig {
    /// 各阶段之间通道的容量
    pub channel_capacity: usize,
    /// 报告中按累计延迟展示的语句数
    pub top_n: usize,
    /// 为 true 时，SQL 无法解析导致的别名归一化失败直接记为错误；
    /// 否则退化为不做归一化的比较
    pub strict_alias_resolution: bool,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            channel_capacity: 64,
            top_n: 500,
            strict_alias_resolution: false,
        }
    }
}

#[derive(Debug, Deserialize, Serialize, Clone, PartialEq, Eq)]
#[serde(default)]
pub struct Config {
    pub task_name: String,
    pub description: String,
    pub work_dir: String,
    /// 源集群（旧版本）
    pub old: ClusterConfig,
    /// 目标集群（新版本）
    pub new: ClusterConfig,
    pub log: LogConfig,
    pub pipeline: PipelineConfig,
}

impl Default for Config {
    fn default() -> Self {
        let mut config = Self {
            task_name: String::new(),
            description: String::new(),
            work_dir: String::new(),
            old: ClusterConfig::default(),
            new: ClusterConfig::default(),
            log: LogConfig::default(),
            pipeline: PipelineConfig::default(),
        };
        config.ensure_defaults();
        config
    }
}

impl Config {
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let content = fs::read_to_string(path).map_err(|e| ConfigError::Read {
            path: path.display().to_string(),
            message: e.to_string(),
        })?;
        let mut config: Config =
            toml::from_str(&content).map_err(|e| ConfigError::Parse(e.to_string()))?;
        config.ensure_defaults();
        Ok(config)
    }

    pub fn save<P: AsRef<Path>>(&self, path: P) -> Result<(), ConfigError> {
        let path = path.as_ref();
        let content =
            toml::to_string_pretty(self).map_err(|e| ConfigError::Serialize(e.to_string()))?;
        fs::write(path, content).map_err(|e| ConfigError::Write {
            path: path.display().to_string(),
            message: e.to_string(),
        })
    }

    /// 填充未设置的配置项
    pub fn ensure_defaults(&mut self) {
        if self.work_dir.is_empty() {
            self.work_dir = env::temp_dir()
                .join(DEFAULT_WORK_SUB_DIR)
                .to_string_lossy()
                .into_owned();
        }
        self.old.fill_defaults(DEFAULT_OLD_PORT, DEFAULT_OLD_MAX_CONN);
        self.new.fill_defaults(DEFAULT_NEW_PORT, DEFAULT_NEW_MAX_CONN);
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        let invalid = |field: &str, reason: &str| ConfigError::Invalid {
            field: field.to_string(),
            reason: reason.to_string(),
        };

        for (role, cluster) in [("old", &self.old), ("new", &self.new)] {
            if cluster.host.is_empty() {
                return Err(invalid(&format!("{}.host", role), "不能为空"));
            }
            if cluster.port == 0 {
                return Err(invalid(&format!("{}.port", role), "不能为 0"));
            }
            if cluster.max_conn == 0 {
                return Err(invalid(&format!("{}.max_conn", role), "不能为 0"));
            }
        }
        if self.old.status_port == 0 {
            return Err(invalid("old.status_port", "不能为 0"));
        }
        if self.work_dir.is_empty() {
            return Err(invalid("work_dir", "不能为空"));
        }
        if self.pipeline.channel_capacity == 0 {
            return Err(invalid("pipeline.channel_capacity", "不能为 0"));
        }
        if self.log.level.trim().is_empty() {
            return Err(invalid("log.level", "不能为空"));
        }
        Ok(())
    }

    /// 工作线程数：两个连接池上限和可用 CPU 数中的最大值
    pub fn worker_count(&self) -> usize {
        (self.old.max_conn as usize)
            .max(self.new.max_conn as usize)
            .max(num_cpus::get())
    }
}
