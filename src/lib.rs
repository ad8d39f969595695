//! Plan Change Capturer
//!
//! 从旧版本集群读取语句摘要和执行计划，把所需的库表结构与统计信息复制到
//! 新版本集群，重新生成执行计划并与旧计划做结构比较，找出升级后可能退化的语句。

pub mod cluster;
pub mod compare;
pub mod config;
pub mod core;
pub mod pipeline;
pub mod plan;
pub mod schema;
pub mod source;
pub mod sql;
pub mod storage;
pub mod utils;
