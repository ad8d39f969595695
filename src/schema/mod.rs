//! 目标集群上的元数据复制
//!
//! `Syncer` 负责幂等地执行建库、建表、导入统计信息和创建绑定，
//! `SchemaReplicator` 从源集群读取定义并按依赖顺序调用 `Syncer`

pub mod deps;
pub mod once_map;
pub mod syncer;

pub use deps::SchemaReplicator;
pub use once_map::OnceMap;
pub use syncer::Syncer;
