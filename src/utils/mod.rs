// 工具模块 - 仅用于导出各个子模块，不包含具体实现

// 文件系统工具模块
pub mod fs;
pub use fs::{atomic_write, escape_path};

// 日志模块
pub mod logging;
