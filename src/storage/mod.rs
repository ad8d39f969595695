//! 工作目录中的持久化文件

pub mod file_manager;

pub use file_manager::FileManager;
