//! 按键只执行一次的异步任务表
//!
//! 同一个键的所有调用方共享同一个 `OnceCell`，第一个调用方执行初始化，
//! 其余调用方等待并读取相同的结果；不同的键之间互不阻塞

use std::future::Future;
use std::sync::Arc;

use dashmap::DashMap;
use tokio::sync::OnceCell;

#[derive(Debug)]
pub struct OnceMap<V> {
    cells: DashMap<String, Arc<OnceCell<V>>>,
}

impl<V> Default for OnceMap<V> {
    fn default() -> Self {
        Self {
            cells: DashMap::new(),
        }
    }
}

impl<V: Clone> OnceMap<V> {
    pub fn new() -> Self {
        Self::default()
    }

    /// 返回键对应的结果，键第一次出现时执行 `init`
    pub async fn get_or_init<F, Fut>(&self, key: &str, init: F) -> V
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = V>,
    {
        // 先取出 Arc 再等待，避免持有分片锁跨越 await
        let cell = Arc::clone(
            self.cells
                .entry(key.to_string())
                .or_insert_with(|| Arc::new(OnceCell::new()))
                .value(),
        );
        cell.get_or_init(init).await.clone()
    }

    /// 已完成的结果
    pub fn get(&self, key: &str) -> Option<V> {
        self.cells.get(key).and_then(|cell| cell.get().cloned())
    }

    pub fn len(&self) -> usize {
        self.cells.len()
    }

    pub fn is_empty(&self) -> bool {
        self.cells.is_empty()
    }
}
