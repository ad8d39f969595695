//! 基于哈希表的并查集，查找时做路径压缩，不按秩合并

use std::collections::HashMap;

#[derive(Debug, Default, Clone)]
pub struct UnionFind {
    parent: HashMap<String, String>,
}

impl UnionFind {
    pub fn new() -> Self {
        Self::default()
    }

    /// 查找根节点，首次出现的元素自成一个集合
    pub fn find(&mut self, x: &str) -> String {
        let parent = match self.parent.get(x) {
            Some(parent) => parent.clone(),
            None => {
                self.parent.insert(x.to_string(), x.to_string());
                return x.to_string();
            }
        };
        if parent == x {
            return parent;
        }

        let root = self.find(&parent);
        self.parent.insert(x.to_string(), root.clone());
        root
    }

    /// 合并两个集合，`x` 所在集合的根成为新的根
    pub fn union(&mut self, x: &str, y: &str) {
        let root_x = self.find(x);
        let root_y = self.find(y);
        if root_x != root_y {
            self.parent.insert(root_y, root_x);
        }
    }

    pub fn equivalent(&mut self, x: &str, y: &str) -> bool {
        self.find(x) == self.find(y)
    }

    /// 只读地查找代表元，未出现过的元素返回自身
    pub fn representative<'a>(&'a self, x: &'a str) -> &'a str {
        let mut current = x;
        while let Some(parent) = self.parent.get(current) {
            if parent == current {
                break;
            }
            current = parent.as_str();
        }
        current
    }

    pub fn len(&self) -> usize {
        self.parent.len()
    }

    pub fn is_empty(&self) -> bool {
        self.parent.is_empty()
    }
}
