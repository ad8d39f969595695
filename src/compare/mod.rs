//! 执行计划比较
//!
//! 比较前先去掉只有一个子节点的投影算子，再按 SQL 中的别名关系归一化访问对象，
//! 最后按先序逐节点比较算子类型、子节点数量和访问对象。
//! 算子 ID、标签和任务类型不参与比较。

pub mod alias;
pub mod result;
pub mod union_find;

pub use alias::{collect_aliases, normalize_table_alias};
pub use result::{CmpVerdict, PlanCmpResult};
pub use union_find::UnionFind;

use crate::core::error::PccResult;
use crate::plan::{AccessObject, PlanNode};

/// 比较两棵计划树，两棵树都会被原地修改
///
/// `sql` 为空时跳过别名归一化；SQL 无法解析时返回错误，
/// 此时投影已经去除，调用方可以用空 SQL 再调用一次做原始比较
pub fn cmp_plan(sql: &str, a: &mut PlanNode, b: &mut PlanNode) -> PccResult<CmpVerdict> {
    remove_projection(a);
    remove_projection(b);
    normalize_table_alias(sql, a, b)?;
    Ok(cmp_node(a, b))
}

/// 原地去除只有一个子节点的投影算子，连续的投影会一并去除
pub fn remove_projection(node: &mut PlanNode) {
    while node.is_projection() && node.children.len() == 1 {
        if let Some(child) = node.children.pop() {
            *node = child;
        }
    }
    for child in &mut node.children {
        remove_projection(child);
    }
}

fn cmp_node(a: &PlanNode, b: &PlanNode) -> CmpVerdict {
    if a.op_type != b.op_type || a.children.len() != b.children.len() {
        return CmpVerdict::Diff;
    }
    if !access_object_eq(a.access_object.as_ref(), b.access_object.as_ref()) {
        return CmpVerdict::Diff;
    }
    for (ca, cb) in a.children.iter().zip(&b.children) {
        if cmp_node(ca, cb) != CmpVerdict::Same {
            return CmpVerdict::Diff;
        }
    }
    CmpVerdict::Same
}

fn access_object_eq(a: Option<&AccessObject>, b: Option<&AccessObject>) -> bool {
    match (a, b) {
        (None, None) => true,
        (Some(a), Some(b)) => {
            a.table == b.table
                && a.index == b.index
                && a.partitions == b.partitions
                && a.cte == b.cte
                && a.dynamic_partition_raw == b.dynamic_partition_raw
        }
        _ => false,
    }
}
