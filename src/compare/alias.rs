//! 表别名归一化
//!
//! 同一张表在新旧计划中可能以不同的别名出现在访问对象里，
//! 比较前把别名统一替换为所在等价类的代表元

use std::ops::ControlFlow;

use sqlparser::ast::{TableFactor, Visit, Visitor};

use crate::compare::union_find::UnionFind;
use crate::core::error::PccResult;
use crate::plan::PlanNode;
use crate::sql::parse_one;

struct AliasCollector {
    aliases: UnionFind,
}

impl Visitor for AliasCollector {
    type Break = ();

    fn pre_visit_table_factor(&mut self, table_factor: &TableFactor) -> ControlFlow<Self::Break> {
        if let TableFactor::Table {
            name,
            alias: Some(alias),
            ..
        } = table_factor
        {
            if let Some(table) = name.0.last() {
                self.aliases
                    .union(&table.value.to_lowercase(), &alias.name.value.to_lowercase());
            }
        }
        ControlFlow::Continue(())
    }
}

/// 从 SQL 中收集 `(表名, 别名)` 等价关系
pub fn collect_aliases(sql: &str) -> PccResult<UnionFind> {
    let stmt = parse_one(sql)?;
    let mut collector = AliasCollector {
        aliases: UnionFind::new(),
    };
    let _ = stmt.visit(&mut collector);
    Ok(collector.aliases)
}

/// 把计划树中所有访问对象的表名改写为代表元
pub fn rename_tables(aliases: &UnionFind, node: &mut PlanNode) {
    if let Some(access) = node.access_object.as_mut() {
        let table = access.table.to_lowercase();
        let representative = aliases.representative(&table);
        if representative != table {
            access.table = representative.to_string();
        }
    }
    for child in &mut node.children {
        rename_tables(aliases, child);
    }
}

/// 按 SQL 中的别名关系归一化两棵计划树，空 SQL 不做处理
pub fn normalize_table_alias(sql: &str, a: &mut PlanNode, b: &mut PlanNode) -> PccResult<()> {
    if sql.is_empty() {
        return Ok(());
    }
    let aliases = collect_aliases(sql)?;
    if aliases.is_empty() {
        return Ok(());
    }
    rename_tables(&aliases, a);
    rename_tables(&aliases, b);
    Ok(())
}
