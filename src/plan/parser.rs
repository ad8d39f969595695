//! 执行计划文本解析
//!
//! 支持两种来源：
//! - EXPLAIN 返回的结果集（`id`、`task`、`access object` 三列）
//! - 语句摘要表中保存的计划文本（制表符分隔，带表头，访问对象位于 `operator info` 列）

use crate::core::error::{PlanError, PlanResult};
use crate::plan::op::PlanNode;
use crate::plan::texttree::{split_indent, CHARS_PER_LEVEL};

pub const ID_COLUMN: &str = "id";
pub const TASK_COLUMN: &str = "task";
pub const ACCESS_OBJECT_COLUMN: &str = "access object";
pub const OPERATOR_INFO_COLUMN: &str = "operator info";

/// 解析结果：计划树以及按行拼接的 `id` 列文本
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParsedPlan {
    pub root: PlanNode,
    pub text: String,
}

/// 计划的一行：`id`、`task`、访问对象
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PlanRow<'a> {
    pub id: &'a str,
    pub task: &'a str,
    pub access_object: &'a str,
}

impl<'a> PlanRow<'a> {
    pub fn new(id: &'a str, task: &'a str, access_object: &'a str) -> Self {
        Self {
            id,
            task,
            access_object,
        }
    }
}

/// 按行构建计划树
///
/// 栈中保存当前路径上尚未闭合的节点，新行的层级决定弹出多少个节点，
/// 弹出的节点依次挂到新的栈顶下面
pub fn plan_from_rows(rows: &[PlanRow<'_>]) -> PlanResult<ParsedPlan> {
    if rows.is_empty() {
        return Err(PlanError::EmptyInput);
    }

    let mut stack: Vec<PlanNode> = Vec::new();
    let mut lines = Vec::with_capacity(rows.len());

    for (i, row) in rows.iter().enumerate() {
        if row.id.is_empty() {
            return Err(PlanError::EmptyId);
        }
        lines.push(row.id);

        let (indent, full_name) = split_indent(row.id);
        if indent % CHARS_PER_LEVEL != 0 {
            return Err(PlanError::OddIndent(row.id.to_string()));
        }

        let level = indent / CHARS_PER_LEVEL;
        if level > stack.len() {
            return Err(PlanError::LevelOvershoot {
                level,
                depth: stack.len(),
                id: row.id.to_string(),
            });
        }
        if level == 0 && i > 0 {
            return Err(PlanError::MultipleRoots(row.id.to_string()));
        }

        close_until(&mut stack, level);
        stack.push(PlanNode::new(full_name, row.task, row.access_object)?);
    }

    close_until(&mut stack, 1);
    let root = stack.pop().ok_or(PlanError::EmptyInput)?;

    Ok(ParsedPlan {
        root,
        text: lines.join("\n"),
    })
}

/// 弹出栈顶节点直到栈深度为 `depth`，每个弹出的节点挂到新的栈顶下
fn close_until(stack: &mut Vec<PlanNode>, depth: usize) {
    let depth = depth.max(1);
    while stack.len() > depth {
        if let Some(child) = stack.pop() {
            if let Some(parent) = stack.last_mut() {
                parent.children.push(child);
            }
        }
    }
}

/// 解析语句摘要中保存的计划文本
///
/// 文本形如：
/// ```text
/// \tid                 \ttask\testRows\toperator info
/// \tProjection_4       \troot\t1      \t...
/// ```
pub fn plan_from_stmt_summary(plan: &str) -> PlanResult<ParsedPlan> {
    let mut lines: Vec<&str> = plan.split('\n').collect();
    while lines.last().is_some_and(|l| l.trim().is_empty()) {
        lines.pop();
    }
    if lines.len() < 2 {
        return Err(PlanError::InvalidPlanText(plan.to_string()));
    }

    let header: Vec<&str> = lines[0].split('\t').map(|c| c.trim_end()).collect();
    let id_idx = column_index(&header, ID_COLUMN, lines[0])?;
    let task_idx = column_index(&header, TASK_COLUMN, lines[0])?;
    let info_idx = column_index(&header, OPERATOR_INFO_COLUMN, lines[0])?;

    let mut fields = Vec::with_capacity(lines.len() - 1);
    for (line_no, line) in lines.iter().enumerate().skip(1) {
        let cols: Vec<&str> = line.split('\t').collect();
        if cols.len() != header.len() {
            return Err(PlanError::ColumnCountMismatch {
                line: line_no,
                header: lines[0].to_string(),
                row: line.to_string(),
            });
        }
        fields.push(cols);
    }

    let rows: Vec<PlanRow<'_>> = fields
        .iter()
        .map(|cols| {
            PlanRow::new(
                cols[id_idx].trim_end_matches(' '),
                cols[task_idx].trim_end_matches(' '),
                cols[info_idx].trim_end_matches(' '),
            )
        })
        .collect();

    plan_from_rows(&rows)
}

/// 解析 EXPLAIN 返回的结果集
///
/// `columns` 为列名，`rows` 中的 NULL 当作空串处理
pub fn plan_from_explain(columns: &[String], rows: &[Vec<Option<String>>]) -> PlanResult<ParsedPlan> {
    let header: Vec<&str> = columns.iter().map(String::as_str).collect();
    let joined = header.join("\t");
    let id_idx = column_index(&header, ID_COLUMN, &joined)?;
    let task_idx = column_index(&header, TASK_COLUMN, &joined)?;
    let access_idx = column_index(&header, ACCESS_OBJECT_COLUMN, &joined)?;

    let mut plan_rows = Vec::with_capacity(rows.len());
    for (line, row) in rows.iter().enumerate() {
        let cell = |idx: usize| {
            match row.get(idx) {
                Some(value) => Ok(value.as_deref().unwrap_or("")),
                None => Err(PlanError::ColumnCountMismatch {
                    line,
                    header: joined.clone(),
                    row: format!("{:?}", row),
                }),
            }
        };
        plan_rows.push(PlanRow::new(cell(id_idx)?, cell(task_idx)?, cell(access_idx)?));
    }

    plan_from_rows(&plan_rows)
}

fn column_index(header: &[&str], column: &str, raw: &str) -> PlanResult<usize> {
    header
        .iter()
        .position(|c| c.trim().eq_ignore_ascii_case(column))
        .ok_or_else(|| PlanError::MissingColumn {
            column: column.to_string(),
            header: raw.to_string(),
        })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::plan::op::AccessObject;

    /// 解析 mysql 客户端 batch 模式的输出（制表符分隔，首行为表头）
    fn batch_rows(text: &str) -> (Vec<String>, Vec<Vec<Option<String>>>) {
        let mut lines = text.trim().lines();
        let columns = lines
            .next()
            .expect("header")
            .split('\t')
            .map(str::to_string)
            .collect();
        let rows = lines
            .map(|l| l.split('\t').map(|c| Some(c.to_string())).collect())
            .collect();
        (columns, rows)
    }

    const HASH_JOIN_PLAN: &str = "id\testRows\ttask\taccess object\toperator info
HashJoin_23\t12487.50\troot\t\tinner join, equal:[eq(test.t1.c2, test.t2.c2)]
├─IndexReader_44(Build)\t9990.00\troot\t\tindex:IndexFullScan_43
│ └─IndexFullScan_43\t9990.00\tcop[tikv]\ttable:t2, index:idx(c2)\tkeep order:false, stats:pseudo
└─TableReader_40(Probe)\t9990.00\troot\t\tdata:Selection_39
  └─Selection_39\t9990.00\tcop[tikv]\t\tnot(isnull(test.t1.c2))
    └─TableFullScan_38\t10000.00\tcop[tikv]\ttable:t1\tkeep order:false, stats:pseudo";

    #[test]
    fn test_plan_from_explain() {
        let (columns, rows) = batch_rows(HASH_JOIN_PLAN);
        let parsed = plan_from_explain(&columns, &rows).expect("valid plan");

        let expected = PlanNode::new("HashJoin_23", "root", "")
            .expect("valid operator")
            .with_children(vec![
                PlanNode::new("IndexReader_44(Build)", "root", "")
                    .expect("valid operator")
                    .with_children(vec![PlanNode::new("IndexFullScan_43", "cop[tikv]", "")
                        .expect("valid operator")
                        .with_access_object(AccessObject::table("t2").with_index("idx(c2)"))]),
                PlanNode::new("TableReader_40(Probe)", "root", "")
                    .expect("valid operator")
                    .with_children(vec![PlanNode::new("Selection_39", "cop[tikv]", "")
                        .expect("valid operator")
                        .with_children(vec![PlanNode::new("TableFullScan_38", "cop[tikv]", "")
                            .expect("valid operator")
                            .with_access_object(AccessObject::table("t1"))])]),
            ]);

        assert_eq!(parsed.root, expected);
        assert_eq!(
            parsed.text,
            "HashJoin_23\n├─IndexReader_44(Build)\n│ └─IndexFullScan_43\n└─TableReader_40(Probe)\n  └─Selection_39\n    └─TableFullScan_38"
        );
    }

    #[test]
    fn test_plan_from_stmt_summary() {
        let plan = "\tid                 \ttask\testRows\toperator info
\tProjection_4       \troot\t1      \tinformation_schema.cluster_statements_summary_history.plan
\t└─Selection_5      \troot\t1      \teq(information_schema.cluster_statements_summary_history.digest_text, \"select * from t\")
\t  └─MemTableScan_6 \troot\t3      \ttable:CLUSTER_STATEMENTS_SUMMARY_HISTORY,
";
        let parsed = plan_from_stmt_summary(plan).expect("valid plan");

        let root = &parsed.root;
        assert_eq!(root.op_type, "Projection");
        assert_eq!(root.id, "4");
        assert!(root.access_object.is_none());
        assert_eq!(root.children.len(), 1);

        let selection = &root.children[0];
        assert_eq!(selection.op_type, "Selection");
        assert_eq!(selection.children.len(), 1);

        let scan = &selection.children[0];
        assert_eq!(scan.op_type, "MemTableScan");
        assert_eq!(scan.task, "root");
        assert_eq!(
            scan.access_object,
            Some(AccessObject::table("CLUSTER_STATEMENTS_SUMMARY_HISTORY"))
        );
        assert_eq!(parsed.text, "Projection_4\n└─Selection_5\n  └─MemTableScan_6");
    }

    #[test]
    fn test_stmt_summary_column_mismatch() {
        let plan = "\tid\ttask\testRows\toperator info\n\tTableReader_5\troot\t1\n";
        assert!(matches!(
            plan_from_stmt_summary(plan),
            Err(PlanError::ColumnCountMismatch { line: 1, .. })
        ));
    }

    #[test]
    fn test_stmt_summary_missing_column() {
        let plan = "\tid\ttask\testRows\n\tTableReader_5\troot\t1\n";
        assert!(matches!(
            plan_from_stmt_summary(plan),
            Err(PlanError::MissingColumn { .. })
        ));
        assert!(matches!(
            plan_from_stmt_summary("\tid\ttask\toperator info\n"),
            Err(PlanError::InvalidPlanText(_))
        ));
    }

    #[test]
    fn test_malformed_rows() {
        assert_eq!(plan_from_rows(&[]), Err(PlanError::EmptyInput));
        assert_eq!(
            plan_from_rows(&[PlanRow::new("", "root", "")]),
            Err(PlanError::EmptyId)
        );

        let odd = [PlanRow::new("Projection_1", "root", ""), PlanRow::new("└TableReader_2", "root", "")];
        assert!(matches!(plan_from_rows(&odd), Err(PlanError::OddIndent(_))));

        let overshoot = [
            PlanRow::new("Projection_1", "root", ""),
            PlanRow::new("  └─TableReader_2", "root", ""),
        ];
        assert!(matches!(
            plan_from_rows(&overshoot),
            Err(PlanError::LevelOvershoot { level: 2, depth: 1, .. })
        ));

        let two_roots = [PlanRow::new("Projection_1", "root", ""), PlanRow::new("Projection_2", "root", "")];
        assert!(matches!(plan_from_rows(&two_roots), Err(PlanError::MultipleRoots(_))));

        let first_indented = [PlanRow::new("└─TableReader_2", "root", "")];
        assert!(matches!(
            plan_from_rows(&first_indented),
            Err(PlanError::LevelOvershoot { level: 1, depth: 0, .. })
        ));
    }

    #[test]
    fn test_siblings_keep_order() {
        let rows = [
            PlanRow::new("Union_1", "root", ""),
            PlanRow::new("├─TableReader_2", "root", ""),
            PlanRow::new("│ └─TableFullScan_3", "cop[tikv]", "table:a"),
            PlanRow::new("├─TableReader_4", "root", ""),
            PlanRow::new("│ └─TableFullScan_5", "cop[tikv]", "table:b"),
            PlanRow::new("└─TableReader_6", "root", ""),
            PlanRow::new("  └─TableFullScan_7", "cop[tikv]", "table:c"),
        ];
        let parsed = plan_from_rows(&rows).expect("valid plan");
        let tables: Vec<_> = parsed
            .root
            .children
            .iter()
            .map(|c| c.children[0].access_object.as_ref().map(|a| a.table.as_str()))
            .collect();
        assert_eq!(tables, vec![Some("a"), Some("b"), Some("c")]);
        assert_eq!(parsed.root.node_count(), 7);
    }
}
