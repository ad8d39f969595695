//! 执行计划节点
//!
//! 一个 `PlanNode` 对应 EXPLAIN 结果中的一行，父节点独占子节点，不保留反向引用

use serde::{Deserialize, Serialize};

use crate::core::error::{PlanError, PlanResult};
use crate::plan::access_object::parse_access_object;

/// 投影算子的类型名
pub const TYPE_PROJECTION: &str = "Projection";

/// 算子访问的表、索引和分区
///
/// `cte` 和 `dynamic_partition_raw` 目前不会被解析器填充，仅用于结构比较
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AccessObject {
    pub table: String,
    pub index: String,
    pub partitions: Vec<String>,
    pub cte: String,
    pub dynamic_partition_raw: String,
}

impl AccessObject {
    pub fn table(table: impl Into<String>) -> Self {
        Self {
            table: table.into(),
            ..Default::default()
        }
    }

    pub fn with_index(mut self, index: impl Into<String>) -> Self {
        self.index = index.into();
        self
    }

    pub fn with_partitions<I, S>(mut self, partitions: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.partitions = partitions.into_iter().map(Into::into).collect();
        self
    }
}

/// 执行计划树节点
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlanNode {
    /// 算子类型，例如 `HashJoin`
    pub op_type: String,
    /// 计划文本中的数字后缀，不同运行之间不保证唯一
    pub id: String,
    /// 可选后缀，例如 `(Build)` / `(Probe)`
    pub label: String,
    /// 执行位置，例如 `root`、`cop[tikv]`
    pub task: String,
    pub access_object: Option<AccessObject>,
    pub children: Vec<PlanNode>,
}

impl PlanNode {
    /// 从完整算子名创建节点
    ///
    /// 完整算子名的格式为 `{Type}_{ID}{Label}`，例如 `IndexReader_44(Build)`
    pub fn new(full_name: &str, task: &str, access_object: &str) -> PlanResult<Self> {
        let (op_type, id, label) = split_full_name(full_name)?;
        let access_object = if access_object.is_empty() {
            None
        } else {
            parse_access_object(access_object)?
        };

        Ok(Self {
            op_type: op_type.to_string(),
            id: id.to_string(),
            label: label.to_string(),
            task: task.to_string(),
            access_object,
            children: Vec::new(),
        })
    }

    /// 创建没有任务类型和访问对象的叶子节点
    pub fn leaf(full_name: &str) -> PlanResult<Self> {
        Self::new(full_name, "", "")
    }

    pub fn with_children(mut self, children: Vec<PlanNode>) -> Self {
        self.children = children;
        self
    }

    pub fn with_access_object(mut self, access_object: AccessObject) -> Self {
        self.access_object = Some(access_object);
        self
    }

    pub fn is_projection(&self) -> bool {
        self.op_type == TYPE_PROJECTION
    }

    /// 还原完整算子名
    pub fn full_name(&self) -> String {
        format!("{}_{}{}", self.op_type, self.id, self.label)
    }

    /// 树中节点总数
    pub fn node_count(&self) -> usize {
        1 + self.children.iter().map(PlanNode::node_count).sum::<usize>()
    }

    /// 树的深度，单个节点深度为 1
    pub fn depth(&self) -> usize {
        1 + self.children.iter().map(PlanNode::depth).max().unwrap_or(0)
    }
}

fn split_full_name(full_name: &str) -> PlanResult<(&str, &str, &str)> {
    let invalid = || PlanError::InvalidOperator(full_name.to_string());

    let underscore = full_name.find('_').ok_or_else(invalid)?;
    let last_digit = full_name
        .rfind(|c: char| c.is_ascii_digit())
        .filter(|&i| i > underscore)
        .ok_or_else(invalid)?;

    Ok((
        &full_name[..underscore],
        &full_name[underscore + 1..=last_digit],
        &full_name[last_digit + 1..],
    ))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_plan_node() {
        let node = PlanNode::new("IndexReader_44(Build)", "root", "").expect("valid operator");
        assert_eq!(node.op_type, "IndexReader");
        assert_eq!(node.id, "44");
        assert_eq!(node.label, "(Build)");
        assert_eq!(node.task, "root");
        assert!(node.access_object.is_none());
        assert_eq!(node.full_name(), "IndexReader_44(Build)");
    }

    #[test]
    fn test_new_plan_node_with_access_object() {
        let node = PlanNode::new("IndexFullScan_43", "cop[tikv]", "table:t, index:idx(c2)")
            .expect("valid operator");
        assert_eq!(
            node.access_object,
            Some(AccessObject::table("t").with_index("idx(c2)"))
        );
    }

    #[test]
    fn test_operator_name_with_multiple_underscores() {
        let node = PlanNode::leaf("Shuffle_Receiver_12").expect("valid operator");
        assert_eq!(node.op_type, "Shuffle");
        assert_eq!(node.id, "Receiver_12");
        assert_eq!(node.label, "");
    }

    #[test]
    fn test_invalid_operator_name() {
        assert_eq!(
            PlanNode::leaf("Projection"),
            Err(PlanError::InvalidOperator("Projection".to_string()))
        );
        assert!(PlanNode::leaf("Projection_").is_err());
        assert!(PlanNode::leaf("Table1_abc").is_err());
    }

    #[test]
    fn test_node_count_and_depth() {
        let tree = PlanNode::leaf("HashJoin_1")
            .expect("valid operator")
            .with_children(vec![
                PlanNode::leaf("TableReader_2").expect("valid operator"),
                PlanNode::leaf("TableReader_3")
                    .expect("valid operator")
                    .with_children(vec![PlanNode::leaf("TableFullScan_4").expect("valid operator")]),
            ]);
        assert_eq!(tree.node_count(), 4);
        assert_eq!(tree.depth(), 3);
    }
}
