//! EXPLAIN 结果 `id` 列中的树形缩进字符
//!
//! 每一层缩进由两个字符组成，例如 `├─`、`│ `、`└─`、`  `

pub const TREE_BODY: char = '│';
pub const TREE_MIDDLE_NODE: char = '├';
pub const TREE_LAST_NODE: char = '└';
pub const TREE_GAP: char = ' ';
pub const TREE_NODE_IDENTIFIER: char = '─';

/// 每层缩进的字符数
pub const CHARS_PER_LEVEL: usize = 2;

pub fn is_indent_char(c: char) -> bool {
    matches!(
        c,
        TREE_BODY | TREE_MIDDLE_NODE | TREE_LAST_NODE | TREE_GAP | TREE_NODE_IDENTIFIER
    )
}

/// 拆分缩进前缀，返回缩进字符数和剩余的算子名
///
/// 缩进字符大多是多字节字符，这里按字符计数，按字节切分
pub fn split_indent(id: &str) -> (usize, &str) {
    let mut count = 0;
    for (offset, c) in id.char_indices() {
        if !is_indent_char(c) {
            return (count, &id[offset..]);
        }
        count += 1;
    }
    (count, "")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_split_indent() {
        assert_eq!(split_indent("HashJoin_23"), (0, "HashJoin_23"));
        assert_eq!(split_indent("├─IndexReader_44(Build)"), (2, "IndexReader_44(Build)"));
        assert_eq!(split_indent("│ └─IndexFullScan_43"), (4, "IndexFullScan_43"));
        assert_eq!(split_indent("  │   └─TableFullScan_38"), (8, "TableFullScan_38"));
        assert_eq!(split_indent("└─"), (2, ""));
    }
}
