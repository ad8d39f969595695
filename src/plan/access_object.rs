//! 访问对象解析
//!
//! 解析 `table:t1, partition:p0,p1, index:idx(a, b)` 这种格式，
//! 只追求覆盖常见情况，并不是通用的解析器

use crate::core::error::{PlanError, PlanResult};
use crate::plan::op::AccessObject;

const TABLE_PREFIX: &str = "table:";
const PARTITION_PREFIX: &str = "partition:";
const INDEX_PREFIX: &str = "index:";
const OBJECT_SEP: &str = ", ";

/// 解析访问对象
///
/// 不以 `table:` 开头的输入（子查询、CTE 等）返回 `Ok(None)`。
/// 索引表达式后面的内容（`range:`、`keep order:` 等算子信息）会被忽略。
pub fn parse_access_object(input: &str) -> PlanResult<Option<AccessObject>> {
    let Some(rest) = input.strip_prefix(TABLE_PREFIX) else {
        return Ok(None);
    };

    let mut ret = AccessObject::default();
    let (table, mut rest) = split_object(rest);
    // 算子信息列中可能是 "table:CLUSTER_STATEMENTS_SUMMARY_HISTORY,"
    ret.table = table.trim_end_matches(',').to_string();

    if let Some(partitions) = rest.and_then(|r| r.strip_prefix(PARTITION_PREFIX)) {
        let (partitions, after) = split_object(partitions);
        ret.partitions = partitions
            .trim_end_matches(',')
            .split(',')
            .map(str::to_string)
            .collect();
        rest = after;
    }

    if let Some(index) = rest.and_then(|r| r.strip_prefix(INDEX_PREFIX)) {
        ret.index = split_index(index, input)?.to_string();
    }

    Ok(Some(ret))
}

fn split_object(input: &str) -> (&str, Option<&str>) {
    match input.find(OBJECT_SEP) {
        Some(i) => (&input[..i], Some(&input[i + OBJECT_SEP.len()..])),
        None => (input, None),
    }
}

/// 索引表达式可能包含括号内的逗号，例如 `idx(a, b)`，
/// 结束位置是第一个不在括号内的 `, `
fn split_index<'a>(input: &'a str, whole: &str) -> PlanResult<&'a str> {
    let unmatched = || PlanError::UnmatchedParenthesis(whole.to_string());
    let bytes = input.as_bytes();
    let mut depth = 0usize;

    for (i, b) in bytes.iter().enumerate() {
        match b {
            b'(' => depth += 1,
            b')' => depth = depth.checked_sub(1).ok_or_else(unmatched)?,
            b',' if depth == 0 && bytes.get(i + 1) == Some(&b' ') => return Ok(&input[..i]),
            _ => {}
        }
    }

    if depth != 0 {
        return Err(unmatched());
    }
    Ok(input.trim_end_matches(','))
}
