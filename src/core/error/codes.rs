//! MySQL 协议错误码
//!
//! 只收录重试分类需要用到的错误码，数值与 TiDB 的 errno 保持一致

/// 语法错误
pub const ER_PARSE_ERROR: u16 = 1064;
/// 表不存在
pub const ER_NO_SUCH_TABLE: u16 = 1146;
/// 数据库不存在
pub const ER_BAD_DB_ERROR: u16 = 1049;

/// 源集群返回这些错误码时，重试也不会成功
const UNRETRYABLE_SOURCE_CODES: [u16; 3] = [ER_PARSE_ERROR, ER_NO_SUCH_TABLE, ER_BAD_DB_ERROR];

/// 判断源集群的错误码是否不可重试
///
/// 没有把握的错误码一律视为可重试，调用方会在之后的运行中再次执行
pub fn is_unretryable_source_code(code: u16) -> bool {
    UNRETRYABLE_SOURCE_CODES.contains(&code)
}
