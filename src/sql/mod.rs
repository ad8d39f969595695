//! SQL 解析辅助
//!
//! 基于 `sqlparser` 的 MySQL 方言，只用于提取表名、别名以及简单的文本改写

pub mod interpolate;
pub mod tables;

pub use interpolate::interpolate_arguments;
pub use tables::{
    extract_ddl_dependencies, extract_table_names, is_mem_or_sys_db, is_mem_or_sys_table,
    normalize_ddl, TableName,
};

use sqlparser::ast::Statement;
use sqlparser::dialect::MySqlDialect;
use sqlparser::parser::Parser;

use crate::core::error::{PccError, PccResult};

/// 解析单条 SQL 语句
pub fn parse_one(sql: &str) -> PccResult<Statement> {
    let mut statements = Parser::parse_sql(&MySqlDialect {}, sql)?;
    match statements.len() {
        1 => Ok(statements.remove(0)),
        0 => Err(PccError::SqlParse(format!("没有可解析的语句: {}", sql))),
        n => Err(PccError::SqlParse(format!("期望一条语句，实际为 {} 条: {}", n, sql))),
    }
}

/// 用反引号转义标识符
pub fn escape_identifier(ident: &str) -> String {
    format!("`{}`", ident.replace('`', "``"))
}
