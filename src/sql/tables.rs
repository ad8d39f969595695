//! 表名提取
//!
//! 查询语句通过 AST 遍历提取；建表、建视图语句在此之外还要补上
//! `LIKE` 源表和序列函数引用的序列

use std::fmt;
use std::ops::ControlFlow;
use std::sync::LazyLock;

use log::warn;
use regex::Regex;
use serde::{Deserialize, Serialize};
use sqlparser::ast::{
    Expr, FunctionArg, FunctionArgExpr, FunctionArguments, Ident, ObjectName, Statement, Value,
    Visit, Visitor,
};

use crate::sql::{escape_identifier, parse_one};

const SEQUENCE_FUNCTIONS: [&str; 3] = ["nextval", "lastval", "setval"];
const MEM_OR_SYS_DBS: [&str; 5] = [
    "information_schema",
    "performance_schema",
    "metrics_schema",
    "mysql",
    "sys",
];

/// 限定了数据库的表名，均为小写
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct TableName {
    pub db: String,
    pub table: String,
}

impl TableName {
    pub fn new(db: impl Into<String>, table: impl Into<String>) -> Self {
        Self {
            db: db.into(),
            table: table.into(),
        }
    }

    fn from_parts(parts: &[&str], curr_db: &str) -> Option<Self> {
        match parts {
            [table] => Some(Self::new(curr_db.to_lowercase(), table.to_lowercase())),
            [.., db, table] => Some(Self::new(db.to_lowercase(), table.to_lowercase())),
            [] => None,
        }
    }

    fn from_idents(idents: &[Ident], curr_db: &str) -> Option<Self> {
        let parts: Vec<&str> = idents.iter().map(|i| i.value.as_str()).collect();
        Self::from_parts(&parts, curr_db)
    }
}

impl fmt::Display for TableName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}.{}",
            escape_identifier(&self.db),
            escape_identifier(&self.table)
        )
    }
}

pub fn is_mem_or_sys_db(db: &str) -> bool {
    MEM_OR_SYS_DBS
        .iter()
        .any(|sys| sys.eq_ignore_ascii_case(db))
}

pub fn is_mem_or_sys_table(table: &TableName) -> bool {
    is_mem_or_sys_db(&table.db)
}

struct TableNameCollector<'a> {
    curr_db: &'a str,
    names: Vec<TableName>,
}

impl TableNameCollector<'_> {
    fn push(&mut self, name: TableName) {
        if !self.names.contains(&name) {
            self.names.push(name);
        }
    }

    fn push_sequence_arg(&mut self, arg: &FunctionArg) {
        let expr = match arg {
            FunctionArg::Unnamed(FunctionArgExpr::Expr(expr)) => expr,
            _ => return,
        };
        let name = match expr {
            Expr::Identifier(ident) => TableName::from_idents(std::slice::from_ref(ident), self.curr_db),
            Expr::CompoundIdentifier(idents) => TableName::from_idents(idents, self.curr_db),
            Expr::Value(Value::SingleQuotedString(s)) | Expr::Value(Value::DoubleQuotedString(s)) => {
                let parts: Vec<&str> = s.split('.').collect();
                TableName::from_parts(&parts, self.curr_db)
            }
            _ => None,
        };
        if let Some(name) = name {
            self.push(name);
        }
    }
}

impl Visitor for TableNameCollector<'_> {
    type Break = ();

    fn pre_visit_relation(&mut self, relation: &ObjectName) -> ControlFlow<Self::Break> {
        if let Some(name) = TableName::from_idents(&relation.0, self.curr_db) {
            self.push(name);
        }
        ControlFlow::Continue(())
    }

    fn pre_visit_expr(&mut self, expr: &Expr) -> ControlFlow<Self::Break> {
        if let Expr::Function(func) = expr {
            let is_sequence_fn = func
                .name
                .0
                .last()
                .is_some_and(|i| SEQUENCE_FUNCTIONS.iter().any(|f| f.eq_ignore_ascii_case(&i.value)));
            if is_sequence_fn {
                if let FunctionArguments::List(list) = &func.args {
                    if let Some(first) = list.args.first() {
                        self.push_sequence_arg(first);
                    }
                }
            }
        }
        ControlFlow::Continue(())
    }
}

/// 提取语句引用的所有表（包括视图和序列），按出现顺序去重
///
/// 未限定数据库的表名归属 `curr_db`
pub fn extract_table_names(stmt: &Statement, curr_db: &str) -> Vec<TableName> {
    let mut collector = TableNameCollector {
        curr_db,
        names: Vec::new(),
    };

    match stmt {
        Statement::CreateTable(create) => {
            if let Some(name) = TableName::from_idents(&create.name.0, curr_db) {
                collector.push(name);
            }
            if let Some(like) = &create.like {
                if let Some(name) = TableName::from_idents(&like.0, curr_db) {
                    collector.push(name);
                }
            }
        }
        Statement::CreateView { name, .. } | Statement::CreateSequence { name, .. } => {
            if let Some(name) = TableName::from_idents(&name.0, curr_db) {
                collector.push(name);
            }
        }
        Statement::Insert(insert) => {
            if let Some(name) = TableName::from_idents(&insert.table_name.0, curr_db) {
                collector.push(name);
            }
        }
        _ => {}
    }

    let _ = stmt.visit(&mut collector);
    collector.names
}

static NEXT_VALUE_FOR_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)\bNEXT\s+VALUE\s+FOR\s+((?:`[^`]+`|[\w$]+)(?:\s*\.\s*(?:`[^`]+`|[\w$]+))?)")
        .expect("NEXT VALUE FOR 正则无效")
});

static VIEW_HEADER_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"(?is)^\s*CREATE\s+(?:OR\s+REPLACE\s+)?(?:ALGORITHM\s*=\s*\w+\s+)?(?:DEFINER\s*=\s*(?:`[^`]*`|'[^']*'|\S+?)@(?:`[^`]*`|'[^']*'|\S+)\s+)?(?:SQL\s+SECURITY\s+\w+\s+)?VIEW\b",
    )
    .expect("视图头部正则无效")
});

static LEXICAL_REFERENCE_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"(?i)\b(?:FROM|JOIN|LIKE|nextval\s*\(|lastval\s*\(|setval\s*\()\s*((?:`[^`]+`|[A-Za-z_$][\w$]*)(?:\s*\.\s*(?:`[^`]+`|[A-Za-z_$][\w$]*))?)",
    )
    .expect("表引用正则无效")
});

/// 把目标端返回的 DDL 改写为 `sqlparser` 能解析的形式
///
/// - `NEXT VALUE FOR seq` 改写为 `nextval(seq)`
/// - 去掉视图定义中的 `ALGORITHM`、`DEFINER`、`SQL SECURITY` 子句
pub fn normalize_ddl(ddl: &str) -> String {
    let ddl = NEXT_VALUE_FOR_RE.replace_all(ddl, "nextval($1)");
    VIEW_HEADER_RE.replace(&ddl, "CREATE VIEW").into_owned()
}

fn split_qualified(name: &str) -> Vec<String> {
    name.split('.')
        .map(|p| p.trim().trim_matches('`').to_string())
        .collect()
}

/// 语法解析失败时的兜底：按关键字匹配引用的表
fn lexical_table_names(ddl: &str, curr_db: &str) -> Vec<TableName> {
    let mut names = Vec::new();
    for caps in LEXICAL_REFERENCE_RE.captures_iter(ddl) {
        let parts = split_qualified(&caps[1]);
        let parts: Vec<&str> = parts.iter().map(String::as_str).collect();
        if let Some(name) = TableName::from_parts(&parts, curr_db) {
            if !names.contains(&name) {
                names.push(name);
            }
        }
    }
    names
}

/// 提取建表或建视图语句依赖的其他对象，不包括对象自身
///
/// DDL 无法解析时记录警告并退化为按关键字匹配，因为目标端返回的 DDL
/// 可能使用了解析器不支持的方言扩展
pub fn extract_ddl_dependencies(ddl: &str, own: &TableName) -> Vec<TableName> {
    let normalized = normalize_ddl(ddl);
    let names = match parse_one(&normalized) {
        Ok(stmt) => extract_table_names(&stmt, &own.db),
        Err(e) => {
            warn!(
                target: "pcc::sql",
                "解析 {} 的 DDL 失败，改为按关键字提取依赖: {}",
                own, e
            );
            lexical_table_names(&normalized, &own.db)
        }
    };
    names.into_iter().filter(|n| n != own).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn names(pairs: &[(&str, &str)]) -> Vec<TableName> {
        pairs.iter().map(|(d, t)| TableName::new(*d, *t)).collect()
    }

    #[test]
    fn test_extract_table_names() {
        let cases: Vec<(&str, Vec<TableName>)> = vec![
            ("SELECT * FROM t", names(&[("test", "t")])),
            ("SELECT * FROM T JOIN Test2.T2 ON T.a = T2.a", names(&[("test", "t"), ("test2", "t2")])),
            ("CREATE TABLE t LIKE test2.t2", names(&[("test", "t"), ("test2", "t2")])),
            ("CREATE TABLE t AS SELECT * FROM test2.t2", names(&[("test", "t"), ("test2", "t2")])),
            ("CREATE VIEW v AS SELECT * FROM test2.t2", names(&[("test", "v"), ("test2", "t2")])),
            ("CREATE SEQUENCE s", names(&[("test", "s")])),
            ("CREATE TABLE t(a int default nextval(seq))", names(&[("test", "t"), ("test", "seq")])),
            ("SELECT SETVAL(seq2, 10)", names(&[("test", "seq2")])),
            ("SELECT *, LASTVAL(seq) FROM t", names(&[("test", "seq"), ("test", "t")])),
            ("SELECT * FROM t WHERE a IN (SELECT a FROM t)", names(&[("test", "t")])),
        ];

        for (sql, expected) in cases {
            let stmt = parse_one(sql).expect("valid sql");
            assert_eq!(extract_table_names(&stmt, "test"), expected, "sql: {}", sql);
        }
    }

    #[test]
    fn test_normalize_ddl() {
        assert_eq!(
            normalize_ddl("CREATE TABLE `t` (`a` int DEFAULT NEXT VALUE FOR `test`.`seq`)"),
            "CREATE TABLE `t` (`a` int DEFAULT nextval(`test`.`seq`))"
        );
        assert_eq!(
            normalize_ddl(
                "CREATE ALGORITHM=UNDEFINED DEFINER=`root`@`%` SQL SECURITY DEFINER VIEW `v` (`a`) AS SELECT `a` FROM `t`"
            ),
            "CREATE VIEW `v` (`a`) AS SELECT `a` FROM `t`"
        );
        assert_eq!(normalize_ddl("CREATE TABLE t (a int)"), "CREATE TABLE t (a int)");
    }

    #[test]
    fn test_ddl_dependencies() {
        let own = TableName::new("test", "t");
        let deps = extract_ddl_dependencies(
            "CREATE TABLE `t` (`a` int DEFAULT NEXT VALUE FOR `seq`)",
            &own,
        );
        assert_eq!(deps, names(&[("test", "seq")]));

        let own = TableName::new("test", "v");
        let deps = extract_ddl_dependencies(
            "CREATE ALGORITHM=UNDEFINED DEFINER=`root`@`%` SQL SECURITY DEFINER VIEW `v` (`a`) AS SELECT `a` FROM `other`.`t`",
            &own,
        );
        assert_eq!(deps, names(&[("other", "t")]));
    }

    #[test]
    fn test_lexical_fallback() {
        let own = TableName::new("test", "t");
        // 解析器不支持的语法，退化为按关键字匹配
        let deps = extract_ddl_dependencies(
            "CREATE TABLE `t` LIKE `test2`.`t2` /*!UNSUPPORTED*/ PLACEMENT POLICY=`p1` ???",
            &own,
        );
        assert_eq!(deps, names(&[("test2", "t2")]));
    }

    #[test]
    fn test_mem_or_sys_table() {
        assert!(is_mem_or_sys_table(&TableName::new("INFORMATION_SCHEMA", "tables")));
        assert!(is_mem_or_sys_table(&TableName::new("mysql", "user")));
        assert!(is_mem_or_sys_db("metrics_schema"));
        assert!(!is_mem_or_sys_table(&TableName::new("test", "t")));
    }

    #[test]
    fn test_table_name_display() {
        assert_eq!(TableName::new("db", "t`1").to_string(), "`db`.`t``1`");
    }
}
