//! 语句摘要中的参数回填
//!
//! 执行计划缓存命中的语句在摘要表中形如
//! `SELECT * FROM t WHERE a IN (?, ?) [arguments: (1, 2)]`，
//! 需要把参数代回占位符才能得到可执行的语句

const ARGUMENTS_PREFIX: &str = " [arguments: ";

/// 把 `[arguments: ...]` 中的参数依次代回 `?` 占位符
///
/// 不带参数后缀的 SQL 原样返回。字符串字面量中的 `?` 不会被替换，
/// 参数中括号或引号内的 `, ` 不会被当作分隔符。
pub fn interpolate_arguments(sql: &str) -> String {
    let Some(index) = sql.find(ARGUMENTS_PREFIX) else {
        return sql.to_string();
    };
    let Some(last) = sql.rfind(']') else {
        return sql.to_string();
    };
    let args_start = index + ARGUMENTS_PREFIX.len();
    if last < args_start {
        return sql.to_string();
    }

    let template = &sql[..index];
    let mut args_str = &sql[args_start..last];
    if args_str.len() >= 2 && args_str.starts_with('(') && args_str.ends_with(')') {
        args_str = &args_str[1..args_str.len() - 1];
    }

    let args = split_arguments(args_str);
    fill_placeholders(template, &args)
}

/// 按顶层的 `, ` 拆分参数
fn split_arguments(input: &str) -> Vec<&str> {
    let bytes = input.as_bytes();
    let mut args = Vec::new();
    let mut depth = 0usize;
    let mut quote: Option<u8> = None;
    let mut start = 0;
    let mut i = 0;

    while i < bytes.len() {
        let b = bytes[i];
        match quote {
            Some(q) => {
                if b == b'\\' {
                    i += 1;
                } else if b == q {
                    quote = None;
                }
            }
            None => match b {
                b'\'' | b'"' => quote = Some(b),
                b'(' => depth += 1,
                b')' => depth = depth.saturating_sub(1),
                b',' if depth == 0 && bytes.get(i + 1) == Some(&b' ') => {
                    args.push(&input[start..i]);
                    start = i + 2;
                    i += 1;
                }
                _ => {}
            },
        }
        i += 1;
    }
    if start <= input.len() {
        args.push(&input[start..]);
    }
    args
}

/// 依次替换字符串字面量之外的 `?`，参数不足时保留剩余占位符
fn fill_placeholders(template: &str, args: &[&str]) -> String {
    let mut out = String::with_capacity(template.len() + args.iter().map(|a| a.len()).sum::<usize>());
    let mut args = args.iter();
    let mut quote: Option<char> = None;
    let mut escaped = false;

    for c in template.chars() {
        match quote {
            Some(q) => {
                if escaped {
                    escaped = false;
                } else if c == '\\' {
                    escaped = true;
                } else if c == q {
                    quote = None;
                }
                out.push(c);
            }
            None => match c {
                '\'' | '"' | '`' => {
                    quote = Some(c);
                    out.push(c);
                }
                '?' => match args.next() {
                    Some(arg) => out.push_str(arg),
                    None => out.push(c),
                },
                _ => out.push(c),
            },
        }
    }
    out
}
