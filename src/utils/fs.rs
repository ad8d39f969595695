// 文件系统工具
//
// 原子写入以及把任意字符串转换为安全的路径分量

use std::fmt::Write as _;
use std::path::{Path, PathBuf};

use crate::core::error::{PccError, PccResult};

const ESCAPED_EMPTY: &str = "empty-string";

/// 把字符串编码为可以安全用作单个路径分量的形式
///
/// 控制字符、路径分隔符、Windows 保留字符、`.` 和 `%` 编码为 `%XX`
pub fn escape_path(input: &str) -> String {
    if input.is_empty() {
        return ESCAPED_EMPTY.to_string();
    }

    let mut out = String::with_capacity(input.len());
    for c in input.chars() {
        let unsafe_char = c.is_control()
            || matches!(
                c,
                '/' | '\\' | ':' | '*' | '?' | '"' | '<' | '>' | '|' | '.' | '%'
            );
        if unsafe_char {
            let _ = write!(out, "%{:02X}", c as u32);
        } else {
            out.push(c);
        }
    }
    out
}

/// 原子写入：先写入同目录下的临时文件，再重命名为目标文件
///
/// 父目录不存在时自动创建
pub async fn atomic_write(path: &Path, content: &[u8]) -> PccResult<()> {
    if let Some(parent) = path.parent() {
        tokio::fs::create_dir_all(parent)
            .await
            .map_err(|e| PccError::Io(format!("创建目录 {} 失败: {}", parent.display(), e)))?;
    }

    let tmp = tmp_path(path);
    if let Err(e) = tokio::fs::write(&tmp, content).await {
        let _ = tokio::fs::remove_file(&tmp).await;
        return Err(PccError::Io(format!("写入 {} 失败: {}", tmp.display(), e)));
    }
    tokio::fs::rename(&tmp, path).await.map_err(|e| {
        PccError::Io(format!(
            "重命名 {} 为 {} 失败: {}",
            tmp.display(),
            path.display(),
            e
        ))
    })
}

fn tmp_path(path: &Path) -> PathBuf {
    let mut name = path.as_os_str().to_owned();
    name.push(format!(".tmp{}", rand::random::<u64>()));
    PathBuf::from(name)
}
