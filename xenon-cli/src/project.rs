//! xenon.json 项目配置加载
//!
//! 项目模式下编译入口和编译器选项来自项目文件，命令行参数优先。

use std::path::{Path, PathBuf};

use serde::Deserialize;

/// xenon.json 结构
#[derive(Debug, Deserialize)]
pub struct ProjectFile {
    /// 入口源文件，相对项目文件所在目录
    pub entry: String,
    #[serde(default)]
    pub compiler: ProjectCompiler,
}

/// 编译器相关的项目选项
#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct ProjectCompiler {
    /// 产物中去掉调试行号表
    pub strip_debug: bool,
    /// 编译后打印反汇编
    pub dump_bytecode: bool,
    /// 日志级别: "silent", "error", "warn", "info", "debug", "trace"
    pub log_level: Option<String>,
}

#[derive(Debug, thiserror::Error)]
pub enum ProjectError {
    #[error("cannot read '{path}': {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("'{path}' is not a valid project file: {source}")]
    Malformed {
        path: PathBuf,
        source: serde_json::Error,
    },
}

impl ProjectFile {
    pub fn load(path: &Path) -> Result<Self, ProjectError> {
        let text = std::fs::read_to_string(path).map_err(|source| ProjectError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        serde_json::from_str(&text).map_err(|source| ProjectError::Malformed {
            path: path.to_path_buf(),
            source,
        })
    }

    /// 入口文件的实际路径，相对项目文件所在目录解析
    pub fn entry_path(&self, project_path: &Path) -> PathBuf {
        match project_path.parent() {
            Some(dir) => dir.join(&self.entry),
            None => PathBuf::from(&self.entry),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_minimal_project() {
        let p: ProjectFile = serde_json::from_str(r#"{"entry": "main.xn"}"#).unwrap();
        assert_eq!(p.entry, "main.xn");
        assert!(!p.compiler.strip_debug);
        assert!(p.compiler.log_level.is_none());
    }

    #[test]
    fn test_parse_full_project() {
        let text = r#"{
            "entry": "src/app.xn",
            "compiler": {"strip_debug": true, "dump_bytecode": true, "log_level": "debug"}
        }"#;
        let p: ProjectFile = serde_json::from_str(text).unwrap();
        assert!(p.compiler.strip_debug);
        assert_eq!(p.compiler.log_level.as_deref(), Some("debug"));
    }

    #[test]
    fn test_entry_path_relative_to_project_dir() {
        let p: ProjectFile = serde_json::from_str(r#"{"entry": "main.xn"}"#).unwrap();
        let resolved = p.entry_path(Path::new("proj/xenon.json"));
        assert_eq!(resolved, PathBuf::from("proj/main.xn"));
    }
}
