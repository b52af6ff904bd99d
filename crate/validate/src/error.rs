//! 校验器错误类型
//!
//! 这里只包含中止校验的错误；规范违例见 [`crate::specerror`]。

use std::path::PathBuf;

use thiserror::Error;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, Error)]
pub enum Error {
    #[error("config.json not found in bundle {0}")]
    ConfigNotFound(PathBuf),

    #[error("failed to access {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// config.json 无法解码为配置树
    #[error("schema error: {0}")]
    Schema(#[from] serde_json::Error),
}

impl Error {
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Error::Io {
            path: path.into(),
            source,
        }
    }
}
