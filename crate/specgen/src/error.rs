//! 生成器错误类型

use runtime_spec::UnknownValue;
use thiserror::Error;

pub type Result<T> = std::result::Result<T, Error>;

/// 命令行 token 无法转换为规范取值
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ParseError {
    /// 未知的枚举取值（动作、架构、操作符、能力、namespace 等）
    #[error("unrecognized {kind}: {token:?}")]
    Unrecognized { kind: &'static str, token: String },

    /// 格式错误的输入，例如 `host:container:size` 字段数不对或不是数字
    #[error("malformed {kind} {input:?}: {reason}")]
    Malformed {
        kind: &'static str,
        input: String,
        reason: String,
    },
}

impl ParseError {
    pub fn unrecognized(kind: &'static str, token: &str) -> Self {
        ParseError::Unrecognized {
            kind,
            token: token.to_string(),
        }
    }

    pub fn malformed(kind: &'static str, input: &str, reason: impl Into<String>) -> Self {
        ParseError::Malformed {
            kind,
            input: input.to_string(),
            reason: reason.into(),
        }
    }
}

impl From<UnknownValue> for ParseError {
    fn from(e: UnknownValue) -> Self {
        ParseError::Unrecognized {
            kind: e.kind,
            token: e.value,
        }
    }
}

/// 生成器错误
#[derive(Debug, Error)]
pub enum Error {
    #[error(transparent)]
    Parse(#[from] ParseError),

    /// 修改会破坏配置不变量
    #[error("invalid state: {0}")]
    InvalidState(String),

    #[error(transparent)]
    Io(#[from] std::io::Error),

    /// 模板 JSON 无法解码为配置树
    #[error("schema error: {0}")]
    Schema(#[from] serde_json::Error),
}

impl From<UnknownValue> for Error {
    fn from(e: UnknownValue) -> Self {
        Error::Parse(e.into())
    }
}

impl Error {
    pub fn invalid_state(msg: impl Into<String>) -> Self {
        Error::InvalidState(msg.into())
    }

    pub fn is_parse(&self) -> bool {
        matches!(self, Error::Parse(_))
    }

    pub fn is_invalid_state(&self) -> bool {
        matches!(self, Error::InvalidState(_))
    }
}
