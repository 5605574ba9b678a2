//! 运行时错误类型

use crate::fiber::FiberStatus;
use crate::object::TraceFrame;

/// 未被脚本捕获的异常，携带抛出点的调用栈
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScriptError {
    pub message: String,
    pub trace: Vec<TraceFrame>,
}

impl std::fmt::Display for ScriptError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.message)?;
        for frame in &self.trace {
            write!(f, "\n    {}", frame)?;
        }
        Ok(())
    }
}

impl std::error::Error for ScriptError {}

/// 宿主一侧的 VM 错误
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum VmError {
    #[error("unhandled script exception: {0}")]
    UnhandledException(ScriptError),
    #[error("fiber {0} does not exist")]
    FiberNotFound(u32),
    #[error("fiber {id} is {status} and cannot be resumed", status = .status.as_str())]
    FiberNotResumable { id: u32, status: FiberStatus },
    #[error("value of type {0} is not callable")]
    NotCallable(&'static str),
    #[error("fiber entry takes {0} parameter(s), expected none")]
    FiberEntryArity(u8),
}
