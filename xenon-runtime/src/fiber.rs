//! 纤程
//!
//! 每个纤程自带值栈、调用帧栈和 try 区域栈。调度完全协作式：
//! 只有 Yield 指令或执行结束会交还控制权。纤程归调度器所有，
//! 脚本一侧只持有不透明的引用对象。

use crate::value::{Handle, Value};

/// 纤程状态
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FiberStatus {
    /// 可被 resume
    Suspended,
    Running,
    Completed,
    /// 异常未被捕获而终止
    Faulted,
}

impl FiberStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            FiberStatus::Suspended => "suspended",
            FiberStatus::Running => "running",
            FiberStatus::Completed => "completed",
            FiberStatus::Faulted => "faulted",
        }
    }
}

/// 一次 resume 的结果
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum FiberOutcome {
    /// 执行到 Yield，携带产出值
    Yielded(Value),
    /// 入口帧返回，携带返回值
    Completed(Value),
}

/// 调用帧
#[derive(Debug, Clone)]
pub struct Frame {
    /// 函数表索引
    pub func: u16,
    /// 下一条待取指令的偏移
    pub ip: usize,
    /// 本帧局部区在值栈上的起点
    pub base: usize,
    /// 闭包对象句柄（普通函数调用为 None）
    pub closure: Option<Handle>,
}

/// 打开的 try 区域
#[derive(Debug, Clone, Copy)]
pub struct TryRegion {
    /// 属于哪一帧（帧栈索引）
    pub frame_index: usize,
    /// handler 入口偏移
    pub handler_ip: usize,
    /// 进入 try 时的值栈深度，unwind 时恢复
    pub stack_len: usize,
}

#[derive(Debug)]
pub struct Fiber {
    pub id: u32,
    pub stack: Vec<Value>,
    pub frames: Vec<Frame>,
    pub tries: Vec<TryRegion>,
    pub status: FiberStatus,
    /// 上次因 Yield 挂起，下次 resume 要把恢复值压栈
    pub pending_resume: bool,
}

impl Fiber {
    pub fn new(id: u32) -> Self {
        Self {
            id,
            stack: Vec::new(),
            frames: Vec::new(),
            tries: Vec::new(),
            status: FiberStatus::Suspended,
            pending_resume: false,
        }
    }

    /// GC 根：栈上所有值加上各帧持有的闭包
    pub fn roots(&self, mut visit: impl FnMut(Handle)) {
        for value in &self.stack {
            if let Some(handle) = value.handle() {
                visit(handle);
            }
        }
        for frame in &self.frames {
            if let Some(handle) = frame.closure {
                visit(handle);
            }
        }
    }
}
