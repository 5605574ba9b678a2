//! 堆对象

use std::collections::HashMap;

use crate::value::{Handle, Value};

/// 调用栈轨迹的一帧
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TraceFrame {
    pub function: String,
    pub line: u32,
}

impl std::fmt::Display for TraceFrame {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "at {} (line {})", self.function, self.line)
    }
}

/// 运行时抛出的内建异常
#[derive(Debug, Clone, PartialEq)]
pub struct ExceptionObj {
    /// 异常类别，如 TypeError / DivideByZeroError
    pub kind: String,
    pub message: String,
    /// 抛出点捕获的调用栈
    pub trace: Vec<TraceFrame>,
}

/// 闭包：函数表索引 + 捕获的 cell 句柄
#[derive(Debug, Clone, PartialEq)]
pub struct Closure {
    pub func: u16,
    pub upvalues: Vec<Handle>,
}

/// 堆对象变体
#[derive(Debug, Clone, PartialEq)]
pub enum HeapObj {
    Str(String),
    Array(Vec<Value>),
    /// 字符串键映射
    Map(HashMap<String, Value>),
    /// 被捕获局部的装箱
    Cell(Value),
    Closure(Closure),
    Exception(ExceptionObj),
    /// 纤程的脚本侧引用，id 指向调度器槽位
    Fiber(u32),
}

impl HeapObj {
    pub fn type_name(&self) -> &'static str {
        match self {
            HeapObj::Str(_) => "string",
            HeapObj::Array(_) => "array",
            HeapObj::Map(_) => "map",
            HeapObj::Cell(_) => "cell",
            HeapObj::Closure(_) => "function",
            HeapObj::Exception(_) => "exception",
            HeapObj::Fiber(_) => "fiber",
        }
    }

    /// 估算占用字节数，驱动 GC 触发阈值
    pub fn approximate_size(&self) -> usize {
        let base = std::mem::size_of::<HeapObj>();
        base + match self {
            HeapObj::Str(s) => s.capacity(),
            HeapObj::Array(v) => v.capacity() * std::mem::size_of::<Value>(),
            HeapObj::Map(m) => {
                m.len() * (std::mem::size_of::<Value>() + 24)
                    + m.keys().map(|k| k.capacity()).sum::<usize>()
            }
            HeapObj::Cell(_) => 0,
            HeapObj::Closure(c) => c.upvalues.capacity() * std::mem::size_of::<Handle>(),
            HeapObj::Exception(e) => {
                e.kind.capacity()
                    + e.message.capacity()
                    + e.trace.capacity() * std::mem::size_of::<TraceFrame>()
            }
            HeapObj::Fiber(_) => 0,
        }
    }
}
