//! 原生互操作层
//!
//! 宿主以 `register_native` 注册原生函数，名字绑定到模块全局表
//! 中的同名槽位。原生函数通过 [`NativeCtx`] 访问堆、全局和纤程
//! 调度，返回值或错误；错误在 VM 一侧转为脚本异常，可被 try
//! 捕获。

use std::collections::HashMap;
use std::sync::Arc;

use crate::error::VmError;
use crate::fiber::{FiberOutcome, FiberStatus};
use crate::object::HeapObj;
use crate::value::{Handle, Value};
use crate::vm::Vm;

/// 原生函数返回的错误，VM 转为可捕获的脚本异常
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("{kind}: {message}")]
pub struct NativeError {
    pub kind: String,
    pub message: String,
}

impl NativeError {
    pub fn new(kind: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            kind: kind.into(),
            message: message.into(),
        }
    }

    /// 默认类别的便捷构造
    pub fn msg(message: impl Into<String>) -> Self {
        Self::new("NativeError", message)
    }

    /// 实参数量不符
    pub fn arity(name: &str, expected: usize, got: usize) -> Self {
        Self::new(
            "TypeError",
            format!("{name} expects {expected} argument(s), got {got}"),
        )
    }
}

pub type NativeResult = Result<Value, NativeError>;

/// 注册表条目。Arc 让调用时不必持有注册表的借用。
pub struct NativeRecord {
    pub name: String,
    pub func: Box<dyn Fn(&mut NativeCtx<'_>, &[Value]) -> NativeResult>,
}

pub type NativeRef = Arc<NativeRecord>;

/// 原生函数的执行上下文
pub struct NativeCtx<'a> {
    pub(crate) vm: &'a mut Vm,
}

impl NativeCtx<'_> {
    // ==================== 堆 ====================

    pub fn alloc_string(&mut self, s: impl Into<String>) -> Value {
        Value::Str(self.vm.heap.alloc_string(s))
    }

    pub fn alloc_array(&mut self, items: Vec<Value>) -> Value {
        Value::Obj(self.vm.heap.alloc(HeapObj::Array(items)))
    }

    pub fn alloc_map(&mut self, entries: HashMap<String, Value>) -> Value {
        Value::Obj(self.vm.heap.alloc(HeapObj::Map(entries)))
    }

    /// 解引用堆对象；句柄已失效时得到 None
    pub fn deref(&self, value: Value) -> Option<&HeapObj> {
        self.vm.heap.get(value.handle()?)
    }

    /// 读取字符串内容
    pub fn string_content(&self, value: Value) -> Option<&str> {
        match self.deref(value)? {
            HeapObj::Str(s) => Some(s.as_str()),
            _ => None,
        }
    }

    /// 值的人类可读渲染（print 等用）
    pub fn display(&self, value: Value) -> String {
        self.vm.display_value(value)
    }

    /// 钉住句柄，宿主跨回收持有时用
    pub fn pin(&mut self, handle: Handle) {
        self.vm.heap.pin(handle);
    }

    pub fn unpin(&mut self, handle: Handle) {
        self.vm.heap.unpin(handle);
    }

    // ==================== 全局 ====================

    pub fn global(&self, name: &str) -> Option<Value> {
        self.vm.global(name)
    }

    /// 写入已存在的全局槽位，名字不在模块全局表中时返回 false
    pub fn set_global(&mut self, name: &str, value: Value) -> bool {
        self.vm.set_global(name, value)
    }

    // ==================== 纤程 ====================

    /// 为可调用值创建新纤程，返回脚本侧引用
    pub fn spawn_fiber(&mut self, callee: Value) -> Result<Value, NativeError> {
        let id = self
            .vm
            .spawn_fiber(callee)
            .map_err(|e| NativeError::new("TypeError", e.to_string()))?;
        Ok(Value::Obj(self.vm.heap.alloc(HeapObj::Fiber(id))))
    }

    /// 从脚本值取纤程 id
    pub fn fiber_id(&self, value: Value) -> Option<u32> {
        match self.deref(value)? {
            HeapObj::Fiber(id) => Some(*id),
            _ => None,
        }
    }

    pub fn resume_fiber(&mut self, id: u32, value: Value) -> Result<FiberOutcome, VmError> {
        self.vm.resume(id, value)
    }

    pub fn fiber_status(&self, id: u32) -> Option<FiberStatus> {
        self.vm.fiber_status(id)
    }

    pub fn discard_fiber(&mut self, id: u32) -> Result<(), VmError> {
        self.vm.discard_fiber(id)
    }
}
