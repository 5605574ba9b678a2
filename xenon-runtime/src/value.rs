//! 运行时值模型
//!
//! Value 是 Copy 的带标签联合：原生类型内联，堆对象通过带代数的
//! 句柄引用。句柄在回收后代数失配，悬垂访问得到 None 而非未定义
//! 行为。

/// 堆句柄：槽位索引 + 分配代数
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Handle {
    pub(crate) index: u32,
    pub(crate) generation: u32,
}

impl Handle {
    pub fn index(&self) -> u32 {
        self.index
    }
}

/// 脚本值
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Value {
    Null,
    Bool(bool),
    Int(i64),
    Float(f64),
    /// 堆上的字符串（相等按内容，见 VM）
    Str(Handle),
    /// 其他堆对象（相等按身份）
    Obj(Handle),
    /// 无捕获的纯函数，函数表索引
    Func(u16),
    /// 原生函数注册表索引
    Native(u32),
}

impl Value {
    /// 真值判定：null 和 false 为假，其余为真
    pub fn is_truthy(&self) -> bool {
        !matches!(self, Value::Null | Value::Bool(false))
    }

    /// 类型名，用于错误消息
    pub fn type_name(&self) -> &'static str {
        match self {
            Value::Null => "null",
            Value::Bool(_) => "bool",
            Value::Int(_) => "int",
            Value::Float(_) => "float",
            Value::Str(_) => "string",
            Value::Obj(_) => "object",
            Value::Func(_) => "function",
            Value::Native(_) => "native function",
        }
    }

    pub fn handle(&self) -> Option<Handle> {
        match self {
            Value::Str(h) | Value::Obj(h) => Some(*h),
            _ => None,
        }
    }
}
