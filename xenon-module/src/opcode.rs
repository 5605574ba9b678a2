//! 指令集定义
//!
//! 固定宽度编码：1 字节操作码 + 0/1/2 字节小端操作数。
//! 跳转偏移以操作数之后的位置为基准（与 patch_jump 的约定一致）。

/// 字节码操作码
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum OpCode {
    Nop = 0,

    // 常量与字面值
    PushConst,  // u16: 常量池索引
    PushNull,
    PushTrue,
    PushFalse,
    PushFunc,   // u16: 函数表索引（无捕获函数）

    // 栈管理
    Pop,
    Dup,

    // 局部变量
    LoadLocal,      // u8: 槽位
    StoreLocal,     // u8
    LoadLocalCell,  // u8: 槽位内是 Cell，读取其内容
    StoreLocalCell, // u8
    NewCell,        // u8: 把槽位的值装箱为 Cell（被捕获的局部变量）

    // upvalue
    LoadUpvalue,  // u8
    StoreUpvalue, // u8

    // 全局变量
    LoadGlobal,   // u16: 全局槽位
    StoreGlobal,  // u16
    DefineGlobal, // u16

    // 算术 / 逻辑
    Add,
    Sub,
    Mul,
    Div,
    Mod,
    Neg,
    Not,

    // 比较
    Equal,
    NotEqual,
    Less,
    LessEqual,
    Greater,
    GreaterEqual,

    // 控制流
    Jump,        // i16: 前向跳转
    JumpIfFalse, // i16: 弹出条件，假值跳转
    JumpBack,    // i16: 负向跳转（循环）

    // 调用
    Call, // u8: 实参个数
    Return,      // 返回 null
    ReturnValue, // 返回栈顶值
    MakeClosure, // u16: 函数表索引，捕获列表取自函数记录

    // 复合值
    NewArray, // u8: 元素个数
    NewMap,   // u8: 键值对个数
    IndexGet,
    IndexSet,

    // 异常
    Throw,
    PushTry, // u16: handler 的前向偏移
    PopTry,

    // 协作调度
    Yield,
}

/// 最大合法操作码值（验证器用）
pub const MAX_OPCODE: u8 = OpCode::Yield as u8;

impl OpCode {
    /// 操作数字节数
    pub fn operand_size(&self) -> usize {
        use OpCode::*;
        match self {
            PushConst | PushFunc | LoadGlobal | StoreGlobal | DefineGlobal | Jump
            | JumpIfFalse | JumpBack | MakeClosure | PushTry => 2,
            LoadLocal | StoreLocal | LoadLocalCell | StoreLocalCell | NewCell | LoadUpvalue
            | StoreUpvalue | Call | NewArray | NewMap => 1,
            _ => 0,
        }
    }

    /// 指令名（反汇编用）
    pub fn name(&self) -> &'static str {
        use OpCode::*;
        match self {
            Nop => "Nop",
            PushConst => "PushConst",
            PushNull => "PushNull",
            PushTrue => "PushTrue",
            PushFalse => "PushFalse",
            PushFunc => "PushFunc",
            Pop => "Pop",
            Dup => "Dup",
            LoadLocal => "LoadLocal",
            StoreLocal => "StoreLocal",
            LoadLocalCell => "LoadLocalCell",
            StoreLocalCell => "StoreLocalCell",
            NewCell => "NewCell",
            LoadUpvalue => "LoadUpvalue",
            StoreUpvalue => "StoreUpvalue",
            LoadGlobal => "LoadGlobal",
            StoreGlobal => "StoreGlobal",
            DefineGlobal => "DefineGlobal",
            Add => "Add",
            Sub => "Sub",
            Mul => "Mul",
            Div => "Div",
            Mod => "Mod",
            Neg => "Neg",
            Not => "Not",
            Equal => "Equal",
            NotEqual => "NotEqual",
            Less => "Less",
            LessEqual => "LessEqual",
            Greater => "Greater",
            GreaterEqual => "GreaterEqual",
            Jump => "Jump",
            JumpIfFalse => "JumpIfFalse",
            JumpBack => "JumpBack",
            Call => "Call",
            Return => "Return",
            ReturnValue => "ReturnValue",
            MakeClosure => "MakeClosure",
            NewArray => "NewArray",
            NewMap => "NewMap",
            IndexGet => "IndexGet",
            IndexSet => "IndexSet",
            Throw => "Throw",
            PushTry => "PushTry",
            PopTry => "PopTry",
            Yield => "Yield",
        }
    }

    /// 从字节解码；非法字节返回 None
    pub fn try_from_u8(byte: u8) -> Option<Self> {
        if byte > MAX_OPCODE {
            return None;
        }
        // repr(u8) 且值域连续，转换安全
        Some(unsafe { std::mem::transmute::<u8, OpCode>(byte) })
    }
}

impl From<u8> for OpCode {
    /// 仅供执行已验证代码的场景使用；非法字节视为 VM 缺陷
    fn from(byte: u8) -> Self {
        OpCode::try_from_u8(byte)
            .unwrap_or_else(|| panic!("vm bug: invalid opcode byte {:#04x}", byte))
    }
}
