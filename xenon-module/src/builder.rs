//! 指令流构建器
//!
//! 发射器按后序遍历写入指令；跳转先占位、随后 patch。
//! 构建器同时模拟求值栈深度，得到函数的 max_stack 供加载时预分配。

use crate::function::LineTable;
use crate::opcode::OpCode;

/// 单个函数的指令流构建器
#[derive(Debug, Default)]
pub struct CodeBuilder {
    code: Vec<u8>,
    lines: LineTable,
    cur_stack: i32,
    max_stack: i32,
}

impl CodeBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// 当前代码位置（计算跳转用）
    pub fn current_offset(&self) -> usize {
        self.code.len()
    }

    /// 模拟出的最大栈深度
    pub fn max_stack(&self) -> u16 {
        self.max_stack.max(0) as u16
    }

    pub fn into_parts(self) -> (Vec<u8>, LineTable) {
        (self.code, self.lines)
    }

    /// 写入无操作数指令
    pub fn write_op(&mut self, op: OpCode, line: u32) {
        self.lines.push(self.code.len() as u32, line);
        self.code.push(op as u8);
        self.track(op, 0);
    }

    /// 写入带 u8 操作数的指令
    pub fn write_op_u8(&mut self, op: OpCode, operand: u8, line: u32) {
        self.lines.push(self.code.len() as u32, line);
        self.code.push(op as u8);
        self.code.push(operand);
        self.track(op, operand as u16);
    }

    /// 写入带 u16 操作数的指令
    pub fn write_op_u16(&mut self, op: OpCode, operand: u16, line: u32) {
        self.lines.push(self.code.len() as u32, line);
        self.code.push(op as u8);
        self.code.extend_from_slice(&operand.to_le_bytes());
        self.track(op, operand);
    }

    /// 写入前向跳转占位，返回操作数位置供 patch_jump 使用
    pub fn write_jump(&mut self, op: OpCode, line: u32) -> usize {
        self.lines.push(self.code.len() as u32, line);
        self.code.push(op as u8);
        let operand_at = self.code.len();
        self.code.extend_from_slice(&(-1i16).to_le_bytes());
        self.track(op, 0);
        operand_at
    }

    /// 修补前向跳转：偏移以操作数之后的位置为基准
    ///
    /// 返回 false 表示跳转距离超出 i16（发射器据此报 JumpTooFar）。
    #[must_use]
    pub fn patch_jump(&mut self, operand_at: usize) -> bool {
        let jump = self.code.len() - (operand_at + 2);
        if jump > i16::MAX as usize {
            return false;
        }
        let bytes = (jump as i16).to_le_bytes();
        self.code[operand_at] = bytes[0];
        self.code[operand_at + 1] = bytes[1];
        true
    }

    /// 写入循环回跳到 loop_start
    #[must_use]
    pub fn write_loop(&mut self, loop_start: usize, line: u32) -> bool {
        self.lines.push(self.code.len() as u32, line);
        self.code.push(OpCode::JumpBack as u8);
        // +2 为 i16 操作数自身
        let offset = self.code.len() + 2 - loop_start;
        if offset > i16::MAX as usize {
            return false;
        }
        self.code
            .extend_from_slice(&(-(offset as i16)).to_le_bytes());
        true
    }

    /// 栈深度模拟
    fn track(&mut self, op: OpCode, operand: u16) {
        use OpCode::*;
        let delta: i32 = match op {
            PushConst | PushNull | PushTrue | PushFalse | PushFunc | Dup | LoadLocal
            | LoadLocalCell | LoadUpvalue | LoadGlobal | MakeClosure => 1,
            Pop | StoreLocal | StoreLocalCell | NewCell | StoreUpvalue | StoreGlobal
            | DefineGlobal | JumpIfFalse | ReturnValue | Throw | IndexGet => -1,
            Add | Sub | Mul | Div | Mod | Equal | NotEqual | Less | LessEqual | Greater
            | GreaterEqual => -1,
            Call => -(operand as i32),
            NewArray => 1 - operand as i32,
            NewMap => 1 - 2 * operand as i32,
            IndexSet => -2,
            _ => 0,
        };
        // handler 入口在 try 进入深度上压入异常值
        if op == PushTry {
            self.max_stack = self.max_stack.max(self.cur_stack + 1);
        }
        self.cur_stack = (self.cur_stack + delta).max(0);
        self.max_stack = self.max_stack.max(self.cur_stack);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_write_and_patch_jump() {
        let mut b = CodeBuilder::new();
        b.write_op(OpCode::PushTrue, 1);
        let j = b.write_jump(OpCode::JumpIfFalse, 1);
        b.write_op(OpCode::PushNull, 1);
        b.write_op(OpCode::Pop, 1);
        assert!(b.patch_jump(j));

        let (code, _) = b.into_parts();
        // JumpIfFalse 操作数 = 跳过 PushNull + Pop 共 2 字节
        let jump = i16::from_le_bytes([code[2], code[3]]);
        assert_eq!(jump, 2);
    }

    #[test]
    fn test_write_loop_negative_offset() {
        let mut b = CodeBuilder::new();
        let start = b.current_offset();
        b.write_op(OpCode::Nop, 1);
        assert!(b.write_loop(start, 1));

        let (code, _) = b.into_parts();
        let jump = i16::from_le_bytes([code[2], code[3]]);
        // 回跳越过操作数(2) + JumpBack(1) + Nop(1)
        assert_eq!(jump, -4);
    }

    #[test]
    fn test_max_stack_tracking() {
        let mut b = CodeBuilder::new();
        b.write_op_u16(OpCode::PushConst, 0, 1);
        b.write_op_u16(OpCode::PushConst, 1, 1);
        b.write_op_u16(OpCode::PushConst, 2, 1);
        b.write_op(OpCode::Add, 1);
        b.write_op(OpCode::Add, 1);
        b.write_op(OpCode::ReturnValue, 1);
        assert_eq!(b.max_stack(), 3);
    }

    #[test]
    fn test_call_stack_effect() {
        let mut b = CodeBuilder::new();
        b.write_op_u16(OpCode::PushFunc, 0, 1); // 被调者
        b.write_op(OpCode::PushNull, 1); // 实参 1
        b.write_op(OpCode::PushNull, 1); // 实参 2
        b.write_op_u8(OpCode::Call, 2, 1);
        b.write_op(OpCode::ReturnValue, 1);
        assert_eq!(b.max_stack(), 3);
    }
}
