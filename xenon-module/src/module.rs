//! 模块的内存表示与反汇编

use crate::constant::Constant;
use crate::function::FunctionRecord;
use crate::opcode::OpCode;
use crate::FORMAT_VERSION;

/// 已加载（或刚发射完）的字节码模块
///
/// 加载完成后不再变更；运行时以 `Arc<Module>` 只读共享。
#[derive(Debug, Clone, PartialEq)]
pub struct Module {
    /// 全局变量名表（槽位按声明顺序）
    pub global_names: Vec<String>,
    /// 常量池
    pub constants: Vec<Constant>,
    /// 函数表
    pub functions: Vec<FunctionRecord>,
    /// 入口函数索引（arity 必须为 0）
    pub entry: u16,
    /// 格式版本
    pub version: u16,
}

impl Module {
    pub fn new(
        global_names: Vec<String>,
        constants: Vec<Constant>,
        functions: Vec<FunctionRecord>,
        entry: u16,
    ) -> Self {
        Self {
            global_names,
            constants,
            functions,
            entry,
            version: FORMAT_VERSION,
        }
    }

    pub fn entry_function(&self) -> &FunctionRecord {
        &self.functions[self.entry as usize]
    }

    /// 反汇编整个模块为文本（调试 / --dump-bytecode 用）
    pub fn disassemble(&self) -> String {
        let mut out = String::new();
        out.push_str(&format!(
            "== module: {} globals, {} constants, {} functions, entry #{} ==\n",
            self.global_names.len(),
            self.constants.len(),
            self.functions.len(),
            self.entry
        ));
        for (i, name) in self.global_names.iter().enumerate() {
            out.push_str(&format!("global [{:3}] {}\n", i, name));
        }
        for (i, constant) in self.constants.iter().enumerate() {
            out.push_str(&format!("const  [{:3}] {}\n", i, constant));
        }
        for (i, func) in self.functions.iter().enumerate() {
            out.push_str(&format!(
                "\n-- fn #{} {} (arity {}, locals {}, max_stack {}, upvalues {}) --\n",
                i,
                func.name,
                func.arity,
                func.local_count,
                func.max_stack,
                func.upvalues.len()
            ));
            let mut offset = 0;
            while offset < func.code.len() {
                offset = self.disassemble_instruction(func, offset, &mut out);
            }
        }
        out
    }

    /// 反汇编单条指令，返回下一条指令的偏移
    fn disassemble_instruction(
        &self,
        func: &FunctionRecord,
        offset: usize,
        out: &mut String,
    ) -> usize {
        let line = func.lines.line_for_offset(offset as u32);
        let line_info = if offset > 0
            && func.lines.line_for_offset(offset as u32 - 1) == line
        {
            "   | ".to_string()
        } else {
            format!("{:4} ", line)
        };

        let op = match OpCode::try_from_u8(func.code[offset]) {
            Some(op) => op,
            None => {
                out.push_str(&format!(
                    "{:04} {}Unknown opcode {:#04x}\n",
                    offset, line_info, func.code[offset]
                ));
                return offset + 1;
            }
        };

        match op.operand_size() {
            0 => {
                out.push_str(&format!("{:04} {}{}\n", offset, line_info, op.name()));
                offset + 1
            }
            1 => {
                let operand = func.code[offset + 1];
                out.push_str(&format!(
                    "{:04} {}{} {}\n",
                    offset,
                    line_info,
                    op.name(),
                    operand
                ));
                offset + 2
            }
            _ => {
                let raw = [func.code[offset + 1], func.code[offset + 2]];
                match op {
                    OpCode::Jump | OpCode::JumpIfFalse | OpCode::JumpBack => {
                        let jump = i16::from_le_bytes(raw);
                        let target = (offset as isize + 3 + jump as isize) as usize;
                        out.push_str(&format!(
                            "{:04} {}{} {} (to {})\n",
                            offset,
                            line_info,
                            op.name(),
                            jump,
                            target
                        ));
                    }
                    OpCode::PushTry => {
                        let operand = u16::from_le_bytes(raw);
                        let target = offset + 3 + operand as usize;
                        out.push_str(&format!(
                            "{:04} {}{} {} (handler {})\n",
                            offset,
                            line_info,
                            op.name(),
                            operand,
                            target
                        ));
                    }
                    OpCode::PushConst => {
                        let idx = u16::from_le_bytes(raw);
                        out.push_str(&format!(
                            "{:04} {}{} {:3} {}\n",
                            offset,
                            line_info,
                            op.name(),
                            idx,
                            self.constants[idx as usize]
                        ));
                    }
                    OpCode::PushFunc | OpCode::MakeClosure => {
                        let idx = u16::from_le_bytes(raw);
                        out.push_str(&format!(
                            "{:04} {}{} {:3} <{}>\n",
                            offset,
                            line_info,
                            op.name(),
                            idx,
                            self.functions[idx as usize].name
                        ));
                    }
                    OpCode::LoadGlobal | OpCode::StoreGlobal | OpCode::DefineGlobal => {
                        let idx = u16::from_le_bytes(raw);
                        out.push_str(&format!(
                            "{:04} {}{} {:3} ({})\n",
                            offset,
                            line_info,
                            op.name(),
                            idx,
                            self.global_names[idx as usize]
                        ));
                    }
                    _ => {
                        let operand = u16::from_le_bytes(raw);
                        out.push_str(&format!(
                            "{:04} {}{} {}\n",
                            offset,
                            line_info,
                            op.name(),
                            operand
                        ));
                    }
                }
                offset + 3
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::function::LineTable;

    fn tiny_module() -> Module {
        let func = FunctionRecord {
            name: "<main>".to_string(),
            arity: 0,
            local_count: 0,
            max_stack: 1,
            upvalues: Vec::new(),
            code: vec![
                OpCode::PushConst as u8,
                0,
                0,
                OpCode::ReturnValue as u8,
            ],
            lines: LineTable::from_runs(vec![(0, 1)]),
        };
        Module::new(
            vec!["answer".to_string()],
            vec![Constant::Int(42)],
            vec![func],
            0,
        )
    }

    #[test]
    fn test_disassemble_mentions_constant() {
        let text = tiny_module().disassemble();
        assert!(text.contains("PushConst"));
        assert!(text.contains("42"));
        assert!(text.contains("<main>"));
    }

    #[test]
    fn test_entry_function() {
        let m = tiny_module();
        assert_eq!(m.entry_function().name, "<main>");
    }
}
