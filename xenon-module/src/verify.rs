//! 字节码静态验证
//!
//! 加载时对每个函数做一次完整解码: 操作码合法、操作数宽度完整、
//! 各类索引在界内、跳转落在指令边界上、代码以 Return 结尾。
//! 通过验证后运行时的分发循环不再做这些检查。

use crate::function::FunctionRecord;
use crate::loader::LoadError;
use crate::module::Module;
use crate::opcode::OpCode;

/// 对整个模块做静态验证
pub fn verify_module(module: &Module) -> Result<(), LoadError> {
    for func in &module.functions {
        verify_function(module, func)?;
    }
    Ok(())
}

fn err(func: &FunctionRecord, offset: usize, msg: impl std::fmt::Display) -> LoadError {
    LoadError::MalformedModule(format!(
        "function {} at offset {}: {}",
        func.name, offset, msg
    ))
}

fn verify_function(module: &Module, func: &FunctionRecord) -> Result<(), LoadError> {
    if func.code.is_empty() {
        return Err(LoadError::MalformedModule(format!(
            "function {}: empty code",
            func.name
        )));
    }

    // 第一遍: 解码每条指令，记录指令起始偏移和待检查的跳转
    let mut starts = vec![false; func.code.len() + 1];
    let mut jumps: Vec<(usize, isize)> = Vec::new();
    let mut last_op = OpCode::Nop;
    let mut offset = 0;
    while offset < func.code.len() {
        starts[offset] = true;
        let byte = func.code[offset];
        let op = OpCode::try_from_u8(byte)
            .ok_or_else(|| err(func, offset, format!("invalid opcode byte {:#04x}", byte)))?;
        let size = 1 + op.operand_size();
        if offset + size > func.code.len() {
            return Err(err(func, offset, "truncated operand"));
        }

        let u8_operand = || func.code[offset + 1];
        let u16_operand = || u16::from_le_bytes([func.code[offset + 1], func.code[offset + 2]]);
        let i16_operand = || i16::from_le_bytes([func.code[offset + 1], func.code[offset + 2]]);

        match op {
            OpCode::PushConst => {
                let idx = u16_operand() as usize;
                if idx >= module.constants.len() {
                    return Err(err(func, offset, format!("constant index {} out of range", idx)));
                }
            }
            OpCode::PushFunc => {
                let idx = u16_operand() as usize;
                if idx >= module.functions.len() {
                    return Err(err(func, offset, format!("function index {} out of range", idx)));
                }
            }
            OpCode::MakeClosure => {
                let idx = u16_operand() as usize;
                let target = module.functions.get(idx).ok_or_else(|| {
                    err(func, offset, format!("function index {} out of range", idx))
                })?;
                // 闭包的上值描述符引用的是当前函数的局部槽或上值槽
                for upvalue in &target.upvalues {
                    let in_range = if upvalue.from_parent_local {
                        (upvalue.index as usize) < (func.local_count as usize)
                    } else {
                        (upvalue.index as usize) < func.upvalues.len()
                    };
                    if !in_range {
                        return Err(err(
                            func,
                            offset,
                            format!(
                                "closure over {}: upvalue index {} out of range",
                                target.name, upvalue.index
                            ),
                        ));
                    }
                }
            }
            OpCode::LoadLocal
            | OpCode::StoreLocal
            | OpCode::LoadLocalCell
            | OpCode::StoreLocalCell
            | OpCode::NewCell => {
                let idx = u8_operand() as usize;
                if idx >= func.local_count as usize {
                    return Err(err(func, offset, format!("local slot {} out of range", idx)));
                }
            }
            OpCode::LoadUpvalue | OpCode::StoreUpvalue => {
                let idx = u8_operand() as usize;
                if idx >= func.upvalues.len() {
                    return Err(err(func, offset, format!("upvalue index {} out of range", idx)));
                }
            }
            OpCode::LoadGlobal | OpCode::StoreGlobal | OpCode::DefineGlobal => {
                let idx = u16_operand() as usize;
                if idx >= module.global_names.len() {
                    return Err(err(func, offset, format!("global slot {} out of range", idx)));
                }
            }
            OpCode::Jump | OpCode::JumpIfFalse => {
                jumps.push((offset, offset as isize + 3 + i16_operand() as isize));
            }
            OpCode::JumpBack => {
                let jump = i16_operand() as isize;
                if jump >= 0 {
                    return Err(err(func, offset, "JumpBack with non-negative offset"));
                }
                jumps.push((offset, offset as isize + 3 + jump));
            }
            OpCode::PushTry => {
                jumps.push((offset, offset as isize + 3 + u16_operand() as isize));
            }
            _ => {}
        }

        last_op = op;
        offset += size;
    }
    starts[func.code.len()] = true;

    if !matches!(last_op, OpCode::Return | OpCode::ReturnValue) {
        return Err(LoadError::MalformedModule(format!(
            "function {}: code does not end with a return",
            func.name
        )));
    }

    // 第二遍: 所有跳转目标必须是指令边界且在代码内
    for (offset, target) in jumps {
        let valid = usize::try_from(target)
            .ok()
            .filter(|&t| t < func.code.len() && starts[t])
            .is_some();
        if !valid {
            return Err(err(
                func,
                offset,
                format!("jump target {} is not an instruction boundary", target),
            ));
        }
    }

    tracing::trace!(
        target: "xenon::loader",
        function = %func.name,
        code_len = func.code.len(),
        "function verified"
    );
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::constant::Constant;
    use crate::function::LineTable;

    fn module_with_code(code: Vec<u8>, local_count: u8) -> Module {
        let func = FunctionRecord {
            name: "<main>".to_string(),
            arity: 0,
            local_count,
            max_stack: 4,
            upvalues: Vec::new(),
            code,
            lines: LineTable::new(),
        };
        Module::new(Vec::new(), vec![Constant::Int(1)], vec![func], 0)
    }

    #[test]
    fn test_accepts_simple_function() {
        let module = module_with_code(
            vec![
                OpCode::PushConst as u8,
                0,
                0,
                OpCode::ReturnValue as u8,
            ],
            0,
        );
        assert!(verify_module(&module).is_ok());
    }

    #[test]
    fn test_rejects_invalid_opcode() {
        let module = module_with_code(vec![0xfe, OpCode::Return as u8], 0);
        assert!(verify_module(&module).is_err());
    }

    #[test]
    fn test_rejects_truncated_operand() {
        let module = module_with_code(vec![OpCode::PushConst as u8, 0], 0);
        assert!(verify_module(&module).is_err());
    }

    #[test]
    fn test_rejects_constant_out_of_range() {
        let module = module_with_code(
            vec![OpCode::PushConst as u8, 9, 0, OpCode::ReturnValue as u8],
            0,
        );
        assert!(verify_module(&module).is_err());
    }

    #[test]
    fn test_rejects_local_out_of_range() {
        let module = module_with_code(
            vec![OpCode::LoadLocal as u8, 2, OpCode::ReturnValue as u8],
            2,
        );
        assert!(verify_module(&module).is_err());
    }

    #[test]
    fn test_rejects_jump_into_operand() {
        // Jump +1 落在 PushConst 的操作数中间
        let module = module_with_code(
            vec![
                OpCode::Jump as u8,
                1,
                0,
                OpCode::PushConst as u8,
                0,
                0,
                OpCode::ReturnValue as u8,
            ],
            0,
        );
        assert!(verify_module(&module).is_err());
    }

    #[test]
    fn test_rejects_missing_return() {
        let module = module_with_code(vec![OpCode::PushNull as u8, OpCode::Pop as u8], 0);
        assert!(verify_module(&module).is_err());
    }

    #[test]
    fn test_rejects_forward_jump_back() {
        let module = module_with_code(
            vec![
                OpCode::JumpBack as u8,
                1,
                0,
                OpCode::Return as u8,
            ],
            0,
        );
        assert!(verify_module(&module).is_err());
    }

    #[test]
    fn test_accepts_loop() {
        // offset 0: PushTrue; 1: JumpIfFalse +1 (to 7); 4: JumpBack -7 (to 0); 7: Return
        let module = module_with_code(
            vec![
                OpCode::PushTrue as u8,
                OpCode::JumpIfFalse as u8,
                3,
                0,
                OpCode::JumpBack as u8,
                0xf9,
                0xff,
                OpCode::Return as u8,
            ],
            0,
        );
        assert!(verify_module(&module).is_ok());
    }
}
