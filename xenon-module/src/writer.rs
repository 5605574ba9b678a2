//! 模块二进制序列化
//!
//! 布局（全部小端）:
//!   头部 44 字节: magic(4) + version(u16) + endian(u16) + entry(u16)
//!                 + reserved(u16) + blake3 校验和(32)
//!   载荷: 全局名表、常量池、函数表
//!
//! 校验和只覆盖载荷，头部自身不参与计算。

use crate::constant::Constant;
use crate::function::FunctionRecord;
use crate::module::Module;
use crate::{CHECKSUM_OFFSET, ENDIAN_MARKER, FORMAT_VERSION, HEADER_SIZE, MAGIC};

/// 序列化过程中超出格式可表达范围时的错误
#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum WriteError {
    #[error("too many {what}: {count} (limit {limit})")]
    TooMany {
        what: &'static str,
        count: usize,
        limit: usize,
    },
    #[error("string too long: {len} bytes (limit {limit})")]
    StringTooLong { len: usize, limit: usize },
}

/// 序列化配置
#[derive(Debug, Clone, Copy)]
pub struct WriteOptions {
    /// 为 false 时不写行号表（--strip-debug）
    pub emit_debug_info: bool,
}

impl Default for WriteOptions {
    fn default() -> Self {
        Self {
            emit_debug_info: true,
        }
    }
}

/// 把模块序列化为完整的二进制镜像
pub fn write_module(module: &Module, options: WriteOptions) -> Result<Vec<u8>, WriteError> {
    let mut payload = Vec::new();
    write_global_names(&mut payload, &module.global_names)?;
    write_constants(&mut payload, &module.constants)?;
    write_functions(&mut payload, &module.functions, options)?;

    let checksum = blake3::hash(&payload);

    let mut out = Vec::with_capacity(HEADER_SIZE + payload.len());
    out.extend_from_slice(&MAGIC);
    out.extend_from_slice(&FORMAT_VERSION.to_le_bytes());
    out.extend_from_slice(&ENDIAN_MARKER.to_le_bytes());
    out.extend_from_slice(&module.entry.to_le_bytes());
    out.extend_from_slice(&0u16.to_le_bytes());
    debug_assert_eq!(out.len(), CHECKSUM_OFFSET);
    out.extend_from_slice(checksum.as_bytes());
    debug_assert_eq!(out.len(), HEADER_SIZE);
    out.extend_from_slice(&payload);

    tracing::debug!(
        target: "xenon::loader",
        payload_len = payload.len(),
        functions = module.functions.len(),
        "module serialized"
    );
    Ok(out)
}

fn check_count(what: &'static str, count: usize) -> Result<u16, WriteError> {
    u16::try_from(count).map_err(|_| WriteError::TooMany {
        what,
        count,
        limit: u16::MAX as usize,
    })
}

fn write_u16_str(out: &mut Vec<u8>, s: &str) -> Result<(), WriteError> {
    let len = u16::try_from(s.len()).map_err(|_| WriteError::StringTooLong {
        len: s.len(),
        limit: u16::MAX as usize,
    })?;
    out.extend_from_slice(&len.to_le_bytes());
    out.extend_from_slice(s.as_bytes());
    Ok(())
}

fn write_u32_str(out: &mut Vec<u8>, s: &str) -> Result<(), WriteError> {
    let len = u32::try_from(s.len()).map_err(|_| WriteError::StringTooLong {
        len: s.len(),
        limit: u32::MAX as usize,
    })?;
    out.extend_from_slice(&len.to_le_bytes());
    out.extend_from_slice(s.as_bytes());
    Ok(())
}

fn write_global_names(out: &mut Vec<u8>, names: &[String]) -> Result<(), WriteError> {
    let count = check_count("globals", names.len())?;
    out.extend_from_slice(&count.to_le_bytes());
    for name in names {
        write_u16_str(out, name)?;
    }
    Ok(())
}

fn write_constants(out: &mut Vec<u8>, constants: &[Constant]) -> Result<(), WriteError> {
    let count = check_count("constants", constants.len())?;
    out.extend_from_slice(&count.to_le_bytes());
    for constant in constants {
        out.push(constant.tag());
        match constant {
            Constant::Int(v) => out.extend_from_slice(&v.to_le_bytes()),
            Constant::Float(v) => out.extend_from_slice(&v.to_le_bytes()),
            Constant::Str(s) => write_u32_str(out, s)?,
        }
    }
    Ok(())
}

fn write_functions(
    out: &mut Vec<u8>,
    functions: &[FunctionRecord],
    options: WriteOptions,
) -> Result<(), WriteError> {
    let count = check_count("functions", functions.len())?;
    out.extend_from_slice(&count.to_le_bytes());
    for func in functions {
        write_u16_str(out, &func.name)?;
        out.push(func.arity);
        out.push(func.local_count);
        out.extend_from_slice(&func.max_stack.to_le_bytes());

        let upvalue_count = u8::try_from(func.upvalues.len()).map_err(|_| {
            WriteError::TooMany {
                what: "upvalues",
                count: func.upvalues.len(),
                limit: u8::MAX as usize,
            }
        })?;
        out.push(upvalue_count);
        for upvalue in &func.upvalues {
            out.push(u8::from(upvalue.from_parent_local));
            out.push(upvalue.index);
        }

        let code_len = u32::try_from(func.code.len()).map_err(|_| WriteError::TooMany {
            what: "code bytes",
            count: func.code.len(),
            limit: u32::MAX as usize,
        })?;
        out.extend_from_slice(&code_len.to_le_bytes());
        out.extend_from_slice(&func.code);

        let runs: &[(u32, u32)] = if options.emit_debug_info {
            func.lines.runs()
        } else {
            &[]
        };
        let run_count = u32::try_from(runs.len()).map_err(|_| WriteError::TooMany {
            what: "line runs",
            count: runs.len(),
            limit: u32::MAX as usize,
        })?;
        out.extend_from_slice(&run_count.to_le_bytes());
        for (offset, line) in runs {
            out.extend_from_slice(&offset.to_le_bytes());
            out.extend_from_slice(&line.to_le_bytes());
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::function::LineTable;
    use crate::opcode::OpCode;

    fn tiny_module() -> Module {
        let func = FunctionRecord {
            name: "<main>".to_string(),
            arity: 0,
            local_count: 0,
            max_stack: 1,
            upvalues: Vec::new(),
            code: vec![OpCode::PushNull as u8, OpCode::ReturnValue as u8],
            lines: LineTable::from_runs(vec![(0, 1)]),
        };
        Module::new(Vec::new(), Vec::new(), vec![func], 0)
    }

    #[test]
    fn test_header_layout() {
        let bytes = write_module(&tiny_module(), WriteOptions::default()).unwrap();
        assert_eq!(&bytes[0..4], &MAGIC);
        assert_eq!(
            u16::from_le_bytes([bytes[4], bytes[5]]),
            FORMAT_VERSION
        );
        assert_eq!(u16::from_le_bytes([bytes[6], bytes[7]]), ENDIAN_MARKER);
        assert_eq!(u16::from_le_bytes([bytes[8], bytes[9]]), 0);
        assert!(bytes.len() > HEADER_SIZE);
    }

    #[test]
    fn test_checksum_covers_payload() {
        let bytes = write_module(&tiny_module(), WriteOptions::default()).unwrap();
        let expected = blake3::hash(&bytes[HEADER_SIZE..]);
        assert_eq!(&bytes[CHECKSUM_OFFSET..HEADER_SIZE], expected.as_bytes());
    }

    #[test]
    fn test_strip_debug_drops_lines() {
        let module = tiny_module();
        let full = write_module(&module, WriteOptions::default()).unwrap();
        let stripped = write_module(
            &module,
            WriteOptions {
                emit_debug_info: false,
            },
        )
        .unwrap();
        assert!(stripped.len() < full.len());
    }
}
