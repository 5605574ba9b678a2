//! 模块二进制加载与校验
//!
//! 加载顺序: 头部检查（magic / endian / version / checksum）-> 载荷解码
//! -> 字节码静态验证（见 [`crate::verify`]）。
//! 任何一步失败都拒绝整个模块，不做部分加载。

use crate::constant::Constant;
use crate::function::{FunctionRecord, LineTable, UpvalueDesc};
use crate::module::Module;
use crate::{CHECKSUM_OFFSET, ENDIAN_MARKER, FORMAT_VERSION, HEADER_SIZE, MAGIC};

/// 模块加载失败
#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum LoadError {
    /// 字节流结构非法（magic 错、越界、索引非法、字节码验证失败等）
    #[error("malformed module: {0}")]
    MalformedModule(String),
    /// 格式版本不被当前运行时支持
    #[error("unsupported module format version {found} (expected {expected})")]
    UnsupportedVersion { found: u16, expected: u16 },
    /// 校验和不匹配，载荷被破坏
    #[error("corrupt module: payload checksum mismatch")]
    CorruptModule,
}

impl LoadError {
    fn malformed(msg: impl Into<String>) -> Self {
        Self::MalformedModule(msg.into())
    }
}

/// 小端字节流读取器，所有读取都做边界检查
struct ByteReader<'a> {
    bytes: &'a [u8],
    pos: usize,
}

impl<'a> ByteReader<'a> {
    fn new(bytes: &'a [u8]) -> Self {
        Self { bytes, pos: 0 }
    }

    fn take(&mut self, n: usize, what: &str) -> Result<&'a [u8], LoadError> {
        let end = self
            .pos
            .checked_add(n)
            .filter(|&end| end <= self.bytes.len())
            .ok_or_else(|| {
                LoadError::malformed(format!(
                    "unexpected end of stream reading {} at offset {}",
                    what, self.pos
                ))
            })?;
        let slice = &self.bytes[self.pos..end];
        self.pos = end;
        Ok(slice)
    }

    fn read_u8(&mut self, what: &str) -> Result<u8, LoadError> {
        Ok(self.take(1, what)?[0])
    }

    fn read_u16(&mut self, what: &str) -> Result<u16, LoadError> {
        let b = self.take(2, what)?;
        Ok(u16::from_le_bytes([b[0], b[1]]))
    }

    fn read_u32(&mut self, what: &str) -> Result<u32, LoadError> {
        let b = self.take(4, what)?;
        Ok(u32::from_le_bytes([b[0], b[1], b[2], b[3]]))
    }

    fn read_i64(&mut self, what: &str) -> Result<i64, LoadError> {
        let b = self.take(8, what)?;
        let mut raw = [0u8; 8];
        raw.copy_from_slice(b);
        Ok(i64::from_le_bytes(raw))
    }

    fn read_f64(&mut self, what: &str) -> Result<f64, LoadError> {
        let b = self.take(8, what)?;
        let mut raw = [0u8; 8];
        raw.copy_from_slice(b);
        Ok(f64::from_le_bytes(raw))
    }

    fn read_str(&mut self, len: usize, what: &str) -> Result<String, LoadError> {
        let b = self.take(len, what)?;
        String::from_utf8(b.to_vec())
            .map_err(|_| LoadError::malformed(format!("{} is not valid utf-8", what)))
    }

    fn is_done(&self) -> bool {
        self.pos == self.bytes.len()
    }
}

impl Module {
    /// 从完整的二进制镜像解析并验证一个模块
    pub fn from_bytes(bytes: &[u8]) -> Result<Self, LoadError> {
        if bytes.len() < HEADER_SIZE {
            return Err(LoadError::malformed(format!(
                "module too short: {} bytes",
                bytes.len()
            )));
        }

        let mut header = ByteReader::new(&bytes[..HEADER_SIZE]);
        let magic = header.take(4, "magic")?;
        if magic != MAGIC {
            return Err(LoadError::malformed("bad magic number"));
        }
        let version = header.read_u16("version")?;
        if version != FORMAT_VERSION {
            return Err(LoadError::UnsupportedVersion {
                found: version,
                expected: FORMAT_VERSION,
            });
        }
        let endian = header.read_u16("endian marker")?;
        if endian != ENDIAN_MARKER {
            return Err(LoadError::malformed("bad endian marker"));
        }
        let entry = header.read_u16("entry index")?;
        let _reserved = header.read_u16("reserved")?;
        debug_assert_eq!(header.pos, CHECKSUM_OFFSET);
        let stored_checksum = header.take(32, "checksum")?;

        let payload = &bytes[HEADER_SIZE..];
        let actual = blake3::hash(payload);
        if stored_checksum != actual.as_bytes() {
            return Err(LoadError::CorruptModule);
        }

        let mut reader = ByteReader::new(payload);
        let global_names = read_global_names(&mut reader)?;
        let constants = read_constants(&mut reader)?;
        let functions = read_functions(&mut reader)?;
        if !reader.is_done() {
            return Err(LoadError::malformed(format!(
                "{} trailing bytes after function table",
                payload.len() - reader.pos
            )));
        }

        if functions.is_empty() {
            return Err(LoadError::malformed("module has no functions"));
        }
        if (entry as usize) >= functions.len() {
            return Err(LoadError::malformed(format!(
                "entry index {} out of range ({} functions)",
                entry,
                functions.len()
            )));
        }
        if functions[entry as usize].arity != 0 {
            return Err(LoadError::malformed("entry function must take no arguments"));
        }

        let module = Module {
            global_names,
            constants,
            functions,
            entry,
            version,
        };
        crate::verify::verify_module(&module)?;

        tracing::debug!(
            target: "xenon::loader",
            functions = module.functions.len(),
            constants = module.constants.len(),
            globals = module.global_names.len(),
            "module loaded and verified"
        );
        Ok(module)
    }
}

fn read_global_names(reader: &mut ByteReader<'_>) -> Result<Vec<String>, LoadError> {
    let count = reader.read_u16("global count")?;
    let mut names = Vec::with_capacity(count as usize);
    for _ in 0..count {
        let len = reader.read_u16("global name length")?;
        names.push(reader.read_str(len as usize, "global name")?);
    }
    Ok(names)
}

fn read_constants(reader: &mut ByteReader<'_>) -> Result<Vec<Constant>, LoadError> {
    let count = reader.read_u16("constant count")?;
    let mut constants = Vec::with_capacity(count as usize);
    for _ in 0..count {
        let tag = reader.read_u8("constant tag")?;
        let constant = match tag {
            1 => Constant::Int(reader.read_i64("int constant")?),
            2 => Constant::Float(reader.read_f64("float constant")?),
            3 => {
                let len = reader.read_u32("string constant length")?;
                Constant::Str(reader.read_str(len as usize, "string constant")?)
            }
            other => {
                return Err(LoadError::malformed(format!(
                    "unknown constant tag {}",
                    other
                )))
            }
        };
        constants.push(constant);
    }
    Ok(constants)
}

fn read_functions(reader: &mut ByteReader<'_>) -> Result<Vec<FunctionRecord>, LoadError> {
    let count = reader.read_u16("function count")?;
    let mut functions = Vec::with_capacity(count as usize);
    for _ in 0..count {
        let name_len = reader.read_u16("function name length")?;
        let name = reader.read_str(name_len as usize, "function name")?;
        let arity = reader.read_u8("arity")?;
        let local_count = reader.read_u8("local count")?;
        let max_stack = reader.read_u16("max stack")?;
        if (arity as usize) > (local_count as usize) {
            return Err(LoadError::malformed(format!(
                "function {}: arity {} exceeds local count {}",
                name, arity, local_count
            )));
        }

        let upvalue_count = reader.read_u8("upvalue count")?;
        let mut upvalues = Vec::with_capacity(upvalue_count as usize);
        for _ in 0..upvalue_count {
            let flags = reader.read_u8("upvalue flags")?;
            if flags > 1 {
                return Err(LoadError::malformed(format!(
                    "function {}: bad upvalue flags {}",
                    name, flags
                )));
            }
            let index = reader.read_u8("upvalue index")?;
            upvalues.push(UpvalueDesc {
                from_parent_local: flags == 1,
                index,
            });
        }

        let code_len = reader.read_u32("code length")?;
        let code = reader.take(code_len as usize, "code")?.to_vec();

        let run_count = reader.read_u32("line run count")?;
        let mut runs = Vec::with_capacity(run_count as usize);
        let mut prev_offset: Option<u32> = None;
        for _ in 0..run_count {
            let offset = reader.read_u32("line run offset")?;
            let line = reader.read_u32("line run line")?;
            if let Some(prev) = prev_offset {
                if offset <= prev {
                    return Err(LoadError::malformed(format!(
                        "function {}: line table offsets not strictly increasing",
                        name
                    )));
                }
            }
            prev_offset = Some(offset);
            runs.push((offset, line));
        }

        functions.push(FunctionRecord {
            name,
            arity,
            local_count,
            max_stack,
            upvalues,
            code,
            lines: LineTable::from_runs(runs),
        });
    }
    Ok(functions)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::builder::CodeBuilder;
    use crate::opcode::OpCode;
    use crate::writer::{write_module, WriteOptions};

    fn tiny_module() -> Module {
        let mut builder = CodeBuilder::new();
        builder.write_op_u16(OpCode::PushConst, 0, 1);
        builder.write_op(OpCode::ReturnValue, 1);
        let max_stack = builder.max_stack();
        let (code, lines) = builder.into_parts();
        let func = FunctionRecord {
            name: "<main>".to_string(),
            arity: 0,
            local_count: 0,
            max_stack,
            upvalues: Vec::new(),
            code,
            lines,
        };
        Module::new(
            vec!["answer".to_string()],
            vec![Constant::Int(7)],
            vec![func],
            0,
        )
    }

    fn tiny_bytes() -> Vec<u8> {
        write_module(&tiny_module(), WriteOptions::default()).unwrap()
    }

    #[test]
    fn test_round_trip() {
        let module = tiny_module();
        let loaded = Module::from_bytes(&tiny_bytes()).unwrap();
        assert_eq!(loaded, module);
    }

    #[test]
    fn test_bad_magic() {
        let mut bytes = tiny_bytes();
        bytes[0] = b'?';
        assert!(matches!(
            Module::from_bytes(&bytes),
            Err(LoadError::MalformedModule(_))
        ));
    }

    #[test]
    fn test_unsupported_version() {
        let mut bytes = tiny_bytes();
        bytes[4] = 0xff;
        bytes[5] = 0xff;
        // 重算校验和无关紧要，版本检查在校验和之前
        assert_eq!(
            Module::from_bytes(&bytes),
            Err(LoadError::UnsupportedVersion {
                found: 0xffff,
                expected: FORMAT_VERSION
            })
        );
    }

    #[test]
    fn test_bad_endian_marker() {
        let mut bytes = tiny_bytes();
        bytes[6] ^= 0xff;
        assert!(matches!(
            Module::from_bytes(&bytes),
            Err(LoadError::MalformedModule(_))
        ));
    }

    #[test]
    fn test_flipped_payload_byte_is_corrupt() {
        let mut bytes = tiny_bytes();
        let last = bytes.len() - 1;
        bytes[last] ^= 0x01;
        assert_eq!(Module::from_bytes(&bytes), Err(LoadError::CorruptModule));
    }

    #[test]
    fn test_truncated_module() {
        let bytes = tiny_bytes();
        assert!(matches!(
            Module::from_bytes(&bytes[..HEADER_SIZE - 1]),
            Err(LoadError::MalformedModule(_))
        ));
    }

    #[test]
    fn test_entry_out_of_range() {
        let mut module = tiny_module();
        module.entry = 9;
        let bytes = write_module(&module, WriteOptions::default()).unwrap();
        assert!(matches!(
            Module::from_bytes(&bytes),
            Err(LoadError::MalformedModule(_))
        ));
    }
}
