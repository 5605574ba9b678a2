//! Xenon Module - 可移植字节码模块格式
//!
//! 编译器产出 [`Module`]，经 [`writer::write_module`] 序列化为 .xnb 文件；
//! 运行时通过 [`Module::from_bytes`] 加载并校验。加载是全有或全无的：
//! 魔数/版本/校验和/边界检查任一失败都不会产生部分可用的模块。
//!
//! 模块一旦加载即不可变，可经 `Arc<Module>` 在多个 VM 实例间只读共享。

pub mod builder;
pub mod constant;
pub mod function;
pub mod loader;
pub mod module;
pub mod opcode;
pub mod verify;
pub mod writer;

pub use builder::CodeBuilder;
pub use constant::{Constant, ConstantKey};
pub use function::{FunctionRecord, LineTable, UpvalueDesc};
pub use loader::LoadError;
pub use module::Module;
pub use opcode::OpCode;
pub use writer::{write_module, WriteError, WriteOptions};

/// 文件魔数
pub const MAGIC: [u8; 4] = *b"XNBC";
/// 当前格式版本
pub const FORMAT_VERSION: u16 = 1;
/// 小端序标记（大端产出的文件读出来是 0x3412）
pub const ENDIAN_MARKER: u16 = 0x1234;
/// 文件头长度：magic(4) + version(2) + endian(2) + entry(2) + reserved(2) + checksum(32)
pub const HEADER_SIZE: usize = 44;
/// 校验和字段在文件头中的偏移
pub const CHECKSUM_OFFSET: usize = 12;
