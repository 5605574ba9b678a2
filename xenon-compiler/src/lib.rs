//! Xenon 编译器
//!
//! 四遍流水线：词法（[`lexer`]）、语法（[`parser`]）、名字解析
//! （[`resolver`]）、发射（[`emitter`]），产出 [`xenon_module::Module`]。
//! 各遍独立成模块，错误类型各自携带位置信息，统一收拢为
//! [`CompileError`]。

pub mod ast;
pub mod emitter;
pub mod lexer;
pub mod parser;
pub mod resolver;
pub mod token;

pub use emitter::{emit, EmitError};
pub use lexer::{tokenize, LexError};
pub use parser::{parse, ParseError};
pub use resolver::{resolve, Annotations, ResolveError};

use tracing::debug;
use xenon_module::Module;

/// 编译任一阶段的错误
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum CompileError {
    #[error("lex error: {0}")]
    Lex(#[from] LexError),
    #[error("parse error: {0}")]
    Parse(#[from] ParseError),
    #[error("resolve error: {0}")]
    Resolve(#[from] ResolveError),
    #[error("emit error: {0}")]
    Emit(#[from] EmitError),
}

/// 编译选项
#[derive(Debug, Clone, Default)]
pub struct CompileOptions {
    /// 宿主预注册的全局名，脚本可直接引用（原生函数等）
    pub host_globals: Vec<String>,
}

/// 从源文本编译出一个完整模块
pub fn compile_source(source: &str, options: &CompileOptions) -> Result<Module, CompileError> {
    let tokens = tokenize(source)?;
    let program = parse(tokens)?;
    let annotations = resolve(&program, &options.host_globals)?;
    let module = emit(&program, &annotations)?;
    debug!(
        target: "xenon::emitter",
        functions = module.functions.len(),
        globals = module.global_names.len(),
        "compilation finished"
    );
    Ok(module)
}
