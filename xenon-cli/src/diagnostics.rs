//! 编译诊断输出
//!
//! 把编译错误连同源码上下文打印到 stderr。

use std::path::Path;

use xenon_compiler::CompileError;

/// 错误发生的位置；resolver 与 emitter 只有行号
pub fn position(error: &CompileError) -> Option<(u32, Option<u32>)> {
    match error {
        CompileError::Lex(e) => Some((e.coordinate.line, Some(e.coordinate.column))),
        CompileError::Parse(e) => Some((e.coordinate.line, Some(e.coordinate.column))),
        CompileError::Resolve(e) => Some((e.line, None)),
        CompileError::Emit(e) => Some((e.line, None)),
    }
}

/// 打印诊断：错误本体、文件位置和一段源码上下文
pub fn print_compile_error(error: &CompileError, path: &Path, source: &str) {
    eprintln!("error: {error}");
    match position(error) {
        Some((line, Some(column))) => {
            eprintln!("  --> {}:{line}:{column}", path.display());
            print_source_context(source, line as usize, Some(column as usize));
        }
        Some((line, None)) => {
            eprintln!("  --> {}:{line}", path.display());
            print_source_context(source, line as usize, None);
        }
        None => {}
    }
}

const CONTEXT_LINES: usize = 2;

/// 打印错误行前后的源码，错误列位置下加 `^` 标记
pub fn print_source_context(source: &str, error_line: usize, error_col: Option<usize>) {
    let lines: Vec<&str> = source.lines().collect();
    if error_line == 0 || error_line > lines.len() {
        return;
    }

    let start = error_line.saturating_sub(CONTEXT_LINES).max(1);
    let end = (error_line + CONTEXT_LINES).min(lines.len());
    let width = end.to_string().len();

    for n in start..=end {
        eprintln!("{n:>width$} | {}", lines[n - 1]);
        if n == error_line {
            if let Some(col) = error_col {
                eprintln!("{:>width$} | {}^", "", " ".repeat(col.saturating_sub(1)));
            }
        }
    }
}
