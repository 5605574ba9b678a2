//! xenonc - XenonScript 编译器前端
//!
//! 把 `.xn` 源文件编译成 `.xnb` 模块。入口来自命令行参数，或者
//! 没有参数时来自当前目录的 `xenon.json` 项目文件。
//!
//! 退出码：0 成功，1 编译错误，2 I/O 错误。

use std::path::{Path, PathBuf};
use std::process;

use clap::Parser;
use xenon_cli::diagnostics::print_compile_error;
use xenon_cli::logging::{self, LogConfig, LogFormat};
use xenon_cli::natives::host_globals;
use xenon_cli::project::ProjectFile;
use xenon_compiler::{compile_source, CompileOptions};
use xenon_module::{write_module, WriteOptions};

const EXIT_COMPILE_ERROR: i32 = 1;
const EXIT_IO_ERROR: i32 = 2;

#[derive(Parser)]
#[command(
    name = "xenonc",
    about = "XenonScript compiler - compiles .xn sources to .xnb modules",
    version
)]
struct Cli {
    /// Source file to compile (default: entry from ./xenon.json)
    input: Option<PathBuf>,

    /// Output path (default: input with .xnb extension)
    #[arg(short, long, value_name = "FILE")]
    output: Option<PathBuf>,

    /// Omit debug line tables from the output module
    #[arg(long)]
    strip_debug: bool,

    /// Print the disassembled module after compiling
    #[arg(long)]
    dump_bytecode: bool,

    /// Log level: silent, error, warn, info, debug, trace
    #[arg(long, default_value = "warn")]
    log_level: String,

    /// Log format: pretty, compact, json
    #[arg(long, default_value = "compact")]
    log_format: String,
}

fn main() {
    let cli = Cli::parse();
    process::exit(run(cli));
}

fn run(mut cli: Cli) -> i32 {
    // 无输入参数时走项目模式
    let input = match &cli.input {
        Some(path) => path.clone(),
        None => {
            let project_path = Path::new("xenon.json");
            let project = match ProjectFile::load(project_path) {
                Ok(p) => p,
                Err(e) => {
                    eprintln!("error: {e}");
                    return EXIT_IO_ERROR;
                }
            };
            cli.strip_debug |= project.compiler.strip_debug;
            cli.dump_bytecode |= project.compiler.dump_bytecode;
            if let Some(level) = &project.compiler.log_level {
                cli.log_level = level.clone();
            }
            project.entry_path(project_path)
        }
    };

    let Some(global) = logging::level_from_str(&cli.log_level) else {
        eprintln!("error: unknown log level '{}'", cli.log_level);
        return EXIT_IO_ERROR;
    };
    let Some(format) = LogFormat::parse(&cli.log_format) else {
        eprintln!("error: unknown log format '{}'", cli.log_format);
        return EXIT_IO_ERROR;
    };
    logging::init(
        &LogConfig {
            global,
            overrides: Vec::new(),
        },
        format,
    );

    let source = match std::fs::read_to_string(&input) {
        Ok(s) => s,
        Err(e) => {
            eprintln!("error: cannot read '{}': {e}", input.display());
            return EXIT_IO_ERROR;
        }
    };

    let options = CompileOptions {
        host_globals: host_globals(),
    };
    let module = match compile_source(&source, &options) {
        Ok(m) => m,
        Err(e) => {
            print_compile_error(&e, &input, &source);
            return EXIT_COMPILE_ERROR;
        }
    };

    if cli.dump_bytecode {
        println!("{}", module.disassemble());
    }

    let bytes = match write_module(
        &module,
        WriteOptions {
            emit_debug_info: !cli.strip_debug,
        },
    ) {
        Ok(b) => b,
        Err(e) => {
            eprintln!("error: {e}");
            return EXIT_COMPILE_ERROR;
        }
    };

    let output = cli
        .output
        .unwrap_or_else(|| input.with_extension("xnb"));
    if let Err(e) = std::fs::write(&output, &bytes) {
        eprintln!("error: cannot write '{}': {e}", output.display());
        return EXIT_IO_ERROR;
    }
    0
}
