//! xenon - XenonScript 运行时前端
//!
//! 加载 `.xnb` 模块，注册标准宿主函数，在根纤程上执行入口函数。
//!
//! 退出码：0 成功，2 I/O 错误，3 模块加载失败，4 未捕获脚本异常。

use std::path::PathBuf;
use std::process;
use std::sync::Arc;

use clap::Parser;
use xenon_base::std_platform;
use xenon_cli::logging::{self, LogConfig, LogFormat};
use xenon_cli::natives::register_host_natives;
use xenon_config::VmConfig;
use xenon_module::Module;
use xenon_runtime::{Vm, VmError};

const EXIT_IO_ERROR: i32 = 2;
const EXIT_LOAD_ERROR: i32 = 3;
const EXIT_SCRIPT_ERROR: i32 = 4;

#[derive(Parser)]
#[command(
    name = "xenon",
    about = "XenonScript runtime - executes compiled .xnb modules",
    version
)]
struct Cli {
    /// Compiled module to run
    module: PathBuf,

    /// Arguments passed to the script as the `args` global
    #[arg(trailing_var_arg = true)]
    script_args: Vec<String>,

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

fn run(cli: Cli) -> i32 {
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

    let bytes = match std::fs::read(&cli.module) {
        Ok(b) => b,
        Err(e) => {
            eprintln!("error: cannot read '{}': {e}", cli.module.display());
            return EXIT_IO_ERROR;
        }
    };

    let module = match Module::from_bytes(&bytes) {
        Ok(m) => m,
        Err(e) => {
            eprintln!("error: cannot load '{}': {e}", cli.module.display());
            return EXIT_LOAD_ERROR;
        }
    };

    let platform = std_platform();
    let mut vm = Vm::new(Arc::new(module), VmConfig::default(), platform.clone());
    register_host_natives(&mut vm, platform);

    // 脚本参数以字符串数组注入 `args` 全局
    let arg_values: Vec<_> = cli
        .script_args
        .iter()
        .map(|s| vm.alloc_string(s.clone()))
        .collect();
    let args_array = vm.alloc_array(arg_values);
    vm.set_global("args", args_array);

    match vm.run_to_completion() {
        Ok(_) => 0,
        Err(VmError::UnhandledException(e)) => {
            eprintln!("unhandled exception: {e}");
            EXIT_SCRIPT_ERROR
        }
        Err(e) => {
            eprintln!("error: {e}");
            EXIT_SCRIPT_ERROR
        }
    }
}
