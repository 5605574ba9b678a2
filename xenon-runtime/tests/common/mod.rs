//! 测试辅助工具
//!
//! 端到端执行：编译源码、序列化、再从字节加载后运行。每次都走完整
//! 的 emit → write → load 链路，顺带覆盖二进制格式的行为等价性。

use std::cell::RefCell;
use std::rc::Rc;
use std::sync::Arc;

use xenon_base::std_platform;
use xenon_compiler::{compile_source, CompileOptions};
use xenon_config::VmConfig;
use xenon_module::{write_module, Module, WriteOptions};
use xenon_runtime::{Value, Vm, VmError};

/// 一次端到端执行的结果
pub struct ExecResult {
    pub vm: Vm,
    pub outcome: Result<Value, VmError>,
    /// print/println 捕获的输出行
    pub printed: Rc<RefCell<Vec<String>>>,
}

impl ExecResult {
    pub fn global(&self, name: &str) -> Value {
        self.vm
            .global(name)
            .unwrap_or_else(|| panic!("global '{name}' not set"))
    }

    pub fn printed_lines(&self) -> Vec<String> {
        self.printed.borrow().clone()
    }
}

/// 编译并执行一段脚本，print/println 输出被捕获而不是写到 stdout
pub fn run_code(source: &str) -> ExecResult {
    run_code_with_config(source, VmConfig::default())
}

pub fn run_code_with_config(source: &str, config: VmConfig) -> ExecResult {
    let options = CompileOptions {
        host_globals: vec!["print".to_string(), "println".to_string()],
    };
    let module = compile_source(source, &options).expect("compile failed");
    let bytes = write_module(&module, WriteOptions::default()).expect("write failed");
    let loaded = Module::from_bytes(&bytes).expect("load failed");

    let mut vm = Vm::new(Arc::new(loaded), config, std_platform());
    let printed: Rc<RefCell<Vec<String>>> = Rc::new(RefCell::new(Vec::new()));

    let sink = printed.clone();
    vm.register_native("print", move |ctx, args| {
        let parts: Vec<String> = args.iter().map(|v| ctx.display(*v)).collect();
        sink.borrow_mut().push(parts.join(" "));
        Ok(Value::Null)
    });
    let sink = printed.clone();
    vm.register_native("println", move |ctx, args| {
        let parts: Vec<String> = args.iter().map(|v| ctx.display(*v)).collect();
        sink.borrow_mut().push(parts.join(" "));
        Ok(Value::Null)
    });

    let outcome = vm.run_to_completion();
    ExecResult {
        vm,
        outcome,
        printed,
    }
}
