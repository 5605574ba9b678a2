//! 宿主原生函数
//!
//! `xenon` 运行时前端注册的标准宿主函数。`xenonc` 编译时要把同一批
//! 名字作为宿主全局传给 resolver，两端必须一致。

use std::io::Write;
use std::sync::Arc;

use xenon_base::Platform;
use xenon_runtime::{FiberOutcome, NativeError, Value, Vm};

/// 编译与运行两端共享的宿主全局名
///
/// `args` 不是函数，是运行时注入的命令行参数数组。
pub const HOST_GLOBALS: &[&str] = &[
    "print",
    "println",
    "clock_ms",
    "fiber_spawn",
    "fiber_resume",
    "fiber_status",
    "args",
];

pub fn host_globals() -> Vec<String> {
    HOST_GLOBALS.iter().map(|s| s.to_string()).collect()
}

/// 注册标准宿主函数
pub fn register_host_natives(vm: &mut Vm, platform: Arc<dyn Platform>) {
    vm.register_native("print", |ctx, args| {
        let parts: Vec<String> = args.iter().map(|v| ctx.display(*v)).collect();
        print!("{}", parts.join(" "));
        let _ = std::io::stdout().flush();
        Ok(Value::Null)
    });

    vm.register_native("println", |ctx, args| {
        let parts: Vec<String> = args.iter().map(|v| ctx.display(*v)).collect();
        println!("{}", parts.join(" "));
        Ok(Value::Null)
    });

    vm.register_native("clock_ms", move |_, args| {
        if !args.is_empty() {
            return Err(NativeError::arity("clock_ms", 0, args.len()));
        }
        Ok(Value::Int(platform.clock().now().as_millis() as i64))
    });

    vm.register_native("fiber_spawn", |ctx, args| match args {
        [callee] => ctx.spawn_fiber(*callee),
        _ => Err(NativeError::arity("fiber_spawn", 1, args.len())),
    });

    vm.register_native("fiber_resume", |ctx, args| {
        let (fiber, resume_value) = match args {
            [f] => (*f, Value::Null),
            [f, v] => (*f, *v),
            _ => return Err(NativeError::arity("fiber_resume", 2, args.len())),
        };
        let id = ctx
            .fiber_id(fiber)
            .ok_or_else(|| NativeError::new("TypeError", "fiber_resume expects a fiber"))?;
        match ctx.resume_fiber(id, resume_value) {
            Ok(FiberOutcome::Yielded(v)) => Ok(v),
            Ok(FiberOutcome::Completed(v)) => Ok(v),
            Err(e) => Err(NativeError::new("FiberError", e.to_string())),
        }
    });

    vm.register_native("fiber_status", |ctx, args| {
        let fiber = match args {
            [f] => *f,
            _ => return Err(NativeError::arity("fiber_status", 1, args.len())),
        };
        let id = ctx
            .fiber_id(fiber)
            .ok_or_else(|| NativeError::new("TypeError", "fiber_status expects a fiber"))?;
        let text = match ctx.fiber_status(id) {
            Some(status) => status.as_str(),
            None => "discarded",
        };
        Ok(ctx.alloc_string(text))
    });
}

#[cfg(test)]
mod tests {
    use super::*;
    use xenon_base::std_platform;
    use xenon_compiler::{compile_source, CompileOptions};
    use xenon_config::VmConfig;

    fn vm_with_natives(source: &str) -> Vm {
        let module = compile_source(
            source,
            &CompileOptions {
                host_globals: host_globals(),
            },
        )
        .unwrap();
        let platform = std_platform();
        let mut vm = Vm::new(Arc::new(module), VmConfig::default(), platform.clone());
        register_host_natives(&mut vm, platform);
        vm
    }

    #[test]
    fn test_clock_ms_returns_int() {
        let mut vm = vm_with_natives("var t = clock_ms();");
        vm.run_to_completion().unwrap();
        assert!(matches!(vm.global("t"), Some(Value::Int(n)) if n >= 0));
    }

    #[test]
    fn test_fiber_natives_round_trip() {
        let source = r#"
            function gen() {
                yield 10;
                return 20;
            }
            var f = fiber_spawn(gen);
            var first = fiber_resume(f);
            var mid = fiber_status(f);
            var second = fiber_resume(f);
            var last = fiber_status(f);
        "#;
        let mut vm = vm_with_natives(source);
        vm.run_to_completion().unwrap();
        assert_eq!(vm.global("first"), Some(Value::Int(10)));
        assert_eq!(vm.global("second"), Some(Value::Int(20)));
        let mid = vm.global("mid").unwrap();
        assert_eq!(vm.display_value(mid), "suspended");
        let last = vm.global("last").unwrap();
        assert_eq!(vm.display_value(last), "completed");
    }

    #[test]
    fn test_fiber_resume_on_non_fiber_is_catchable() {
        let source = r#"
            var r = 0;
            try {
                fiber_resume(42);
            } catch (e) {
                r = 1;
            }
        "#;
        let mut vm = vm_with_natives(source);
        vm.run_to_completion().unwrap();
        assert_eq!(vm.global("r"), Some(Value::Int(1)));
    }
}
