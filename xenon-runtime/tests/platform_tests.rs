//! 多虚拟机并行执行
//!
//! 模块是不可变的，经 Arc 在平台线程间共享；每个线程持有自己的
//! 虚拟机实例、堆和纤程。宿主侧汇总用基础库的锁类型。

use std::sync::Arc;

use xenon_base::{std_platform, Mutex, RwLock};
use xenon_compiler::{compile_source, CompileOptions};
use xenon_config::VmConfig;
use xenon_module::{write_module, Module, WriteOptions};
use xenon_runtime::{Value, Vm};

fn load(source: &str) -> Arc<Module> {
    let options = CompileOptions {
        host_globals: vec!["seed".to_string()],
    };
    let module = compile_source(source, &options).expect("compile failed");
    let bytes = write_module(&module, WriteOptions::default()).expect("write failed");
    Arc::new(Module::from_bytes(&bytes).expect("load failed"))
}

#[test]
fn test_module_shared_across_vm_threads() {
    let module = load(
        r#"
            var acc = 0;
            for (var i = 1; i <= 100; i = i + 1) {
                acc = acc + i * seed;
            }
        "#,
    );

    let platform = std_platform();
    let results: Arc<Mutex<Vec<i64>>> = Arc::new(Mutex::new(Vec::new()));

    let handles: Vec<_> = (1..=4i64)
        .map(|seed| {
            let module = module.clone();
            let platform = platform.clone();
            let results = results.clone();
            let worker = platform.clone();
            worker.spawn_thread(
                &format!("vm-{seed}"),
                Box::new(move || {
                    let mut vm = Vm::new(module, VmConfig::default(), platform);
                    vm.set_global("seed", Value::Int(seed));
                    vm.run_to_completion().expect("script faulted");
                    let Some(Value::Int(acc)) = vm.global("acc") else {
                        panic!("acc not set");
                    };
                    results.lock().push(acc);
                    0
                }),
            )
        })
        .collect();
    for handle in handles {
        assert_eq!(handle.join(), 0);
    }

    let mut totals = results.lock().clone();
    totals.sort();
    assert_eq!(totals, vec![5050, 10100, 15150, 20200]);
}

#[test]
fn test_shared_readonly_config_under_rwlock() {
    let limits = Arc::new(RwLock::new(VmConfig::default()));
    let platform = std_platform();

    let handles: Vec<_> = (0..3)
        .map(|i| {
            let limits = limits.clone();
            platform.spawn_thread(
                &format!("reader-{i}"),
                Box::new(move || {
                    let config = limits.read().clone();
                    if config.limits.max_frames > 0 {
                        0
                    } else {
                        1
                    }
                }),
            )
        })
        .collect();
    for handle in handles {
        assert_eq!(handle.join(), 0);
    }
}
