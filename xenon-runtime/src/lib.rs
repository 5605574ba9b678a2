//! Xenon Runtime - 模块执行引擎
//!
//! 接收 `xenon-module` 的已验证模块并执行。包含带代差句柄的
//! 标记清除堆、协作式纤程调度和原生函数互操作层。
//!
//! 宿主的典型用法：
//! ```rust,ignore
//! use std::sync::Arc;
//! use xenon_base::std_platform;
//! use xenon_config::VmConfig;
//! use xenon_runtime::Vm;
//!
//! let mut vm = Vm::new(Arc::new(module), VmConfig::default(), std_platform());
//! vm.register_native("print", |ctx, args| { /* ... */ Ok(xenon_runtime::Value::Null) });
//! let result = vm.run_to_completion()?;
//! ```

pub mod error;
pub mod fiber;
pub mod heap;
pub mod interop;
pub mod object;
pub mod value;
pub mod vm;

pub use error::{ScriptError, VmError};
pub use fiber::{Fiber, FiberOutcome, FiberStatus};
pub use heap::{GcStats, Heap};
pub use interop::{NativeCtx, NativeError, NativeResult};
pub use object::{Closure, ExceptionObj, HeapObj, TraceFrame};
pub use value::{Handle, Value};
pub use vm::Vm;
