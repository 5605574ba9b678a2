//! 虚拟机
//!
//! 栈式解释器。字节码在加载时已做静态验证，分发循环里不再检查
//! 操作码合法性或索引边界；运行期检查只剩类型、算术和容器边界，
//! 失败统一走脚本异常（可被 try 捕获）。
//!
//! 纤程归 VM 所有。resume 把纤程从槽位取出执行，遇到 Yield、
//! 入口帧返回或未捕获异常交还控制权。GC 安全点在调用与回跳边。

use std::sync::Arc;

use tracing::{debug, trace};
use xenon_base::Platform;
use xenon_config::VmConfig;
use xenon_module::{Constant, Module, OpCode};

use crate::error::{ScriptError, VmError};
use crate::fiber::{Fiber, FiberOutcome, FiberStatus, Frame, TryRegion};
use crate::heap::Heap;
use crate::interop::{NativeCtx, NativeError, NativeRecord, NativeRef, NativeResult};
use crate::object::{Closure, ExceptionObj, HeapObj, TraceFrame};
use crate::value::{Handle, Value};

enum FiberSlot {
    /// 已丢弃
    Vacant,
    /// 正在执行（被 resume 取出）
    Running,
    Parked(Fiber),
}

/// 数值二元运算的操作数配对
enum NumPair {
    Int(i64, i64),
    Float(f64, f64),
}

fn num_pair(a: Value, b: Value) -> Option<NumPair> {
    match (a, b) {
        (Value::Int(x), Value::Int(y)) => Some(NumPair::Int(x, y)),
        (Value::Int(x), Value::Float(y)) => Some(NumPair::Float(x as f64, y)),
        (Value::Float(x), Value::Int(y)) => Some(NumPair::Float(x, y as f64)),
        (Value::Float(x), Value::Float(y)) => Some(NumPair::Float(x, y)),
        _ => None,
    }
}

pub struct Vm {
    module: Arc<Module>,
    pub(crate) heap: Heap,
    /// 常量池的运行时形态，字符串已入堆（作为 GC 根常驻）
    constants: Vec<Value>,
    /// 全局槽位，None 表示尚未定义
    globals: Vec<Option<Value>>,
    /// 宿主追加的全局名，紧跟在模块全局表之后
    extra_global_names: Vec<String>,
    natives: Vec<NativeRef>,
    fibers: Vec<FiberSlot>,
    config: VmConfig,
    platform: Arc<dyn Platform>,
}

impl Vm {
    pub fn new(module: Arc<Module>, config: VmConfig, platform: Arc<dyn Platform>) -> Self {
        let mut heap = Heap::new(config.gc_threshold);
        let constants = module
            .constants
            .iter()
            .map(|c| match c {
                Constant::Int(v) => Value::Int(*v),
                Constant::Float(v) => Value::Float(*v),
                Constant::Str(s) => Value::Str(heap.alloc_string(s.clone())),
            })
            .collect();
        let globals = vec![None; module.global_names.len()];
        Self {
            module,
            heap,
            constants,
            globals,
            extra_global_names: Vec::new(),
            natives: Vec::new(),
            fibers: Vec::new(),
            config,
            platform,
        }
    }

    pub fn module(&self) -> &Arc<Module> {
        &self.module
    }

    // ==================== 宿主接口 ====================

    /// 注册原生函数并绑定到同名全局槽位
    ///
    /// 名字不在模块全局表中时追加一个宿主侧槽位，脚本引用不到，
    /// 但宿主仍可以通过 `global` 取回。
    pub fn register_native(
        &mut self,
        name: &str,
        func: impl Fn(&mut NativeCtx<'_>, &[Value]) -> NativeResult + 'static,
    ) {
        let index = self.natives.len() as u32;
        self.natives.push(Arc::new(NativeRecord {
            name: name.to_string(),
            func: Box::new(func),
        }));
        let slot = match self.global_index(name) {
            Some(slot) => slot,
            None => {
                self.extra_global_names.push(name.to_string());
                self.globals.push(None);
                self.globals.len() - 1
            }
        };
        self.globals[slot] = Some(Value::Native(index));
    }

    fn global_index(&self, name: &str) -> Option<usize> {
        if let Some(i) = self.module.global_names.iter().position(|n| n == name) {
            return Some(i);
        }
        self.extra_global_names
            .iter()
            .position(|n| n == name)
            .map(|i| self.module.global_names.len() + i)
    }

    pub fn global(&self, name: &str) -> Option<Value> {
        self.globals.get(self.global_index(name)?).copied().flatten()
    }

    /// 宿主侧字符串分配；在 set_global 前不会触发回收
    pub fn alloc_string(&mut self, s: impl Into<String>) -> Value {
        Value::Str(self.heap.alloc_string(s))
    }

    pub fn alloc_array(&mut self, items: Vec<Value>) -> Value {
        Value::Obj(self.heap.alloc(HeapObj::Array(items)))
    }

    pub fn set_global(&mut self, name: &str, value: Value) -> bool {
        match self.global_index(name) {
            Some(slot) => {
                self.globals[slot] = Some(value);
                true
            }
            None => false,
        }
    }

    /// 为入口函数创建主纤程
    pub fn spawn_entry(&mut self) -> Result<u32, VmError> {
        self.spawn_fiber(Value::Func(self.module.entry))
    }

    /// 运行入口函数直到完成；途中的 Yield 以 null 续跑
    pub fn run_to_completion(&mut self) -> Result<Value, VmError> {
        let main = self.spawn_entry()?;
        let mut resume_value = Value::Null;
        loop {
            match self.resume(main, resume_value)? {
                FiberOutcome::Completed(value) => return Ok(value),
                FiberOutcome::Yielded(_) => resume_value = Value::Null,
            }
        }
    }

    // ==================== 纤程调度 ====================

    /// 为零参可调用值创建挂起的纤程
    pub fn spawn_fiber(&mut self, callee: Value) -> Result<u32, VmError> {
        let (func_index, closure) = match callee {
            Value::Func(index) => (index, None),
            Value::Obj(handle) => match self.heap.get(handle) {
                Some(HeapObj::Closure(c)) => (c.func, Some(handle)),
                Some(obj) => return Err(VmError::NotCallable(obj.type_name())),
                None => return Err(VmError::NotCallable("dangling handle")),
            },
            other => return Err(VmError::NotCallable(other.type_name())),
        };
        let func = &self.module.functions[func_index as usize];
        if func.arity != 0 {
            return Err(VmError::FiberEntryArity(func.arity));
        }

        let id = self.fibers.len() as u32;
        let mut fiber = Fiber::new(id);
        fiber
            .stack
            .resize(func.local_count as usize, Value::Null);
        fiber.frames.push(Frame {
            func: func_index,
            ip: 0,
            base: 0,
            closure,
        });
        self.fibers.push(FiberSlot::Parked(fiber));
        trace!(target: "xenon::vm", fiber = id, function = %func.name, "fiber spawned");
        Ok(id)
    }

    pub fn fiber_status(&self, id: u32) -> Option<FiberStatus> {
        match self.fibers.get(id as usize)? {
            FiberSlot::Vacant => None,
            FiberSlot::Running => Some(FiberStatus::Running),
            FiberSlot::Parked(fiber) => Some(fiber.status),
        }
    }

    /// 丢弃一个挂起或结束的纤程，其栈上引用随之脱离根集合
    pub fn discard_fiber(&mut self, id: u32) -> Result<(), VmError> {
        let slot = self
            .fibers
            .get_mut(id as usize)
            .ok_or(VmError::FiberNotFound(id))?;
        match slot {
            FiberSlot::Vacant => Err(VmError::FiberNotFound(id)),
            FiberSlot::Running => Err(VmError::FiberNotResumable {
                id,
                status: FiberStatus::Running,
            }),
            FiberSlot::Parked(fiber) if fiber.status == FiberStatus::Running => {
                Err(VmError::FiberNotResumable {
                    id,
                    status: FiberStatus::Running,
                })
            }
            FiberSlot::Parked(_) => {
                *slot = FiberSlot::Vacant;
                Ok(())
            }
        }
    }

    /// 恢复挂起的纤程执行
    pub fn resume(&mut self, id: u32, value: Value) -> Result<FiberOutcome, VmError> {
        let slot = self
            .fibers
            .get_mut(id as usize)
            .ok_or(VmError::FiberNotFound(id))?;
        let mut fiber = match std::mem::replace(slot, FiberSlot::Running) {
            FiberSlot::Parked(fiber) if fiber.status == FiberStatus::Suspended => fiber,
            FiberSlot::Parked(fiber) => {
                let status = fiber.status;
                *slot = FiberSlot::Parked(fiber);
                return Err(VmError::FiberNotResumable { id, status });
            }
            FiberSlot::Running => {
                return Err(VmError::FiberNotResumable {
                    id,
                    status: FiberStatus::Running,
                })
            }
            FiberSlot::Vacant => {
                *slot = FiberSlot::Vacant;
                return Err(VmError::FiberNotFound(id));
            }
        };

        fiber.status = FiberStatus::Running;
        if fiber.pending_resume {
            // Yield 的求值结果是恢复值
            fiber.stack.push(value);
            fiber.pending_resume = false;
        }

        let result = self.run_fiber(&mut fiber);
        match &result {
            Ok(FiberOutcome::Yielded(_)) => {
                fiber.status = FiberStatus::Suspended;
                fiber.pending_resume = true;
            }
            Ok(FiberOutcome::Completed(_)) => fiber.status = FiberStatus::Completed,
            Err(_) => fiber.status = FiberStatus::Faulted,
        }
        self.fibers[id as usize] = FiberSlot::Parked(fiber);
        result
    }

    // ==================== 分发循环 ====================

    fn run_fiber(&mut self, fiber: &mut Fiber) -> Result<FiberOutcome, VmError> {
        let module = self.module.clone();
        loop {
            let frame = current_frame(fiber);
            let func = &module.functions[frame.func as usize];
            let op_start = frame.ip;
            let op = OpCode::from(func.code[op_start]);
            let operand_u8 = || func.code[op_start + 1];
            let operand_u16 =
                || u16::from_le_bytes([func.code[op_start + 1], func.code[op_start + 2]]);
            let operand_i16 =
                || i16::from_le_bytes([func.code[op_start + 1], func.code[op_start + 2]]);
            frame.ip = op_start + 1 + op.operand_size();
            let base = frame.base;

            match op {
                OpCode::Nop => {}
                OpCode::PushConst => fiber.stack.push(self.constants[operand_u16() as usize]),
                OpCode::PushNull => fiber.stack.push(Value::Null),
                OpCode::PushTrue => fiber.stack.push(Value::Bool(true)),
                OpCode::PushFalse => fiber.stack.push(Value::Bool(false)),
                OpCode::PushFunc => fiber.stack.push(Value::Func(operand_u16())),
                OpCode::Pop => {
                    fiber.stack.pop();
                }
                OpCode::Dup => {
                    let top = *top(fiber);
                    fiber.stack.push(top);
                }

                OpCode::LoadLocal => {
                    let v = fiber.stack[base + operand_u8() as usize];
                    fiber.stack.push(v);
                }
                OpCode::StoreLocal => {
                    let v = pop(fiber);
                    fiber.stack[base + operand_u8() as usize] = v;
                }
                OpCode::NewCell => {
                    let v = pop(fiber);
                    let handle = self.heap.alloc(HeapObj::Cell(v));
                    fiber.stack[base + operand_u8() as usize] = Value::Obj(handle);
                }
                OpCode::LoadLocalCell => {
                    let slot_value = fiber.stack[base + operand_u8() as usize];
                    let v = self.cell_value(slot_value);
                    fiber.stack.push(v);
                }
                OpCode::StoreLocalCell => {
                    let v = pop(fiber);
                    let slot_value = fiber.stack[base + operand_u8() as usize];
                    self.cell_set(slot_value, v);
                }
                OpCode::LoadUpvalue => {
                    let cell = self.upvalue_cell(fiber, operand_u8());
                    let v = self.cell_value(Value::Obj(cell));
                    fiber.stack.push(v);
                }
                OpCode::StoreUpvalue => {
                    let v = pop(fiber);
                    let cell = self.upvalue_cell(fiber, operand_u8());
                    self.cell_set(Value::Obj(cell), v);
                }

                OpCode::LoadGlobal => {
                    let slot = operand_u16() as usize;
                    match self.globals[slot] {
                        Some(v) => fiber.stack.push(v),
                        None => {
                            self.raise(
                                fiber,
                                op_start,
                                "UndefinedGlobalError",
                                format!(
                                    "global '{}' is not defined",
                                    module.global_names[slot]
                                ),
                            )?;
                        }
                    }
                }
                OpCode::StoreGlobal => {
                    let slot = operand_u16() as usize;
                    if self.globals[slot].is_some() {
                        self.globals[slot] = Some(pop(fiber));
                    } else {
                        self.raise(
                            fiber,
                            op_start,
                            "UndefinedGlobalError",
                            format!("global '{}' is not defined", module.global_names[slot]),
                        )?;
                    }
                }
                OpCode::DefineGlobal => {
                    let slot = operand_u16() as usize;
                    self.globals[slot] = Some(pop(fiber));
                }

                OpCode::Add => {
                    let b = pop(fiber);
                    let a = pop(fiber);
                    match (self.string_content(a), self.string_content(b)) {
                        (Some(x), Some(y)) => {
                            let joined = format!("{x}{y}");
                            let handle = self.heap.alloc_string(joined);
                            fiber.stack.push(Value::Str(handle));
                        }
                        _ => match num_pair(a, b) {
                            Some(NumPair::Int(x, y)) => {
                                fiber.stack.push(Value::Int(x.wrapping_add(y)))
                            }
                            Some(NumPair::Float(x, y)) => fiber.stack.push(Value::Float(x + y)),
                            None => self.type_error_binary(fiber, op_start, "+", a, b)?,
                        },
                    }
                }
                OpCode::Sub => self.arith(fiber, op_start, "-", |x, y| x.wrapping_sub(y), |x, y| x - y)?,
                OpCode::Mul => self.arith(fiber, op_start, "*", |x, y| x.wrapping_mul(y), |x, y| x * y)?,
                OpCode::Div => {
                    let b = pop(fiber);
                    let a = pop(fiber);
                    match num_pair(a, b) {
                        Some(NumPair::Int(_, 0)) => {
                            self.raise(
                                fiber,
                                op_start,
                                "DivideByZeroError",
                                "integer division by zero".to_string(),
                            )?;
                        }
                        Some(NumPair::Int(x, y)) => fiber.stack.push(Value::Int(x.wrapping_div(y))),
                        // 浮点除零遵循 IEEE，得到无穷/NaN
                        Some(NumPair::Float(x, y)) => fiber.stack.push(Value::Float(x / y)),
                        None => self.type_error_binary(fiber, op_start, "/", a, b)?,
                    }
                }
                OpCode::Mod => {
                    let b = pop(fiber);
                    let a = pop(fiber);
                    match num_pair(a, b) {
                        Some(NumPair::Int(_, 0)) => {
                            self.raise(
                                fiber,
                                op_start,
                                "DivideByZeroError",
                                "integer remainder by zero".to_string(),
                            )?;
                        }
                        Some(NumPair::Int(x, y)) => fiber.stack.push(Value::Int(x.wrapping_rem(y))),
                        Some(NumPair::Float(x, y)) => fiber.stack.push(Value::Float(x % y)),
                        None => self.type_error_binary(fiber, op_start, "%", a, b)?,
                    }
                }
                OpCode::Neg => {
                    let v = pop(fiber);
                    match v {
                        Value::Int(x) => fiber.stack.push(Value::Int(x.wrapping_neg())),
                        Value::Float(x) => fiber.stack.push(Value::Float(-x)),
                        other => {
                            self.raise(
                                fiber,
                                op_start,
                                "TypeError",
                                format!("cannot negate {}", other.type_name()),
                            )?;
                        }
                    }
                }
                OpCode::Not => {
                    let v = pop(fiber);
                    fiber.stack.push(Value::Bool(!v.is_truthy()));
                }

                OpCode::Equal => {
                    let b = pop(fiber);
                    let a = pop(fiber);
                    let eq = self.value_equals(a, b);
                    fiber.stack.push(Value::Bool(eq));
                }
                OpCode::NotEqual => {
                    let b = pop(fiber);
                    let a = pop(fiber);
                    let eq = self.value_equals(a, b);
                    fiber.stack.push(Value::Bool(!eq));
                }
                OpCode::Less => self.compare(fiber, op_start, "<", |o| o == std::cmp::Ordering::Less)?,
                OpCode::LessEqual => {
                    self.compare(fiber, op_start, "<=", |o| o != std::cmp::Ordering::Greater)?
                }
                OpCode::Greater => {
                    self.compare(fiber, op_start, ">", |o| o == std::cmp::Ordering::Greater)?
                }
                OpCode::GreaterEqual => {
                    self.compare(fiber, op_start, ">=", |o| o != std::cmp::Ordering::Less)?
                }

                OpCode::Jump => {
                    let offset = operand_i16() as isize;
                    jump(fiber, offset);
                }
                OpCode::JumpIfFalse => {
                    let condition = pop(fiber);
                    if !condition.is_truthy() {
                        let offset = operand_i16() as isize;
                        jump(fiber, offset);
                    }
                }
                OpCode::JumpBack => {
                    let offset = operand_i16() as isize;
                    jump(fiber, offset);
                    // 回跳边是安全点
                    if self.heap.should_collect() {
                        self.collect_garbage(fiber);
                    }
                }

                OpCode::Call => {
                    let argc = operand_u8() as usize;
                    self.call_value(fiber, op_start, argc)?;
                    if self.heap.should_collect() {
                        self.collect_garbage(fiber);
                    }
                }
                OpCode::Return | OpCode::ReturnValue => {
                    let value = if op == OpCode::ReturnValue {
                        pop(fiber)
                    } else {
                        Value::Null
                    };
                    // 本帧打开的 try 区域随帧废弃
                    let frame_index = fiber.frames.len() - 1;
                    while fiber
                        .tries
                        .last()
                        .is_some_and(|t| t.frame_index >= frame_index)
                    {
                        fiber.tries.pop();
                    }
                    let frame = fiber
                        .frames
                        .pop()
                        .unwrap_or_else(|| unreachable!("return without frame"));
                    fiber.stack.truncate(frame.base);
                    if fiber.frames.is_empty() {
                        return Ok(FiberOutcome::Completed(value));
                    }
                    fiber.stack.push(value);
                }

                OpCode::MakeClosure => {
                    let func_index = operand_u16();
                    let descs = module.functions[func_index as usize].upvalues.clone();
                    let mut upvalues = Vec::with_capacity(descs.len());
                    for desc in &descs {
                        let cell = if desc.from_parent_local {
                            // 被捕获槽位必定持有 cell
                            match fiber.stack[base + desc.index as usize] {
                                Value::Obj(handle) => handle,
                                _ => unreachable!("captured slot does not hold a cell"),
                            }
                        } else {
                            self.upvalue_cell(fiber, desc.index)
                        };
                        upvalues.push(cell);
                    }
                    let handle = self.heap.alloc(HeapObj::Closure(Closure {
                        func: func_index,
                        upvalues,
                    }));
                    fiber.stack.push(Value::Obj(handle));
                }

                OpCode::NewArray => {
                    let count = operand_u8() as usize;
                    let items = fiber.stack.split_off(fiber.stack.len() - count);
                    let handle = self.heap.alloc(HeapObj::Array(items));
                    fiber.stack.push(Value::Obj(handle));
                }
                OpCode::NewMap => {
                    let count = operand_u8() as usize;
                    let flat = fiber.stack.split_off(fiber.stack.len() - count * 2);
                    let mut entries = std::collections::HashMap::with_capacity(count);
                    for pair in flat.chunks_exact(2) {
                        // 键由发射器保证是字符串常量
                        let key = self
                            .string_content(pair[0])
                            .unwrap_or_default()
                            .to_string();
                        entries.insert(key, pair[1]);
                    }
                    let handle = self.heap.alloc(HeapObj::Map(entries));
                    fiber.stack.push(Value::Obj(handle));
                }

                OpCode::IndexGet => {
                    let index = pop(fiber);
                    let object = pop(fiber);
                    match self.index_get(object, index) {
                        Ok(v) => fiber.stack.push(v),
                        Err((kind, message)) => self.raise(fiber, op_start, kind, message)?,
                    }
                }
                OpCode::IndexSet => {
                    let value = pop(fiber);
                    let index = pop(fiber);
                    let object = pop(fiber);
                    match self.index_set(object, index, value) {
                        Ok(()) => fiber.stack.push(value),
                        Err((kind, message)) => self.raise(fiber, op_start, kind, message)?,
                    }
                }

                OpCode::Throw => {
                    let value = pop(fiber);
                    self.throw_value(fiber, op_start, value)?;
                }
                OpCode::PushTry => {
                    let handler_ip = current_frame(fiber).ip + operand_u16() as usize;
                    let region = TryRegion {
                        frame_index: fiber.frames.len() - 1,
                        handler_ip,
                        stack_len: fiber.stack.len(),
                    };
                    fiber.tries.push(region);
                }
                OpCode::PopTry => {
                    fiber.tries.pop();
                }

                OpCode::Yield => {
                    let value = pop(fiber);
                    trace!(target: "xenon::vm", fiber = fiber.id, "fiber yielded");
                    return Ok(FiberOutcome::Yielded(value));
                }
            }
        }
    }

    // ==================== 调用 ====================

    fn call_value(
        &mut self,
        fiber: &mut Fiber,
        op_start: usize,
        argc: usize,
    ) -> Result<(), VmError> {
        let callee_pos = fiber.stack.len() - argc - 1;
        let callee = fiber.stack[callee_pos];
        match callee {
            Value::Func(index) => {
                fiber.stack.remove(callee_pos);
                self.call_function(fiber, op_start, index, None, argc)
            }
            Value::Obj(handle) => match self.heap.get(handle) {
                Some(HeapObj::Closure(c)) => {
                    let func = c.func;
                    fiber.stack.remove(callee_pos);
                    self.call_function(fiber, op_start, func, Some(handle), argc)
                }
                Some(obj) => {
                    let name = obj.type_name();
                    self.raise(
                        fiber,
                        op_start,
                        "TypeError",
                        format!("value of type {name} is not callable"),
                    )
                }
                None => self.raise(
                    fiber,
                    op_start,
                    "TypeError",
                    "call through dangling handle".to_string(),
                ),
            },
            Value::Native(index) => {
                let native = self.natives[index as usize].clone();
                let args = fiber.stack.split_off(callee_pos + 1);
                fiber.stack.pop();
                // 原生函数可能触发嵌套 resume 和回收；把本纤程放回
                // 槽位，让它的栈在期间保持可达
                let id = fiber.id as usize;
                let placeholder = Fiber::new(fiber.id);
                self.fibers[id] = FiberSlot::Parked(std::mem::replace(fiber, placeholder));
                for handle in args.iter().filter_map(Value::handle) {
                    self.heap.pin(handle);
                }
                let mut ctx = NativeCtx { vm: self };
                let outcome = (native.func)(&mut ctx, &args);
                for handle in args.iter().filter_map(Value::handle) {
                    self.heap.unpin(handle);
                }
                match std::mem::replace(&mut self.fibers[id], FiberSlot::Running) {
                    FiberSlot::Parked(f) => *fiber = f,
                    _ => unreachable!("calling fiber vanished during native call"),
                }
                match outcome {
                    Ok(value) => {
                        fiber.stack.push(value);
                        Ok(())
                    }
                    Err(e) => {
                        let NativeError { kind, message } = e;
                        self.raise(fiber, op_start, &kind, message)
                    }
                }
            }
            other => self.raise(
                fiber,
                op_start,
                "TypeError",
                format!("value of type {} is not callable", other.type_name()),
            ),
        }
    }

    fn call_function(
        &mut self,
        fiber: &mut Fiber,
        op_start: usize,
        func_index: u16,
        closure: Option<Handle>,
        argc: usize,
    ) -> Result<(), VmError> {
        let func = &self.module.functions[func_index as usize];
        if func.arity as usize != argc {
            let message = format!(
                "{} expects {} argument(s), got {argc}",
                func.name, func.arity
            );
            return self.raise(fiber, op_start, "TypeError", message);
        }
        if fiber.frames.len() >= self.config.limits.max_frames {
            return self.raise(
                fiber,
                op_start,
                "StackOverflowError",
                format!("call depth exceeds {} frames", self.config.limits.max_frames),
            );
        }
        let base = fiber.stack.len() - argc;
        let needed = base + func.local_count as usize + func.max_stack as usize;
        if needed > self.config.limits.max_stack_size {
            return self.raise(
                fiber,
                op_start,
                "StackOverflowError",
                format!(
                    "value stack exceeds {} slots",
                    self.config.limits.max_stack_size
                ),
            );
        }
        fiber
            .stack
            .resize(base + func.local_count as usize, Value::Null);
        fiber.frames.push(Frame {
            func: func_index,
            ip: 0,
            base,
            closure,
        });
        Ok(())
    }

    // ==================== 异常 ====================

    /// 构造内建异常并抛出
    fn raise(
        &mut self,
        fiber: &mut Fiber,
        op_start: usize,
        kind: &str,
        message: String,
    ) -> Result<(), VmError> {
        let trace = self.capture_trace(fiber, op_start);
        let handle = self.heap.alloc(HeapObj::Exception(ExceptionObj {
            kind: kind.to_string(),
            message,
            trace,
        }));
        self.throw_value(fiber, op_start, Value::Obj(handle))
    }

    /// 沿 try 区域栈 unwind；无 handler 时纤程出错终止
    fn throw_value(
        &mut self,
        fiber: &mut Fiber,
        op_start: usize,
        value: Value,
    ) -> Result<(), VmError> {
        match fiber.tries.pop() {
            Some(region) => {
                fiber.frames.truncate(region.frame_index + 1);
                let frame = current_frame(fiber);
                frame.ip = region.handler_ip;
                fiber.stack.truncate(region.stack_len);
                // handler 入口约定：异常值在栈顶
                fiber.stack.push(value);
                Ok(())
            }
            None => {
                let error = self.script_error(fiber, op_start, value);
                debug!(
                    target: "xenon::vm",
                    fiber = fiber.id,
                    message = %error.message,
                    "unhandled exception"
                );
                Err(VmError::UnhandledException(error))
            }
        }
    }

    fn script_error(&self, fiber: &Fiber, op_start: usize, value: Value) -> ScriptError {
        // 内建异常对象带着抛出点的轨迹，其他值在 unwind 失败处补采
        if let Value::Obj(handle) = value {
            if let Some(HeapObj::Exception(e)) = self.heap.get(handle) {
                return ScriptError {
                    message: format!("{}: {}", e.kind, e.message),
                    trace: e.trace.clone(),
                };
            }
        }
        ScriptError {
            message: self.display_value(value),
            trace: self.capture_trace(fiber, op_start),
        }
    }

    fn capture_trace(&self, fiber: &Fiber, op_start: usize) -> Vec<TraceFrame> {
        let mut trace = Vec::with_capacity(fiber.frames.len());
        for (i, frame) in fiber.frames.iter().enumerate().rev() {
            let func = &self.module.functions[frame.func as usize];
            // 栈顶帧用当前指令起点，调用方帧 ip 停在调用点之后
            let offset = if i == fiber.frames.len() - 1 {
                op_start
            } else {
                frame.ip.saturating_sub(1)
            };
            trace.push(TraceFrame {
                function: func.name.clone(),
                line: func.lines.line_for_offset(offset as u32),
            });
        }
        trace
    }

    fn type_error_binary(
        &mut self,
        fiber: &mut Fiber,
        op_start: usize,
        op: &str,
        a: Value,
        b: Value,
    ) -> Result<(), VmError> {
        let message = format!(
            "operator '{op}' not defined for {} and {}",
            a.type_name(),
            b.type_name()
        );
        self.raise(fiber, op_start, "TypeError", message)
    }

    // ==================== 运算辅助 ====================

    fn arith(
        &mut self,
        fiber: &mut Fiber,
        op_start: usize,
        name: &str,
        int_op: fn(i64, i64) -> i64,
        float_op: fn(f64, f64) -> f64,
    ) -> Result<(), VmError> {
        let b = pop(fiber);
        let a = pop(fiber);
        match num_pair(a, b) {
            Some(NumPair::Int(x, y)) => {
                fiber.stack.push(Value::Int(int_op(x, y)));
                Ok(())
            }
            Some(NumPair::Float(x, y)) => {
                fiber.stack.push(Value::Float(float_op(x, y)));
                Ok(())
            }
            None => self.type_error_binary(fiber, op_start, name, a, b),
        }
    }

    fn compare(
        &mut self,
        fiber: &mut Fiber,
        op_start: usize,
        name: &str,
        accept: fn(std::cmp::Ordering) -> bool,
    ) -> Result<(), VmError> {
        let b = pop(fiber);
        let a = pop(fiber);
        let ordering = match num_pair(a, b) {
            Some(NumPair::Int(x, y)) => Some(x.cmp(&y)),
            Some(NumPair::Float(x, y)) => x.partial_cmp(&y),
            None => match (self.string_content(a), self.string_content(b)) {
                (Some(x), Some(y)) => Some(x.cmp(y)),
                _ => return self.type_error_binary(fiber, op_start, name, a, b),
            },
        };
        match ordering {
            Some(o) => {
                fiber.stack.push(Value::Bool(accept(o)));
                Ok(())
            }
            // NaN 比较永假
            None => {
                fiber.stack.push(Value::Bool(false));
                Ok(())
            }
        }
    }

    fn value_equals(&self, a: Value, b: Value) -> bool {
        match (a, b) {
            (Value::Null, Value::Null) => true,
            (Value::Bool(x), Value::Bool(y)) => x == y,
            (Value::Str(x), Value::Str(y)) => {
                x == y
                    || matches!(
                        (self.heap.get(x), self.heap.get(y)),
                        (Some(HeapObj::Str(s)), Some(HeapObj::Str(t))) if s == t
                    )
            }
            (Value::Obj(x), Value::Obj(y)) => x == y,
            (Value::Func(x), Value::Func(y)) => x == y,
            (Value::Native(x), Value::Native(y)) => x == y,
            _ => match num_pair(a, b) {
                Some(NumPair::Int(x, y)) => x == y,
                Some(NumPair::Float(x, y)) => x == y,
                None => false,
            },
        }
    }

    fn string_content(&self, value: Value) -> Option<&str> {
        match value {
            Value::Str(handle) => match self.heap.get(handle)? {
                HeapObj::Str(s) => Some(s.as_str()),
                _ => None,
            },
            _ => None,
        }
    }

    fn index_get(&self, object: Value, index: Value) -> Result<Value, (&'static str, String)> {
        let handle = match object {
            Value::Obj(handle) => handle,
            other => {
                return Err((
                    "TypeError",
                    format!("cannot index into {}", other.type_name()),
                ))
            }
        };
        match self.heap.get(handle) {
            Some(HeapObj::Array(items)) => match index {
                Value::Int(i) if i >= 0 && (i as usize) < items.len() => Ok(items[i as usize]),
                Value::Int(i) => Err((
                    "IndexError",
                    format!("index {i} out of range for array of length {}", items.len()),
                )),
                other => Err((
                    "TypeError",
                    format!("array index must be int, got {}", other.type_name()),
                )),
            },
            Some(HeapObj::Map(entries)) => match self.string_content(index) {
                // 缺失键得到 null
                Some(key) => Ok(entries.get(key).copied().unwrap_or(Value::Null)),
                None => Err((
                    "TypeError",
                    format!("map key must be string, got {}", index.type_name()),
                )),
            },
            Some(obj) => Err((
                "TypeError",
                format!("cannot index into {}", obj.type_name()),
            )),
            None => Err(("TypeError", "index through dangling handle".to_string())),
        }
    }

    fn index_set(
        &mut self,
        object: Value,
        index: Value,
        value: Value,
    ) -> Result<(), (&'static str, String)> {
        let handle = match object {
            Value::Obj(handle) => handle,
            other => {
                return Err((
                    "TypeError",
                    format!("cannot index into {}", other.type_name()),
                ))
            }
        };
        let key = match self.heap.get(handle) {
            Some(HeapObj::Map(_)) => match self.string_content(index) {
                Some(key) => Some(key.to_string()),
                None => {
                    return Err((
                        "TypeError",
                        format!("map key must be string, got {}", index.type_name()),
                    ))
                }
            },
            _ => None,
        };
        match self.heap.get_mut(handle) {
            Some(HeapObj::Array(items)) => match index {
                Value::Int(i) if i >= 0 && (i as usize) < items.len() => {
                    items[i as usize] = value;
                    Ok(())
                }
                Value::Int(i) => Err((
                    "IndexError",
                    format!("index {i} out of range for array of length {}", items.len()),
                )),
                other => Err((
                    "TypeError",
                    format!("array index must be int, got {}", other.type_name()),
                )),
            },
            Some(HeapObj::Map(entries)) => {
                if let Some(key) = key {
                    entries.insert(key, value);
                }
                Ok(())
            }
            Some(obj) => Err((
                "TypeError",
                format!("cannot index into {}", obj.type_name()),
            )),
            None => Err(("TypeError", "index through dangling handle".to_string())),
        }
    }

    // ==================== cell / 上值 ====================

    fn cell_value(&self, slot_value: Value) -> Value {
        match slot_value {
            Value::Obj(handle) => match self.heap.get(handle) {
                Some(HeapObj::Cell(v)) => *v,
                _ => unreachable!("cell slot does not hold a cell"),
            },
            _ => unreachable!("cell slot does not hold a cell"),
        }
    }

    fn cell_set(&mut self, slot_value: Value, value: Value) {
        match slot_value {
            Value::Obj(handle) => match self.heap.get_mut(handle) {
                Some(HeapObj::Cell(v)) => *v = value,
                _ => unreachable!("cell slot does not hold a cell"),
            },
            _ => unreachable!("cell slot does not hold a cell"),
        }
    }

    fn upvalue_cell(&self, fiber: &Fiber, index: u8) -> Handle {
        let frame = fiber
            .frames
            .last()
            .unwrap_or_else(|| unreachable!("no active frame"));
        let closure_handle = frame
            .closure
            .unwrap_or_else(|| unreachable!("upvalue access outside closure"));
        match self.heap.get(closure_handle) {
            Some(HeapObj::Closure(c)) => c.upvalues[index as usize],
            _ => unreachable!("frame closure handle invalid"),
        }
    }

    // ==================== GC ====================

    /// 安全点回收：收集全局、常量、所有纤程的根
    fn collect_garbage(&mut self, current: &Fiber) {
        let mut roots: Vec<Handle> = Vec::new();
        for value in self.constants.iter().chain(self.globals.iter().flatten()) {
            if let Some(handle) = value.handle() {
                roots.push(handle);
            }
        }
        for slot in &self.fibers {
            if let FiberSlot::Parked(fiber) = slot {
                fiber.roots(|h| roots.push(h));
            }
        }
        current.roots(|h| roots.push(h));

        let clock = self.platform.clock();
        let started = clock.now();
        let stats = self.heap.collect(roots);
        let elapsed = clock.now().saturating_sub(started);
        debug!(
            target: "xenon::gc",
            elapsed_us = elapsed.as_micros() as u64,
            freed = stats.freed_objects,
            live = stats.live_objects,
            "safe-point collection"
        );
    }

    // ==================== 渲染 ====================

    /// 值的人类可读渲染
    pub fn display_value(&self, value: Value) -> String {
        self.display_value_depth(value, 0)
    }

    fn display_value_depth(&self, value: Value, depth: usize) -> String {
        if depth > 8 {
            return "...".to_string();
        }
        match value {
            Value::Null => "null".to_string(),
            Value::Bool(b) => b.to_string(),
            Value::Int(v) => v.to_string(),
            Value::Float(v) => {
                if v.fract() == 0.0 && v.is_finite() {
                    format!("{v:.1}")
                } else {
                    v.to_string()
                }
            }
            Value::Str(handle) => match self.heap.get(handle) {
                Some(HeapObj::Str(s)) => s.clone(),
                _ => "<dangling string>".to_string(),
            },
            Value::Func(index) => {
                format!("<fn {}>", self.module.functions[index as usize].name)
            }
            Value::Native(index) => format!(
                "<native {}>",
                self.natives
                    .get(index as usize)
                    .map(|n| n.name.as_str())
                    .unwrap_or("?")
            ),
            Value::Obj(handle) => match self.heap.get(handle) {
                Some(HeapObj::Str(s)) => s.clone(),
                Some(HeapObj::Array(items)) => {
                    let inner: Vec<String> = items
                        .iter()
                        .map(|v| self.display_value_depth(*v, depth + 1))
                        .collect();
                    format!("[{}]", inner.join(", "))
                }
                Some(HeapObj::Map(entries)) => {
                    let mut keys: Vec<&String> = entries.keys().collect();
                    keys.sort();
                    let inner: Vec<String> = keys
                        .into_iter()
                        .map(|k| {
                            format!(
                                "{}: {}",
                                k,
                                self.display_value_depth(entries[k], depth + 1)
                            )
                        })
                        .collect();
                    format!("{{{}}}", inner.join(", "))
                }
                Some(HeapObj::Cell(v)) => self.display_value_depth(*v, depth + 1),
                Some(HeapObj::Closure(c)) => format!(
                    "<fn {}>",
                    self.module.functions[c.func as usize].name
                ),
                Some(HeapObj::Exception(e)) => format!("{}: {}", e.kind, e.message),
                Some(HeapObj::Fiber(id)) => format!("<fiber {id}>"),
                None => "<dangling object>".to_string(),
            },
        }
    }
}

// ==================== 栈辅助 ====================

fn current_frame(fiber: &mut Fiber) -> &mut Frame {
    fiber
        .frames
        .last_mut()
        .unwrap_or_else(|| unreachable!("fiber has no active frame"))
}

fn pop(fiber: &mut Fiber) -> Value {
    fiber
        .stack
        .pop()
        .unwrap_or_else(|| unreachable!("operand stack underflow"))
}

fn top(fiber: &mut Fiber) -> &Value {
    fiber
        .stack
        .last()
        .unwrap_or_else(|| unreachable!("operand stack underflow"))
}

fn jump(fiber: &mut Fiber, offset: isize) {
    let frame = current_frame(fiber);
    frame.ip = (frame.ip as isize + offset) as usize;
}

#[cfg(test)]
mod tests {
    use super::*;
    use xenon_base::std_platform;
    use xenon_compiler::{compile_source, CompileOptions};

    fn vm_for(source: &str) -> Vm {
        vm_with_config(source, VmConfig::default())
    }

    fn vm_with_config(source: &str, config: VmConfig) -> Vm {
        let module = compile_source(source, &CompileOptions::default()).unwrap();
        Vm::new(Arc::new(module), config, std_platform())
    }

    fn eval_global(source: &str, name: &str) -> (Vm, Value) {
        let mut vm = vm_for(source);
        vm.run_to_completion().unwrap();
        let value = vm.global(name).unwrap();
        (vm, value)
    }

    #[test]
    fn test_arithmetic_and_globals() {
        let (_, v) = eval_global("var r = (2 + 3) * 4 - 10 / 2;", "r");
        assert_eq!(v, Value::Int(15));
    }

    #[test]
    fn test_mixed_numeric_promotion() {
        let (_, v) = eval_global("var r = 1 + 0.5;", "r");
        assert_eq!(v, Value::Float(1.5));
    }

    #[test]
    fn test_string_concat_and_display() {
        let (vm, v) = eval_global(r#"var r = "foo" + "bar";"#, "r");
        assert_eq!(vm.display_value(v), "foobar");
    }

    #[test]
    fn test_function_call_and_recursion() {
        let source = r#"
            function fib(n) {
                if (n < 2) { return n; }
                return fib(n - 1) + fib(n - 2);
            }
            var r = fib(10);
        "#;
        let (_, v) = eval_global(source, "r");
        assert_eq!(v, Value::Int(55));
    }

    #[test]
    fn test_closure_counter_shares_cell() {
        let source = r#"
            function make_counter() {
                var n = 0;
                function bump() {
                    n = n + 1;
                    return n;
                }
                return bump;
            }
            var c = make_counter();
            c();
            c();
            var r = c();
        "#;
        let (_, v) = eval_global(source, "r");
        assert_eq!(v, Value::Int(3));
    }

    #[test]
    fn test_while_loop() {
        let source = r#"
            var sum = 0;
            var i = 1;
            while (i <= 100) {
                sum = sum + i;
                i = i + 1;
            }
        "#;
        let (_, v) = eval_global(source, "sum");
        assert_eq!(v, Value::Int(5050));
    }

    #[test]
    fn test_array_index_get_set() {
        let source = r#"
            var a = [10, 20, 30];
            a[1] = a[1] + 5;
            var r = a[0] + a[1] + a[2];
        "#;
        let (_, v) = eval_global(source, "r");
        assert_eq!(v, Value::Int(65));
    }

    #[test]
    fn test_map_missing_key_is_null() {
        let source = r#"
            var m = {x: 1};
            var r = m["absent"];
        "#;
        let (_, v) = eval_global(source, "r");
        assert_eq!(v, Value::Null);
    }

    #[test]
    fn test_try_catch_reaches_handler() {
        let source = r#"
            var r = "unset";
            try {
                throw "boom";
            } catch (e) {
                r = e;
            }
        "#;
        let (vm, v) = eval_global(source, "r");
        assert_eq!(vm.display_value(v), "boom");
    }

    #[test]
    fn test_divide_by_zero_is_catchable() {
        let source = r#"
            var r = 0;
            try {
                r = 1 / 0;
            } catch (e) {
                r = -1;
            }
        "#;
        let (_, v) = eval_global(source, "r");
        assert_eq!(v, Value::Int(-1));
    }

    #[test]
    fn test_arity_mismatch_is_catchable() {
        let source = r#"
            function pair(a, b) { return a + b; }
            var r = 0;
            try {
                r = pair(1);
            } catch (e) {
                r = 7;
            }
        "#;
        let (_, v) = eval_global(source, "r");
        assert_eq!(v, Value::Int(7));
    }

    #[test]
    fn test_exception_unwinds_across_frames() {
        let source = r#"
            function inner() { throw "deep"; }
            function outer() { inner(); }
            var r = "unset";
            try {
                outer();
            } catch (e) {
                r = e;
            }
        "#;
        let (vm, v) = eval_global(source, "r");
        assert_eq!(vm.display_value(v), "deep");
    }

    #[test]
    fn test_uncaught_throw_faults_with_trace() {
        let source = r#"
            function blow() { throw "bang"; }
            blow();
        "#;
        let mut vm = vm_for(source);
        match vm.run_to_completion() {
            Err(VmError::UnhandledException(e)) => {
                assert_eq!(e.message, "bang");
                assert_eq!(e.trace.len(), 2);
                assert_eq!(e.trace[0].function, "blow");
            }
            other => panic!("expected unhandled exception, got {other:?}"),
        }
    }

    #[test]
    fn test_undefined_global_is_catchable() {
        // later 在顶层预扫描中登记为全局，声明语句执行前读取它是
        // 运行期异常而不是解析错误
        let source = r#"
            var r = 0;
            try {
                r = later;
            } catch (e) {
                r = 1;
            }
            var later = 7;
            var after = later;
        "#;
        let (vm, v) = eval_global(source, "r");
        assert_eq!(v, Value::Int(1));
        assert_eq!(vm.global("after"), Some(Value::Int(7)));
    }

    #[test]
    fn test_call_depth_limit_is_catchable() {
        let source = r#"
            function spin() { return spin(); }
            var r = 0;
            try {
                spin();
            } catch (e) {
                r = 1;
            }
        "#;
        let (_, v) = eval_global(source, "r");
        assert_eq!(v, Value::Int(1));
    }

    #[test]
    fn test_native_registration_and_call() {
        let source = "var r = twice(21);";
        let module = compile_source(
            source,
            &CompileOptions {
                host_globals: vec!["twice".to_string()],
            },
        )
        .unwrap();
        let mut vm = Vm::new(Arc::new(module), VmConfig::default(), std_platform());
        vm.register_native("twice", |_, args| match args {
            [Value::Int(n)] => Ok(Value::Int(n * 2)),
            _ => Err(NativeError::arity("twice", 1, args.len())),
        });
        vm.run_to_completion().unwrap();
        assert_eq!(vm.global("r"), Some(Value::Int(42)));
    }

    #[test]
    fn test_register_native_appends_slot_for_unknown_name() {
        let mut vm = vm_for("var r = 1;");
        vm.register_native("host_only", |_, _| Ok(Value::Null));
        assert!(matches!(vm.global("host_only"), Some(Value::Native(_))));
        vm.run_to_completion().unwrap();
        assert_eq!(vm.global("r"), Some(Value::Int(1)));
    }

    #[test]
    fn test_native_error_is_catchable() {
        let source = r#"
            var r = 0;
            try {
                fail();
            } catch (e) {
                r = 1;
            }
        "#;
        let module = compile_source(
            source,
            &CompileOptions {
                host_globals: vec!["fail".to_string()],
            },
        )
        .unwrap();
        let mut vm = Vm::new(Arc::new(module), VmConfig::default(), std_platform());
        vm.register_native("fail", |_, _| Err(NativeError::msg("host refused")));
        vm.run_to_completion().unwrap();
        assert_eq!(vm.global("r"), Some(Value::Int(1)));
    }

    #[test]
    fn test_fiber_yield_and_resume() {
        let source = r#"
            function gen() {
                yield 1;
                yield 2;
                return 3;
            }
        "#;
        let mut vm = vm_for(source);
        vm.run_to_completion().unwrap();
        let callee = vm.global("gen").unwrap();
        let id = vm.spawn_fiber(callee).unwrap();
        assert_eq!(vm.fiber_status(id), Some(FiberStatus::Suspended));

        match vm.resume(id, Value::Null).unwrap() {
            FiberOutcome::Yielded(v) => assert_eq!(v, Value::Int(1)),
            other => panic!("expected yield, got {other:?}"),
        }
        match vm.resume(id, Value::Null).unwrap() {
            FiberOutcome::Yielded(v) => assert_eq!(v, Value::Int(2)),
            other => panic!("expected yield, got {other:?}"),
        }
        match vm.resume(id, Value::Null).unwrap() {
            FiberOutcome::Completed(v) => assert_eq!(v, Value::Int(3)),
            other => panic!("expected completion, got {other:?}"),
        }
        assert_eq!(vm.fiber_status(id), Some(FiberStatus::Completed));
        assert!(matches!(
            vm.resume(id, Value::Null),
            Err(VmError::FiberNotResumable { .. })
        ));
    }

    #[test]
    fn test_yield_expression_receives_resume_value() {
        let source = r#"
            function echo() {
                var got = yield "ready";
                return got;
            }
        "#;
        let mut vm = vm_for(source);
        vm.run_to_completion().unwrap();
        let callee = vm.global("echo").unwrap();
        let id = vm.spawn_fiber(callee).unwrap();
        match vm.resume(id, Value::Null).unwrap() {
            FiberOutcome::Yielded(v) => assert_eq!(vm.display_value(v), "ready"),
            other => panic!("expected yield, got {other:?}"),
        }
        match vm.resume(id, Value::Int(99)).unwrap() {
            FiberOutcome::Completed(v) => assert_eq!(v, Value::Int(99)),
            other => panic!("expected completion, got {other:?}"),
        }
    }

    #[test]
    fn test_spawn_rejects_entry_with_params() {
        let source = "function f(a) { return a; }";
        let mut vm = vm_for(source);
        vm.run_to_completion().unwrap();
        let callee = vm.global("f").unwrap();
        assert!(matches!(
            vm.spawn_fiber(callee),
            Err(VmError::FiberEntryArity(1))
        ));
    }

    #[test]
    fn test_discarded_fiber_is_gone() {
        let source = "function f() { yield 0; }";
        let mut vm = vm_for(source);
        vm.run_to_completion().unwrap();
        let callee = vm.global("f").unwrap();
        let id = vm.spawn_fiber(callee).unwrap();
        vm.discard_fiber(id).unwrap();
        assert_eq!(vm.fiber_status(id), None);
        assert!(matches!(
            vm.resume(id, Value::Null),
            Err(VmError::FiberNotFound(_))
        ));
    }

    #[test]
    fn test_gc_runs_under_allocation_pressure() {
        let source = r#"
            var keep = [1, 2, 3];
            var i = 0;
            while (i < 2000) {
                var garbage = [i, i, i, "padding padding padding"];
                i = i + 1;
            }
            var r = keep[0] + keep[1] + keep[2];
        "#;
        let config = VmConfig {
            gc_threshold: 4 * 1024,
            ..VmConfig::default()
        };
        let mut vm = vm_with_config(source, config);
        vm.run_to_completion().unwrap();
        assert_eq!(vm.global("r"), Some(Value::Int(6)));
        // 2000 个临时数组绝大多数已被回收
        assert!(vm.heap.live_objects() < 1000);
    }

    #[test]
    fn test_closure_survives_collection() {
        let source = r#"
            function make() {
                var secret = "kept alive";
                function read() { return secret; }
                return read;
            }
            var f = make();
            var i = 0;
            while (i < 2000) {
                var garbage = [i, "filler filler filler"];
                i = i + 1;
            }
            var r = f();
        "#;
        let config = VmConfig {
            gc_threshold: 4 * 1024,
            ..VmConfig::default()
        };
        let mut vm = vm_with_config(source, config);
        vm.run_to_completion().unwrap();
        let v = vm.global("r").unwrap();
        assert_eq!(vm.display_value(v), "kept alive");
    }

    #[test]
    fn test_display_nested_containers() {
        let source = r#"var r = [1, "two", [3, null], true];"#;
        let (vm, v) = eval_global(source, "r");
        assert_eq!(vm.display_value(v), r#"[1, two, [3, null], true]"#);
    }

    #[test]
    fn test_equality_semantics() {
        let source = r#"
            var by_content = "ab" == "a" + "b";
            var promoted = 1 == 1.0;
            var arrays = [1] == [1];
        "#;
        let mut vm = vm_for(source);
        vm.run_to_completion().unwrap();
        assert_eq!(vm.global("by_content"), Some(Value::Bool(true)));
        assert_eq!(vm.global("promoted"), Some(Value::Bool(true)));
        // 复合值按句柄同一性比较
        assert_eq!(vm.global("arrays"), Some(Value::Bool(false)));
    }
}
