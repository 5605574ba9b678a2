//! 字节码发射
//!
//! 按解析旁表把 AST 翻译为模块。脚本入口编为函数表第 0 项
//! `<main>`，嵌套函数按遇到顺序追加。常量池按值去重。
//!
//! 被捕获的局部持有 cell 句柄：声明点发 NewCell 装箱，之后的
//! 读写走 LoadLocalCell / StoreLocalCell，闭包按槽位捕获 cell。

use std::collections::HashMap;

use tracing::trace;
use xenon_module::{
    CodeBuilder, Constant, ConstantKey, FunctionRecord, Module, OpCode,
};

use crate::ast::{
    BinaryOp, Expr, ExprKind, FunctionDecl, LogicalOp, Program, Stmt, StmtKind, UnaryOp,
};
use crate::resolver::{Annotations, FunctionLayout, Resolution};

/// 发射错误类型
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EmitErrorKind {
    TooManyConstants,
    TooManyFunctions,
    JumpTooFar,
}

/// 发射错误，带行号
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("line {line}: {}", kind_message(.kind))]
pub struct EmitError {
    pub kind: EmitErrorKind,
    pub line: u32,
}

fn kind_message(kind: &EmitErrorKind) -> String {
    match kind {
        EmitErrorKind::TooManyConstants => "too many constants in one module".to_string(),
        EmitErrorKind::TooManyFunctions => "too many functions in one module".to_string(),
        EmitErrorKind::JumpTooFar => "jump distance exceeds bytecode limits".to_string(),
    }
}

/// 把解析完的程序发射为模块
pub fn emit(program: &Program, annotations: &Annotations) -> Result<Module, EmitError> {
    let mut emitter = Emitter {
        annotations,
        constants: Vec::new(),
        constant_index: HashMap::new(),
        functions: vec![placeholder_record()],
    };

    let record = emitter.emit_function_body(
        "<main>".to_string(),
        &[],
        &program.statements,
        &annotations.root,
    )?;
    emitter.functions[0] = record;

    trace!(
        target: "xenon::emitter",
        functions = emitter.functions.len(),
        constants = emitter.constants.len(),
        "emit finished"
    );
    Ok(Module::new(
        annotations.global_names.clone(),
        emitter.constants,
        emitter.functions,
        0,
    ))
}

fn placeholder_record() -> FunctionRecord {
    FunctionRecord {
        name: String::new(),
        arity: 0,
        local_count: 0,
        max_stack: 0,
        upvalues: Vec::new(),
        code: Vec::new(),
        lines: xenon_module::LineTable::new(),
    }
}

/// 单个循环的发射上下文
struct LoopCtx {
    /// break 的前向跳转待回填位置
    break_patches: Vec<usize>,
    /// continue 的前向跳转待回填位置（for 的步进在循环体之后）
    continue_patches: Vec<usize>,
    /// continue 的已知回跳目标（while 的条件起点）
    continue_target: Option<usize>,
    /// 进入循环时的 try 嵌套深度，break/continue 跳出前补 PopTry
    try_depth_at_entry: u32,
}

/// 单个函数的发射状态
struct FuncState<'a> {
    builder: CodeBuilder,
    layout: &'a FunctionLayout,
    loops: Vec<LoopCtx>,
    try_depth: u32,
}

struct Emitter<'a> {
    annotations: &'a Annotations,
    constants: Vec<Constant>,
    constant_index: HashMap<ConstantKey, u16>,
    functions: Vec<FunctionRecord>,
}

impl<'a> Emitter<'a> {
    fn constant(&mut self, constant: Constant, line: u32) -> Result<u16, EmitError> {
        let key = constant.key();
        if let Some(&index) = self.constant_index.get(&key) {
            return Ok(index);
        }
        let index = u16::try_from(self.constants.len()).map_err(|_| EmitError {
            kind: EmitErrorKind::TooManyConstants,
            line,
        })?;
        self.constants.push(constant);
        self.constant_index.insert(key, index);
        Ok(index)
    }

    fn patch(&self, state: &mut FuncState<'_>, at: usize, line: u32) -> Result<(), EmitError> {
        if state.builder.patch_jump(at) {
            Ok(())
        } else {
            Err(EmitError {
                kind: EmitErrorKind::JumpTooFar,
                line,
            })
        }
    }

    fn loop_back(
        &self,
        state: &mut FuncState<'_>,
        start: usize,
        line: u32,
    ) -> Result<(), EmitError> {
        if state.builder.write_loop(start, line) {
            Ok(())
        } else {
            Err(EmitError {
                kind: EmitErrorKind::JumpTooFar,
                line,
            })
        }
    }

    /// 发射一个函数体为完整的函数记录
    fn emit_function_body(
        &mut self,
        name: String,
        params: &[String],
        body: &[Stmt],
        layout: &'a FunctionLayout,
    ) -> Result<FunctionRecord, EmitError> {
        let mut state = FuncState {
            builder: CodeBuilder::new(),
            layout,
            loops: Vec::new(),
            try_depth: 0,
        };

        // 被捕获的参数在入口处装箱
        let first_line = body.first().map(|s| s.line).unwrap_or(1);
        for slot in 0..params.len() {
            if layout.cells.get(slot).copied().unwrap_or(false) {
                state
                    .builder
                    .write_op_u8(OpCode::LoadLocal, slot as u8, first_line);
                state
                    .builder
                    .write_op_u8(OpCode::NewCell, slot as u8, first_line);
            }
        }

        for stmt in body {
            self.emit_stmt(&mut state, stmt)?;
        }

        // 隐式 return null
        let last_line = body.last().map(|s| s.line).unwrap_or(1);
        state.builder.write_op(OpCode::PushNull, last_line);
        state.builder.write_op(OpCode::ReturnValue, last_line);

        let max_stack = state.builder.max_stack();
        let (code, lines) = state.builder.into_parts();
        Ok(FunctionRecord {
            name,
            arity: params.len() as u8,
            local_count: layout.local_count,
            max_stack,
            upvalues: layout.upvalues.clone(),
            code,
            lines,
        })
    }

    /// 发射嵌套函数声明，返回函数表索引
    fn emit_nested_function(
        &mut self,
        decl: &FunctionDecl,
        layout: &'a FunctionLayout,
        line: u32,
    ) -> Result<u16, EmitError> {
        let index = u16::try_from(self.functions.len()).map_err(|_| EmitError {
            kind: EmitErrorKind::TooManyFunctions,
            line,
        })?;
        // 先占位拿到索引，函数体里再嵌套声明时索引保持稳定
        self.functions.push(placeholder_record());
        let record =
            self.emit_function_body(decl.name.clone(), &decl.params, &decl.body, layout)?;
        self.functions[index as usize] = record;
        Ok(index)
    }

    // ==================== 语句 ====================

    fn emit_stmt(&mut self, state: &mut FuncState<'a>, stmt: &Stmt) -> Result<(), EmitError> {
        let line = stmt.line;
        match &stmt.kind {
            StmtKind::Var { init, .. } => {
                match init {
                    Some(init) => self.emit_expr(state, init)?,
                    None => state.builder.write_op(OpCode::PushNull, line),
                }
                self.emit_store_declaration(state, self.annotations.resolution(stmt.id), line);
                Ok(())
            }
            StmtKind::Function(decl) => {
                let layout = self.annotations.function_layout(stmt.id);
                let index = self.emit_nested_function(decl, layout, line)?;
                if layout.upvalues.is_empty() {
                    state.builder.write_op_u16(OpCode::PushFunc, index, line);
                } else {
                    state.builder.write_op_u16(OpCode::MakeClosure, index, line);
                }
                self.emit_store_declaration(state, self.annotations.resolution(stmt.id), line);
                Ok(())
            }
            StmtKind::If {
                condition,
                then_branch,
                else_branch,
            } => {
                self.emit_expr(state, condition)?;
                let skip_then = state.builder.write_jump(OpCode::JumpIfFalse, line);
                for inner in then_branch {
                    self.emit_stmt(state, inner)?;
                }
                match else_branch {
                    Some(else_branch) => {
                        let skip_else = state.builder.write_jump(OpCode::Jump, line);
                        self.patch(state, skip_then, line)?;
                        for inner in else_branch {
                            self.emit_stmt(state, inner)?;
                        }
                        self.patch(state, skip_else, line)?;
                    }
                    None => self.patch(state, skip_then, line)?,
                }
                Ok(())
            }
            StmtKind::While { condition, body } => {
                let start = state.builder.current_offset();
                self.emit_expr(state, condition)?;
                let exit = state.builder.write_jump(OpCode::JumpIfFalse, line);
                state.loops.push(LoopCtx {
                    break_patches: Vec::new(),
                    continue_patches: Vec::new(),
                    continue_target: Some(start),
                    try_depth_at_entry: state.try_depth,
                });
                for inner in body {
                    self.emit_stmt(state, inner)?;
                }
                self.loop_back(state, start, line)?;
                self.patch(state, exit, line)?;
                self.finish_loop(state, line)
            }
            StmtKind::For {
                init,
                condition,
                step,
                body,
            } => {
                if let Some(init) = init {
                    self.emit_stmt(state, init)?;
                }
                let cond_start = state.builder.current_offset();
                let exit = match condition {
                    Some(condition) => {
                        self.emit_expr(state, condition)?;
                        Some(state.builder.write_jump(OpCode::JumpIfFalse, line))
                    }
                    None => None,
                };
                state.loops.push(LoopCtx {
                    break_patches: Vec::new(),
                    continue_patches: Vec::new(),
                    continue_target: None,
                    try_depth_at_entry: state.try_depth,
                });
                for inner in body {
                    self.emit_stmt(state, inner)?;
                }
                // continue 落到步进表达式
                let patches = state
                    .loops
                    .last_mut()
                    .map(|c| std::mem::take(&mut c.continue_patches))
                    .unwrap_or_default();
                for at in patches {
                    self.patch(state, at, line)?;
                }
                if let Some(step) = step {
                    self.emit_expr(state, step)?;
                    state.builder.write_op(OpCode::Pop, step.line);
                }
                self.loop_back(state, cond_start, line)?;
                if let Some(exit) = exit {
                    self.patch(state, exit, line)?;
                }
                self.finish_loop(state, line)
            }
            StmtKind::Return(value) => {
                match value {
                    Some(value) => self.emit_expr(state, value)?,
                    None => state.builder.write_op(OpCode::PushNull, line),
                }
                // 帧退出时 VM 丢弃属于该帧的 try 区域
                state.builder.write_op(OpCode::ReturnValue, line);
                Ok(())
            }
            StmtKind::Break => {
                self.emit_try_exits(state, line);
                let at = state.builder.write_jump(OpCode::Jump, line);
                if let Some(ctx) = state.loops.last_mut() {
                    ctx.break_patches.push(at);
                }
                Ok(())
            }
            StmtKind::Continue => {
                self.emit_try_exits(state, line);
                match state.loops.last().and_then(|c| c.continue_target) {
                    Some(target) => self.loop_back(state, target, line)?,
                    None => {
                        let at = state.builder.write_jump(OpCode::Jump, line);
                        if let Some(ctx) = state.loops.last_mut() {
                            ctx.continue_patches.push(at);
                        }
                    }
                }
                Ok(())
            }
            StmtKind::Try {
                try_block,
                catch_block,
                ..
            } => {
                let handler = state.builder.write_jump(OpCode::PushTry, line);
                state.try_depth += 1;
                for inner in try_block {
                    self.emit_stmt(state, inner)?;
                }
                state.try_depth -= 1;
                state.builder.write_op(OpCode::PopTry, line);
                let skip_handler = state.builder.write_jump(OpCode::Jump, line);

                // handler 入口：异常值已被 VM 压栈
                self.patch(state, handler, line)?;
                self.emit_store_declaration(state, self.annotations.resolution(stmt.id), line);
                for inner in catch_block {
                    self.emit_stmt(state, inner)?;
                }
                self.patch(state, skip_handler, line)
            }
            StmtKind::Throw(value) => {
                self.emit_expr(state, value)?;
                state.builder.write_op(OpCode::Throw, line);
                Ok(())
            }
            StmtKind::Block(statements) => {
                for inner in statements {
                    self.emit_stmt(state, inner)?;
                }
                Ok(())
            }
            StmtKind::Expr(value) => {
                self.emit_expr(state, value)?;
                state.builder.write_op(OpCode::Pop, line);
                Ok(())
            }
        }
    }

    /// 声明点的存储：弹出栈顶写入目标槽位
    fn emit_store_declaration(
        &mut self,
        state: &mut FuncState<'_>,
        resolution: Resolution,
        line: u32,
    ) {
        match resolution {
            Resolution::Global { slot } => {
                state.builder.write_op_u16(OpCode::DefineGlobal, slot, line);
            }
            Resolution::Local { slot } => {
                if state.layout.cells.get(slot as usize).copied().unwrap_or(false) {
                    state.builder.write_op_u8(OpCode::NewCell, slot, line);
                } else {
                    state.builder.write_op_u8(OpCode::StoreLocal, slot, line);
                }
            }
            Resolution::Upvalue { index } => {
                // 声明不会解析为上值
                state.builder.write_op_u8(OpCode::StoreUpvalue, index, line);
            }
        }
    }

    /// break/continue 跳出循环前弹掉循环内打开的 try 区域
    fn emit_try_exits(&mut self, state: &mut FuncState<'_>, line: u32) {
        let entry_depth = state
            .loops
            .last()
            .map(|c| c.try_depth_at_entry)
            .unwrap_or(0);
        for _ in entry_depth..state.try_depth {
            state.builder.write_op(OpCode::PopTry, line);
        }
    }

    fn finish_loop(&mut self, state: &mut FuncState<'_>, line: u32) -> Result<(), EmitError> {
        if let Some(ctx) = state.loops.pop() {
            for at in ctx.break_patches {
                self.patch(state, at, line)?;
            }
            debug_assert!(ctx.continue_patches.is_empty());
        }
        Ok(())
    }

    // ==================== 表达式 ====================

    fn emit_expr(&mut self, state: &mut FuncState<'a>, expr: &Expr) -> Result<(), EmitError> {
        let line = expr.line;
        match &expr.kind {
            ExprKind::Int(v) => {
                let index = self.constant(Constant::Int(*v), line)?;
                state.builder.write_op_u16(OpCode::PushConst, index, line);
            }
            ExprKind::Float(v) => {
                let index = self.constant(Constant::Float(*v), line)?;
                state.builder.write_op_u16(OpCode::PushConst, index, line);
            }
            ExprKind::Str(s) => {
                let index = self.constant(Constant::Str(s.clone()), line)?;
                state.builder.write_op_u16(OpCode::PushConst, index, line);
            }
            ExprKind::True => state.builder.write_op(OpCode::PushTrue, line),
            ExprKind::False => state.builder.write_op(OpCode::PushFalse, line),
            ExprKind::Null => state.builder.write_op(OpCode::PushNull, line),
            ExprKind::Array(elements) => {
                for element in elements {
                    self.emit_expr(state, element)?;
                }
                state
                    .builder
                    .write_op_u8(OpCode::NewArray, elements.len() as u8, line);
            }
            ExprKind::Map(entries) => {
                for (key, value) in entries {
                    let index = self.constant(Constant::Str(key.clone()), line)?;
                    state.builder.write_op_u16(OpCode::PushConst, index, line);
                    self.emit_expr(state, value)?;
                }
                state
                    .builder
                    .write_op_u8(OpCode::NewMap, entries.len() as u8, line);
            }
            ExprKind::Var(_) => {
                self.emit_load(state, self.annotations.resolution(expr.id), line);
            }
            ExprKind::Assign { target, value } => match &target.kind {
                ExprKind::Var(_) => {
                    self.emit_expr(state, value)?;
                    state.builder.write_op(OpCode::Dup, line);
                    self.emit_store(state, self.annotations.resolution(target.id), line);
                }
                ExprKind::Index { object, index } => {
                    self.emit_expr(state, object)?;
                    self.emit_expr(state, index)?;
                    self.emit_expr(state, value)?;
                    // IndexSet 弹 3 压回被赋的值
                    state.builder.write_op(OpCode::IndexSet, line);
                }
                // 解析器已拒绝其他目标
                _ => debug_assert!(false, "invalid assignment target survived parsing"),
            },
            ExprKind::Binary { op, lhs, rhs } => {
                self.emit_expr(state, lhs)?;
                self.emit_expr(state, rhs)?;
                let op = match op {
                    BinaryOp::Add => OpCode::Add,
                    BinaryOp::Sub => OpCode::Sub,
                    BinaryOp::Mul => OpCode::Mul,
                    BinaryOp::Div => OpCode::Div,
                    BinaryOp::Mod => OpCode::Mod,
                    BinaryOp::Equal => OpCode::Equal,
                    BinaryOp::NotEqual => OpCode::NotEqual,
                    BinaryOp::Less => OpCode::Less,
                    BinaryOp::LessEqual => OpCode::LessEqual,
                    BinaryOp::Greater => OpCode::Greater,
                    BinaryOp::GreaterEqual => OpCode::GreaterEqual,
                };
                state.builder.write_op(op, line);
            }
            ExprKind::Logical { op, lhs, rhs } => {
                self.emit_expr(state, lhs)?;
                match op {
                    LogicalOp::And => {
                        // 左值为假时短路保留左值
                        state.builder.write_op(OpCode::Dup, line);
                        let end = state.builder.write_jump(OpCode::JumpIfFalse, line);
                        state.builder.write_op(OpCode::Pop, line);
                        self.emit_expr(state, rhs)?;
                        self.patch(state, end, line)?;
                    }
                    LogicalOp::Or => {
                        // 左值为真时短路保留左值
                        state.builder.write_op(OpCode::Dup, line);
                        let take_rhs = state.builder.write_jump(OpCode::JumpIfFalse, line);
                        let end = state.builder.write_jump(OpCode::Jump, line);
                        self.patch(state, take_rhs, line)?;
                        state.builder.write_op(OpCode::Pop, line);
                        self.emit_expr(state, rhs)?;
                        self.patch(state, end, line)?;
                    }
                }
            }
            ExprKind::Unary { op, operand } => {
                self.emit_expr(state, operand)?;
                let op = match op {
                    UnaryOp::Neg => OpCode::Neg,
                    UnaryOp::Not => OpCode::Not,
                };
                state.builder.write_op(op, line);
            }
            ExprKind::Call { callee, args } => {
                self.emit_expr(state, callee)?;
                for arg in args {
                    self.emit_expr(state, arg)?;
                }
                state
                    .builder
                    .write_op_u8(OpCode::Call, args.len() as u8, line);
            }
            ExprKind::Index { object, index } => {
                self.emit_expr(state, object)?;
                self.emit_expr(state, index)?;
                state.builder.write_op(OpCode::IndexGet, line);
            }
            ExprKind::Yield(value) => {
                match value {
                    Some(value) => self.emit_expr(state, value)?,
                    None => state.builder.write_op(OpCode::PushNull, line),
                }
                state.builder.write_op(OpCode::Yield, line);
            }
        }
        Ok(())
    }

    fn emit_load(&mut self, state: &mut FuncState<'_>, resolution: Resolution, line: u32) {
        match resolution {
            Resolution::Local { slot } => {
                if state.layout.cells.get(slot as usize).copied().unwrap_or(false) {
                    state.builder.write_op_u8(OpCode::LoadLocalCell, slot, line);
                } else {
                    state.builder.write_op_u8(OpCode::LoadLocal, slot, line);
                }
            }
            Resolution::Upvalue { index } => {
                state.builder.write_op_u8(OpCode::LoadUpvalue, index, line);
            }
            Resolution::Global { slot } => {
                state.builder.write_op_u16(OpCode::LoadGlobal, slot, line);
            }
        }
    }

    fn emit_store(&mut self, state: &mut FuncState<'_>, resolution: Resolution, line: u32) {
        match resolution {
            Resolution::Local { slot } => {
                if state.layout.cells.get(slot as usize).copied().unwrap_or(false) {
                    state.builder.write_op_u8(OpCode::StoreLocalCell, slot, line);
                } else {
                    state.builder.write_op_u8(OpCode::StoreLocal, slot, line);
                }
            }
            Resolution::Upvalue { index } => {
                state.builder.write_op_u8(OpCode::StoreUpvalue, index, line);
            }
            Resolution::Global { slot } => {
                state.builder.write_op_u16(OpCode::StoreGlobal, slot, line);
            }
        }
    }
}
