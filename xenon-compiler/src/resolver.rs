//! 名字解析
//!
//! 独立的一遍，介于语法分析和发射之间。把每个变量引用归类为
//! 局部槽 / 上值 / 全局槽，写入以 NodeId 为键的旁表；同时为每个
//! 函数（含脚本入口）产出布局：局部槽数量、被内层函数捕获而需要
//! 装箱的槽位、上值描述符表。
//!
//! 槽位分配不复用：同一函数内每个声明占独立槽位，装箱标记因此
//! 可以按槽位存储。顶层最外层作用域的声明进全局表，顶层块内的
//! 声明是入口函数的局部。

use std::collections::HashMap;

use tracing::trace;
use xenon_module::UpvalueDesc;

use crate::ast::{Expr, ExprKind, FunctionDecl, NodeId, Program, Stmt, StmtKind};

/// 解析错误类型
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ResolveErrorKind {
    UndeclaredIdentifier(String),
    DuplicateDeclaration(String),
    InvalidBreakOrContinue,
    InvalidReturn,
    TooManyLocals,
    TooManyUpvalues,
    TooManyGlobals,
}

/// 解析错误，带行号
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("line {line}: {}", kind_message(.kind))]
pub struct ResolveError {
    pub kind: ResolveErrorKind,
    pub line: u32,
}

fn kind_message(kind: &ResolveErrorKind) -> String {
    match kind {
        ResolveErrorKind::UndeclaredIdentifier(name) => {
            format!("use of undeclared identifier '{name}'")
        }
        ResolveErrorKind::DuplicateDeclaration(name) => {
            format!("duplicate declaration of '{name}'")
        }
        ResolveErrorKind::InvalidBreakOrContinue => {
            "'break' or 'continue' outside of a loop".to_string()
        }
        ResolveErrorKind::InvalidReturn => "'return' outside of a function".to_string(),
        ResolveErrorKind::TooManyLocals => {
            "too many local variables in one function (limit 255)".to_string()
        }
        ResolveErrorKind::TooManyUpvalues => {
            "too many captured variables in one function (limit 255)".to_string()
        }
        ResolveErrorKind::TooManyGlobals => "too many global variables".to_string(),
    }
}

/// 单个名字引用（或声明）的归宿
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Resolution {
    Local { slot: u8 },
    Upvalue { index: u8 },
    Global { slot: u16 },
}

/// 函数布局，发射器据此生成函数记录
#[derive(Debug, Clone, PartialEq, Default)]
pub struct FunctionLayout {
    pub local_count: u8,
    /// 按槽位索引：该槽是否被内层函数捕获（需装箱为 cell）
    pub cells: Vec<bool>,
    pub upvalues: Vec<UpvalueDesc>,
}

/// 解析结果旁表
#[derive(Debug, Clone, PartialEq)]
pub struct Annotations {
    resolutions: HashMap<NodeId, Resolution>,
    /// 以函数声明语句的 NodeId 为键
    functions: HashMap<NodeId, FunctionLayout>,
    /// 脚本入口的布局
    pub root: FunctionLayout,
    /// 全局槽位表（前段为宿主注册的名字）
    pub global_names: Vec<String>,
}

impl Annotations {
    pub fn resolution(&self, id: NodeId) -> Resolution {
        // 解析遍保证每个引用节点都有记录
        self.resolutions[&id]
    }

    pub fn function_layout(&self, id: NodeId) -> &FunctionLayout {
        &self.functions[&id]
    }
}

/// 对整个程序做名字解析
///
/// `host_globals` 是宿主预注册的全局名（原生函数等），占据全局表
/// 的前段槽位，脚本可以直接引用。
pub fn resolve(program: &Program, host_globals: &[String]) -> Result<Annotations, ResolveError> {
    let mut resolver = Resolver::new(program, host_globals)?;
    resolver.run(program)?;
    trace!(
        target: "xenon::resolver",
        globals = resolver.global_names.len(),
        functions = resolver.functions.len() + 1,
        "resolve finished"
    );
    Ok(Annotations {
        resolutions: resolver.resolutions,
        functions: resolver.functions,
        root: resolver
            .scopes
            .pop()
            .map(FuncScope::into_layout)
            .unwrap_or_default(),
        global_names: resolver.global_names,
    })
}

struct LocalVar {
    name: String,
    depth: u32,
    slot: u8,
}

struct FuncScope {
    /// 当前可见的局部（块结束即弹出，槽位不回收）
    locals: Vec<LocalVar>,
    /// 已分配的槽位总数
    next_slot: u16,
    cells: Vec<bool>,
    upvalues: Vec<UpvalueDesc>,
    scope_depth: u32,
    loop_depth: u32,
}

impl FuncScope {
    fn new() -> Self {
        Self {
            locals: Vec::new(),
            next_slot: 0,
            cells: Vec::new(),
            upvalues: Vec::new(),
            scope_depth: 0,
            loop_depth: 0,
        }
    }

    fn into_layout(self) -> FunctionLayout {
        FunctionLayout {
            local_count: self.next_slot as u8,
            cells: self.cells,
            upvalues: self.upvalues,
        }
    }
}

struct Resolver {
    scopes: Vec<FuncScope>,
    resolutions: HashMap<NodeId, Resolution>,
    functions: HashMap<NodeId, FunctionLayout>,
    global_names: Vec<String>,
    /// 源码里声明（而非宿主注册）的全局数量下界，用于重复检查
    host_global_count: usize,
}

impl Resolver {
    /// 预扫描顶层声明，建立全局表，支持前向引用
    fn new(program: &Program, host_globals: &[String]) -> Result<Self, ResolveError> {
        let mut global_names: Vec<String> = host_globals.to_vec();
        for stmt in &program.statements {
            let name = match &stmt.kind {
                StmtKind::Var { name, .. } => name,
                StmtKind::Function(decl) => &decl.name,
                _ => continue,
            };
            if global_names.iter().any(|n| n == name) {
                return Err(ResolveError {
                    kind: ResolveErrorKind::DuplicateDeclaration(name.clone()),
                    line: stmt.line,
                });
            }
            if global_names.len() >= u16::MAX as usize {
                return Err(ResolveError {
                    kind: ResolveErrorKind::TooManyGlobals,
                    line: stmt.line,
                });
            }
            global_names.push(name.clone());
        }
        Ok(Self {
            scopes: vec![FuncScope::new()],
            resolutions: HashMap::new(),
            functions: HashMap::new(),
            global_names,
            host_global_count: host_globals.len(),
        })
    }

    fn run(&mut self, program: &Program) -> Result<(), ResolveError> {
        for stmt in &program.statements {
            self.resolve_stmt(stmt)?;
        }
        Ok(())
    }

    fn scope(&mut self) -> &mut FuncScope {
        // scopes 栈在 run 期间永不为空
        self.scopes.last_mut().unwrap_or_else(|| unreachable!())
    }

    fn at_script_top_level(&self) -> bool {
        self.scopes.len() == 1 && self.scopes[0].scope_depth == 0
    }

    fn err(&self, kind: ResolveErrorKind, line: u32) -> ResolveError {
        ResolveError { kind, line }
    }

    // ==================== 声明 ====================

    /// 把名字登记为当前函数的局部，返回槽位
    fn declare_local(&mut self, name: &str, line: u32) -> Result<u8, ResolveError> {
        let scope = self.scopes.last_mut().unwrap_or_else(|| unreachable!());
        let duplicate = scope
            .locals
            .iter()
            .any(|l| l.depth == scope.scope_depth && l.name == name);
        if duplicate {
            return Err(ResolveError {
                kind: ResolveErrorKind::DuplicateDeclaration(name.to_string()),
                line,
            });
        }
        // local_count 在函数记录里是 u8，255 是最后一个可表示的数量
        if scope.next_slot >= 255 {
            return Err(ResolveError {
                kind: ResolveErrorKind::TooManyLocals,
                line,
            });
        }
        let slot = scope.next_slot as u8;
        scope.next_slot += 1;
        scope.cells.push(false);
        scope.locals.push(LocalVar {
            name: name.to_string(),
            depth: scope.scope_depth,
            slot,
        });
        Ok(slot)
    }

    fn global_slot(&self, name: &str) -> Option<u16> {
        self.global_names
            .iter()
            .position(|n| n == name)
            .map(|i| i as u16)
    }

    /// 声明点的归宿：顶层最外层进全局表，其余进局部槽
    fn resolve_declaration(&mut self, id: NodeId, name: &str, line: u32) -> Result<(), ResolveError> {
        let resolution = if self.at_script_top_level() {
            // 预扫描已登记过
            let slot = self
                .global_slot(name)
                .ok_or_else(|| self.err(ResolveErrorKind::UndeclaredIdentifier(name.to_string()), line))?;
            Resolution::Global { slot }
        } else {
            Resolution::Local {
                slot: self.declare_local(name, line)?,
            }
        };
        self.resolutions.insert(id, resolution);
        Ok(())
    }

    // ==================== 引用 ====================

    fn resolve_name(&mut self, id: NodeId, name: &str, line: u32) -> Result<(), ResolveError> {
        let level = self.scopes.len() - 1;
        let resolution = if let Some(slot) = self.find_local(level, name) {
            Resolution::Local { slot }
        } else if let Some(index) = self.find_upvalue(level, name, line)? {
            Resolution::Upvalue { index }
        } else if let Some(slot) = self.global_slot(name) {
            Resolution::Global { slot }
        } else {
            return Err(self.err(
                ResolveErrorKind::UndeclaredIdentifier(name.to_string()),
                line,
            ));
        };
        self.resolutions.insert(id, resolution);
        Ok(())
    }

    fn find_local(&self, level: usize, name: &str) -> Option<u8> {
        self.scopes[level]
            .locals
            .iter()
            .rev()
            .find(|l| l.name == name)
            .map(|l| l.slot)
    }

    /// 在外层函数链上查找并登记上值，返回当前层的上值索引
    fn find_upvalue(
        &mut self,
        level: usize,
        name: &str,
        line: u32,
    ) -> Result<Option<u8>, ResolveError> {
        if level == 0 {
            return Ok(None);
        }
        if let Some(slot) = self.find_local(level - 1, name) {
            // 被捕获的父局部装箱为 cell
            self.scopes[level - 1].cells[slot as usize] = true;
            let desc = UpvalueDesc {
                from_parent_local: true,
                index: slot,
            };
            return Ok(Some(self.add_upvalue(level, desc, line)?));
        }
        if let Some(parent_index) = self.find_upvalue(level - 1, name, line)? {
            let desc = UpvalueDesc {
                from_parent_local: false,
                index: parent_index,
            };
            return Ok(Some(self.add_upvalue(level, desc, line)?));
        }
        Ok(None)
    }

    fn add_upvalue(&mut self, level: usize, desc: UpvalueDesc, line: u32) -> Result<u8, ResolveError> {
        let upvalues = &mut self.scopes[level].upvalues;
        if let Some(i) = upvalues.iter().position(|u| *u == desc) {
            return Ok(i as u8);
        }
        if upvalues.len() >= 255 {
            return Err(ResolveError {
                kind: ResolveErrorKind::TooManyUpvalues,
                line,
            });
        }
        upvalues.push(desc);
        Ok((upvalues.len() - 1) as u8)
    }

    // ==================== 语句 ====================

    fn begin_scope(&mut self) {
        self.scope().scope_depth += 1;
    }

    fn end_scope(&mut self) {
        let scope = self.scopes.last_mut().unwrap_or_else(|| unreachable!());
        scope.scope_depth -= 1;
        let depth = scope.scope_depth;
        scope.locals.retain(|l| l.depth <= depth);
    }

    fn resolve_block(&mut self, statements: &[Stmt]) -> Result<(), ResolveError> {
        self.begin_scope();
        for stmt in statements {
            self.resolve_stmt(stmt)?;
        }
        self.end_scope();
        Ok(())
    }

    fn resolve_stmt(&mut self, stmt: &Stmt) -> Result<(), ResolveError> {
        match &stmt.kind {
            StmtKind::Var { name, init } => {
                if let Some(init) = init {
                    self.resolve_expr(init)?;
                }
                // 初始化表达式先解析，声明自身不可见（var x = x; 引用外层）
                self.resolve_declaration(stmt.id, name, stmt.line)
            }
            StmtKind::Function(decl) => {
                // 名字先于函数体可见，允许递归
                self.resolve_declaration(stmt.id, &decl.name, stmt.line)?;
                self.resolve_function(stmt.id, decl)
            }
            StmtKind::If {
                condition,
                then_branch,
                else_branch,
            } => {
                self.resolve_expr(condition)?;
                self.resolve_block(then_branch)?;
                if let Some(else_branch) = else_branch {
                    self.resolve_block(else_branch)?;
                }
                Ok(())
            }
            StmtKind::While { condition, body } => {
                self.resolve_expr(condition)?;
                self.scope().loop_depth += 1;
                self.resolve_block(body)?;
                self.scope().loop_depth -= 1;
                Ok(())
            }
            StmtKind::For {
                init,
                condition,
                step,
                body,
            } => {
                // init 里的声明作用域覆盖整个 for
                self.begin_scope();
                if let Some(init) = init {
                    self.resolve_stmt(init)?;
                }
                if let Some(condition) = condition {
                    self.resolve_expr(condition)?;
                }
                if let Some(step) = step {
                    self.resolve_expr(step)?;
                }
                self.scope().loop_depth += 1;
                self.resolve_block(body)?;
                self.scope().loop_depth -= 1;
                self.end_scope();
                Ok(())
            }
            StmtKind::Return(value) => {
                if self.scopes.len() == 1 {
                    return Err(self.err(ResolveErrorKind::InvalidReturn, stmt.line));
                }
                if let Some(value) = value {
                    self.resolve_expr(value)?;
                }
                Ok(())
            }
            StmtKind::Break | StmtKind::Continue => {
                if self.scope().loop_depth == 0 {
                    return Err(self.err(ResolveErrorKind::InvalidBreakOrContinue, stmt.line));
                }
                Ok(())
            }
            StmtKind::Try {
                try_block,
                catch_name,
                catch_block,
            } => {
                self.resolve_block(try_block)?;
                self.begin_scope();
                let slot = self.declare_local(catch_name, stmt.line)?;
                self.resolutions.insert(stmt.id, Resolution::Local { slot });
                for inner in catch_block {
                    self.resolve_stmt(inner)?;
                }
                self.end_scope();
                Ok(())
            }
            StmtKind::Throw(value) => self.resolve_expr(value),
            StmtKind::Block(statements) => self.resolve_block(statements),
            StmtKind::Expr(value) => self.resolve_expr(value),
        }
    }

    fn resolve_function(&mut self, id: NodeId, decl: &FunctionDecl) -> Result<(), ResolveError> {
        self.scopes.push(FuncScope::new());
        self.begin_scope();
        for param in &decl.params {
            // 参数占据最前面的槽位
            self.declare_local(param, 0)?;
        }
        for stmt in &decl.body {
            self.resolve_stmt(stmt)?;
        }
        self.end_scope();
        let scope = self.scopes.pop().unwrap_or_else(|| unreachable!());
        self.functions.insert(id, scope.into_layout());
        Ok(())
    }

    // ==================== 表达式 ====================

    fn resolve_expr(&mut self, expr: &Expr) -> Result<(), ResolveError> {
        match &expr.kind {
            ExprKind::Int(_)
            | ExprKind::Float(_)
            | ExprKind::Str(_)
            | ExprKind::True
            | ExprKind::False
            | ExprKind::Null => Ok(()),
            ExprKind::Array(elements) => {
                for element in elements {
                    self.resolve_expr(element)?;
                }
                Ok(())
            }
            ExprKind::Map(entries) => {
                for (_, value) in entries {
                    self.resolve_expr(value)?;
                }
                Ok(())
            }
            ExprKind::Var(name) => self.resolve_name(expr.id, name, expr.line),
            ExprKind::Assign { target, value } => {
                self.resolve_expr(value)?;
                match &target.kind {
                    ExprKind::Var(name) => self.resolve_name(target.id, name, target.line),
                    _ => self.resolve_expr(target),
                }
            }
            ExprKind::Binary { lhs, rhs, .. } | ExprKind::Logical { lhs, rhs, .. } => {
                self.resolve_expr(lhs)?;
                self.resolve_expr(rhs)
            }
            ExprKind::Unary { operand, .. } => self.resolve_expr(operand),
            ExprKind::Call { callee, args } => {
                self.resolve_expr(callee)?;
                for arg in args {
                    self.resolve_expr(arg)?;
                }
                Ok(())
            }
            ExprKind::Index { object, index } => {
                self.resolve_expr(object)?;
                self.resolve_expr(index)
            }
            ExprKind::Yield(value) => {
                if let Some(value) = value {
                    self.resolve_expr(value)?;
                }
                Ok(())
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::lexer::tokenize;
    use crate::parser::parse;

    fn resolve_source(source: &str) -> Result<Annotations, ResolveError> {
        resolve_source_with(source, &[])
    }

    fn resolve_source_with(
        source: &str,
        host_globals: &[&str],
    ) -> Result<Annotations, ResolveError> {
        let program = parse(tokenize(source).unwrap()).unwrap();
        let hosts: Vec<String> = host_globals.iter().map(|s| s.to_string()).collect();
        resolve(&program, &hosts)
    }

    #[test]
    fn test_top_level_is_global() {
        let annotations = resolve_source("var x = 1; x;").unwrap();
        assert_eq!(annotations.global_names, vec!["x".to_string()]);
        assert_eq!(annotations.root.local_count, 0);
    }

    #[test]
    fn test_block_local_in_script() {
        let annotations = resolve_source("{ var x = 1; x; }").unwrap();
        assert!(annotations.global_names.is_empty());
        assert_eq!(annotations.root.local_count, 1);
    }

    #[test]
    fn test_undeclared_identifier() {
        let err = resolve_source("y;").unwrap_err();
        assert_eq!(
            err.kind,
            ResolveErrorKind::UndeclaredIdentifier("y".to_string())
        );
    }

    #[test]
    fn test_host_global_visible() {
        let annotations = resolve_source_with("print(1);", &["print"]).unwrap();
        assert_eq!(annotations.global_names, vec!["print".to_string()]);
    }

    #[test]
    fn test_forward_reference_between_functions() {
        let source = "function even(n) { if (n == 0) { return true; } return odd(n - 1); }\n\
                      function odd(n) { if (n == 0) { return false; } return even(n - 1); }";
        assert!(resolve_source(source).is_ok());
    }

    #[test]
    fn test_duplicate_local() {
        let err = resolve_source("function f() { var a = 1; var a = 2; }").unwrap_err();
        assert_eq!(
            err.kind,
            ResolveErrorKind::DuplicateDeclaration("a".to_string())
        );
    }

    #[test]
    fn test_shadowing_in_inner_block_allowed() {
        assert!(resolve_source("function f() { var a = 1; { var a = 2; a; } }").is_ok());
    }

    #[test]
    fn test_break_outside_loop() {
        let err = resolve_source("function f() { break; }").unwrap_err();
        assert_eq!(err.kind, ResolveErrorKind::InvalidBreakOrContinue);
    }

    #[test]
    fn test_return_at_top_level() {
        let err = resolve_source("return 1;").unwrap_err();
        assert_eq!(err.kind, ResolveErrorKind::InvalidReturn);
    }

    #[test]
    fn test_capture_marks_cell() {
        let source = "function outer() {\n\
                        var counter = 0;\n\
                        function bump() { counter = counter + 1; return counter; }\n\
                        return bump;\n\
                      }";
        let program = parse(tokenize(source).unwrap()).unwrap();
        let annotations = resolve(&program, &[]).unwrap();

        let outer_id = program.statements[0].id;
        let outer = annotations.function_layout(outer_id);
        // counter 槽位被捕获
        assert!(outer.cells.iter().any(|&c| c));

        // 内层函数有一个来自父局部的上值
        let StmtKind::Function(outer_decl) = &program.statements[0].kind else {
            panic!("expected function");
        };
        let bump_id = outer_decl
            .body
            .iter()
            .find_map(|s| match &s.kind {
                StmtKind::Function(_) => Some(s.id),
                _ => None,
            })
            .unwrap();
        let bump = annotations.function_layout(bump_id);
        assert_eq!(bump.upvalues.len(), 1);
        assert!(bump.upvalues[0].from_parent_local);
    }

    #[test]
    fn test_catch_binding_is_local() {
        let source = "try { throw 1; } catch (e) { e; }";
        let program = parse(tokenize(source).unwrap()).unwrap();
        let annotations = resolve(&program, &[]).unwrap();
        let try_id = program.statements[0].id;
        assert!(matches!(
            annotations.resolution(try_id),
            Resolution::Local { .. }
        ));
    }

    #[test]
    fn test_slots_not_reused_across_blocks() {
        // 两个块各占一个槽
        let program = parse(tokenize("function f() { { var a = 1; } { var b = 2; } }").unwrap())
            .unwrap();
        let annotations = resolve(&program, &[]).unwrap();
        let layout = annotations.function_layout(program.statements[0].id);
        assert_eq!(layout.local_count, 2);
    }

    fn function_with_locals(count: usize) -> String {
        let mut source = String::from("function f() {\n");
        for i in 0..count {
            source.push_str(&format!("var v{i} = {i};\n"));
        }
        source.push('}');
        source
    }

    #[test]
    fn test_local_limit_boundary() {
        // 255 个局部刚好填满 u8 计数
        let source = function_with_locals(255);
        let program = parse(tokenize(&source).unwrap()).unwrap();
        let annotations = resolve(&program, &[]).unwrap();
        let layout = annotations.function_layout(program.statements[0].id);
        assert_eq!(layout.local_count, 255);

        let err = resolve_source(&function_with_locals(256)).unwrap_err();
        assert_eq!(err.kind, ResolveErrorKind::TooManyLocals);
    }

    #[test]
    fn test_top_level_forward_reference_is_global() {
        // 顶层声明先预扫描，声明前的引用解析为全局槽而不是解析错误
        let source = "function peek() { return later; }\nvar later = 7;";
        let program = parse(tokenize(source).unwrap()).unwrap();
        let annotations = resolve(&program, &[]).unwrap();
        assert!(annotations
            .global_names
            .iter()
            .any(|n| n == "later"));
    }
}
