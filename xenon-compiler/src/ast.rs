//! 抽象语法树
//!
//! 每个需要名字解析的节点携带唯一的 [`NodeId`]，解析器
//! （resolver）把解析结果写进以 NodeId 为键的旁表，发射器
//! 按表取用。AST 自身在各遍之间不被改写。

/// AST 节点编号，解析旁表的键
pub type NodeId = u32;

/// 二元算术 / 比较运算符
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BinaryOp {
    Add,
    Sub,
    Mul,
    Div,
    Mod,
    Equal,
    NotEqual,
    Less,
    LessEqual,
    Greater,
    GreaterEqual,
}

/// 短路逻辑运算符
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogicalOp {
    And,
    Or,
}

/// 一元运算符
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnaryOp {
    Neg,
    Not,
}

/// 表达式节点
#[derive(Debug, Clone, PartialEq)]
pub struct Expr {
    pub id: NodeId,
    pub line: u32,
    pub kind: ExprKind,
}

#[derive(Debug, Clone, PartialEq)]
pub enum ExprKind {
    Int(i64),
    Float(f64),
    Str(String),
    True,
    False,
    Null,
    /// 数组字面量 `[a, b, c]`
    Array(Vec<Expr>),
    /// 映射字面量 `{ "k": v }`，键为字符串字面量或标识符简写
    Map(Vec<(String, Expr)>),
    /// 变量引用，解析结果在旁表中
    Var(String),
    /// 赋值表达式，求值为被赋的值
    Assign {
        target: Box<Expr>,
        value: Box<Expr>,
    },
    Binary {
        op: BinaryOp,
        lhs: Box<Expr>,
        rhs: Box<Expr>,
    },
    Logical {
        op: LogicalOp,
        lhs: Box<Expr>,
        rhs: Box<Expr>,
    },
    Unary {
        op: UnaryOp,
        operand: Box<Expr>,
    },
    Call {
        callee: Box<Expr>,
        args: Vec<Expr>,
    },
    /// 索引访问；`a.b` 在解析阶段脱糖为 `a["b"]`
    Index {
        object: Box<Expr>,
        index: Box<Expr>,
    },
    /// yield 表达式，无操作数时产出 null
    Yield(Option<Box<Expr>>),
}

/// 语句节点
#[derive(Debug, Clone, PartialEq)]
pub struct Stmt {
    pub id: NodeId,
    pub line: u32,
    pub kind: StmtKind,
}

#[derive(Debug, Clone, PartialEq)]
pub enum StmtKind {
    /// 变量声明，缺省初始化为 null
    Var {
        name: String,
        init: Option<Expr>,
    },
    /// 函数声明（顶层为全局，函数体内为局部）
    Function(FunctionDecl),
    If {
        condition: Expr,
        then_branch: Vec<Stmt>,
        else_branch: Option<Vec<Stmt>>,
    },
    While {
        condition: Expr,
        body: Vec<Stmt>,
    },
    /// C 风格 for，三个子句均可省略
    For {
        init: Option<Box<Stmt>>,
        condition: Option<Expr>,
        step: Option<Expr>,
        body: Vec<Stmt>,
    },
    Return(Option<Expr>),
    Break,
    Continue,
    Try {
        try_block: Vec<Stmt>,
        /// catch 绑定变量，解析为 catch 块内的局部
        catch_name: String,
        catch_block: Vec<Stmt>,
    },
    Throw(Expr),
    Block(Vec<Stmt>),
    Expr(Expr),
}

/// 函数声明
#[derive(Debug, Clone, PartialEq)]
pub struct FunctionDecl {
    pub name: String,
    pub params: Vec<String>,
    pub body: Vec<Stmt>,
}

/// 整个翻译单元
#[derive(Debug, Clone, PartialEq)]
pub struct Program {
    pub statements: Vec<Stmt>,
    /// 分配过的 NodeId 数量，旁表可据此预留容量
    pub node_count: u32,
}
