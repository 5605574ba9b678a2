//! 函数记录与调试行号表

/// upvalue 捕获描述
///
/// `from_parent_local` 为真时 `index` 是外层函数的局部槽位（其值是 Cell），
/// 否则是外层闭包自身 upvalue 列表的索引。
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct UpvalueDesc {
    pub from_parent_local: bool,
    pub index: u8,
}

/// 行号表：按 (起始偏移, 行号) 游程编码，与 code 解耦
#[derive(Debug, Clone, Default, PartialEq)]
pub struct LineTable {
    runs: Vec<(u32, u32)>,
}

impl LineTable {
    pub fn new() -> Self {
        Self { runs: Vec::new() }
    }

    pub fn from_runs(runs: Vec<(u32, u32)>) -> Self {
        Self { runs }
    }

    pub fn is_empty(&self) -> bool {
        self.runs.is_empty()
    }

    pub fn runs(&self) -> &[(u32, u32)] {
        &self.runs
    }

    /// 记录从 `offset` 开始的指令属于 `line`
    pub fn push(&mut self, offset: u32, line: u32) {
        if let Some(&(_, last_line)) = self.runs.last() {
            if last_line == line {
                return;
            }
        }
        self.runs.push((offset, line));
    }

    /// 查询字节偏移对应的源码行；无调试信息时返回 0
    pub fn line_for_offset(&self, offset: u32) -> u32 {
        match self.runs.binary_search_by(|&(start, _)| start.cmp(&offset)) {
            Ok(i) => self.runs[i].1,
            Err(0) => 0,
            Err(i) => self.runs[i - 1].1,
        }
    }
}

/// 模块函数表条目
#[derive(Debug, Clone, PartialEq)]
pub struct FunctionRecord {
    /// 函数名（顶层脚本体为 `<main>`）
    pub name: String,
    /// 形参个数（占据前 arity 个局部槽位）
    pub arity: u8,
    /// 局部槽位总数（含形参）
    pub local_count: u8,
    /// 求值栈最大深度（加载时预分配用）
    pub max_stack: u16,
    /// 捕获列表
    pub upvalues: Vec<UpvalueDesc>,
    /// 指令流
    pub code: Vec<u8>,
    /// 行号表（strip-debug 后为空）
    pub lines: LineTable,
}

impl FunctionRecord {
    /// 该函数是否需要闭包包装
    pub fn captures_anything(&self) -> bool {
        !self.upvalues.is_empty()
    }
}
