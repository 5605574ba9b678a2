//! 常量池条目
//!
//! null/true/false 有专用指令，不进常量池。

/// 常量池条目（编译期字面值）
#[derive(Debug, Clone, PartialEq)]
pub enum Constant {
    Int(i64),
    Float(f64),
    Str(String),
}

/// 常量去重键：浮点按位比较，NaN 也能去重
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum ConstantKey {
    Int(i64),
    Float(u64),
    Str(String),
}

impl Constant {
    pub fn key(&self) -> ConstantKey {
        match self {
            Constant::Int(n) => ConstantKey::Int(*n),
            Constant::Float(f) => ConstantKey::Float(f.to_bits()),
            Constant::Str(s) => ConstantKey::Str(s.clone()),
        }
    }

    /// 序列化 tag
    pub(crate) fn tag(&self) -> u8 {
        match self {
            Constant::Int(_) => 1,
            Constant::Float(_) => 2,
            Constant::Str(_) => 3,
        }
    }
}

impl std::fmt::Display for Constant {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Constant::Int(n) => write!(f, "{}", n),
            Constant::Float(x) => write!(f, "{}", x),
            Constant::Str(s) => write!(f, "{:?}", s),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_key_dedup_floats() {
        assert_eq!(Constant::Float(1.5).key(), Constant::Float(1.5).key());
        assert_ne!(Constant::Float(1.5).key(), Constant::Float(2.5).key());
        // NaN 与自身去重
        assert_eq!(
            Constant::Float(f64::NAN).key(),
            Constant::Float(f64::NAN).key()
        );
    }

    #[test]
    fn test_key_distinguishes_types() {
        assert_ne!(Constant::Int(1).key(), Constant::Float(1.0).key());
    }
}
