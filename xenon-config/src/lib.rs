//! Xenon Config - Pure configuration data structures
//!
//! This crate contains only data structures, no logic or global state.
//! It serves as the shared configuration vocabulary across all Xenon crates.

use serde::{Deserialize, Serialize};

/// Configuration for compiler behavior
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CompilerConfig {
    /// Whether to emit debug line tables into the module
    pub emit_debug_info: bool,
    /// Whether to dump disassembled bytecode after emission
    pub dump_bytecode: bool,
}

/// Configuration for execution limits
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LimitConfig {
    /// Maximum values on one fiber's evaluation stack
    pub max_stack_size: usize,
    /// Maximum call frames on one fiber
    pub max_frames: usize,
}

/// Configuration for one VM instance
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct VmConfig {
    /// Heap bytes allocated since the last collection before the GC runs
    pub gc_threshold: usize,
    /// Execution limits
    pub limits: LimitConfig,
}

/// Execution phase enum for phase-specific configuration
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Phase {
    Lexer,
    Parser,
    Resolver,
    Emitter,
    Loader,
    Vm,
    Gc,
}

impl Phase {
    /// Get the string name of the phase
    pub fn as_str(&self) -> &'static str {
        match self {
            Phase::Lexer => "lexer",
            Phase::Parser => "parser",
            Phase::Resolver => "resolver",
            Phase::Emitter => "emitter",
            Phase::Loader => "loader",
            Phase::Vm => "vm",
            Phase::Gc => "gc",
        }
    }

    /// Get the log target name for this phase
    pub fn target(&self) -> String {
        format!("xenon::{}", self.as_str())
    }
}

impl Default for CompilerConfig {
    fn default() -> Self {
        Self {
            emit_debug_info: true,
            dump_bytecode: false,
        }
    }
}

impl Default for LimitConfig {
    fn default() -> Self {
        Self {
            max_stack_size: 16 * 1024,
            max_frames: 256,
        }
    }
}

impl Default for VmConfig {
    fn default() -> Self {
        Self {
            gc_threshold: 1024 * 1024,
            limits: LimitConfig::default(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_compiler_config() {
        let cfg = CompilerConfig::default();
        assert!(cfg.emit_debug_info);
        assert!(!cfg.dump_bytecode);
    }

    #[test]
    fn test_default_vm_config() {
        let cfg = VmConfig::default();
        assert_eq!(cfg.gc_threshold, 1024 * 1024);
        assert_eq!(cfg.limits.max_frames, 256);
    }

    #[test]
    fn test_phase_as_str() {
        assert_eq!(Phase::Lexer.as_str(), "lexer");
        assert_eq!(Phase::Vm.target(), "xenon::vm");
        assert_eq!(Phase::Gc.target(), "xenon::gc");
    }

    #[test]
    fn test_config_roundtrip_json() {
        let cfg = VmConfig::default();
        let json = serde_json::to_string(&cfg).unwrap();
        let back: VmConfig = serde_json::from_str(&json).unwrap();
        assert_eq!(back.gc_threshold, cfg.gc_threshold);
    }

    #[test]
    fn test_partial_config_json() {
        // 缺省字段走 Default
        let cfg: VmConfig = serde_json::from_str(r#"{"gc_threshold": 4096}"#).unwrap();
        assert_eq!(cfg.gc_threshold, 4096);
        assert_eq!(cfg.limits.max_stack_size, 16 * 1024);
    }
}
