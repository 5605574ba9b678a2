//! CLI 日志系统初始化
//!
//! 基于 `tracing-subscriber` 实现分阶段日志控制。

use std::io;

use tracing_subscriber::{
    filter::{LevelFilter, Targets},
    fmt,
    layer::SubscriberExt,
    util::SubscriberInitExt,
    Layer,
};
use xenon_config::Phase;

/// 日志输出格式
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum LogFormat {
    /// 彩色格式化（开发使用）
    Pretty,
    /// 紧凑格式
    Compact,
    /// JSON 格式（工具集成）
    Json,
}

impl LogFormat {
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "pretty" => Some(LogFormat::Pretty),
            "compact" => Some(LogFormat::Compact),
            "json" => Some(LogFormat::Json),
            _ => None,
        }
    }
}

/// CLI 日志配置
#[derive(Debug, Clone)]
pub struct LogConfig {
    pub global: LevelFilter,
    /// 各阶段的覆盖级别，缺省沿用 global
    pub overrides: Vec<(Phase, LevelFilter)>,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            global: LevelFilter::INFO,
            overrides: Vec::new(),
        }
    }
}

impl LogConfig {
    pub fn level_for(&self, phase: Phase) -> LevelFilter {
        self.overrides
            .iter()
            .find(|(p, _)| *p == phase)
            .map(|(_, level)| *level)
            .unwrap_or(self.global)
    }
}

/// 解析级别名，"silent" 关闭所有输出
pub fn level_from_str(s: &str) -> Option<LevelFilter> {
    match s {
        "silent" => Some(LevelFilter::OFF),
        "error" => Some(LevelFilter::ERROR),
        "warn" => Some(LevelFilter::WARN),
        "info" => Some(LevelFilter::INFO),
        "debug" => Some(LevelFilter::DEBUG),
        "trace" => Some(LevelFilter::TRACE),
        _ => None,
    }
}

const PHASES: [Phase; 7] = [
    Phase::Lexer,
    Phase::Parser,
    Phase::Resolver,
    Phase::Emitter,
    Phase::Loader,
    Phase::Vm,
    Phase::Gc,
];

/// 使用指定格式和日志配置初始化日志系统
pub fn init(config: &LogConfig, format: LogFormat) {
    let mut targets = Targets::new().with_default(config.global);
    for phase in PHASES {
        targets = targets.with_target(phase.target(), config.level_for(phase));
    }

    let stderr_layer = format_layer(format, io::stderr).with_filter(targets);
    tracing_subscriber::registry().with(stderr_layer).init();
}

fn format_layer<W, F>(format: LogFormat, make_writer: F) -> impl Layer<tracing_subscriber::Registry>
where
    W: io::Write + Send + Sync + 'static,
    F: Fn() -> W + Send + Sync + 'static,
{
    match format {
        LogFormat::Pretty => fmt::layer()
            .pretty()
            .with_target(true)
            .with_timer(fmt::time::time())
            .with_writer(make_writer)
            .boxed(),
        LogFormat::Compact => fmt::layer()
            .compact()
            .with_target(false)
            .without_time()
            .with_writer(make_writer)
            .boxed(),
        LogFormat::Json => fmt::layer()
            .json()
            .with_target(true)
            .with_timer(fmt::time::time())
            .with_writer(make_writer)
            .boxed(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_level_for_falls_back_to_global() {
        let config = LogConfig {
            global: LevelFilter::WARN,
            overrides: vec![(Phase::Gc, LevelFilter::TRACE)],
        };
        assert_eq!(config.level_for(Phase::Gc), LevelFilter::TRACE);
        assert_eq!(config.level_for(Phase::Vm), LevelFilter::WARN);
    }

    #[test]
    fn test_level_from_str() {
        assert_eq!(level_from_str("silent"), Some(LevelFilter::OFF));
        assert_eq!(level_from_str("debug"), Some(LevelFilter::DEBUG));
        assert_eq!(level_from_str("loud"), None);
    }

    #[test]
    fn test_format_parse() {
        assert_eq!(LogFormat::parse("json"), Some(LogFormat::Json));
        assert_eq!(LogFormat::parse("xml"), None);
    }
}
