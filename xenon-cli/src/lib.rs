//! XenonScript CLI - 两个前端共享的基础设施
//!
//! `xenonc`（编译器）与 `xenon`（运行时）共用日志初始化、项目配置、
//! 诊断输出和宿主原生函数注册。

pub mod diagnostics;
pub mod logging;
pub mod natives;
pub mod project;
