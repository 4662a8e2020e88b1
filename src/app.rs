//! 控制接口：命令解析和文本端点

pub mod command;
pub mod endpoint;
