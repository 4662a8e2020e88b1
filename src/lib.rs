//! BCM2837 单引脚 GPIO 控制驱动
//!
//! 通过文本接口暴露内存映射的 GPIO 控制器：读取返回引脚电平，写入
//! `"pin,value"` 把引脚配置为输出并驱动高/低。

pub mod app;
pub mod config;
pub mod peripherals;
pub mod utils;
