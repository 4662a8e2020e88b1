//! 外设模块
//!
//! 内存映射设施、GPIO 寄存器表和引脚控制器

pub mod mmio;
pub mod register_map;
pub mod gpio;
