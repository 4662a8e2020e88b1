//! 驱动配置模块
//! 
//! 提供驱动参数的定义和驱动生命周期管理器

pub mod pins;
pub mod manager;

// 重新导出常用类型
pub use manager::DriverManager;
