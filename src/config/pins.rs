//! 驱动配置定义
//!
//! 定义寄存器基地址、状态引脚和命令接口的参数

use crate::peripherals::gpio::BANK0_PINS;

/// 驱动配置结构体
#[derive(Debug, Clone, Copy)]
pub struct DriverConfig {
    /// BCM2837 GPIO 寄存器块物理地址
    pub gpio_base: usize,

    /// 状态读取时报告的引脚 (GPIO4)
    pub status_pin: u32,

    /// 命令接口接受的最大引脚编号（含）
    pub max_command_pin: u32,

    /// 命令缓冲区容量（字节），超出部分被截断
    pub command_capacity: usize,

    /// 控制端点名称
    pub endpoint_name: &'static str,
}

/// 默认驱动配置
///
/// - GPIO 基地址: 0x3F200000 (BCM2837)
/// - 状态引脚: GPIO4
/// - 命令引脚范围: 0..=21
/// - 命令缓冲区: 256 字节
/// - 端点: dht22
pub const DRIVER_CONFIG: DriverConfig = DriverConfig {
    gpio_base: 0x3F20_0000,
    status_pin: 4,
    max_command_pin: 21,
    command_capacity: 0x100,
    endpoint_name: "dht22",
};

/// 验证驱动配置的有效性
///
/// # 参数
/// * `config` - 要验证的配置
///
/// # 返回
/// * `Ok(())` - 配置有效
/// * `Err(String)` - 配置无效，包含错误信息
pub fn validate_config(config: &DriverConfig) -> Result<(), String> {
    if config.status_pin >= BANK0_PINS {
        return Err(format!("状态引脚 {} 超出第 0 组范围", config.status_pin));
    }

    if config.max_command_pin >= BANK0_PINS {
        return Err(format!(
            "最大命令引脚 {} 超出第 0 组范围",
            config.max_command_pin
        ));
    }

    if config.command_capacity == 0 {
        return Err("命令缓冲区容量不能为 0".to_string());
    }

    if config.endpoint_name.is_empty() {
        return Err("端点名称不能为空".to_string());
    }

    if config.gpio_base % 4096 != 0 {
        return Err(format!("基地址 0x{:08x} 未按页对齐", config.gpio_base));
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_valid() {
        assert!(validate_config(&DRIVER_CONFIG).is_ok());
    }

    #[test]
    fn test_invalid_configs() {
        let mut config = DRIVER_CONFIG;
        config.status_pin = 32;
        assert!(validate_config(&config).is_err());

        let mut config = DRIVER_CONFIG;
        config.command_capacity = 0;
        assert!(validate_config(&config).is_err());

        let mut config = DRIVER_CONFIG;
        config.endpoint_name = "";
        assert!(validate_config(&config).is_err());

        let mut config = DRIVER_CONFIG;
        config.gpio_base = 0x3F20_0004;
        assert!(validate_config(&config).is_err());
    }
}
