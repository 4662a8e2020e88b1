//! 驱动管理器
//!
//! 持有驱动的全部硬件状态：映射好的寄存器块和已注册的端点。启动时先映射
//! 再注册端点，停止时先移除端点再解除映射；停止会消耗管理器，因此解除映射
//! 之后不可能再访问寄存器。

use thiserror::Error;

use crate::app::endpoint::{ControlEndpoint, EndpointError, EndpointRegistry};
use crate::config::pins::{validate_config, DriverConfig};
use crate::peripherals::gpio::PinController;
use crate::peripherals::mmio::{MapError, MemoryMapper};
use crate::peripherals::register_map::RegisterBlock;

/// 驱动启动错误类型
#[derive(Debug, Error)]
pub enum StartError {
    #[error("配置无效: {0}")]
    Config(String),

    #[error("GPIO 内存映射失败: {0}")]
    Map(#[from] MapError),

    #[error("控制端点注册失败: {0}")]
    Publish(#[from] EndpointError),
}

/// 运行中的驱动
pub struct DriverManager {
    config: DriverConfig,
    gpio: PinController,
}

impl DriverManager {
    /// 启动驱动
    ///
    /// # 参数
    /// * `config` - 驱动配置
    /// * `mapper` - 宿主内存映射设施
    /// * `registry` - 宿主端点注册设施
    ///
    /// # 返回
    /// * `Ok(Self)` - 寄存器块已映射，端点已注册
    /// * `Err(StartError)` - 任一步失败；已映射的块会被释放
    pub fn start(
        config: DriverConfig,
        mapper: &mut dyn MemoryMapper,
        registry: &mut dyn EndpointRegistry,
    ) -> Result<Self, StartError> {
        log::info!("DHT22 驱动初始化");
        validate_config(&config).map_err(StartError::Config)?;

        let block = match RegisterBlock::map(mapper, config.gpio_base) {
            Ok(block) => block,
            Err(e) => {
                log::error!("GPIO 内存映射失败: {e}");
                return Err(e.into());
            }
        };
        log::info!("GPIO 内存映射成功");

        if let Err(e) = registry.publish(config.endpoint_name) {
            log::error!("创建控制端点失败: {e}");
            block.unmap(mapper);
            return Err(e.into());
        }

        Ok(Self {
            config,
            gpio: PinController::new(block),
        })
    }

    /// 停止驱动，移除端点并解除映射
    pub fn stop(self, mapper: &mut dyn MemoryMapper, registry: &mut dyn EndpointRegistry) {
        log::info!("DHT22 驱动退出");
        if let Err(e) = registry.withdraw(self.config.endpoint_name) {
            log::warn!("移除控制端点失败: {e}");
        }
        self.gpio.into_block().unmap(mapper);
    }

    /// 打开控制端点；每次打开都有自己的命令缓冲区
    pub fn endpoint(&self) -> ControlEndpoint<'_> {
        ControlEndpoint::new(
            &self.gpio,
            self.config.command_capacity,
            self.config.status_pin,
            self.config.max_command_pin,
        )
    }
}
