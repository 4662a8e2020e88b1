//! GPIO 引脚控制器
//!
//! 把“引脚 N 输出高/低”翻译成对寄存器块的读-改-写序列。所有访问都在同一把
//! 锁内完成：功能选择寄存器一个字装 10 个引脚，两个调用方并发修改同一个字时
//! 不加锁会互相覆盖。

use std::sync::{Mutex, MutexGuard, PoisonError};

use embedded_hal::digital::{self, ErrorType, InputPin, OutputPin, StatefulOutputPin};
use thiserror::Error;

use crate::peripherals::register_map::{
    RegisterBlock, RegisterError, GPCLR0, GPFSEL0, GPLEV0, GPSET0,
};

/// 第 0 组（GPSET0/GPCLR0/GPLEV0）覆盖的引脚数
pub const BANK0_PINS: u32 = 32;

const FSEL_MASK: u32 = 0b111;
const FSEL_WIDTH: u32 = 3;
const PINS_PER_FSEL: u32 = 10;

/// 引脚电平
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Level {
    Low = 0,
    High = 1,
}

impl Level {
    /// 从 0/1 转换，其他值返回 `None`
    pub fn from_bit(value: u32) -> Option<Self> {
        match value {
            0 => Some(Level::Low),
            1 => Some(Level::High),
            _ => None,
        }
    }

    pub fn as_bit(self) -> u32 {
        self as u32
    }
}

/// 引脚功能选择编码
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GpioFunction {
    Input = 0b000,
    Output = 0b001,
    Alt0 = 0b100,
    Alt1 = 0b101,
    Alt2 = 0b110,
    Alt3 = 0b111,
    Alt4 = 0b011,
    Alt5 = 0b010,
}

impl GpioFunction {
    fn from_bits(bits: u32) -> Self {
        match bits & FSEL_MASK {
            0b000 => GpioFunction::Input,
            0b001 => GpioFunction::Output,
            0b100 => GpioFunction::Alt0,
            0b101 => GpioFunction::Alt1,
            0b110 => GpioFunction::Alt2,
            0b111 => GpioFunction::Alt3,
            0b011 => GpioFunction::Alt4,
            _ => GpioFunction::Alt5,
        }
    }
}

/// GPIO 控制器错误类型
#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
pub enum GpioError {
    #[error("无效的引脚编号: {0}")]
    InvalidPin(u32),

    #[error("无效的输出值: {0}")]
    InvalidValue(u32),

    #[error("寄存器访问失败: {0}")]
    Register(#[from] RegisterError),
}

impl digital::Error for GpioError {
    fn kind(&self) -> digital::ErrorKind {
        digital::ErrorKind::Other
    }
}

/// 引脚控制器，独占寄存器块
pub struct PinController {
    block: Mutex<RegisterBlock>,
}

impl PinController {
    pub fn new(block: RegisterBlock) -> Self {
        Self {
            block: Mutex::new(block),
        }
    }

    /// 取回寄存器块（用于解除映射）
    pub fn into_block(self) -> RegisterBlock {
        self.block
            .into_inner()
            .unwrap_or_else(PoisonError::into_inner)
    }

    // 寄存器块里没有会被 panic 破坏的 Rust 层不变量，锁中毒时直接接管
    fn lock(&self) -> MutexGuard<'_, RegisterBlock> {
        self.block.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn check_pin(pin: u32) -> Result<(), GpioError> {
        if pin >= BANK0_PINS {
            return Err(GpioError::InvalidPin(pin));
        }
        Ok(())
    }

    /// 读取引脚当前电平
    pub fn read_level(&self, pin: u32) -> Result<Level, GpioError> {
        Self::check_pin(pin)?;
        let bit = self.lock().get_bit(GPLEV0, pin)?;
        Ok(if bit == 0 { Level::Low } else { Level::High })
    }

    /// 读取引脚当前的功能选择
    pub fn function(&self, pin: u32) -> Result<GpioFunction, GpioError> {
        Self::check_pin(pin)?;
        let (index, shift) = fsel_location(pin);
        let word = self.lock().read_word(GPFSEL0 + index)?;
        Ok(GpioFunction::from_bits(word >> shift))
    }

    /// 把引脚配置为输出并驱动为 `desired`（0 或 1）
    ///
    /// # 返回
    /// * `Ok(())` - 寄存器已更新
    /// * `Err(GpioError)` - 引脚或取值无效，寄存器未被改动
    pub fn drive_pin(&self, pin: u32, desired: u32) -> Result<(), GpioError> {
        let level = Level::from_bit(desired).ok_or(GpioError::InvalidValue(desired))?;
        Self::check_pin(pin)?;
        self.drive(pin, level)
    }

    fn drive(&self, pin: u32, level: Level) -> Result<(), GpioError> {
        let (index, shift) = fsel_location(pin);
        let mut block = self.lock();

        block.modify(GPFSEL0 + index, |word| {
            (word & !(FSEL_MASK << shift)) | ((GpioFunction::Output as u32) << shift)
        })?;

        let target = match level {
            Level::High => GPSET0,
            Level::Low => GPCLR0,
        };
        block.modify(target, |word| word | (1 << pin))?;

        log::debug!("GPIO{pin} -> {level:?}");
        Ok(())
    }

    /// 获取一个实现 `embedded-hal` 数字引脚 trait 的输出句柄
    ///
    /// 句柄借用控制器，创建时不会改动寄存器；第一次 `set_high`/`set_low`
    /// 时才配置为输出。
    pub fn output_pin(&self, pin: u32) -> Result<GpioPin<'_>, GpioError> {
        Self::check_pin(pin)?;
        Ok(GpioPin {
            controller: self,
            pin,
        })
    }
}

fn fsel_location(pin: u32) -> (usize, u32) {
    ((pin / PINS_PER_FSEL) as usize, (pin % PINS_PER_FSEL) * FSEL_WIDTH)
}

/// 单个引脚的借用句柄
pub struct GpioPin<'a> {
    controller: &'a PinController,
    pin: u32,
}

impl ErrorType for GpioPin<'_> {
    type Error = GpioError;
}

impl OutputPin for GpioPin<'_> {
    fn set_low(&mut self) -> Result<(), Self::Error> {
        self.controller.drive(self.pin, Level::Low)
    }

    fn set_high(&mut self) -> Result<(), Self::Error> {
        self.controller.drive(self.pin, Level::High)
    }
}

impl StatefulOutputPin for GpioPin<'_> {
    fn is_set_high(&mut self) -> Result<bool, Self::Error> {
        Ok(self.controller.read_level(self.pin)? == Level::High)
    }

    fn is_set_low(&mut self) -> Result<bool, Self::Error> {
        Ok(self.controller.read_level(self.pin)? == Level::Low)
    }
}

impl InputPin for GpioPin<'_> {
    fn is_high(&mut self) -> Result<bool, Self::Error> {
        Ok(self.controller.read_level(self.pin)? == Level::High)
    }

    fn is_low(&mut self) -> Result<bool, Self::Error> {
        Ok(self.controller.read_level(self.pin)? == Level::Low)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::peripherals::mmio::{SimulatedGpioMapper, SimulatedProbe};
    use std::sync::Arc;
    use std::thread;

    const BASE: usize = 0x3F20_0000;

    fn setup() -> (PinController, SimulatedProbe) {
        let mut mapper = SimulatedGpioMapper::new(BASE);
        let probe = mapper.probe();
        let block = RegisterBlock::map(&mut mapper, BASE).unwrap();
        (PinController::new(block), probe)
    }

    #[test]
    fn test_drive_then_read_all_pins() {
        let (gpio, _probe) = setup();
        for pin in 0..=21 {
            for desired in [1, 0, 1] {
                gpio.drive_pin(pin, desired).unwrap();
                assert_eq!(gpio.read_level(pin).unwrap().as_bit(), desired);
                assert_eq!(gpio.function(pin), Ok(GpioFunction::Output));
            }
        }
    }

    #[test]
    fn test_bank0_upper_bound() {
        let (gpio, probe) = setup();

        gpio.drive_pin(31, 1).unwrap();
        assert_eq!(gpio.read_level(31), Ok(Level::High));
        // GPFSEL3 的 bit 3..5 = 001
        assert_eq!(gpio.function(31), Ok(GpioFunction::Output));
        assert_eq!(probe.raw_word(GPFSEL0 + 3), 1 << 3);

        gpio.drive_pin(31, 0).unwrap();
        assert_eq!(gpio.read_level(31), Ok(Level::Low));
    }

    #[test]
    fn test_controller_accepts_pins_beyond_command_range() {
        use crate::app::command::{parse_command, CommandError};

        let (gpio, _probe) = setup();
        // 命令接口只接受 0..=21，控制器本身接受整个第 0 组
        assert_eq!(parse_command(b"22,1", 21), Err(CommandError::InvalidPin(22)));
        gpio.drive_pin(22, 1).unwrap();
        assert_eq!(gpio.read_level(22), Ok(Level::High));
        assert_eq!(gpio.drive_pin(32, 1), Err(GpioError::InvalidPin(32)));
    }

    #[test]
    fn test_function_select_field_layout() {
        let (gpio, probe) = setup();

        gpio.drive_pin(4, 1).unwrap();
        // GPFSEL0 的 bit 12..14 = 001
        assert_eq!(probe.raw_word(GPFSEL0), 1 << 12);

        gpio.drive_pin(17, 0).unwrap();
        // GPFSEL1 的 bit 21..23 = 001
        assert_eq!(probe.raw_word(GPFSEL0 + 1), 1 << 21);
        assert_eq!(probe.raw_word(GPLEV0), 1 << 4);
    }

    #[test]
    fn test_neighbours_untouched() {
        let (gpio, probe) = setup();

        // 预置 GPFSEL0：引脚 3 和 5 为 ALT0，引脚 4 为 ALT3
        let alt0 = GpioFunction::Alt0 as u32;
        let preset = (alt0 << 9) | (0b111 << 12) | (alt0 << 15);
        {
            let mut block = gpio.lock();
            block.write_word(GPFSEL0, preset).unwrap();
        }

        gpio.drive_pin(4, 1).unwrap();
        let word = probe.raw_word(GPFSEL0);
        assert_eq!((word >> 9) & 0b111, alt0);
        assert_eq!((word >> 15) & 0b111, alt0);
        assert_eq!((word >> 12) & 0b111, 0b001);
        // 除了引脚 4 的字段，其余位保持不变
        assert_eq!(word & !(0b111 << 12), preset & !(0b111 << 12));
    }

    #[test]
    fn test_invalid_input_no_mutation() {
        let (gpio, probe) = setup();

        assert_eq!(gpio.drive_pin(4, 2), Err(GpioError::InvalidValue(2)));
        assert_eq!(gpio.drive_pin(32, 1), Err(GpioError::InvalidPin(32)));
        assert_eq!(gpio.read_level(40), Err(GpioError::InvalidPin(40)));
        assert_eq!(probe.write_count(), 0);
    }

    #[test]
    fn test_external_level() {
        let (gpio, probe) = setup();
        assert_eq!(gpio.read_level(4), Ok(Level::Low));
        probe.set_external_level(4, true);
        assert_eq!(gpio.read_level(4), Ok(Level::High));
    }

    #[test]
    fn test_embedded_hal_pin() {
        let (gpio, probe) = setup();
        let mut pin = gpio.output_pin(7).unwrap();
        assert_eq!(probe.write_count(), 0);

        pin.set_high().unwrap();
        assert!(pin.is_set_high().unwrap());
        assert!(pin.is_high().unwrap());

        pin.set_low().unwrap();
        assert!(pin.is_set_low().unwrap());
        assert!(pin.is_low().unwrap());

        assert!(gpio.output_pin(32).is_err());
    }

    #[test]
    fn test_concurrent_shared_word() {
        let (gpio, probe) = setup();
        let gpio = Arc::new(gpio);

        // 引脚 0..=9 共用 GPFSEL0
        let handles: Vec<_> = (0..10)
            .map(|pin| {
                let gpio = Arc::clone(&gpio);
                thread::spawn(move || {
                    for i in 0..200 {
                        gpio.drive_pin(pin, i % 2).unwrap();
                    }
                })
            })
            .collect();
        for handle in handles {
            handle.join().unwrap();
        }

        let word = probe.raw_word(GPFSEL0);
        for pin in 0..10 {
            assert_eq!((word >> (pin * 3)) & 0b111, 0b001, "pin {pin}");
        }
    }
}
