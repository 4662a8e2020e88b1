//! BCM2837 GPIO 寄存器表
//!
//! 以 32 位字为单位描述寄存器块布局，并提供带边界检查的读写。

use thiserror::Error;

use crate::peripherals::mmio::{MapError, MappedRegion, MemoryMapper, PAGE_SIZE};

/// 功能选择寄存器 0..5（每个字 10 个引脚，每引脚 3 位）
pub const GPFSEL0: usize = 0;
pub const GPFSEL1: usize = 1;
pub const GPFSEL2: usize = 2;
pub const GPFSEL3: usize = 3;
pub const GPFSEL4: usize = 4;
pub const GPFSEL5: usize = 5;

/// 输出置位寄存器（字节偏移 0x1c / 0x20）
pub const GPSET0: usize = 7;
pub const GPSET1: usize = 8;

/// 输出清零寄存器（字节偏移 0x28 / 0x2c）
pub const GPCLR0: usize = 10;
pub const GPCLR1: usize = 11;

/// 电平寄存器（字节偏移 0x34 / 0x38）
pub const GPLEV0: usize = 13;
pub const GPLEV1: usize = 14;

/// 上下拉控制
pub const GPPUD: usize = 37;
pub const GPPUDCLK0: usize = 38;
pub const GPPUDCLK1: usize = 39;

/// 寄存器块内被引用到的最小字数
pub const MIN_WORDS: usize = GPPUDCLK1 + 1;

/// 寄存器访问错误
#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
pub enum RegisterError {
    #[error("字偏移 {offset} 越界, 映射区域只有 {words} 个字")]
    OutOfRange { offset: usize, words: usize },

    #[error("位索引 {0} 超出 32 位寄存器")]
    BitOutOfRange(u32),
}

/// 映射好的 GPIO 寄存器块
///
/// 独占映射句柄；不能 `Clone`，只能通过 [`RegisterBlock::unmap`] 消耗，
/// 因此解除映射只可能发生一次。
pub struct RegisterBlock {
    region: Box<dyn MappedRegion>,
    base: usize,
}

impl RegisterBlock {
    /// 映射 `[base, base + PAGE_SIZE)`
    pub fn map(mapper: &mut dyn MemoryMapper, base: usize) -> Result<Self, MapError> {
        let region = mapper.map(base, PAGE_SIZE)?;
        if region.word_count() < MIN_WORDS {
            let len = region.word_count() * 4;
            mapper.unmap(region);
            return Err(MapError::OutOfResources { len });
        }
        log::info!("已映射 GPIO 寄存器块: 0x{base:08x}");
        Ok(Self { region, base })
    }

    /// 解除映射，消耗寄存器块
    pub fn unmap(self, mapper: &mut dyn MemoryMapper) {
        log::info!("解除 GPIO 寄存器块映射: 0x{:08x}", self.base);
        mapper.unmap(self.region);
    }

    /// 映射区域的字数
    #[inline]
    pub fn word_count(&self) -> usize {
        self.region.word_count()
    }

    fn check(&self, offset: usize) -> Result<(), RegisterError> {
        let words = self.word_count();
        if offset >= words {
            return Err(RegisterError::OutOfRange { offset, words });
        }
        Ok(())
    }

    /// 读取一个字
    pub fn read_word(&self, offset: usize) -> Result<u32, RegisterError> {
        self.check(offset)?;
        Ok(self.region.read(offset))
    }

    /// 写入一个字
    pub fn write_word(&mut self, offset: usize, value: u32) -> Result<(), RegisterError> {
        self.check(offset)?;
        self.region.write(offset, value);
        Ok(())
    }

    /// 读-改-写一个字，闭包收到当前值并返回新值
    pub fn modify<F>(&mut self, offset: usize, f: F) -> Result<(), RegisterError>
    where
        F: FnOnce(u32) -> u32,
    {
        let value = self.read_word(offset)?;
        self.region.write(offset, f(value));
        Ok(())
    }

    /// 返回 `(word >> bit) & 1`
    pub fn get_bit(&self, offset: usize, bit: u32) -> Result<u32, RegisterError> {
        if bit >= u32::BITS {
            return Err(RegisterError::BitOutOfRange(bit));
        }
        Ok((self.read_word(offset)? >> bit) & 1)
    }
}
