//! 内存映射 I/O 抽象
//!
//! 把物理地址区间变成可按 32 位字访问的区域。真实硬件上由宿主的映射设施提供，
//! 没有硬件时使用 [`SimulatedGpioMapper`] 模拟 BCM2837 的 GPIO 寄存器块。

use std::collections::HashSet;
use std::sync::{Arc, Mutex, PoisonError};
use thiserror::Error;

use crate::peripherals::gpio::BANK0_PINS;
use crate::peripherals::register_map::{GPCLR0, GPCLR1, GPLEV0, GPLEV1, GPSET0, GPSET1};

/// 一页映射的大小（字节）
pub const PAGE_SIZE: usize = 4096;

/// 映射失败的错误类型
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum MapError {
    #[error("地址 0x{0:08x} 不可用")]
    AddressUnavailable(usize),

    #[error("无权映射地址 0x{0:08x}")]
    PermissionDenied(usize),

    #[error("映射 {len} 字节失败: 资源不足")]
    OutOfResources { len: usize },
}

/// 已映射的寄存器区域，按 32 位字寻址
///
/// 实现者负责保证 `word < word_count()` 时访问有效。调用方（寄存器表）
/// 已在外层做了边界检查。
pub trait MappedRegion: Send {
    /// 区域内 32 位字的数量
    fn word_count(&self) -> usize;

    /// 读取一个字（真实硬件上是 volatile 读）
    fn read(&self, word: usize) -> u32;

    /// 写入一个字（真实硬件上是 volatile 写）
    fn write(&mut self, word: usize, value: u32);
}

/// 宿主的设备内存映射设施
pub trait MemoryMapper {
    /// 映射 `[base, base + len)`，成功时返回独占的区域句柄
    fn map(&mut self, base: usize, len: usize) -> Result<Box<dyn MappedRegion>, MapError>;

    /// 释放映射；句柄被消耗，之后不可能再访问该区域
    fn unmap(&mut self, region: Box<dyn MappedRegion>);
}

/// 模拟的 GPIO 寄存器字
///
/// 与 BCM2837 一致：GPSET/GPCLR 只写（读回 0），写入的 1 位立即反映到
/// GPLEV；GPLEV 只读。其余字表现为普通存储。
#[derive(Debug)]
struct GpioSimState {
    words: Vec<u32>,
}

impl GpioSimState {
    fn new(word_count: usize) -> Self {
        Self {
            words: vec![0; word_count],
        }
    }

    fn read(&self, word: usize) -> u32 {
        match word {
            GPSET0 | GPSET1 | GPCLR0 | GPCLR1 => 0,
            _ => self.words[word],
        }
    }

    fn write(&mut self, word: usize, value: u32) {
        match word {
            GPSET0 => self.words[GPLEV0] |= value,
            GPSET1 => self.words[GPLEV1] |= value,
            GPCLR0 => self.words[GPLEV0] &= !value,
            GPCLR1 => self.words[GPLEV1] &= !value,
            GPLEV0 | GPLEV1 => {}
            _ => self.words[word] = value,
        }
    }
}

/// 模拟寄存器块的只读探针，测试和演示程序用它观察“硬件”状态
#[derive(Debug, Clone)]
pub struct SimulatedProbe {
    state: Arc<Mutex<GpioSimState>>,
    writes: Arc<Mutex<usize>>,
}

impl SimulatedProbe {
    /// 直接读取底层字（不经过只写寄存器的读回规则）
    pub fn raw_word(&self, word: usize) -> u32 {
        let state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
        state.words.get(word).copied().unwrap_or(0)
    }

    /// 驱动程序执行过的写操作次数
    pub fn write_count(&self) -> usize {
        *self.writes.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// 模拟外部电路改变引脚电平（例如按键拉高输入）
    ///
    /// 只模拟第 0 组，超出范围的引脚被忽略
    pub fn set_external_level(&self, pin: u32, high: bool) {
        if pin >= BANK0_PINS {
            log::warn!("模拟电平: 引脚 {pin} 不在第 0 组, 已忽略");
            return;
        }
        let mut state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
        if high {
            state.words[GPLEV0] |= 1 << pin;
        } else {
            state.words[GPLEV0] &= !(1 << pin);
        }
    }
}

struct SimulatedRegion {
    state: Arc<Mutex<GpioSimState>>,
    writes: Arc<Mutex<usize>>,
    word_count: usize,
}

impl MappedRegion for SimulatedRegion {
    fn word_count(&self) -> usize {
        self.word_count
    }

    fn read(&self, word: usize) -> u32 {
        self.state
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .read(word)
    }

    fn write(&mut self, word: usize, value: u32) {
        self.state
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .write(word, value);
        *self.writes.lock().unwrap_or_else(PoisonError::into_inner) += 1;
    }
}

/// 模拟的映射设施，只接受已注册的基地址
pub struct SimulatedGpioMapper {
    base: usize,
    state: Arc<Mutex<GpioSimState>>,
    writes: Arc<Mutex<usize>>,
    mapped: HashSet<usize>,
}

impl SimulatedGpioMapper {
    /// 在 `base` 处创建一个全零的模拟 GPIO 块
    pub fn new(base: usize) -> Self {
        Self {
            base,
            state: Arc::new(Mutex::new(GpioSimState::new(PAGE_SIZE / 4))),
            writes: Arc::new(Mutex::new(0)),
            mapped: HashSet::new(),
        }
    }

    /// 获取观察硬件状态的探针
    pub fn probe(&self) -> SimulatedProbe {
        SimulatedProbe {
            state: Arc::clone(&self.state),
            writes: Arc::clone(&self.writes),
        }
    }

    /// 当前是否处于映射状态
    pub fn is_mapped(&self) -> bool {
        self.mapped.contains(&self.base)
    }
}

impl MemoryMapper for SimulatedGpioMapper {
    fn map(&mut self, base: usize, len: usize) -> Result<Box<dyn MappedRegion>, MapError> {
        if base != self.base {
            return Err(MapError::AddressUnavailable(base));
        }
        if len > PAGE_SIZE {
            return Err(MapError::OutOfResources { len });
        }
        if !self.mapped.insert(base) {
            return Err(MapError::OutOfResources { len });
        }
        log::debug!("模拟映射 0x{base:08x}, {len} 字节");
        Ok(Box::new(SimulatedRegion {
            state: Arc::clone(&self.state),
            writes: Arc::clone(&self.writes),
            word_count: len / 4,
        }))
    }

    fn unmap(&mut self, region: Box<dyn MappedRegion>) {
        log::debug!("模拟解除映射, {} 个字", region.word_count());
        self.mapped.remove(&self.base);
        drop(region);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_map_wrong_address() {
        let mut mapper = SimulatedGpioMapper::new(0x3F20_0000);
        let err = mapper.map(0x2020_0000, PAGE_SIZE).err();
        assert_eq!(err, Some(MapError::AddressUnavailable(0x2020_0000)));
        assert!(!mapper.is_mapped());
    }

    #[test]
    fn test_set_clear_write_only() {
        let mut mapper = SimulatedGpioMapper::new(0x3F20_0000);
        let mut region = mapper.map(0x3F20_0000, PAGE_SIZE).unwrap();
        assert_eq!(region.word_count(), 1024);

        region.write(GPSET0, 1 << 4);
        // 只写寄存器读回 0，电平寄存器立即反映
        assert_eq!(region.read(GPSET0), 0);
        assert_eq!(region.read(GPLEV0), 1 << 4);

        region.write(GPCLR0, 1 << 4);
        assert_eq!(region.read(GPLEV0), 0);

        // 电平寄存器只读
        region.write(GPLEV0, u32::MAX);
        assert_eq!(region.read(GPLEV0), 0);

        mapper.unmap(region);
        assert!(!mapper.is_mapped());
    }

    #[test]
    fn test_double_map_refused() {
        let mut mapper = SimulatedGpioMapper::new(0x3F20_0000);
        let _region = mapper.map(0x3F20_0000, PAGE_SIZE).unwrap();
        assert!(mapper.map(0x3F20_0000, PAGE_SIZE).is_err());
    }

    #[test]
    fn test_external_level_latch() {
        let mut mapper = SimulatedGpioMapper::new(0x3F20_0000);
        let probe = mapper.probe();
        let region = mapper.map(0x3F20_0000, PAGE_SIZE).unwrap();
        probe.set_external_level(17, true);
        assert_eq!(region.read(GPLEV0), 1 << 17);
        probe.set_external_level(17, false);
        assert_eq!(region.read(GPLEV0), 0);
    }

    #[test]
    fn test_external_level_out_of_bank() {
        let mut mapper = SimulatedGpioMapper::new(0x3F20_0000);
        let probe = mapper.probe();
        let region = mapper.map(0x3F20_0000, PAGE_SIZE).unwrap();

        probe.set_external_level(31, true);
        assert_eq!(region.read(GPLEV0), 1 << 31);
        // 第 1 组引脚不会移位溢出，也不会改动任何寄存器
        probe.set_external_level(32, true);
        probe.set_external_level(u32::MAX, true);
        assert_eq!(region.read(GPLEV0), 1 << 31);
        assert_eq!(region.read(GPLEV1), 0);
    }
}
