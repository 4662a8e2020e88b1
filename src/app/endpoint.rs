//! 文本控制端点
//!
//! 读取返回状态文本，写入接受 `"<pin>,<value>"` 命令。端点本身不持有硬件
//! 状态，只通过 [`PinController`] 操作寄存器。

use std::collections::HashSet;

use embedded_io::{ErrorKind, ErrorType, Read, Write};
use thiserror::Error;

use crate::app::command::{parse_command, Command, CommandError};
use crate::peripherals::gpio::PinController;

/// 端点注册失败
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum EndpointError {
    #[error("端点 {0} 已存在")]
    AlreadyPublished(String),

    #[error("端点 {0} 未注册")]
    NotPublished(String),
}

impl embedded_io::Error for EndpointError {
    fn kind(&self) -> ErrorKind {
        match self {
            EndpointError::AlreadyPublished(_) => ErrorKind::AlreadyExists,
            EndpointError::NotPublished(_) => ErrorKind::NotFound,
        }
    }
}

/// 宿主的端点注册设施
pub trait EndpointRegistry {
    fn publish(&mut self, name: &str) -> Result<(), EndpointError>;

    fn withdraw(&mut self, name: &str) -> Result<(), EndpointError>;
}

/// 进程内的端点注册表
#[derive(Debug, Default)]
pub struct LocalRegistry {
    published: HashSet<String>,
}

impl LocalRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_published(&self, name: &str) -> bool {
        self.published.contains(name)
    }
}

impl EndpointRegistry for LocalRegistry {
    fn publish(&mut self, name: &str) -> Result<(), EndpointError> {
        if !self.published.insert(name.to_string()) {
            return Err(EndpointError::AlreadyPublished(name.to_string()));
        }
        log::info!("已注册控制端点: {name}");
        Ok(())
    }

    fn withdraw(&mut self, name: &str) -> Result<(), EndpointError> {
        if !self.published.remove(name) {
            return Err(EndpointError::NotPublished(name.to_string()));
        }
        log::info!("已移除控制端点: {name}");
        Ok(())
    }
}

/// 一次写入的结果
///
/// `consumed` 始终是截断后的输入长度，即使命令被拒绝；`outcome` 区分
/// 成功执行、格式错误和越界。
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WriteReport {
    pub consumed: usize,
    pub outcome: Result<Command, CommandError>,
}

/// 控制端点：命令缓冲区 + 对引脚控制器的借用
pub struct ControlEndpoint<'a> {
    gpio: &'a PinController,
    buffer: Vec<u8>,
    status_pin: u32,
    max_pin: u32,
}

impl<'a> ControlEndpoint<'a> {
    /// 创建端点，缓冲区多留一个字节作为结尾 NUL
    pub fn new(gpio: &'a PinController, capacity: usize, status_pin: u32, max_pin: u32) -> Self {
        Self {
            gpio,
            buffer: vec![0; capacity + 1],
            status_pin,
            max_pin,
        }
    }

    /// 命令缓冲区容量
    pub fn capacity(&self) -> usize {
        self.buffer.len() - 1
    }

    /// 渲染状态文本
    pub fn status(&self) -> String {
        // 状态读取不报错，读取失败时按低电平报告
        let level = match self.gpio.read_level(self.status_pin) {
            Ok(level) => level.as_bit(),
            Err(e) => {
                log::error!("读取状态引脚失败: {e}");
                0
            }
        };
        format!("Hello, World!\nPin{}: {}", self.status_pin, level)
    }

    /// 打开一次状态读取
    pub fn open_status(&self) -> StatusReader {
        StatusReader::new(self.status())
    }

    /// 处理一次命令写入
    pub fn submit(&mut self, input: &[u8]) -> WriteReport {
        self.buffer.fill(0);
        let consumed = input.len().min(self.capacity());
        self.buffer[..consumed].copy_from_slice(&input[..consumed]);

        log::debug!(
            "命令缓冲区: {}",
            String::from_utf8_lossy(&self.buffer[..consumed])
        );

        let outcome = parse_command(&self.buffer, self.max_pin).and_then(|command| {
            log::info!("收到命令: 引脚 {}, 值 {}", command.pin, command.level.as_bit());
            self.gpio.drive_pin(command.pin, command.level.as_bit())?;
            Ok(command)
        });

        if let Err(e) = &outcome {
            match e {
                CommandError::Parse(_) => log::warn!("提交的数据格式不正确: {e}"),
                CommandError::InvalidPin(_) => log::warn!("提交的引脚编号无效: {e}"),
                CommandError::InvalidValue(_) => log::warn!("开关值无效: {e}"),
                CommandError::Gpio(_) => log::error!("{e}"),
            }
        }

        WriteReport { consumed, outcome }
    }
}

impl ErrorType for ControlEndpoint<'_> {
    type Error = EndpointError;
}

impl Write for ControlEndpoint<'_> {
    /// 兼容接口：命令被拒绝时也报告全部消耗
    fn write(&mut self, buf: &[u8]) -> Result<usize, Self::Error> {
        Ok(self.submit(buf).consumed)
    }

    fn flush(&mut self) -> Result<(), Self::Error> {
        Ok(())
    }
}

/// 一次打开的状态读取，文本在打开时生成
#[derive(Debug, Clone)]
pub struct StatusReader {
    text: String,
    pos: usize,
}

impl StatusReader {
    fn new(text: String) -> Self {
        Self { text, pos: 0 }
    }
}

impl ErrorType for StatusReader {
    type Error = EndpointError;
}

impl Read for StatusReader {
    fn read(&mut self, buf: &mut [u8]) -> Result<usize, Self::Error> {
        let remaining = &self.text.as_bytes()[self.pos..];
        let n = remaining.len().min(buf.len());
        buf[..n].copy_from_slice(&remaining[..n]);
        self.pos += n;
        Ok(n)
    }
}
