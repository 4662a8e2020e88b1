//! 控制命令解析
//!
//! 命令格式为 `"<pin>,<value>"`，两个十进制整数用逗号分隔，按 `%d,%d`
//! 的规则提取：整数前可有空白和符号，逗号必须紧跟第一个整数，第二个整数之后
//! 的内容被忽略。

use thiserror::Error;

use crate::peripherals::gpio::{GpioError, Level};

/// 解析后的命令
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Command {
    pub pin: u32,
    pub level: Level,
}

/// 命令处理错误
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum CommandError {
    #[error("数据格式不正确, 只匹配到 {0} 个整数")]
    Parse(usize),

    #[error("无效的引脚编号: {0}")]
    InvalidPin(i64),

    #[error("无效的开关值: {0}")]
    InvalidValue(i64),

    #[error("GPIO 操作失败: {0}")]
    Gpio(#[from] GpioError),
}

impl CommandError {
    /// 是否属于取值范围错误（而不是格式错误）
    pub fn is_range_violation(&self) -> bool {
        matches!(self, CommandError::InvalidPin(_) | CommandError::InvalidValue(_))
    }
}

struct Scanner<'a> {
    input: &'a [u8],
    pos: usize,
}

impl<'a> Scanner<'a> {
    fn new(input: &'a [u8]) -> Self {
        Self { input, pos: 0 }
    }

    fn peek(&self) -> Option<u8> {
        self.input.get(self.pos).copied()
    }

    fn skip_whitespace(&mut self) {
        while matches!(self.peek(), Some(b' ' | b'\t' | b'\n' | b'\r' | 0x0b | 0x0c)) {
            self.pos += 1;
        }
    }

    // 溢出时饱和，保证超大的数仍被当作越界而不是回绕成合法值
    fn integer(&mut self) -> Option<i64> {
        self.skip_whitespace();
        let negative = match self.peek() {
            Some(b'-') => {
                self.pos += 1;
                true
            }
            Some(b'+') => {
                self.pos += 1;
                false
            }
            _ => false,
        };

        let start = self.pos;
        let mut value: i64 = 0;
        while let Some(digit @ b'0'..=b'9') = self.peek() {
            value = value
                .saturating_mul(10)
                .saturating_add(i64::from(digit - b'0'));
            self.pos += 1;
        }
        if self.pos == start {
            return None;
        }
        Some(if negative { -value } else { value })
    }

    fn literal(&mut self, expected: u8) -> bool {
        if self.peek() == Some(expected) {
            self.pos += 1;
            true
        } else {
            false
        }
    }
}

/// 按 `%d,%d` 提取两个整数
///
/// 输入在第一个 NUL 字节处结束。
pub fn scan_pair(input: &[u8]) -> Result<(i64, i64), CommandError> {
    let end = input.iter().position(|&b| b == 0).unwrap_or(input.len());
    let mut scanner = Scanner::new(&input[..end]);

    let pin = scanner.integer().ok_or(CommandError::Parse(0))?;
    if !scanner.literal(b',') {
        return Err(CommandError::Parse(1));
    }
    let value = scanner.integer().ok_or(CommandError::Parse(1))?;
    Ok((pin, value))
}

/// 解析并校验命令
///
/// # 参数
/// * `input` - 原始命令字节
/// * `max_pin` - 接受的最大引脚编号（含）
pub fn parse_command(input: &[u8], max_pin: u32) -> Result<Command, CommandError> {
    let (pin, value) = scan_pair(input)?;

    // 引脚按无符号处理，负数无法表达任何引脚
    let pin = u32::try_from(pin)
        .ok()
        .filter(|&pin| pin <= max_pin)
        .ok_or(CommandError::InvalidPin(pin))?;

    let level = match value {
        0 => Level::Low,
        1 => Level::High,
        _ => return Err(CommandError::InvalidValue(value)),
    };

    Ok(Command { pin, level })
}
