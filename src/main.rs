use anyhow::{Context, Result};
use dht22_driver::app::endpoint::LocalRegistry;
use dht22_driver::config::pins::DRIVER_CONFIG;
use dht22_driver::config::DriverManager;
use dht22_driver::peripherals::mmio::SimulatedGpioMapper;
use dht22_driver::utils::logger;
use embedded_io::Read;
use std::io::BufRead;

/// 读取状态文本的命令
const STATUS_COMMAND: &str = "cat";

fn main() -> Result<()> {
    logger::initialize_default().context("日志初始化失败")?;

    // 宿主机上没有 BCM2837 外设，使用模拟的寄存器块
    let mut mapper = SimulatedGpioMapper::new(DRIVER_CONFIG.gpio_base);
    let mut registry = LocalRegistry::new();
    let driver = DriverManager::start(DRIVER_CONFIG, &mut mapper, &mut registry)
        .context("驱动启动失败")?;

    let result = run(&driver);
    driver.stop(&mut mapper, &mut registry);
    result
}

/// 主循环: 每行输入写入一次控制端点，`cat` 打印状态
fn run(driver: &DriverManager) -> Result<()> {
    let mut endpoint = driver.endpoint();
    let stdin = std::io::stdin();

    for line in stdin.lock().lines() {
        let line = line.context("读取标准输入失败")?;
        if line.trim() == STATUS_COMMAND {
            let mut reader = endpoint.open_status();
            let mut buf = [0u8; 64];
            let mut text = Vec::new();
            loop {
                let n = reader
                    .read(&mut buf)
                    .map_err(|e| anyhow::anyhow!("读取状态失败: {e}"))?;
                if n == 0 {
                    break;
                }
                text.extend_from_slice(&buf[..n]);
            }
            println!("{}", String::from_utf8_lossy(&text));
            continue;
        }

        let report = endpoint.submit(line.as_bytes());
        match report.outcome {
            Ok(command) => println!(
                "{} 字节: GPIO{} -> {}",
                report.consumed,
                command.pin,
                command.level.as_bit()
            ),
            Err(e) if e.is_range_violation() => {
                println!("{} 字节: 超出范围, 已忽略 ({e})", report.consumed)
            }
            Err(e) => println!("{} 字节: 已忽略 ({e})", report.consumed),
        }
    }

    Ok(())
}
