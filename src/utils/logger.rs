//! 日志后端初始化
//!
//! 把 `log` 门面绑定到 `env_logger`。级别由环境变量 `DRIVER_LOG` 决定，
//! 未设置时使用 `info`。

/// 读取级别的环境变量名
pub const LOG_ENV: &str = "DRIVER_LOG";

/// 初始化默认日志后端，重复调用时返回错误
pub fn initialize_default() -> Result<(), log::SetLoggerError> {
    env_logger::Builder::from_env(env_logger::Env::new().filter_or(LOG_ENV, "info")).try_init()
}
