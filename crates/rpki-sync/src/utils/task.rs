//! 后台任务
//!
//! 通知类调用（启动传输、触发重置、触发解析验证）不等待结果，
//! 失败只记录日志，不会影响调用方。

use std::future::Future;

use tokio::task::JoinHandle;
use tracing::{debug, error};

use crate::error::Result;

/// 启动一个后台任务，失败时记录 `name` 和错误
pub fn spawn_logged<F>(name: &'static str, fut: F) -> JoinHandle<()>
where
    F: Future<Output = Result<()>> + Send + 'static,
{
    tokio::spawn(async move {
        match fut.await {
            Ok(()) => debug!("{} 完成", name),
            Err(e) => error!("❌ {} 失败: {}", name, e),
        }
    })
}
