//! 协作服务接口
//!
//! 同步核心不直接依赖 HTTP：tal、传输、全量重置、解析验证都通过下面的 trait 调用，
//! 线上由 `ServiceHttpClient` 实现，测试中使用内存实现。

use async_trait::async_trait;

use crate::error::Result;
use crate::sync::{SyncStyle, SyncUrls, TalModel, Transport};

/// tal 服务：提供所有仓库的同步地址
#[async_trait]
pub trait TalService: Send + Sync {
    async fn get_tals(&self) -> Result<Vec<TalModel>>;
}

/// 传输服务：只负责启动，结果通过 `SyncOrchestrator::rrdp_result` / `rsync_result` 回报
#[async_trait]
pub trait TransportService: Send + Sync {
    async fn start(&self, transport: Transport, sync_urls: &SyncUrls) -> Result<()>;
}

/// 全量重置
#[async_trait]
pub trait ResetTrigger: Send + Sync {
    async fn trigger_full_sync(&self, sync_style: SyncStyle) -> Result<()>;
}

/// 同步结束后启动解析验证
#[async_trait]
pub trait PipelineTrigger: Send + Sync {
    async fn start_parse_validate(&self) -> Result<()>;
}
