//! 同步模块
//!
//! 一次同步的流程：
//!
//! 1. `SyncOrchestrator` 写入同步日志，从 tal 服务取得仓库地址并按 syncStyle 分类
//! 2. `FullSyncDetector` 检查上一次另一种传输留下的目录，冲突时转为全量重置
//! 3. `dispatcher` 分别启动 rrdp / rsync 传输服务
//! 4. `ResultRegistry` 等待两个传输都回报结果，合并后结束同步并触发解析验证

pub mod classify;
pub mod dispatcher;
pub mod fan_in;
pub mod full_sync;
pub mod orchestrator;
pub mod services;

pub use classify::get_urls_by_sync_style;
pub use fan_in::{FanInSummary, ResultRegistry};
pub use full_sync::{FullSyncCheck, FullSyncDetector};
pub use orchestrator::SyncOrchestrator;
pub use services::{PipelineTrigger, ResetTrigger, TalService, TransportService};

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// 同步方式
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SyncStyle {
    /// 每个仓库优先 rrdp，不支持时退回 rsync
    Sync,
    /// 只用 rrdp
    Rrdp,
    /// 只用 rsync
    Rsync,
}

impl SyncStyle {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Sync => "sync",
            Self::Rrdp => "rrdp",
            Self::Rsync => "rsync",
        }
    }
}

impl FromStr for SyncStyle {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "sync" => Ok(Self::Sync),
            "rrdp" => Ok(Self::Rrdp),
            "rsync" => Ok(Self::Rsync),
            _ => Err(()),
        }
    }
}

impl fmt::Display for SyncStyle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// 传输协议
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Transport {
    Rrdp,
    Rsync,
}

impl Transport {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Rrdp => "rrdp",
            Self::Rsync => "rsync",
        }
    }
}

impl fmt::Display for Transport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// tal 中某个仓库的同步地址
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TalSyncUrl {
    #[serde(default)]
    pub support_rrdp: bool,
    #[serde(default)]
    pub rrdp_url: String,
    #[serde(default)]
    pub support_rsync: bool,
    #[serde(default)]
    pub rsync_url: String,
}

/// 一个 tal
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TalModel {
    #[serde(default)]
    pub tal_sync_urls: Vec<TalSyncUrl>,
}

/// 发给传输服务的启动请求
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SyncUrls {
    pub sync_log_id: u64,
    #[serde(default)]
    pub rrdp_urls: Vec<String>,
    #[serde(default)]
    pub rsync_urls: Vec<String>,
}

/// `SyncOrchestrator::start` 的结果
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncOutcome {
    /// 增量同步完成，已触发解析验证
    Synced { sync_log_id: u64 },
    /// 目录布局冲突，已改为触发全量重置
    FullSyncTriggered { sync_log_id: u64 },
}

impl SyncOutcome {
    pub fn sync_log_id(&self) -> u64 {
        match self {
            Self::Synced { sync_log_id } | Self::FullSyncTriggered { sync_log_id } => *sync_log_id,
        }
    }
}
