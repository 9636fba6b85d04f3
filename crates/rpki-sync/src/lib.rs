//! rpki-sync - RPKI 仓库同步与 CRL 持久化核心
//!
//! 本 crate 提供：
//! - 🔄 同步编排：按 syncStyle 选择 rrdp / rsync 地址，检测是否需要全量同步
//! - 📡 传输调度：异步启动 rrdp / rsync 服务，按 syncLogId 汇合两者的结果
//! - 🗄️ 持久化：CRL 与吊销条目的事务性写入 / 删除，同步文件的状态跟踪
//!
//! # 快速开始
//!
//! ```rust,no_run
//! use rpki_sync::{SyncConfig, SyncOrchestrator, SyncStyle};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = SyncConfig::from_json_file("/etc/rpki-sync/config.json")?;
//!     let orchestrator = SyncOrchestrator::open(&config).await?;
//!
//!     // rrdp / rsync 服务完成后通过 orchestrator.rrdp_result / rsync_result 回报
//!     let outcome = orchestrator.start(SyncStyle::Sync).await?;
//!     println!("syncLogId = {}", outcome.sync_log_id());
//!     Ok(())
//! }
//! ```

pub mod config;
pub mod error;
pub mod http_client;
pub mod storage;
pub mod sync;
pub mod utils;
pub mod version;

pub use config::{HttpClientConfig, ServiceEndpoints, SyncConfig, SyncConfigBuilder};
pub use error::{Result, SyncError};
pub use http_client::ServiceHttpClient;
pub use storage::{
    CrlDao, CrlModel, RevokedCertModel, StorageManager, SyncLogDao, SyncLogFileDao, SyncLogFileModel,
    SyncLogState, SyncResult, TransactionManager,
};
pub use sync::orchestrator::SyncServices;
pub use sync::{
    FanInSummary, FullSyncCheck, FullSyncDetector, PipelineTrigger, ResetTrigger, SyncOrchestrator, SyncOutcome, SyncStyle,
    SyncUrls, TalModel, TalService, Transport, TransportService,
};
pub use version::{BUILD_TIME, DB_VERSION, GIT_SHA, VERSION};
