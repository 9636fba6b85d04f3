//! 同步编排
//!
//! `start` 是一次同步的完整流程；`rrdp_result` / `rsync_result` 由传输服务的
//! 回报入口调用，与 `start` 并发执行。

use std::sync::Arc;
use std::time::{Duration, Instant};

use chrono::Utc;
use tracing::{debug, error, info, warn};

use crate::config::SyncConfig;
use crate::error::{Result, SyncError};
use crate::http_client::ServiceHttpClient;
use crate::storage::{SyncLogDao, SyncLogState, SyncLogSyncState, SyncResult, StorageManager};
use crate::sync::classify::get_urls_by_sync_style;
use crate::sync::dispatcher::dispatch;
use crate::sync::fan_in::ResultRegistry;
use crate::sync::full_sync::FullSyncDetector;
use crate::sync::services::{PipelineTrigger, ResetTrigger, TalService, TransportService};
use crate::sync::{SyncOutcome, SyncStyle, SyncUrls, Transport};
use crate::utils::spawn_logged;

/// 同步依赖的协作服务
#[derive(Clone)]
pub struct SyncServices {
    pub tal: Arc<dyn TalService>,
    pub transport: Arc<dyn TransportService>,
    pub reset: Arc<dyn ResetTrigger>,
    pub pipeline: Arc<dyn PipelineTrigger>,
}

impl SyncServices {
    /// 所有服务都走同一个 HTTP 客户端
    pub fn http(client: Arc<ServiceHttpClient>) -> Self {
        Self {
            tal: client.clone(),
            transport: client.clone(),
            reset: client.clone(),
            pipeline: client,
        }
    }
}

pub struct SyncOrchestrator {
    storage: StorageManager,
    detector: FullSyncDetector,
    services: SyncServices,
    registry: ResultRegistry,
    fan_in_timeout: Option<Duration>,
}

impl SyncOrchestrator {
    pub fn new(config: &SyncConfig, storage: StorageManager, services: SyncServices) -> Self {
        Self {
            storage,
            detector: FullSyncDetector::from_config(config),
            services,
            registry: ResultRegistry::new(),
            fan_in_timeout: config.fan_in_timeout(),
        }
    }

    /// 按配置打开数据库并创建 HTTP 客户端
    pub async fn open(config: &SyncConfig) -> Result<Self> {
        config.validate()?;
        let storage = StorageManager::open(&config.db_path).await?;
        let client = ServiceHttpClient::new(&config.http_client_config, config.services.clone())?;
        info!(
            "🚀 rpki-sync {} 已初始化 (db: {}, rrdp: {}, rsync: {})",
            crate::version::VERSION,
            config.db_path.display(),
            config.rrdp_dest_path.display(),
            config.rsync_dest_path.display()
        );
        Ok(Self::new(config, storage, SyncServices::http(Arc::new(client))))
    }

    pub fn storage(&self) -> &StorageManager {
        &self.storage
    }

    /// 执行一次同步
    pub async fn start(&self, sync_style: SyncStyle) -> Result<SyncOutcome> {
        let start = Instant::now();
        info!("🔄 开始同步: syncStyle={}", sync_style);

        // 1. 写入同步日志
        let mut sync_state = SyncLogSyncState::new(sync_style);
        let sync_log_id = {
            let conn = self.storage.connection().await;
            SyncLogDao::new(&conn).insert_start(&sync_state).map_err(|e| {
                error!("start(): 写入 lab_rpki_sync_log 失败: {}", e);
                e
            })?
        };
        debug!("start(): syncLogId={}", sync_log_id);

        // 2-3. 取 tal 并按 syncStyle 分类
        let (rrdp_urls, rsync_urls) = match self.select_urls(sync_style).await {
            Ok(urls) => urls,
            Err(e) => {
                error!("start(): syncLogId={} 无法得到同步地址: {}", sync_log_id, e);
                self.finish_best_effort(sync_log_id, SyncLogState::Failed, &mut sync_state).await;
                return Err(e);
            }
        };
        sync_state.rrdp_urls = rrdp_urls;
        sync_state.rsync_urls = rsync_urls;
        debug!(
            "start(): syncLogId={}, rrdpUrls={:?}, rsyncUrls={:?}",
            sync_log_id, sync_state.rrdp_urls, sync_state.rsync_urls
        );

        // 4. 上次的同步方式与本次不同时只能全量同步
        let check = self
            .detector
            .check_need_full_sync(&sync_state.rrdp_urls, &sync_state.rsync_urls)
            .await;
        if check.needs_full_sync() {
            info!(
                "start(): syncLogId={} 本次同步方式与上次不同 ({:?})，改为触发全量同步",
                sync_log_id, check
            );
            let reset = Arc::clone(&self.services.reset);
            spawn_logged("触发全量重置", async move { reset.trigger_full_sync(sync_style).await });
            self.finish_best_effort(sync_log_id, SyncLogState::Superseded, &mut sync_state).await;
            return Ok(SyncOutcome::FullSyncTriggered { sync_log_id });
        }

        // 5. 启动 rrdp / rsync 并等待结果
        let sync_urls = SyncUrls {
            sync_log_id,
            rrdp_urls: sync_state.rrdp_urls.clone(),
            rsync_urls: sync_state.rsync_urls.clone(),
        };
        let pending = match self.registry.register(&sync_urls) {
            Ok(pending) => pending,
            Err(e) => {
                error!("start(): syncLogId={} 登记结果槽失败: {}", sync_log_id, e);
                self.finish_best_effort(sync_log_id, SyncLogState::Failed, &mut sync_state).await;
                return Err(e);
            }
        };
        let started = dispatch(&self.services.transport, &sync_urls);
        debug!("start(): syncLogId={} 已启动传输: {:?}", sync_log_id, started);
        let summary = pending.wait(self.fan_in_timeout, &mut sync_state).await;

        // 启动的传输都没有回报时同步失败，不触发解析验证；只要有一个回报就继续
        if summary.nothing_reported() {
            error!(
                "start(): syncLogId={} 没有任何传输回报结果: {:?}",
                sync_log_id, summary.missing
            );
            self.finish_best_effort(sync_log_id, SyncLogState::Failed, &mut sync_state).await;
            return Err(SyncError::Timeout(format!(
                "syncLogId={} 的 {:?} 都没有回报结果",
                sync_log_id, summary.missing
            )));
        }
        if !summary.missing.is_empty() {
            warn!(
                "start(): syncLogId={} 部分传输没有回报结果: {:?}，按已回报的结果继续",
                sync_log_id, summary.missing
            );
        }

        // 6. 结束同步日志
        {
            let conn = self.storage.connection().await;
            SyncLogDao::new(&conn)
                .update_end(sync_log_id, SyncLogState::Synced, &sync_state)
                .map_err(|e| {
                    error!("start(): syncLogId={} 更新 lab_rpki_sync_log 失败: {}", sync_log_id, e);
                    e
                })?;
        }
        info!(
            "✅ 同步完成: syncLogId={}, rrdpUrls={}, rsyncUrls={}, time(s)={:.3}",
            sync_log_id,
            sync_state.rrdp_urls.len(),
            sync_state.rsync_urls.len(),
            start.elapsed().as_secs_f64()
        );

        // 7. 触发解析验证
        let pipeline = Arc::clone(&self.services.pipeline);
        spawn_logged("启动解析验证", async move { pipeline.start_parse_validate().await });

        Ok(SyncOutcome::Synced { sync_log_id })
    }

    /// rrdp 服务回报结果
    pub fn rrdp_result(&self, sync_log_id: u64, result: SyncResult) -> Result<()> {
        self.report(sync_log_id, Transport::Rrdp, result)
    }

    /// rsync 服务回报结果
    pub fn rsync_result(&self, sync_log_id: u64, result: SyncResult) -> Result<()> {
        self.report(sync_log_id, Transport::Rsync, result)
    }

    fn report(&self, sync_log_id: u64, transport: Transport, result: SyncResult) -> Result<()> {
        debug!(
            "{}_result(): syncLogId={}, okUrls={}, failUrls={}",
            transport,
            sync_log_id,
            result.ok_urls.len(),
            result.fail_urls.len()
        );
        self.registry.complete(sync_log_id, transport, result)
    }

    async fn select_urls(&self, sync_style: SyncStyle) -> Result<(Vec<String>, Vec<String>)> {
        let start = Instant::now();
        let tal_models = self.services.tal.get_tals().await?;
        if tal_models.is_empty() {
            return Err(SyncError::TalUnavailable("没有 tal 文件".to_string()));
        }
        debug!(
            "select_urls(): talModels={}, time(s)={:.3}",
            tal_models.len(),
            start.elapsed().as_secs_f64()
        );
        get_urls_by_sync_style(sync_style, &tal_models)
    }

    /// 以非 synced 状态结束同步日志；失败只记录日志
    async fn finish_best_effort(&self, sync_log_id: u64, state: SyncLogState, sync_state: &mut SyncLogSyncState) {
        sync_state.end_time = Some(Utc::now());
        let conn = self.storage.connection().await;
        if let Err(e) = SyncLogDao::new(&conn).update_end(sync_log_id, state, sync_state) {
            warn!("syncLogId={} 标记为 {} 失败: {}", sync_log_id, state, e);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use parking_lot::Mutex;
    use tempfile::TempDir;
    use tokio::sync::mpsc;

    use crate::storage::SyncLog;
    use crate::sync::{TalModel, TalSyncUrl};

    #[derive(Debug, Clone, PartialEq)]
    enum Call {
        Transport(Transport, SyncUrls),
        Reset(SyncStyle),
        Pipeline,
    }

    struct MockServices {
        tals: Mutex<Result<Vec<TalModel>>>,
        calls: mpsc::UnboundedSender<Call>,
    }

    #[async_trait]
    impl TalService for MockServices {
        async fn get_tals(&self) -> Result<Vec<TalModel>> {
            match &*self.tals.lock() {
                Ok(tals) => Ok(tals.clone()),
                Err(e) => Err(SyncError::TalUnavailable(e.to_string())),
            }
        }
    }

    #[async_trait]
    impl TransportService for MockServices {
        async fn start(&self, transport: Transport, sync_urls: &SyncUrls) -> Result<()> {
            let _ = self.calls.send(Call::Transport(transport, sync_urls.clone()));
            Ok(())
        }
    }

    #[async_trait]
    impl ResetTrigger for MockServices {
        async fn trigger_full_sync(&self, sync_style: SyncStyle) -> Result<()> {
            let _ = self.calls.send(Call::Reset(sync_style));
            Ok(())
        }
    }

    #[async_trait]
    impl PipelineTrigger for MockServices {
        async fn start_parse_validate(&self) -> Result<()> {
            let _ = self.calls.send(Call::Pipeline);
            Ok(())
        }
    }

    struct Harness {
        _dir: TempDir,
        orchestrator: Arc<SyncOrchestrator>,
        calls: mpsc::UnboundedReceiver<Call>,
        rsync_root: std::path::PathBuf,
    }

    fn init_tracing() {
        let _ = tracing_subscriber::fmt()
            .with_env_filter("rpki_sync=debug")
            .with_test_writer()
            .try_init();
    }

    fn harness(tals: Result<Vec<TalModel>>) -> Harness {
        init_tracing();
        let dir = TempDir::new().unwrap();
        let rrdp_root = dir.path().join("rrdp");
        let rsync_root = dir.path().join("rsync");
        std::fs::create_dir_all(&rrdp_root).unwrap();
        std::fs::create_dir_all(&rsync_root).unwrap();

        let config = SyncConfig::builder()
            .rrdp_dest_path(&rrdp_root)
            .rsync_dest_path(&rsync_root)
            .fan_in_timeout(Some(Duration::from_secs(30)))
            .build();
        let (tx, rx) = mpsc::unbounded_channel();
        let mock = Arc::new(MockServices {
            tals: Mutex::new(tals),
            calls: tx,
        });
        let services = SyncServices {
            tal: mock.clone(),
            transport: mock.clone(),
            reset: mock.clone(),
            pipeline: mock,
        };
        let storage = StorageManager::open_in_memory().unwrap();
        Harness {
            _dir: dir,
            orchestrator: Arc::new(SyncOrchestrator::new(&config, storage, services)),
            calls: rx,
            rsync_root,
        }
    }

    fn tal(urls: Vec<TalSyncUrl>) -> Vec<TalModel> {
        vec![TalModel { tal_sync_urls: urls }]
    }

    fn both(host: &str) -> TalSyncUrl {
        TalSyncUrl {
            support_rrdp: true,
            rrdp_url: format!("https://{}/notification.xml", host),
            support_rsync: true,
            rsync_url: format!("rsync://{}/repo", host),
        }
    }

    fn rsync_only(host: &str) -> TalSyncUrl {
        TalSyncUrl {
            support_rsync: true,
            rsync_url: format!("rsync://{}/repo", host),
            ..Default::default()
        }
    }

    async fn sync_log(orchestrator: &SyncOrchestrator, id: u64) -> SyncLog {
        let conn = orchestrator.storage().connection().await;
        SyncLogDao::new(&conn).get(id).unwrap().unwrap()
    }

    #[tokio::test]
    async fn single_endpoint_sync_dispatches_only_rrdp() {
        let mut h = harness(Ok(tal(vec![both("a")])));
        let orchestrator = Arc::clone(&h.orchestrator);
        let run = tokio::spawn(async move { orchestrator.start(SyncStyle::Sync).await });

        let Call::Transport(transport, urls) = h.calls.recv().await.unwrap() else {
            panic!("expected transport start");
        };
        assert_eq!(transport, Transport::Rrdp);
        assert_eq!(urls.rrdp_urls, vec!["https://a/notification.xml".to_string()]);
        assert!(urls.rsync_urls.is_empty());

        // 未启动的 rsync 不接受回报
        assert!(h.orchestrator.rsync_result(urls.sync_log_id, SyncResult::default()).is_err());
        h.orchestrator
            .rrdp_result(
                urls.sync_log_id,
                SyncResult {
                    ok_urls: urls.rrdp_urls.clone(),
                    add_files_len: 12,
                    ..Default::default()
                },
            )
            .unwrap();

        let outcome = run.await.unwrap().unwrap();
        assert_eq!(outcome, SyncOutcome::Synced { sync_log_id: urls.sync_log_id });
        assert_eq!(h.calls.recv().await.unwrap(), Call::Pipeline);
        assert!(h.calls.try_recv().is_err());

        let log = sync_log(&h.orchestrator, urls.sync_log_id).await;
        assert_eq!(log.state, SyncLogState::Synced);
        assert!(log.end_time.is_some());
        assert_eq!(log.sync_state.rrdp_result.unwrap().add_files_len, 12);
        assert!(log.sync_state.rsync_result.is_none());
    }

    #[tokio::test]
    async fn both_transports_reported_in_any_order() {
        let mut h = harness(Ok(tal(vec![both("a"), rsync_only("b")])));
        let orchestrator = Arc::clone(&h.orchestrator);
        let run = tokio::spawn(async move { orchestrator.start(SyncStyle::Sync).await });

        let mut sync_log_id = 0;
        let mut started = Vec::new();
        for _ in 0..2 {
            match h.calls.recv().await.unwrap() {
                Call::Transport(transport, urls) => {
                    sync_log_id = urls.sync_log_id;
                    started.push(transport);
                }
                other => panic!("unexpected call: {:?}", other),
            }
        }
        started.sort_by_key(|t| t.as_str());
        assert_eq!(started, vec![Transport::Rrdp, Transport::Rsync]);

        h.orchestrator.rsync_result(sync_log_id, SyncResult::default()).unwrap();
        h.orchestrator.rrdp_result(sync_log_id, SyncResult::default()).unwrap();
        assert!(run.await.unwrap().is_ok());

        let log = sync_log(&h.orchestrator, sync_log_id).await;
        assert_eq!(log.state, SyncLogState::Synced);
        assert_eq!(log.sync_state.rsync_urls, vec!["rsync://b/repo".to_string()]);
        assert!(log.sync_state.rrdp_result.is_some() && log.sync_state.rsync_result.is_some());
    }

    #[tokio::test]
    async fn layout_conflict_triggers_reset_without_dispatch() {
        let mut h = harness(Ok(tal(vec![both("a")])));
        // 上次用 rsync 同步过 a
        std::fs::create_dir_all(h.rsync_root.join("a").join("repo")).unwrap();

        let outcome = h.orchestrator.start(SyncStyle::Sync).await.unwrap();
        let SyncOutcome::FullSyncTriggered { sync_log_id } = outcome else {
            panic!("expected full sync, got {:?}", outcome);
        };
        assert_eq!(h.calls.recv().await.unwrap(), Call::Reset(SyncStyle::Sync));
        assert!(h.calls.try_recv().is_err());

        let log = sync_log(&h.orchestrator, sync_log_id).await;
        assert_eq!(log.state, SyncLogState::Superseded);
        assert!(log.end_time.is_some());
        assert_eq!(h.orchestrator.registry.pending_runs(), 0);
    }

    #[tokio::test]
    async fn empty_catalog_fails_run() {
        let mut h = harness(Ok(vec![]));
        let err = h.orchestrator.start(SyncStyle::Rrdp).await.unwrap_err();
        assert!(matches!(err, SyncError::TalUnavailable(_)));

        let log = sync_log(&h.orchestrator, 1).await;
        assert_eq!(log.state, SyncLogState::Failed);
        assert!(h.calls.try_recv().is_err());
    }

    #[tokio::test]
    async fn unavailable_tal_service_fails_run() {
        let mut h = harness(Err(SyncError::Transport("connection refused".to_string())));
        let err = h.orchestrator.start(SyncStyle::Sync).await.unwrap_err();
        assert!(err.is_catalog_error());
        assert!(h.calls.try_recv().is_err());
    }

    #[tokio::test]
    async fn no_matching_urls_fails_run() {
        let mut h = harness(Ok(tal(vec![rsync_only("b")])));
        let err = h.orchestrator.start(SyncStyle::Rrdp).await.unwrap_err();
        assert!(matches!(err, SyncError::NoSyncUrls(_)));
        assert_eq!(sync_log(&h.orchestrator, 1).await.state, SyncLogState::Failed);
        assert!(h.calls.try_recv().is_err());
    }

    #[tokio::test]
    async fn result_for_unknown_run_is_rejected() {
        let h = harness(Ok(tal(vec![both("a")])));
        let err = h.orchestrator.rrdp_result(42, SyncResult::default()).unwrap_err();
        assert!(matches!(err, SyncError::UnknownRun { sync_log_id: 42, transport: Transport::Rrdp }));
    }

    #[tokio::test]
    async fn rrdp_style_with_rsync_layout_triggers_reset() {
        let mut h = harness(Ok(tal(vec![both("a")])));
        std::fs::create_dir_all(h.rsync_root.join("a").join("repo")).unwrap();

        let outcome = h.orchestrator.start(SyncStyle::Rrdp).await.unwrap();
        let SyncOutcome::FullSyncTriggered { sync_log_id } = outcome else {
            panic!("expected full sync, got {:?}", outcome);
        };
        assert_eq!(h.calls.recv().await.unwrap(), Call::Reset(SyncStyle::Rrdp));
        assert!(h.calls.try_recv().is_err());

        let log = sync_log(&h.orchestrator, sync_log_id).await;
        assert_eq!(log.state, SyncLogState::Superseded);
        assert_eq!(log.sync_state.rrdp_urls, vec!["https://a/notification.xml".to_string()]);
        assert_eq!(h.orchestrator.registry.pending_runs(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn silent_transport_times_out() {
        let mut h = harness(Ok(tal(vec![rsync_only("b")])));
        let orchestrator = Arc::clone(&h.orchestrator);
        let run = tokio::spawn(async move { orchestrator.start(SyncStyle::Rsync).await });

        let Call::Transport(Transport::Rsync, urls) = h.calls.recv().await.unwrap() else {
            panic!("expected rsync start");
        };
        let err = run.await.unwrap().unwrap_err();
        assert!(matches!(err, SyncError::Timeout(_)));

        let log = sync_log(&h.orchestrator, urls.sync_log_id).await;
        assert_eq!(log.state, SyncLogState::Failed);
        assert!(log.end_time.is_some());
        assert!(log.sync_state.rsync_result.unwrap().timed_out);

        // 没有触发解析验证
        for _ in 0..10 {
            tokio::task::yield_now().await;
        }
        assert!(h.calls.try_recv().is_err());
        assert_eq!(h.orchestrator.registry.pending_runs(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn partial_report_still_syncs() {
        let mut h = harness(Ok(tal(vec![both("a"), rsync_only("b")])));
        let orchestrator = Arc::clone(&h.orchestrator);
        let run = tokio::spawn(async move { orchestrator.start(SyncStyle::Sync).await });

        let mut sync_log_id = 0;
        for _ in 0..2 {
            let Call::Transport(_, urls) = h.calls.recv().await.unwrap() else {
                panic!("expected transport start");
            };
            sync_log_id = urls.sync_log_id;
        }
        h.orchestrator
            .rrdp_result(
                sync_log_id,
                SyncResult {
                    add_files_len: 3,
                    ..Default::default()
                },
            )
            .unwrap();

        let outcome = run.await.unwrap().unwrap();
        assert_eq!(outcome, SyncOutcome::Synced { sync_log_id });
        assert_eq!(h.calls.recv().await.unwrap(), Call::Pipeline);

        let log = sync_log(&h.orchestrator, sync_log_id).await;
        assert_eq!(log.state, SyncLogState::Synced);
        assert_eq!(log.sync_state.rrdp_result.unwrap().add_files_len, 3);
        assert!(log.sync_state.rsync_result.unwrap().timed_out);
    }
}
