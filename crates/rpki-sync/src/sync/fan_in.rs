//! 传输结果汇合
//!
//! 每次同步在启动传输前按 syncLogId 登记结果槽（每个已启动的传输一个 oneshot），
//! 传输服务回报时按 syncLogId + 传输找到对应的槽。并发的多次同步互不干扰；
//! 未登记的 syncLogId、或同一传输重复回报都会被拒绝。
//!
//! 登记得到的 `PendingResults` 被丢弃时（等待结束，或等待中的同步被取消）
//! 会一并注销该 syncLogId 剩余的结果槽。

use std::collections::HashMap;
use std::future::pending;
use std::sync::Arc;
use std::time::{Duration, Instant};

use chrono::Utc;
use parking_lot::Mutex;
use tokio::sync::oneshot;
use tracing::{debug, info, warn};

use crate::error::{Result, SyncError};
use crate::storage::entities::{SyncLogSyncState, SyncResult};
use crate::sync::{SyncUrls, Transport};

type RunMap = Arc<Mutex<HashMap<u64, RunSlots>>>;

#[derive(Debug, Default)]
struct RunSlots {
    rrdp: Option<oneshot::Sender<SyncResult>>,
    rsync: Option<oneshot::Sender<SyncResult>>,
}

impl RunSlots {
    fn slot_mut(&mut self, transport: Transport) -> &mut Option<oneshot::Sender<SyncResult>> {
        match transport {
            Transport::Rrdp => &mut self.rrdp,
            Transport::Rsync => &mut self.rsync,
        }
    }

    fn is_empty(&self) -> bool {
        self.rrdp.is_none() && self.rsync.is_none()
    }
}

/// 汇合后的回报情况
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FanInSummary {
    /// 按时回报了结果的传输
    pub reported: Vec<Transport>,
    /// 超时或结果槽被关闭、没有真正结果的传输
    pub missing: Vec<Transport>,
}

impl FanInSummary {
    /// 启动了传输，但没有任何一个回报结果
    pub fn nothing_reported(&self) -> bool {
        self.reported.is_empty() && !self.missing.is_empty()
    }
}

/// 一次同步等待中的结果
#[derive(Debug)]
pub struct PendingResults {
    sync_log_id: u64,
    rrdp: Option<oneshot::Receiver<SyncResult>>,
    rsync: Option<oneshot::Receiver<SyncResult>>,
    runs: RunMap,
}

impl PendingResults {
    pub fn sync_log_id(&self) -> u64 {
        self.sync_log_id
    }

    /// 等待所有已启动传输的结果并写入 `sync_state`；超时的传输记为 timed_out
    pub async fn wait(mut self, timeout: Option<Duration>, sync_state: &mut SyncLogSyncState) -> FanInSummary {
        let start = Instant::now();
        let sync_log_id = self.sync_log_id;
        let mut summary = FanInSummary::default();

        let deadline = async move {
            match timeout {
                Some(t) => tokio::time::sleep(t).await,
                None => pending::<()>().await,
            }
        };
        tokio::pin!(deadline);

        while self.rrdp.is_some() || self.rsync.is_some() {
            tokio::select! {
                result = recv_slot(&mut self.rrdp) => {
                    self.rrdp = None;
                    sync_state.rrdp_result = Some(received(sync_log_id, Transport::Rrdp, result, &mut summary));
                }
                result = recv_slot(&mut self.rsync) => {
                    self.rsync = None;
                    sync_state.rsync_result = Some(received(sync_log_id, Transport::Rsync, result, &mut summary));
                }
                _ = &mut deadline => {
                    warn!(
                        "wait(): syncLogId={} 等待传输结果超时, rrdp 未回报={}, rsync 未回报={}",
                        sync_log_id,
                        self.rrdp.is_some(),
                        self.rsync.is_some()
                    );
                    if self.rrdp.take().is_some() {
                        sync_state.rrdp_result = Some(SyncResult::timed_out("等待 rrdp 结果超时"));
                        summary.missing.push(Transport::Rrdp);
                    }
                    if self.rsync.take().is_some() {
                        sync_state.rsync_result = Some(SyncResult::timed_out("等待 rsync 结果超时"));
                        summary.missing.push(Transport::Rsync);
                    }
                }
            }
        }

        sync_state.end_time = Some(Utc::now());
        info!(
            "wait(): syncLogId={} 传输结果已汇合, reported={:?}, missing={:?}, time(s)={:.3}",
            sync_log_id,
            summary.reported,
            summary.missing,
            start.elapsed().as_secs_f64()
        );
        summary
    }
}

impl Drop for PendingResults {
    fn drop(&mut self) {
        if self.runs.lock().remove(&self.sync_log_id).is_some() {
            debug!("PendingResults::drop(): syncLogId={} 剩余结果槽已注销", self.sync_log_id);
        }
    }
}

/// 按 syncLogId 管理的结果槽
#[derive(Default)]
pub struct ResultRegistry {
    runs: RunMap,
}

impl ResultRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// 为要启动的传输登记结果槽，必须在启动传输之前调用
    pub fn register(&self, sync_urls: &SyncUrls) -> Result<PendingResults> {
        let mut runs = self.runs.lock();
        if runs.contains_key(&sync_urls.sync_log_id) {
            return Err(SyncError::InvalidArgument(format!(
                "syncLogId={} 已在等待结果",
                sync_urls.sync_log_id
            )));
        }

        let mut slots = RunSlots::default();
        let mut pending = PendingResults {
            sync_log_id: sync_urls.sync_log_id,
            rrdp: None,
            rsync: None,
            runs: Arc::clone(&self.runs),
        };
        if !sync_urls.rrdp_urls.is_empty() {
            let (tx, rx) = oneshot::channel();
            slots.rrdp = Some(tx);
            pending.rrdp = Some(rx);
        }
        if !sync_urls.rsync_urls.is_empty() {
            let (tx, rx) = oneshot::channel();
            slots.rsync = Some(tx);
            pending.rsync = Some(rx);
        }
        if !slots.is_empty() {
            runs.insert(sync_urls.sync_log_id, slots);
        }
        debug!(
            "register(): syncLogId={}, rrdp={}, rsync={}",
            sync_urls.sync_log_id,
            pending.rrdp.is_some(),
            pending.rsync.is_some()
        );
        Ok(pending)
    }

    /// 传输服务回报结果
    pub fn complete(&self, sync_log_id: u64, transport: Transport, result: SyncResult) -> Result<()> {
        let sender = {
            let mut runs = self.runs.lock();
            let Some(slots) = runs.get_mut(&sync_log_id) else {
                warn!("complete(): syncLogId={} 没有等待中的同步, transport={}", sync_log_id, transport);
                return Err(SyncError::UnknownRun { sync_log_id, transport });
            };
            let sender = slots.slot_mut(transport).take();
            if slots.is_empty() {
                runs.remove(&sync_log_id);
            }
            sender
        };

        let Some(sender) = sender else {
            warn!("complete(): syncLogId={} 的 {} 结果已回报过或未启动", sync_log_id, transport);
            return Err(SyncError::UnknownRun { sync_log_id, transport });
        };
        // 接收端已放弃（等待超时）
        if sender.send(result).is_err() {
            warn!("complete(): syncLogId={} 已不再等待 {} 结果", sync_log_id, transport);
            return Err(SyncError::UnknownRun { sync_log_id, transport });
        }
        debug!("complete(): syncLogId={}, transport={}", sync_log_id, transport);
        Ok(())
    }

    /// 当前仍在等待结果的同步数
    pub fn pending_runs(&self) -> usize {
        self.runs.lock().len()
    }
}

async fn recv_slot(
    slot: &mut Option<oneshot::Receiver<SyncResult>>,
) -> std::result::Result<SyncResult, oneshot::error::RecvError> {
    match slot {
        Some(rx) => rx.await,
        None => pending().await,
    }
}

fn received(
    sync_log_id: u64,
    transport: Transport,
    result: std::result::Result<SyncResult, oneshot::error::RecvError>,
    summary: &mut FanInSummary,
) -> SyncResult {
    match result {
        Ok(result) => {
            debug!(
                "wait(): syncLogId={}, {} 结果: ok={}, fail={}, add={}, update={}, del={}",
                sync_log_id,
                transport,
                result.ok_urls.len(),
                result.fail_urls.len(),
                result.add_files_len,
                result.update_files_len,
                result.del_files_len
            );
            summary.reported.push(transport);
            result
        }
        Err(_) => {
            warn!("wait(): syncLogId={} 的 {} 结果槽已关闭", sync_log_id, transport);
            summary.missing.push(transport);
            SyncResult::lost(format!("{} 结果槽在回报前被关闭", transport))
        }
    }
}
