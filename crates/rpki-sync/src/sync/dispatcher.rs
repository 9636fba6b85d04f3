//! 启动传输
//!
//! rrdp / rsync 各自在后台任务中启动，地址为空的传输不启动。
//! 启动失败只记录日志，结果仍由传输服务回报（或由等待超时兜底）。

use std::sync::Arc;

use tracing::{debug, info};

use crate::sync::services::TransportService;
use crate::sync::{SyncUrls, Transport};
use crate::utils::spawn_logged;

/// 返回实际启动的传输
pub fn dispatch(service: &Arc<dyn TransportService>, sync_urls: &SyncUrls) -> Vec<Transport> {
    let mut started = Vec::with_capacity(2);
    for (transport, urls) in [
        (Transport::Rrdp, &sync_urls.rrdp_urls),
        (Transport::Rsync, &sync_urls.rsync_urls),
    ] {
        if urls.is_empty() {
            debug!("dispatch(): syncLogId={}, {} 没有地址，跳过", sync_urls.sync_log_id, transport);
            continue;
        }

        let service = Arc::clone(service);
        let sync_urls = sync_urls.clone();
        let name = match transport {
            Transport::Rrdp => "启动 rrdp",
            Transport::Rsync => "启动 rsync",
        };
        spawn_logged(name, async move { service.start(transport, &sync_urls).await });
        started.push(transport);
    }
    info!(
        "dispatch(): syncLogId={}, rrdpUrls={}, rsyncUrls={}, started={:?}",
        sync_urls.sync_log_id,
        sync_urls.rrdp_urls.len(),
        sync_urls.rsync_urls.len(),
        started
    );
    started
}
