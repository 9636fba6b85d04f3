//! 全量同步检测
//!
//! rrdp 与 rsync 各自把仓库下载到自己的根目录下（`<root>/<url host>/...`）。
//! 若本次要走 rrdp 的仓库在 rsync 根目录下已有数据（或反过来），说明上次用的
//! 是另一种传输，增量同步会得到不一致的结果，只能全量重置。

use std::path::{Path, PathBuf};

use tracing::{debug, error, info};
use url::Url;

use crate::config::SyncConfig;
use crate::error::{Result, SyncError};

/// 检测结果
#[derive(Debug)]
pub enum FullSyncCheck {
    /// 没有冲突，可以增量同步
    Incremental,
    /// 发现另一种传输留下的目录
    Conflict(PathBuf),
    /// 无法判断（地址无法解析或目录探测失败），按需要全量处理
    CheckFailed(SyncError),
}

impl FullSyncCheck {
    pub fn needs_full_sync(&self) -> bool {
        !matches!(self, Self::Incremental)
    }
}

#[derive(Debug, Clone)]
pub struct FullSyncDetector {
    rrdp_dest_path: PathBuf,
    rsync_dest_path: PathBuf,
}

impl FullSyncDetector {
    pub fn new(rrdp_dest_path: impl Into<PathBuf>, rsync_dest_path: impl Into<PathBuf>) -> Self {
        Self {
            rrdp_dest_path: rrdp_dest_path.into(),
            rsync_dest_path: rsync_dest_path.into(),
        }
    }

    pub fn from_config(config: &SyncConfig) -> Self {
        Self::new(&config.rrdp_dest_path, &config.rsync_dest_path)
    }

    /// rrdp 地址在 rsync 根目录下找，rsync 地址在 rrdp 根目录下找，遇到第一个冲突即返回
    pub async fn check_need_full_sync(&self, rrdp_urls: &[String], rsync_urls: &[String]) -> FullSyncCheck {
        debug!(
            "check_need_full_sync(): rrdpDestPath={}, rsyncDestPath={}, rrdpUrls={}, rsyncUrls={}",
            self.rrdp_dest_path.display(),
            self.rsync_dest_path.display(),
            rrdp_urls.len(),
            rsync_urls.len()
        );

        let targets = rrdp_urls
            .iter()
            .map(|url| (url, &self.rsync_dest_path))
            .chain(rsync_urls.iter().map(|url| (url, &self.rrdp_dest_path)));

        for (url, other_root) in targets {
            match existing_target(other_root, url).await {
                Ok(Some(path)) => {
                    info!(
                        "check_need_full_sync(): {} 已存在于另一种传输的目录 {}，需要全量同步",
                        url,
                        path.display()
                    );
                    return FullSyncCheck::Conflict(path);
                }
                Ok(None) => {}
                Err(e) => {
                    error!(
                        "check_need_full_sync(): 探测 {} 于 {} 失败: {}",
                        url,
                        other_root.display(),
                        e
                    );
                    return FullSyncCheck::CheckFailed(e);
                }
            }
        }

        debug!("check_need_full_sync(): 不需要全量同步");
        FullSyncCheck::Incremental
    }
}

/// 返回已存在的目标路径
async fn existing_target(root: &Path, url: &str) -> Result<Option<PathBuf>> {
    let path = join_prefix_path_and_url_host(root, url)?;
    let exists = tokio::fs::try_exists(&path).await?;
    debug!("existing_target(): {} exists={}", path.display(), exists);
    Ok(exists.then_some(path))
}

/// `<root>/<url host>`
pub fn join_prefix_path_and_url_host(root: &Path, url: &str) -> Result<PathBuf> {
    let parsed = Url::parse(url)?;
    let host = parsed
        .host_str()
        .filter(|h| !h.is_empty())
        .ok_or_else(|| SyncError::Url(format!("{} 中没有 host", url)))?;
    Ok(root.join(host))
}
