//! 按 syncStyle 把 tal 中的仓库地址分成 rrdp / rsync 两组

use tracing::{debug, error};

use crate::error::{Result, SyncError};
use crate::sync::{SyncStyle, TalModel};

/// 返回 (rrdpUrls, rsyncUrls)，两组都为空时报错。
///
/// - `sync`：支持 rrdp 的仓库只取 rrdp 地址；不支持 rrdp 但支持 rsync 的取 rsync 地址
/// - `rrdp`：只取支持 rrdp 的仓库
/// - `rsync`：只取支持 rsync 的仓库
pub fn get_urls_by_sync_style(
    sync_style: SyncStyle,
    tal_models: &[TalModel],
) -> Result<(Vec<String>, Vec<String>)> {
    let mut rrdp_urls = Vec::new();
    let mut rsync_urls = Vec::new();

    for url in tal_models.iter().flat_map(|tal| &tal.tal_sync_urls) {
        match sync_style {
            SyncStyle::Sync => {
                if url.support_rrdp {
                    rrdp_urls.push(url.rrdp_url.clone());
                } else if url.support_rsync {
                    rsync_urls.push(url.rsync_url.clone());
                }
            }
            SyncStyle::Rrdp if url.support_rrdp => rrdp_urls.push(url.rrdp_url.clone()),
            SyncStyle::Rsync if url.support_rsync => rsync_urls.push(url.rsync_url.clone()),
            _ => {}
        }
    }
    debug!(
        "get_urls_by_sync_style(): syncStyle={}, rrdpUrls={:?}, rsyncUrls={:?}",
        sync_style, rrdp_urls, rsync_urls
    );

    if rrdp_urls.is_empty() && rsync_urls.is_empty() {
        error!("get_urls_by_sync_style(): syncStyle={} 下既没有 rrdp 地址也没有 rsync 地址", sync_style);
        return Err(SyncError::NoSyncUrls(format!(
            "syncStyle={} 下既没有 rrdp 地址也没有 rsync 地址",
            sync_style
        )));
    }
    Ok((rrdp_urls, rsync_urls))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sync::TalSyncUrl;

    fn endpoint(rrdp: Option<&str>, rsync: Option<&str>) -> TalSyncUrl {
        TalSyncUrl {
            support_rrdp: rrdp.is_some(),
            rrdp_url: rrdp.unwrap_or_default().to_string(),
            support_rsync: rsync.is_some(),
            rsync_url: rsync.unwrap_or_default().to_string(),
        }
    }

    fn catalog() -> Vec<TalModel> {
        vec![
            TalModel {
                tal_sync_urls: vec![
                    endpoint(Some("https://a/notification.xml"), Some("rsync://a/repo")),
                    endpoint(None, Some("rsync://b/repo")),
                ],
            },
            TalModel {
                tal_sync_urls: vec![
                    endpoint(Some("https://c/notification.xml"), None),
                    endpoint(None, None),
                ],
            },
        ]
    }

    #[test]
    fn sync_prefers_rrdp_per_endpoint() {
        let (rrdp, rsync) = get_urls_by_sync_style(SyncStyle::Sync, &catalog()).unwrap();
        assert_eq!(rrdp, vec!["https://a/notification.xml", "https://c/notification.xml"]);
        // a 同时支持 rsync，但已经走 rrdp
        assert_eq!(rsync, vec!["rsync://b/repo"]);
    }

    #[test]
    fn rrdp_only_takes_rrdp_capable() {
        let (rrdp, rsync) = get_urls_by_sync_style(SyncStyle::Rrdp, &catalog()).unwrap();
        assert_eq!(rrdp, vec!["https://a/notification.xml", "https://c/notification.xml"]);
        assert!(rsync.is_empty());
    }

    #[test]
    fn rsync_only_takes_rsync_capable() {
        let (rrdp, rsync) = get_urls_by_sync_style(SyncStyle::Rsync, &catalog()).unwrap();
        assert!(rrdp.is_empty());
        assert_eq!(rsync, vec!["rsync://a/repo", "rsync://b/repo"]);
    }

    #[test]
    fn every_endpoint_contributes_at_most_once_under_sync() {
        let tals = catalog();
        let capable = tals
            .iter()
            .flat_map(|t| &t.tal_sync_urls)
            .filter(|u| u.support_rrdp || u.support_rsync)
            .count();
        let (rrdp, rsync) = get_urls_by_sync_style(SyncStyle::Sync, &tals).unwrap();
        assert_eq!(rrdp.len() + rsync.len(), capable);
    }

    #[test]
    fn nothing_selected_is_an_error() {
        let tals = vec![TalModel {
            tal_sync_urls: vec![endpoint(None, Some("rsync://b/repo"))],
        }];
        let result = get_urls_by_sync_style(SyncStyle::Rrdp, &tals);
        assert!(matches!(result, Err(SyncError::NoSyncUrls(_))));

        assert!(get_urls_by_sync_style(SyncStyle::Sync, &[]).is_err());
    }
}
