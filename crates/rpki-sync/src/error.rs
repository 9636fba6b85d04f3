use std::fmt;

use crate::sync::Transport;

/// rpki-sync 统一错误类型
#[derive(Debug, thiserror::Error)]
pub enum SyncError {
    #[error("SQLite error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    #[error("JSON error: {0}")]
    Json(String),

    #[error("IO error: {0}")]
    Io(String),

    #[error("Database error: {0}")]
    Database(String),

    #[error("Migration error: {0}")]
    Migration(String),

    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    #[error("Invalid data: {0}")]
    InvalidData(String),

    #[error("Config error: {0}")]
    Config(String),

    #[error("Transport error: {0}")]
    Transport(String),

    #[error("Url error: {0}")]
    Url(String),

    /// 获取 tal 失败或 tal 列表为空
    #[error("Tal unavailable: {0}")]
    TalUnavailable(String),

    /// 按当前 syncStyle 既没有 rrdp 也没有 rsync 地址
    #[error("No sync urls: {0}")]
    NoSyncUrls(String),

    /// 结果回报的 syncLogId 没有对应的等待中的同步（或已回报过）
    #[error("No pending {transport} result slot for syncLogId {sync_log_id}")]
    UnknownRun { sync_log_id: u64, transport: Transport },

    #[error("Timeout: {0}")]
    Timeout(String),
}

impl From<serde_json::Error> for SyncError {
    fn from(error: serde_json::Error) -> Self {
        SyncError::Json(error.to_string())
    }
}

impl From<std::io::Error> for SyncError {
    fn from(error: std::io::Error) -> Self {
        SyncError::Io(error.to_string())
    }
}

impl From<refinery::Error> for SyncError {
    fn from(error: refinery::Error) -> Self {
        SyncError::Migration(error.to_string())
    }
}

impl From<reqwest::Error> for SyncError {
    fn from(error: reqwest::Error) -> Self {
        SyncError::Transport(error.to_string())
    }
}

impl From<url::ParseError> for SyncError {
    fn from(error: url::ParseError) -> Self {
        SyncError::Url(error.to_string())
    }
}

impl SyncError {
    /// 带上下文的数据库错误
    pub fn database<T: fmt::Display>(msg: T) -> Self {
        SyncError::Database(msg.to_string())
    }

    /// 是否属于"本次同步不可继续"的前置错误（tal / url 分类）
    pub fn is_catalog_error(&self) -> bool {
        matches!(self, SyncError::TalUnavailable(_) | SyncError::NoSyncUrls(_))
    }
}

pub type Result<T> = std::result::Result<T, SyncError>;
