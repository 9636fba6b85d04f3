//! 数据实体定义 - 对应数据库表结构
//!
//! - lab_rpki_sync_log / lab_rpki_sync_log_file：同步过程记录
//! - lab_rpki_crl / lab_rpki_crl_revoked_cert：已解析的 CRL
//! - lab_rpki_cer / lab_rpki_mft / lab_rpki_roa：仅用于按文件定位已有行

use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::sync::SyncStyle;

/// 同步日志状态（lab_rpki_sync_log.state）
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SyncLogState {
    Syncing,
    Synced,
    /// 检测到目录布局冲突，已改为触发全量同步
    Superseded,
    Failed,
}

impl SyncLogState {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Syncing => "syncing",
            Self::Synced => "synced",
            Self::Superseded => "superseded",
            Self::Failed => "failed",
        }
    }
}

impl FromStr for SyncLogState {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "syncing" => Ok(Self::Syncing),
            "synced" => Ok(Self::Synced),
            "superseded" => Ok(Self::Superseded),
            "failed" => Ok(Self::Failed),
            _ => Err(()),
        }
    }
}

impl fmt::Display for SyncLogState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// 单个传输（rrdp 或 rsync）的一次同步结果，由传输服务回报
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SyncResult {
    #[serde(default)]
    pub start_time: Option<DateTime<Utc>>,
    #[serde(default)]
    pub end_time: Option<DateTime<Utc>>,
    #[serde(default)]
    pub ok_urls: Vec<String>,
    /// url -> 失败原因
    #[serde(default)]
    pub fail_urls: BTreeMap<String, String>,
    #[serde(default)]
    pub add_files_len: u64,
    #[serde(default)]
    pub update_files_len: u64,
    #[serde(default)]
    pub del_files_len: u64,
    /// 等待超时，未收到传输服务的回报
    #[serde(default)]
    pub timed_out: bool,
    /// 未能得到结果的原因（超时或回报通道被关闭）
    #[serde(default)]
    pub error: Option<String>,
}

impl SyncResult {
    pub fn timed_out(reason: impl Into<String>) -> Self {
        Self {
            end_time: Some(Utc::now()),
            timed_out: true,
            error: Some(reason.into()),
            ..Default::default()
        }
    }

    pub fn lost(reason: impl Into<String>) -> Self {
        Self {
            end_time: Some(Utc::now()),
            error: Some(reason.into()),
            ..Default::default()
        }
    }
}

/// lab_rpki_sync_log.sync_state 中保存的整次同步快照
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SyncLogSyncState {
    pub start_time: DateTime<Utc>,
    #[serde(default)]
    pub end_time: Option<DateTime<Utc>>,
    pub sync_style: SyncStyle,
    #[serde(default)]
    pub rrdp_urls: Vec<String>,
    #[serde(default)]
    pub rsync_urls: Vec<String>,
    #[serde(default)]
    pub rrdp_result: Option<SyncResult>,
    #[serde(default)]
    pub rsync_result: Option<SyncResult>,
}

impl SyncLogSyncState {
    pub fn new(sync_style: SyncStyle) -> Self {
        Self {
            start_time: Utc::now(),
            end_time: None,
            sync_style,
            rrdp_urls: Vec::new(),
            rsync_urls: Vec::new(),
            rrdp_result: None,
            rsync_result: None,
        }
    }
}

/// lab_rpki_sync_log 行
#[derive(Debug, Clone)]
pub struct SyncLog {
    pub id: u64,
    pub sync_style: SyncStyle,
    pub state: SyncLogState,
    pub start_time: DateTime<Utc>,
    pub end_time: Option<DateTime<Utc>>,
    pub sync_state: SyncLogSyncState,
}

/// 文件类型，决定去哪张对象表查找已有行
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FileType {
    Cer,
    Crl,
    Mft,
    Roa,
}

impl FileType {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Cer => "cer",
            Self::Crl => "crl",
            Self::Mft => "mft",
            Self::Roa => "roa",
        }
    }

    /// 对应的对象表
    pub fn table_name(self) -> &'static str {
        match self {
            Self::Cer => "lab_rpki_cer",
            Self::Crl => "lab_rpki_crl",
            Self::Mft => "lab_rpki_mft",
            Self::Roa => "lab_rpki_roa",
        }
    }
}

impl FromStr for FileType {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "cer" => Ok(Self::Cer),
            "crl" => Ok(Self::Crl),
            "mft" => Ok(Self::Mft),
            "roa" => Ok(Self::Roa),
            _ => Err(()),
        }
    }
}

impl fmt::Display for FileType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// 文件在本次同步中的动作
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SyncType {
    Add,
    Update,
    Del,
}

impl SyncType {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Add => "add",
            Self::Update => "update",
            Self::Del => "del",
        }
    }

    /// 只有 update / del 在对象表中有旧行
    pub fn has_existing_row(self) -> bool {
        !matches!(self, Self::Add)
    }
}

impl FromStr for SyncType {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "add" => Ok(Self::Add),
            "update" => Ok(Self::Update),
            "del" => Ok(Self::Del),
            _ => Err(()),
        }
    }
}

impl fmt::Display for SyncType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// 某个处理阶段的完成情况
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum StageState {
    NotNeed,
    NotYet,
    Finished,
}

impl StageState {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::NotNeed => "notNeed",
            Self::NotYet => "notYet",
            Self::Finished => "finished",
        }
    }
}

/// lab_rpki_sync_log_file.state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct SyncLogFileState {
    /// 是否已写入对象表
    pub update_cert_table: StageState,
    /// 是否还需要 rtr 刷新
    pub rtr: StageState,
}

impl Default for SyncLogFileState {
    fn default() -> Self {
        Self {
            update_cert_table: StageState::NotYet,
            rtr: StageState::NotNeed,
        }
    }
}

impl SyncLogFileState {
    /// 写完对象表后的状态：roa 非删除时仍需 rtr 刷新
    pub fn after_cert_table_update(file_type: FileType, sync_type: SyncType) -> Self {
        let rtr = if file_type == FileType::Roa && sync_type != SyncType::Del {
            StageState::NotYet
        } else {
            StageState::NotNeed
        };
        Self {
            update_cert_table: StageState::Finished,
            rtr,
        }
    }
}

/// CRL 中的一条吊销记录
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RevokedCertModel {
    pub sn: String,
    pub revocation_time: DateTime<Utc>,
}

/// 已解析的 CRL
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CrlModel {
    pub crl_number: String,
    pub this_update: DateTime<Utc>,
    pub next_update: DateTime<Utc>,
    #[serde(default)]
    pub has_expired: bool,
    #[serde(default)]
    pub aki: String,
    pub file_path: String,
    pub file_name: String,
    #[serde(default)]
    pub file_hash: String,
    #[serde(default)]
    pub revoked_cert_models: Vec<RevokedCertModel>,
}

/// 文件对应的已解析对象（当前只落库 CRL）
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum CertModel {
    Crl(CrlModel),
}

/// lab_rpki_sync_log_file 行 + 解析结果
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SyncLogFileModel {
    pub id: u64,
    pub sync_log_id: u64,
    pub file_path: String,
    pub file_name: String,
    pub file_type: FileType,
    pub sync_type: SyncType,
    /// update / del 时在对象表中的旧行 id
    #[serde(default)]
    pub cert_id: Option<u64>,
    #[serde(default)]
    pub state: SyncLogFileState,
    /// 解析结果的完整 JSON（审计用）
    #[serde(default)]
    pub json_all: Option<String>,
    #[serde(default, skip_serializing)]
    pub cert_model: Option<CertModel>,
}

impl SyncLogFileModel {
    pub fn new(
        sync_log_id: u64,
        file_path: impl Into<String>,
        file_name: impl Into<String>,
        file_type: FileType,
        sync_type: SyncType,
    ) -> Self {
        Self {
            id: 0,
            sync_log_id,
            file_path: file_path.into(),
            file_name: file_name.into(),
            file_type,
            sync_type,
            cert_id: None,
            state: SyncLogFileState::default(),
            json_all: None,
            cert_model: None,
        }
    }

    /// 挂上解析后的 CRL，同时生成 json_all
    pub fn with_crl(mut self, crl: CrlModel) -> Result<Self, serde_json::Error> {
        self.json_all = Some(serde_json::to_string(&crl)?);
        self.cert_model = Some(CertModel::Crl(crl));
        Ok(self)
    }
}
