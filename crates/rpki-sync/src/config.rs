//! 同步核心配置
//!
//! 包含数据库位置、rrdp/rsync 下载根目录、协作服务地址与等待超时，
//! 可由 JSON 文件加载，也可用 builder 在代码中组装。

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{Result, SyncError};

/// HTTP 客户端配置
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HttpClientConfig {
    /// 连接超时（秒）
    pub connect_timeout_secs: Option<u64>,
    /// 请求超时（秒）
    pub request_timeout_secs: Option<u64>,
}

impl Default for HttpClientConfig {
    fn default() -> Self {
        Self {
            connect_timeout_secs: Some(10),
            request_timeout_secs: Some(60),
        }
    }
}

/// 协作服务的基础地址
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ServiceEndpoints {
    /// tal 服务，提供 /tal/gettals
    pub tal_server: String,
    /// rrdp 服务，提供 /rrdp/start
    pub rrdp_server: String,
    /// rsync 服务，提供 /rsync/start
    pub rsync_server: String,
    /// sys 服务，提供 /sys/initreset
    pub sys_server: String,
    /// parsevalidate 服务，提供 /parsevalidate/start
    pub parse_validate_server: String,
}

impl Default for ServiceEndpoints {
    fn default() -> Self {
        let local = "http://127.0.0.1:8070".to_string();
        Self {
            tal_server: local.clone(),
            rrdp_server: local.clone(),
            rsync_server: local.clone(),
            sys_server: local.clone(),
            parse_validate_server: local,
        }
    }
}

/// 同步核心配置
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SyncConfig {
    /// SQLite 数据库文件
    pub db_path: PathBuf,
    /// rrdp 下载根目录
    pub rrdp_dest_path: PathBuf,
    /// rsync 下载根目录
    pub rsync_dest_path: PathBuf,
    /// 协作服务地址
    #[serde(default)]
    pub services: ServiceEndpoints,
    /// HTTP 客户端配置
    #[serde(default)]
    pub http_client_config: HttpClientConfig,
    /// 等待 rrdp/rsync 结果的最长时间（秒）；None 表示一直等待
    #[serde(default = "default_fan_in_timeout_secs")]
    pub fan_in_timeout_secs: Option<u64>,
}

fn default_fan_in_timeout_secs() -> Option<u64> {
    Some(6 * 3600)
}

impl Default for SyncConfig {
    fn default() -> Self {
        let data_dir = default_data_dir();
        Self {
            db_path: data_dir.join("rpki_sync.db"),
            rrdp_dest_path: data_dir.join("rrdprepo"),
            rsync_dest_path: data_dir.join("rsyncrepo"),
            services: ServiceEndpoints::default(),
            http_client_config: HttpClientConfig::default(),
            fan_in_timeout_secs: default_fan_in_timeout_secs(),
        }
    }
}

/// 默认数据目录 ~/.rpki-sync/
fn default_data_dir() -> PathBuf {
    match std::env::var("HOME") {
        Ok(home) => PathBuf::from(home).join(".rpki-sync"),
        Err(_) => PathBuf::from("./rpki_sync_data"),
    }
}

impl SyncConfig {
    pub fn builder() -> SyncConfigBuilder {
        SyncConfigBuilder::new()
    }

    /// 从 JSON 配置文件加载
    pub fn from_json_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path)
            .map_err(|e| SyncError::Config(format!("读取配置文件 {} 失败: {}", path.display(), e)))?;
        let config: SyncConfig = serde_json::from_str(&content)
            .map_err(|e| SyncError::Config(format!("解析配置文件 {} 失败: {}", path.display(), e)))?;
        config.validate()?;
        Ok(config)
    }

    /// rrdp 与 rsync 目录必须不同，否则无法判断上次的同步方式
    pub fn validate(&self) -> Result<()> {
        if self.rrdp_dest_path == self.rsync_dest_path {
            return Err(SyncError::Config(format!(
                "rrdpDestPath 与 rsyncDestPath 不能相同: {}",
                self.rrdp_dest_path.display()
            )));
        }
        Ok(())
    }

    pub fn fan_in_timeout(&self) -> Option<Duration> {
        self.fan_in_timeout_secs.map(Duration::from_secs)
    }
}

pub struct SyncConfigBuilder {
    config: SyncConfig,
}

impl SyncConfigBuilder {
    pub fn new() -> Self {
        Self {
            config: SyncConfig::default(),
        }
    }

    pub fn db_path<P: AsRef<Path>>(mut self, path: P) -> Self {
        self.config.db_path = path.as_ref().to_path_buf();
        self
    }

    pub fn rrdp_dest_path<P: AsRef<Path>>(mut self, path: P) -> Self {
        self.config.rrdp_dest_path = path.as_ref().to_path_buf();
        self
    }

    pub fn rsync_dest_path<P: AsRef<Path>>(mut self, path: P) -> Self {
        self.config.rsync_dest_path = path.as_ref().to_path_buf();
        self
    }

    pub fn services(mut self, services: ServiceEndpoints) -> Self {
        self.config.services = services;
        self
    }

    pub fn http_client_config(mut self, config: HttpClientConfig) -> Self {
        self.config.http_client_config = config;
        self
    }

    /// 设置等待传输结果的超时；None 表示一直等待
    pub fn fan_in_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.config.fan_in_timeout_secs = timeout.map(|t| t.as_secs());
        self
    }

    pub fn build(self) -> SyncConfig {
        self.config
    }
}

impl Default for SyncConfigBuilder {
    fn default() -> Self {
        Self::new()
    }
}
