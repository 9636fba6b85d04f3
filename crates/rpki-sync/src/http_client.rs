//! HTTP 客户端模块 - 调用 tal / rrdp / rsync / sys / parsevalidate 服务
//!
//! 所有请求都是 POST + JSON，底层使用 reqwest。

use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use tracing::{debug, error, info};

use crate::config::{HttpClientConfig, ServiceEndpoints};
use crate::error::{Result, SyncError};
use crate::sync::services::{PipelineTrigger, ResetTrigger, TalService, TransportService};
use crate::sync::{SyncStyle, SyncUrls, TalModel, Transport};

/// /tal/gettals 响应
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TalResponse {
    #[serde(default)]
    pub result: String,
    #[serde(default)]
    pub msg: String,
    #[serde(default)]
    pub tal_models: Vec<TalModel>,
}

impl TalResponse {
    /// 校验响应并取出 tal 列表
    pub fn into_tal_models(self) -> Result<Vec<TalModel>> {
        if self.result != "ok" {
            return Err(SyncError::TalUnavailable(format!(
                "/tal/gettals 返回 result={} msg={}",
                self.result, self.msg
            )));
        }
        if self.tal_models.is_empty() {
            return Err(SyncError::TalUnavailable("没有 tal 文件".to_string()));
        }
        Ok(self.tal_models)
    }
}

/// /sys/initreset 请求
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct InitResetRequest {
    pub sys_style: String,
    pub sync_style: SyncStyle,
}

impl InitResetRequest {
    pub fn full_sync(sync_style: SyncStyle) -> Self {
        Self {
            sys_style: "fullsync".to_string(),
            sync_style,
        }
    }
}

/// 协作服务的 HTTP 客户端
pub struct ServiceHttpClient {
    client: Client,
    endpoints: ServiceEndpoints,
}

impl ServiceHttpClient {
    pub fn new(config: &HttpClientConfig, endpoints: ServiceEndpoints) -> Result<Self> {
        let mut builder = Client::builder();

        if let Some(timeout) = config.connect_timeout_secs {
            builder = builder.connect_timeout(Duration::from_secs(timeout));
        }

        if let Some(timeout) = config.request_timeout_secs {
            builder = builder.timeout(Duration::from_secs(timeout));
        }

        let client = builder
            .build()
            .map_err(|e| SyncError::Transport(format!("创建 HTTP 客户端失败: {}", e)))?;

        info!("✅ HTTP 客户端已创建 (tal: {}, rrdp: {}, rsync: {})",
            endpoints.tal_server, endpoints.rrdp_server, endpoints.rsync_server);

        Ok(Self { client, endpoints })
    }

    fn transport_url(&self, transport: Transport) -> String {
        match transport {
            Transport::Rrdp => join_url(&self.endpoints.rrdp_server, "/rrdp/start"),
            Transport::Rsync => join_url(&self.endpoints.rsync_server, "/rsync/start"),
        }
    }

    /// POST 并检查状态码
    async fn post(&self, url: &str, body: Option<String>) -> Result<reqwest::Response> {
        debug!("POST {} ({} bytes)", url, body.as_ref().map_or(0, |b| b.len()));
        let mut request = self.client.post(url);
        if let Some(body) = body {
            request = request.header(reqwest::header::CONTENT_TYPE, "application/json").body(body);
        }

        let response = request
            .send()
            .await
            .map_err(|e| SyncError::Transport(format!("请求 {} 失败: {}", url, e)))?;

        let status = response.status();
        if !status.is_success() {
            let error_text = response.text().await.unwrap_or_else(|_| "无法读取错误信息".to_string());
            error!("❌ {} 失败，HTTP 状态码: {}, 错误: {}", url, status, error_text);
            return Err(SyncError::Transport(format!(
                "{} 失败，HTTP 状态码: {} ({})", url, status, error_text
            )));
        }
        Ok(response)
    }
}

#[async_trait]
impl TalService for ServiceHttpClient {
    async fn get_tals(&self) -> Result<Vec<TalModel>> {
        let url = join_url(&self.endpoints.tal_server, "/tal/gettals");
        let response = self.post(&url, None).await.map_err(|e| {
            error!("get_tals(): {}", e);
            SyncError::TalUnavailable(e.to_string())
        })?;
        let tal_response: TalResponse = response
            .json()
            .await
            .map_err(|e| SyncError::TalUnavailable(format!("解析 /tal/gettals 响应失败: {}", e)))?;

        let tal_models = tal_response.into_tal_models()?;
        debug!("get_tals(): talModels={}", tal_models.len());
        Ok(tal_models)
    }
}

#[async_trait]
impl TransportService for ServiceHttpClient {
    async fn start(&self, transport: Transport, sync_urls: &SyncUrls) -> Result<()> {
        let url = self.transport_url(transport);
        self.post(&url, Some(serde_json::to_string(sync_urls)?)).await?;
        info!("📤 已启动 {}: syncLogId={}", transport, sync_urls.sync_log_id);
        Ok(())
    }
}

#[async_trait]
impl ResetTrigger for ServiceHttpClient {
    async fn trigger_full_sync(&self, sync_style: SyncStyle) -> Result<()> {
        let url = join_url(&self.endpoints.sys_server, "/sys/initreset");
        let body = serde_json::to_string(&InitResetRequest::full_sync(sync_style))?;
        self.post(&url, Some(body)).await?;
        info!("📤 已触发全量重置: syncStyle={}", sync_style);
        Ok(())
    }
}

#[async_trait]
impl PipelineTrigger for ServiceHttpClient {
    async fn start_parse_validate(&self) -> Result<()> {
        let url = join_url(&self.endpoints.parse_validate_server, "/parsevalidate/start");
        self.post(&url, None).await?;
        info!("📤 已启动解析验证");
        Ok(())
    }
}

fn join_url(base: &str, path: &str) -> String {
    format!("{}{}", base.trim_end_matches('/'), path)
}
