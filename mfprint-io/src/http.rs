use std::time::Duration;

use reqwest::blocking::Client;
use serde::de::DeserializeOwned;
use tracing::debug;

use crate::{
    CancelResponse, PrintSpec, PrintTransport, ReportError, ReportResponse, StatusResponse,
};

/// 基于 `reqwest` 阻塞客户端的打印服务端点。
pub struct HttpTransport {
    base_url: String,
    client: Client,
}

impl HttpTransport {
    pub fn new(base_url: impl Into<String>) -> Result<Self, ReportError> {
        Self::with_client(base_url, Client::builder().build()?)
    }

    /// 为单次请求设置超时；轮询总时长仍由 `PollSettings` 控制。
    pub fn with_request_timeout(
        base_url: impl Into<String>,
        timeout: Duration,
    ) -> Result<Self, ReportError> {
        Self::with_client(base_url, Client::builder().timeout(timeout).build()?)
    }

    fn with_client(base_url: impl Into<String>, client: Client) -> Result<Self, ReportError> {
        let base_url = base_url.into().trim_end_matches('/').to_string();
        Ok(Self { base_url, client })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }
}

fn decode<T: DeserializeOwned>(body: &str) -> Result<T, ReportError> {
    Ok(serde_json::from_str(body)?)
}

impl PrintTransport for HttpTransport {
    fn request_report(&self, spec: &PrintSpec) -> Result<ReportResponse, ReportError> {
        let url = format!("{}/report.{}", self.base_url, spec.format);
        debug!(%url, "提交打印请求");
        let response = self.client.post(&url).json(spec).send()?;
        let status = response.status();
        let body = response.text()?;
        if !status.is_success() {
            return Err(ReportError::Submission {
                status: Some(status.as_u16()),
                message: body,
            });
        }
        decode(&body)
    }

    fn status(&self, reference: &str) -> Result<StatusResponse, ReportError> {
        let url = format!("{}/status/{reference}.json", self.base_url);
        let body = self.client.get(&url).send()?.error_for_status()?.text()?;
        decode(&body)
    }

    fn cancel(&self, reference: &str) -> Result<CancelResponse, ReportError> {
        let url = format!("{}/cancel/{reference}", self.base_url);
        let response = self.client.delete(&url).send()?;
        Ok(CancelResponse {
            status: response.status().as_u16(),
        })
    }

    fn download_url(&self, reference: &str) -> String {
        format!("{}/report/{reference}", self.base_url)
    }
}
