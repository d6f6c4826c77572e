//! 打印服务的报告生命周期：提交、轮询、下载地址与取消。

use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

pub mod http;
pub mod report;

pub use http::HttpTransport;
pub use mfprint_engine::PrintSpec;
pub use report::{CancelHandle, ReportClient, ReportJob};

#[derive(Debug, Error)]
pub enum ReportError {
    #[error("report submission rejected (status {status:?}): {message}")]
    Submission { status: Option<u16>, message: String },
    #[error("print duration exceeded for job {reference} after {waited:?}")]
    Timeout { reference: String, waited: Duration },
    #[error("print job {reference} failed: {message}")]
    Service { reference: String, message: String },
    #[error("print job {reference} was cancelled")]
    Cancelled { reference: String },
    #[error("transport failure: {0}")]
    Transport(#[from] reqwest::Error),
    #[error("malformed service response: {0}")]
    Decode(#[from] serde_json::Error),
    #[error("invalid poll settings: {message}")]
    InvalidSettings { message: String },
    #[error("job cannot move from {from} to {to}")]
    InvalidTransition {
        from: &'static str,
        to: &'static str,
    },
}

/// `POST /report.<format>` 的应答。
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReportResponse {
    #[serde(rename = "ref")]
    pub reference: String,
    #[serde(rename = "statusURL", default)]
    pub status_url: String,
    #[serde(rename = "downloadURL", default)]
    pub download_url: String,
}

/// `GET /status/<ref>.json` 的应答。
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StatusResponse {
    #[serde(default)]
    pub done: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(rename = "downloadURL", default)]
    pub download_url: String,
    #[serde(default)]
    pub elapsed_time: f64,
    #[serde(default)]
    pub waiting_time: f64,
    #[serde(default)]
    pub status: String,
}

impl StatusResponse {
    /// 服务端报告的应用级错误；空串视为无错误。
    pub fn error_message(&self) -> Option<&str> {
        self.error.as_deref().filter(|message| !message.is_empty())
    }
}

/// `DELETE /cancel/<ref>` 只有状态码。
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct CancelResponse {
    pub status: u16,
}

impl CancelResponse {
    #[inline]
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }
}

/// 与打印服务通信的端点集合。
pub trait PrintTransport: Send + Sync {
    fn request_report(&self, spec: &PrintSpec) -> Result<ReportResponse, ReportError>;
    fn status(&self, reference: &str) -> Result<StatusResponse, ReportError>;
    fn cancel(&self, reference: &str) -> Result<CancelResponse, ReportError>;
    fn download_url(&self, reference: &str) -> String;
}

/// 轮询间隔计时器。测试中替换为记录型实现。
pub trait Sleeper {
    fn sleep(&self, duration: Duration);
}

#[derive(Debug, Clone, Copy, Default)]
pub struct ThreadSleeper;

impl Sleeper for ThreadSleeper {
    fn sleep(&self, duration: Duration) {
        std::thread::sleep(duration);
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PollSettings {
    pub interval: Duration,
    pub timeout: Duration,
}

impl Default for PollSettings {
    fn default() -> Self {
        Self {
            interval: Duration::from_millis(Self::DEFAULT_INTERVAL_MS),
            timeout: Duration::from_millis(Self::DEFAULT_TIMEOUT_MS),
        }
    }
}

impl PollSettings {
    pub const DEFAULT_INTERVAL_MS: u64 = 1000;
    pub const DEFAULT_TIMEOUT_MS: u64 = 30_000;

    /// 间隔必须大于零，否则累计等待永远达不到超时。
    pub fn new(interval: Duration, timeout: Duration) -> Result<Self, ReportError> {
        let settings = Self { interval, timeout };
        settings.validate()?;
        Ok(settings)
    }

    pub fn from_millis(interval_ms: u64, timeout_ms: u64) -> Result<Self, ReportError> {
        Self::new(
            Duration::from_millis(interval_ms),
            Duration::from_millis(timeout_ms),
        )
    }

    pub fn validate(&self) -> Result<(), ReportError> {
        if self.interval.is_zero() {
            return Err(ReportError::InvalidSettings {
                message: "poll interval must be greater than zero".into(),
            });
        }
        Ok(())
    }
}

/// 作业状态。`Done`、`Errored`、`TimedOut`、`Cancelled` 为终态。
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum JobState {
    Submitted,
    Polling,
    Done(String),
    Errored(String),
    TimedOut,
    Cancelled,
}

impl JobState {
    pub fn name(&self) -> &'static str {
        match self {
            JobState::Submitted => "submitted",
            JobState::Polling => "polling",
            JobState::Done(_) => "done",
            JobState::Errored(_) => "errored",
            JobState::TimedOut => "timed-out",
            JobState::Cancelled => "cancelled",
        }
    }

    pub fn is_terminal(&self) -> bool {
        !matches!(self, JobState::Submitted | JobState::Polling)
    }

    /// 终态不再迁移；`Submitted` 只能进入轮询或被取消。
    pub fn transition(&mut self, next: JobState) -> Result<(), ReportError> {
        let allowed = match (&*self, &next) {
            (JobState::Submitted, JobState::Polling | JobState::Cancelled) => true,
            (JobState::Polling, next) => next.is_terminal(),
            _ => false,
        };
        if !allowed {
            return Err(ReportError::InvalidTransition {
                from: self.name(),
                to: next.name(),
            });
        }
        *self = next;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn terminal_states_reject_transitions() {
        let mut state = JobState::Submitted;
        state.transition(JobState::Polling).expect("开始轮询");
        state
            .transition(JobState::Done("http://print/report/1".into()))
            .expect("完成");
        let err = state
            .transition(JobState::Cancelled)
            .expect_err("终态不可迁移");
        assert!(matches!(
            err,
            ReportError::InvalidTransition {
                from: "done",
                to: "cancelled"
            }
        ));
        assert_eq!(state, JobState::Done("http://print/report/1".into()));
    }

    #[test]
    fn submitted_job_cannot_finish_without_polling() {
        let mut state = JobState::Submitted;
        assert!(state.transition(JobState::TimedOut).is_err());
        assert!(state.transition(JobState::Cancelled).is_ok());
        assert!(state.is_terminal());
    }

    #[test]
    fn wire_types_follow_service_field_names() {
        let report: ReportResponse = serde_json::from_str(
            r#"{"ref":"abc-123","statusURL":"/status/abc-123.json","downloadURL":"/report/abc-123"}"#,
        )
        .expect("解析提交应答");
        assert_eq!(report.reference, "abc-123");
        assert_eq!(report.status_url, "/status/abc-123.json");

        let status: StatusResponse = serde_json::from_str(
            r#"{"done":false,"error":"","downloadURL":"","elapsedTime":120,"waitingTime":4,"status":"running"}"#,
        )
        .expect("解析状态应答");
        assert!(!status.done);
        assert_eq!(status.error_message(), None);
        assert_eq!(status.elapsed_time, 120.0);
        assert_eq!(status.status, "running");
    }

    #[test]
    fn poll_settings_default_to_one_second_and_thirty_seconds() {
        let settings = PollSettings::default();
        assert_eq!(settings.interval, Duration::from_secs(1));
        assert_eq!(settings.timeout, Duration::from_secs(30));
        assert_eq!(
            PollSettings::from_millis(250, 1000)
                .expect("合法间隔")
                .interval,
            Duration::from_millis(250)
        );
    }

    #[test]
    fn zero_interval_is_rejected() {
        assert!(matches!(
            PollSettings::from_millis(0, 1000),
            Err(ReportError::InvalidSettings { .. })
        ));
        let settings = PollSettings {
            interval: Duration::ZERO,
            timeout: Duration::from_secs(1),
        };
        assert!(settings.validate().is_err());
        assert!(PollSettings::default().validate().is_ok());
    }
}
