use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use tracing::{debug, info, warn};

use crate::{
    HttpTransport, JobState, PollSettings, PrintSpec, PrintTransport, ReportError, Sleeper,
    StatusResponse,
};

pub struct ReportClient {
    transport: Arc<dyn PrintTransport>,
    settings: PollSettings,
}

impl ReportClient {
    pub fn new(transport: Arc<dyn PrintTransport>) -> Self {
        Self {
            transport,
            settings: PollSettings::default(),
        }
    }

    pub fn http(base_url: impl Into<String>) -> Result<Self, ReportError> {
        Ok(Self::new(Arc::new(HttpTransport::new(base_url)?)))
    }

    pub fn with_settings(mut self, settings: PollSettings) -> Self {
        self.settings = settings;
        self
    }

    pub fn settings(&self) -> PollSettings {
        self.settings
    }

    /// 提交规格并返回处于 `Submitted` 状态的作业。
    pub fn submit(&self, spec: &PrintSpec) -> Result<ReportJob, ReportError> {
        self.settings.validate()?;
        let response = self.transport.request_report(spec)?;
        if response.reference.is_empty() {
            return Err(ReportError::Submission {
                status: None,
                message: "service returned no job reference".into(),
            });
        }
        info!(
            reference = %response.reference,
            format = %spec.format,
            layout = %spec.layout,
            "打印作业已提交"
        );
        Ok(ReportJob {
            reference: response.reference,
            status_url: response.status_url,
            transport: Arc::clone(&self.transport),
            settings: self.settings,
            state: Arc::new(Mutex::new(JobState::Submitted)),
        })
    }

    /// 提交后阻塞轮询，直到得到下载地址或失败。
    pub fn print(&self, spec: &PrintSpec, sleeper: &dyn Sleeper) -> Result<String, ReportError> {
        self.submit(spec)?.wait(sleeper)
    }
}

pub struct ReportJob {
    reference: String,
    status_url: String,
    transport: Arc<dyn PrintTransport>,
    settings: PollSettings,
    state: Arc<Mutex<JobState>>,
}

impl ReportJob {
    pub fn reference(&self) -> &str {
        &self.reference
    }

    pub fn status_url(&self) -> &str {
        &self.status_url
    }

    pub fn state(&self) -> JobState {
        self.state.lock().clone()
    }

    pub fn cancel_handle(&self) -> CancelHandle {
        CancelHandle {
            reference: self.reference.clone(),
            transport: Arc::clone(&self.transport),
            state: Arc::clone(&self.state),
        }
    }

    /// 按固定间隔轮询状态。首次轮询发生在一个间隔之后；
    /// 非终态轮询后累计等待达到超时即判定超时。
    pub fn wait(&self, sleeper: &dyn Sleeper) -> Result<String, ReportError> {
        {
            let mut state = self.state.lock();
            if *state == JobState::Submitted {
                self.settings.validate()?;
                state.transition(JobState::Polling)?;
            } else if state.is_terminal() {
                let finished = state.clone();
                drop(state);
                return self.outcome(&finished);
            }
        }

        let interval = self.settings.interval;
        let mut waited = Duration::ZERO;
        let next = loop {
            sleeper.sleep(interval);
            if matches!(*self.state.lock(), JobState::Cancelled) {
                break JobState::Cancelled;
            }
            let status = match self.transport.status(&self.reference) {
                Ok(status) => status,
                Err(err) => {
                    warn!(reference = %self.reference, error = %err, "查询作业状态失败");
                    self.settle(JobState::Errored(err.to_string()))?;
                    return Err(err);
                }
            };
            if let Some(next) = self.evaluate(&status, waited) {
                break next;
            }
            debug!(
                reference = %self.reference,
                status = %status.status,
                elapsed_ms = status.elapsed_time,
                waited_ms = waited.as_millis() as u64,
                "作业仍在处理中"
            );
            waited += interval;
        };

        let settled = self.settle(next)?;
        self.outcome(&settled)
    }

    fn evaluate(&self, status: &StatusResponse, waited: Duration) -> Option<JobState> {
        if let Some(message) = status.error_message() {
            return Some(JobState::Errored(message.to_string()));
        }
        if status.done {
            return Some(JobState::Done(self.transport.download_url(&self.reference)));
        }
        (waited >= self.settings.timeout).then_some(JobState::TimedOut)
    }

    /// 写入终态；若期间已被取消，则保留取消状态。
    fn settle(&self, next: JobState) -> Result<JobState, ReportError> {
        let mut state = self.state.lock();
        if matches!(*state, JobState::Cancelled) {
            return Ok(JobState::Cancelled);
        }
        state.transition(next)?;
        info!(reference = %self.reference, state = state.name(), "打印作业结束");
        Ok(state.clone())
    }

    fn outcome(&self, state: &JobState) -> Result<String, ReportError> {
        match state {
            JobState::Done(url) => Ok(url.clone()),
            JobState::Errored(message) => Err(ReportError::Service {
                reference: self.reference.clone(),
                message: message.clone(),
            }),
            JobState::TimedOut => Err(ReportError::Timeout {
                reference: self.reference.clone(),
                waited: self.settings.timeout,
            }),
            JobState::Cancelled => Err(ReportError::Cancelled {
                reference: self.reference.clone(),
            }),
            JobState::Submitted | JobState::Polling => Err(ReportError::InvalidTransition {
                from: state.name(),
                to: "done",
            }),
        }
    }
}

/// 可跨线程传递的取消句柄。
#[derive(Clone)]
pub struct CancelHandle {
    reference: String,
    transport: Arc<dyn PrintTransport>,
    state: Arc<Mutex<JobState>>,
}

impl CancelHandle {
    pub fn reference(&self) -> &str {
        &self.reference
    }

    /// 向服务发送取消请求。作业已处于终态时不做任何事并返回 `false`。
    pub fn cancel(&self) -> Result<bool, ReportError> {
        if self.state.lock().is_terminal() {
            debug!(reference = %self.reference, "作业已结束，忽略取消");
            return Ok(false);
        }
        let response = self.transport.cancel(&self.reference)?;
        if !response.is_success() {
            return Err(ReportError::Service {
                reference: self.reference.clone(),
                message: format!("cancel request answered with status {}", response.status),
            });
        }

        let mut state = self.state.lock();
        if state.is_terminal() {
            return Ok(false);
        }
        state.transition(JobState::Cancelled)?;
        info!(reference = %self.reference, "打印作业已取消");
        Ok(true)
    }
}
