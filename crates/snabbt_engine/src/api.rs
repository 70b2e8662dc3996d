use chrono::Utc;
use reqwest::header::CONTENT_TYPE;
use reqwest::StatusCode;
use snabbt_core::{JobId, JobStatusSnapshot, QrPollOutcome};
use url::Url;

use crate::wire::{self, StartResponse, StopRequest};
use crate::{FailureKind, RequestError, RequestTimeouts};

/// Result of one QR endpoint call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QrPoll {
    pub outcome: QrPollOutcome,
    /// Status fields the worker attached to the QR response, if any.
    pub status: Option<JobStatusSnapshot>,
}

/// The remote automation worker, as seen by the sync runtime.
#[async_trait::async_trait]
pub trait WorkerApi: Send + Sync {
    async fn fetch_status(&self, job_id: &JobId) -> Result<JobStatusSnapshot, RequestError>;

    /// A QR that is not published yet is `Ok` with `QrPollOutcome::NotReady`.
    async fn fetch_qr(&self, job_id: &JobId) -> Result<QrPoll, RequestError>;

    async fn probe_health(&self) -> Result<(), RequestError>;

    /// Starts a job with an opaque booking configuration and returns its id.
    async fn start_job(&self, booking: &serde_json::Value) -> Result<JobId, RequestError>;

    async fn stop_job(&self, job_id: &JobId) -> Result<(), RequestError>;
}

/// HTTP implementation against the worker's REST proxy.
#[derive(Debug, Clone)]
pub struct ReqwestWorkerApi {
    base: Url,
    client: reqwest::Client,
    timeouts: RequestTimeouts,
}

impl ReqwestWorkerApi {
    pub fn new(base_url: &str, timeouts: RequestTimeouts) -> Result<Self, RequestError> {
        let base = Url::parse(base_url)
            .map_err(|err| RequestError::new(FailureKind::InvalidUrl, err.to_string()))?;
        if base.cannot_be_a_base() {
            return Err(RequestError::new(
                FailureKind::InvalidUrl,
                format!("{base_url} cannot be used as a base url"),
            ));
        }
        let client = reqwest::Client::builder()
            .connect_timeout(timeouts.connect)
            .build()
            .map_err(|err| RequestError::new(FailureKind::Network, err.to_string()))?;
        Ok(Self {
            base,
            client,
            timeouts,
        })
    }

    fn endpoint(&self, segments: &[&str]) -> Result<Url, RequestError> {
        let mut url = self.base.clone();
        url.path_segments_mut()
            .map_err(|_| RequestError::new(FailureKind::InvalidUrl, "base url cannot have a path"))?
            .pop_if_empty()
            .extend(segments);
        Ok(url)
    }

    async fn get_bytes(
        &self,
        url: Url,
        timeout: std::time::Duration,
    ) -> Result<(StatusCode, Vec<u8>), RequestError> {
        let response = self
            .client
            .get(url)
            .timeout(timeout)
            .send()
            .await
            .map_err(map_reqwest_error)?;
        let status = response.status();
        let bytes = response.bytes().await.map_err(map_reqwest_error)?;
        Ok((status, bytes.to_vec()))
    }

    async fn post_json(
        &self,
        url: Url,
        body: Vec<u8>,
    ) -> Result<(StatusCode, Vec<u8>), RequestError> {
        let response = self
            .client
            .post(url)
            .timeout(self.timeouts.control)
            .header(CONTENT_TYPE, "application/json")
            .body(body)
            .send()
            .await
            .map_err(map_reqwest_error)?;
        let status = response.status();
        let bytes = response.bytes().await.map_err(map_reqwest_error)?;
        Ok((status, bytes.to_vec()))
    }
}

#[async_trait::async_trait]
impl WorkerApi for ReqwestWorkerApi {
    async fn fetch_status(&self, job_id: &JobId) -> Result<JobStatusSnapshot, RequestError> {
        let url = self.endpoint(&["api", "status", job_id.as_str()])?;
        let (status, body) = self.get_bytes(url, self.timeouts.status).await?;
        ensure_success(status)?;
        wire::decode_status(&body, job_id, Utc::now())
    }

    async fn fetch_qr(&self, job_id: &JobId) -> Result<QrPoll, RequestError> {
        let url = self.endpoint(&["api", "qr", job_id.as_str()])?;
        let (status, body) = self.get_bytes(url, self.timeouts.qr).await?;
        if status == StatusCode::NOT_FOUND {
            // The worker has not uploaded a QR image yet; the body may still explain why.
            let reason = wire::decode_qr(&body, job_id, Utc::now())
                .ok()
                .and_then(|(outcome, _)| match outcome {
                    QrPollOutcome::NotReady { reason } => reason,
                    QrPollOutcome::Frame(_) => None,
                });
            return Ok(QrPoll {
                outcome: QrPollOutcome::NotReady { reason },
                status: None,
            });
        }
        ensure_success(status)?;
        let (outcome, status) = wire::decode_qr(&body, job_id, Utc::now())?;
        Ok(QrPoll { outcome, status })
    }

    async fn probe_health(&self) -> Result<(), RequestError> {
        let url = self.endpoint(&["health"])?;
        let (status, _) = self.get_bytes(url, self.timeouts.health).await?;
        ensure_success(status)
    }

    async fn start_job(&self, booking: &serde_json::Value) -> Result<JobId, RequestError> {
        let url = self.endpoint(&["api", "start"])?;
        let body = serde_json::to_vec(booking)
            .map_err(|err| RequestError::new(FailureKind::Malformed, err.to_string()))?;
        let (status, bytes) = self.post_json(url, body).await?;
        ensure_success(status)?;
        let response: StartResponse = serde_json::from_slice(&bytes)
            .map_err(|err| RequestError::new(FailureKind::Malformed, err.to_string()))?;
        if response.job_id.trim().is_empty() {
            return Err(RequestError::new(FailureKind::Malformed, "empty job_id"));
        }
        Ok(JobId::new(response.job_id))
    }

    async fn stop_job(&self, job_id: &JobId) -> Result<(), RequestError> {
        let url = self.endpoint(&["api", "stop"])?;
        let body = serde_json::to_vec(&StopRequest {
            job_id: job_id.as_str(),
        })
        .map_err(|err| RequestError::new(FailureKind::Malformed, err.to_string()))?;
        let (status, _) = self.post_json(url, body).await?;
        ensure_success(status)
    }
}

fn ensure_success(status: StatusCode) -> Result<(), RequestError> {
    if status.is_success() {
        Ok(())
    } else {
        Err(RequestError::new(
            FailureKind::HttpStatus(status.as_u16()),
            status.to_string(),
        ))
    }
}

fn map_reqwest_error(err: reqwest::Error) -> RequestError {
    if err.is_timeout() {
        return RequestError::new(FailureKind::Timeout, err.to_string());
    }
    if err.is_connect() {
        return RequestError::new(FailureKind::Offline, err.to_string());
    }
    if err.is_decode() {
        return RequestError::new(FailureKind::Malformed, err.to_string());
    }
    RequestError::new(FailureKind::Network, err.to_string())
}
