//! JSON shapes exchanged with the worker and the push channel.
//!
//! Decoding is tolerant of missing optional fields; anything that does not fit
//! becomes a `FailureKind::Malformed` error for the caller to discard.

use chrono::{DateTime, TimeZone, Utc};
use serde::{Deserialize, Serialize};
use snabbt_core::{JobId, JobStatus, JobStatusSnapshot, QrFrame, QrPayload, QrPollOutcome};

use crate::{FailureKind, RequestError};

/// Integers are epoch milliseconds, floats are epoch seconds, text is RFC 3339.
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
enum WireTimestamp {
    Millis(i64),
    Seconds(f64),
    Text(String),
}

impl WireTimestamp {
    fn resolve(&self, observed_at: DateTime<Utc>) -> DateTime<Utc> {
        let parsed = match self {
            WireTimestamp::Millis(ms) => Utc.timestamp_millis_opt(*ms).single(),
            WireTimestamp::Seconds(secs) => {
                let millis = (secs * 1_000.0).round();
                if millis.is_finite() {
                    Utc.timestamp_millis_opt(millis as i64).single()
                } else {
                    None
                }
            }
            WireTimestamp::Text(raw) => DateTime::parse_from_rfc3339(raw.trim())
                .ok()
                .map(|dt| dt.with_timezone(&Utc)),
        };
        parsed.unwrap_or(observed_at)
    }
}

#[derive(Debug, Clone, Deserialize)]
pub(crate) struct StatusBody {
    #[serde(alias = "jobId")]
    job_id: Option<String>,
    status: String,
    stage: Option<String>,
    message: Option<String>,
    progress: Option<f64>,
    slots_found: Option<u32>,
    cycle_count: Option<u32>,
    timestamp: Option<WireTimestamp>,
    step: Option<u64>,
}

impl StatusBody {
    pub(crate) fn into_snapshot(self, job_id: JobId, observed_at: DateTime<Utc>) -> JobStatusSnapshot {
        let timestamp = self
            .timestamp
            .map_or(observed_at, |ts| ts.resolve(observed_at));
        JobStatusSnapshot {
            job_id,
            status: JobStatus::from_wire(&self.status),
            stage: non_empty(self.stage),
            message: non_empty(self.message),
            progress: self.progress.and_then(clamp_progress),
            timestamp,
            step: self.step,
            slots_found: self.slots_found.unwrap_or(0),
            cycle_count: self.cycle_count.unwrap_or(0),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub(crate) struct QrBody {
    #[serde(alias = "jobId")]
    job_id: Option<String>,
    success: Option<bool>,
    qr_url: Option<String>,
    qr_data: Option<String>,
    error: Option<String>,
    status: Option<String>,
    stage: Option<String>,
    message: Option<String>,
    progress: Option<f64>,
    timestamp: Option<WireTimestamp>,
    step: Option<u64>,
}

impl QrBody {
    /// Splits a QR response into its frame outcome and any status riding along.
    pub(crate) fn into_parts(
        self,
        job_id: JobId,
        observed_at: DateTime<Utc>,
    ) -> (QrPollOutcome, Option<JobStatusSnapshot>) {
        let status = self.status.clone().map(|status| {
            StatusBody {
                job_id: None,
                status,
                stage: self.stage.clone(),
                message: self.message.clone(),
                progress: self.progress,
                slots_found: None,
                cycle_count: None,
                timestamp: self.timestamp.clone(),
                step: self.step,
            }
            .into_snapshot(job_id, observed_at)
        });

        let payload = if self.success == Some(false) {
            None
        } else if let Some(url) = non_empty(self.qr_url) {
            Some(QrPayload::Url(url))
        } else {
            non_empty(self.qr_data).map(QrPayload::Data)
        };

        let outcome = match payload {
            Some(payload) => QrPollOutcome::Frame(QrFrame::new(payload, observed_at)),
            None => QrPollOutcome::NotReady {
                reason: non_empty(self.error),
            },
        };
        (outcome, status)
    }
}

#[derive(Debug, Deserialize)]
#[serde(tag = "type")]
enum PushEnvelope {
    #[serde(rename = "status_update")]
    StatusUpdate(StatusBody),
    #[serde(rename = "qr_code_update")]
    QrCodeUpdate(QrBody),
}

/// A decoded push event for the subscribed job.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PushUpdate {
    Status(JobStatusSnapshot),
    Qr {
        frame: QrFrame,
        status: Option<JobStatusSnapshot>,
    },
}

/// Decodes one push frame. `Ok(None)` means the frame is valid but not for this job
/// or carries nothing usable.
pub fn decode_push(
    text: &str,
    job_id: &JobId,
    observed_at: DateTime<Utc>,
) -> Result<Option<PushUpdate>, RequestError> {
    let envelope: PushEnvelope = serde_json::from_str(text)
        .map_err(|err| RequestError::new(FailureKind::Malformed, err.to_string()))?;

    let belongs_to = |other: &Option<String>| other.as_deref().is_none_or(|id| id == job_id.as_str());
    match envelope {
        PushEnvelope::StatusUpdate(body) => {
            if !belongs_to(&body.job_id) {
                return Ok(None);
            }
            Ok(Some(PushUpdate::Status(
                body.into_snapshot(job_id.clone(), observed_at),
            )))
        }
        PushEnvelope::QrCodeUpdate(body) => {
            if !belongs_to(&body.job_id) {
                return Ok(None);
            }
            let (outcome, status) = body.into_parts(job_id.clone(), observed_at);
            Ok(match outcome {
                QrPollOutcome::Frame(frame) => Some(PushUpdate::Qr { frame, status }),
                QrPollOutcome::NotReady { .. } => status.map(PushUpdate::Status),
            })
        }
    }
}

pub(crate) fn decode_status(
    bytes: &[u8],
    job_id: &JobId,
    observed_at: DateTime<Utc>,
) -> Result<JobStatusSnapshot, RequestError> {
    let body: StatusBody = serde_json::from_slice(bytes)
        .map_err(|err| RequestError::new(FailureKind::Malformed, err.to_string()))?;
    Ok(body.into_snapshot(job_id.clone(), observed_at))
}

pub(crate) fn decode_qr(
    bytes: &[u8],
    job_id: &JobId,
    observed_at: DateTime<Utc>,
) -> Result<(QrPollOutcome, Option<JobStatusSnapshot>), RequestError> {
    let body: QrBody = serde_json::from_slice(bytes)
        .map_err(|err| RequestError::new(FailureKind::Malformed, err.to_string()))?;
    Ok(body.into_parts(job_id.clone(), observed_at))
}

#[derive(Debug, Deserialize)]
pub(crate) struct StartResponse {
    #[serde(alias = "jobId")]
    pub(crate) job_id: String,
}

#[derive(Debug, Serialize)]
pub(crate) struct StopRequest<'a> {
    pub(crate) job_id: &'a str,
}

fn non_empty(value: Option<String>) -> Option<String> {
    value.filter(|text| !text.trim().is_empty())
}

fn clamp_progress(progress: f64) -> Option<u8> {
    if progress.is_finite() {
        Some(progress.round().clamp(0.0, 100.0) as u8)
    } else {
        None
    }
}

#[cfg(test)]
mod tests {
    use chrono::{TimeZone, Utc};
    use pretty_assertions::assert_eq;
    use snabbt_core::{JobId, JobStatus, QrPayload, QrPollOutcome};

    use super::{decode_push, decode_qr, decode_status, PushUpdate};
    use crate::FailureKind;

    fn observed() -> chrono::DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 5, 4, 12, 0, 0).unwrap()
    }

    #[test]
    fn status_with_only_required_field_uses_observed_time() {
        let job = JobId::new("job-1");
        let snap = decode_status(br#"{"status":"initializing"}"#, &job, observed()).unwrap();
        assert_eq!(snap.status, JobStatus::Initializing);
        assert_eq!(snap.timestamp, observed());
        assert_eq!(snap.progress, None);
        assert_eq!(snap.slots_found, 0);
    }

    #[test]
    fn status_timestamps_accept_millis_seconds_and_rfc3339() {
        let job = JobId::new("job-1");
        let expected = Utc.with_ymd_and_hms(2026, 5, 4, 11, 59, 0).unwrap();
        let millis = expected.timestamp_millis();
        let secs = expected.timestamp();

        for body in [
            format!(r#"{{"status":"running","timestamp":{millis}}}"#),
            format!(r#"{{"status":"running","timestamp":{secs}.0}}"#),
            r#"{"status":"running","timestamp":"2026-05-04T13:59:00+02:00"}"#.to_string(),
        ] {
            let snap = decode_status(body.as_bytes(), &job, observed()).unwrap();
            assert_eq!(snap.timestamp, expected, "{body}");
        }
    }

    #[test]
    fn progress_is_rounded_and_clamped() {
        let job = JobId::new("job-1");
        let snap = decode_status(br#"{"status":"running","progress":140.2}"#, &job, observed())
            .unwrap();
        assert_eq!(snap.progress, Some(100));
        let snap = decode_status(br#"{"status":"running","progress":33.6}"#, &job, observed())
            .unwrap();
        assert_eq!(snap.progress, Some(34));
    }

    #[test]
    fn status_without_status_field_is_malformed() {
        let job = JobId::new("job-1");
        let err = decode_status(br#"{"stage":"x"}"#, &job, observed()).unwrap_err();
        assert_eq!(err.kind, FailureKind::Malformed);
    }

    #[test]
    fn qr_prefers_url_over_data_and_reports_not_found() {
        let job = JobId::new("job-1");
        let (outcome, status) = decode_qr(
            br#"{"success":true,"qr_url":"https://x/qr1.png","qr_data":"abc"}"#,
            &job,
            observed(),
        )
        .unwrap();
        match outcome {
            QrPollOutcome::Frame(frame) => {
                assert_eq!(frame.payload, QrPayload::Url("https://x/qr1.png".into()))
            }
            other => panic!("unexpected {other:?}"),
        }
        assert!(status.is_none());

        let (outcome, _) = decode_qr(
            br#"{"success":false,"error":"QR code not found"}"#,
            &job,
            observed(),
        )
        .unwrap();
        assert_eq!(
            outcome,
            QrPollOutcome::NotReady {
                reason: Some("QR code not found".into())
            }
        );
    }

    #[test]
    fn qr_response_may_carry_status() {
        let job = JobId::new("job-1");
        let (_, status) = decode_qr(
            br#"{"success":true,"qr_data":"iVBOR","status":"bankid_waiting","message":"Skanna"}"#,
            &job,
            observed(),
        )
        .unwrap();
        let status = status.unwrap();
        assert_eq!(status.status.as_str(), "bankid_waiting");
        assert_eq!(status.message.as_deref(), Some("Skanna"));
    }

    #[test]
    fn push_frames_accept_the_camel_case_job_id() {
        let job = JobId::new("job-42");
        let foreign = decode_push(
            r#"{"type":"status_update","jobId":"job-7","status":"running"}"#,
            &job,
            observed(),
        )
        .unwrap();
        assert_eq!(foreign, None);

        let mine = decode_push(
            r#"{"type":"qr_code_update","jobId":"job-42","qr_url":"https://x/qr.png"}"#,
            &job,
            observed(),
        )
        .unwrap();
        assert!(matches!(mine, Some(PushUpdate::Qr { status: None, .. })));
    }

    #[test]
    fn push_frames_for_other_jobs_are_skipped() {
        let job = JobId::new("job-1");
        let other = decode_push(
            r#"{"type":"status_update","job_id":"job-2","status":"running"}"#,
            &job,
            observed(),
        )
        .unwrap();
        assert_eq!(other, None);

        let mine = decode_push(
            r#"{"type":"qr_code_update","job_id":"job-1","qr_url":"https://x/q.png"}"#,
            &job,
            observed(),
        )
        .unwrap();
        assert!(matches!(mine, Some(PushUpdate::Qr { status: None, .. })));
    }

    #[test]
    fn unknown_push_type_is_malformed() {
        let err = decode_push(r#"{"type":"heartbeat"}"#, &JobId::new("j"), observed()).unwrap_err();
        assert_eq!(err.kind, FailureKind::Malformed);
        let err = decode_push("not json", &JobId::new("j"), observed()).unwrap_err();
        assert_eq!(err.kind, FailureKind::Malformed);
    }
}
