//! Shared freshness and de-duplication rules.
//!
//! Both the poller and the push bridge feed updates through [`SyncLedger`],
//! so whichever source delivers an update first wins and the other copy is a
//! no-op.

use std::cmp::Ordering;
use std::collections::VecDeque;

use chrono::{DateTime, Utc};

use crate::format::format_log_line;
use crate::{ContentHash, JobStatusSnapshot, QrFrame};

/// Number of trailing status lines kept for display.
pub const DEFAULT_LOG_CAPACITY: usize = 50;

/// Number of recently accepted QR hashes a late duplicate is checked against.
/// BankID frames rotate and never legitimately come back.
pub const RECENT_QR_CAPACITY: usize = 16;

/// Decides whether a candidate supersedes the last accepted value.
pub trait Freshness {
    fn is_newer_than(&self, last_accepted: &Self) -> bool;
}

/// QR frames are keyed on content only: an identical payload is never newer.
impl Freshness for QrFrame {
    fn is_newer_than(&self, last_accepted: &Self) -> bool {
        self.content_hash != last_accepted.content_hash
    }
}

/// Snapshots must move strictly forward in time; equal timestamps are only
/// broken by a strictly greater step counter.
impl Freshness for JobStatusSnapshot {
    fn is_newer_than(&self, last_accepted: &Self) -> bool {
        match self.timestamp.cmp(&last_accepted.timestamp) {
            Ordering::Greater => true,
            Ordering::Less => false,
            Ordering::Equal => {
                matches!((self.step, last_accepted.step), (Some(next), Some(prev)) if next > prev)
            }
        }
    }
}

/// Anything is newer than nothing.
pub fn is_newer<T: Freshness>(candidate: &T, last_accepted: Option<&T>) -> bool {
    last_accepted.is_none_or(|last| candidate.is_newer_than(last))
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QrAcceptance {
    /// A new rendition; `update_count` includes it.
    New { update_count: u64 },
    /// Content already accepted recently; proof of liveness only.
    Heartbeat,
}

/// Accepted state for one job, shared by the poll and push paths.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SyncLedger {
    latest_status: Option<JobStatusSnapshot>,
    last_qr: Option<QrFrame>,
    recent_qr: VecDeque<ContentHash>,
    qr_updates: u64,
    qr_last_seen: Option<DateTime<Utc>>,
    log: VecDeque<String>,
    log_capacity: usize,
}

impl Default for SyncLedger {
    fn default() -> Self {
        Self::with_log_capacity(DEFAULT_LOG_CAPACITY)
    }
}

impl SyncLedger {
    pub fn with_log_capacity(log_capacity: usize) -> Self {
        Self {
            latest_status: None,
            last_qr: None,
            recent_qr: VecDeque::with_capacity(RECENT_QR_CAPACITY),
            qr_updates: 0,
            qr_last_seen: None,
            log: VecDeque::with_capacity(log_capacity),
            log_capacity,
        }
    }

    /// Records the snapshot if it is fresher than the held one.
    pub fn accept_status(&mut self, snapshot: &JobStatusSnapshot) -> bool {
        if !is_newer(snapshot, self.latest_status.as_ref()) {
            return false;
        }
        if self.log_capacity > 0 {
            while self.log.len() >= self.log_capacity {
                self.log.pop_front();
            }
            self.log.push_back(format_log_line(snapshot));
        }
        self.latest_status = Some(snapshot.clone());
        true
    }

    /// Records the frame. Content matching any recently accepted frame only
    /// refreshes the last-seen time, so a late copy never replaces a newer one.
    pub fn accept_qr(&mut self, frame: &QrFrame) -> QrAcceptance {
        self.qr_last_seen = Some(match self.qr_last_seen {
            Some(seen) => seen.max(frame.observed_at),
            None => frame.observed_at,
        });
        if !is_newer(frame, self.last_qr.as_ref()) || self.recent_qr.contains(&frame.content_hash)
        {
            return QrAcceptance::Heartbeat;
        }
        while self.recent_qr.len() >= RECENT_QR_CAPACITY {
            self.recent_qr.pop_front();
        }
        self.recent_qr.push_back(frame.content_hash);
        self.qr_updates += 1;
        self.last_qr = Some(frame.clone());
        QrAcceptance::New {
            update_count: self.qr_updates,
        }
    }

    pub fn latest_status(&self) -> Option<&JobStatusSnapshot> {
        self.latest_status.as_ref()
    }

    pub fn last_qr(&self) -> Option<&QrFrame> {
        self.last_qr.as_ref()
    }

    pub fn last_qr_hash(&self) -> Option<ContentHash> {
        self.last_qr.as_ref().map(|frame| frame.content_hash)
    }

    pub fn qr_update_count(&self) -> u64 {
        self.qr_updates
    }

    pub fn qr_last_seen(&self) -> Option<DateTime<Utc>> {
        self.qr_last_seen
    }

    pub fn log_lines(&self) -> impl Iterator<Item = &str> {
        self.log.iter().map(String::as_str)
    }
}
