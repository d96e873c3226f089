//! Plan-based admission gate for incoming batches.
//!
//! [`admit`] is a pure partition: it never touches the queue or the caller's
//! batch, it only decides which prefix of the batch may be appended.

use everythingpdf_shared::{FREE_LIMIT, Tier};

/// Result of gating one batch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AdmissionReport<T> {
    /// Inputs that may be appended, in original order.
    pub accepted: Vec<T>,
    /// How many inputs of the batch were turned away.
    pub rejected_count: usize,
    /// The queue was already full; nothing from this batch was admitted.
    pub cap_exceeded: bool,
}

impl<T> AdmissionReport<T> {
    /// User-facing notice, `None` when the whole batch was admitted.
    pub fn message(&self) -> Option<String> {
        if self.cap_exceeded {
            Some(format!(
                "Free plan allows only {FREE_LIMIT} uploads. Upgrade to Pro to add more."
            ))
        } else if self.rejected_count > 0 {
            Some(format!(
                "Free plan limit: only {} more upload(s) allowed. {} extra file(s) were not added.",
                self.accepted.len(),
                self.rejected_count
            ))
        } else {
            None
        }
    }
}

/// Decide how much of `batch` fits in a queue currently holding
/// `current_len` entries under `tier`.
pub fn admit<T: Clone>(batch: &[T], current_len: usize, tier: Tier) -> AdmissionReport<T> {
    let Some(cap) = tier.cap() else {
        return AdmissionReport {
            accepted: batch.to_vec(),
            rejected_count: 0,
            cap_exceeded: false,
        };
    };

    if batch.is_empty() {
        return AdmissionReport {
            accepted: Vec::new(),
            rejected_count: 0,
            cap_exceeded: false,
        };
    }

    let remaining = cap.saturating_sub(current_len);
    if remaining == 0 {
        tracing::debug!(current_len, cap, batch = batch.len(), "queue full, batch refused");
        return AdmissionReport {
            accepted: Vec::new(),
            rejected_count: batch.len(),
            cap_exceeded: true,
        };
    }

    let accepted: Vec<T> = batch.iter().take(remaining).cloned().collect();
    let rejected_count = batch.len() - accepted.len();
    if rejected_count > 0 {
        tracing::debug!(current_len, cap, accepted = accepted.len(), rejected_count, "batch truncated");
    }

    AdmissionReport {
        accepted,
        rejected_count,
        cap_exceeded: false,
    }
}
