use crate::model::{BatchList, RunState};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum RecordStatus {
    Success,
    Failed,
}

/// Last outcome recorded for one payload signature.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunStateRecord {
    pub signature: String,
    pub status: RecordStatus,
    #[serde(default)]
    pub reference_number: String,
    #[serde(default)]
    pub failure_reason: String,
    pub updated_at: DateTime<Utc>,
}

impl RunStateRecord {
    pub fn success(signature: impl Into<String>, reference_number: impl Into<String>) -> Self {
        Self {
            signature: signature.into(),
            status: RecordStatus::Success,
            reference_number: reference_number.into(),
            failure_reason: String::new(),
            updated_at: Utc::now(),
        }
    }

    pub fn failed(signature: impl Into<String>, reason: impl Into<String>) -> Self {
        Self {
            signature: signature.into(),
            status: RecordStatus::Failed,
            reference_number: String::new(),
            failure_reason: reason.into(),
            updated_at: Utc::now(),
        }
    }

    /// Record for a settled list; `None` for Pending/Processing or empty lists.
    pub fn from_list(list: &BatchList) -> Option<Self> {
        let signature = list.signature();
        if signature.is_empty() {
            return None;
        }
        match list.state() {
            RunState::Success => Some(Self::success(
                signature,
                list.reference_number().unwrap_or_default(),
            )),
            RunState::Failed => Some(Self::failed(
                signature,
                list.failure_reason().unwrap_or_default(),
            )),
            RunState::Pending | RunState::Processing => None,
        }
    }

    /// Applies the recorded outcome when it would change `list`.
    pub fn apply_to(&self, list: &mut BatchList) -> bool {
        match self.status {
            RecordStatus::Success => {
                let reference = self.reference_number.trim();
                if reference.is_empty()
                    || (list.state() == RunState::Success
                        && list.reference_number() == Some(reference))
                {
                    return false;
                }
                list.mark_success(reference);
                true
            }
            RecordStatus::Failed => {
                let before = (list.state(), list.failure_reason().map(str::to_owned));
                list.mark_failed(&self.failure_reason);
                before != (list.state(), list.failure_reason().map(str::to_owned))
            }
        }
    }
}
