//! Contract and its append-only version history.
//!
//! A contract's body mutates only by appending a new version; `fingerprint`
//! always mirrors the current body's content hash (see [`crate::fingerprint`]).
//! Analysis rows reference a contract by id only — never the reverse — so
//! the ownership graph stays acyclic (§9 of the design notes).

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Default alert thresholds, in days-before-expiry, applied to a new
/// contract unless the caller overrides them.
pub const DEFAULT_ALERT_THRESHOLDS: [i64; 4] = [90, 60, 30, 7];

/// One historical body of a contract, keyed by its own content fingerprint.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ContractVersion {
    pub version: u32,
    pub body: String,
    pub fingerprint: String,
    pub created_at: DateTime<Utc>,
}

/// AI-extracted date fields. All optional: a field is written only when the
/// model returns a parseable value for it (§4.6c), never overwritten with an
/// empty/absent extraction.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ContractDates {
    pub effective_date: Option<DateTime<Utc>>,
    pub expiry_date: Option<DateTime<Utc>>,
    pub renewal_date: Option<DateTime<Utc>>,
}

/// A single fired alert, unique per threshold within a contract.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AlertRecord {
    pub threshold_days: i64,
    pub fired_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Contract {
    pub id: String,
    pub tenant_id: String,
    pub title: String,
    /// Current body text; equal to `versions.last().body`.
    pub body: String,
    /// Fingerprint of `body`. Invariant: always `fingerprint(body)`.
    pub fingerprint: String,
    pub versions: Vec<ContractVersion>,
    pub dates: ContractDates,
    pub parties: Vec<String>,
    pub alert_thresholds_days: Vec<i64>,
    pub alerts_sent: Vec<AlertRecord>,
    pub deleted: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Contract {
    /// Create a new contract with a single initial version.
    pub fn new(tenant_id: impl Into<String>, title: impl Into<String>, body: String) -> Self {
        let fingerprint = crate::fingerprint::fingerprint(&body);
        let now = Utc::now();
        let id = uuid::Uuid::new_v4().to_string();
        Self {
            id,
            tenant_id: tenant_id.into(),
            title: title.into(),
            body: body.clone(),
            fingerprint: fingerprint.clone(),
            versions: vec![ContractVersion {
                version: 1,
                body,
                fingerprint,
                created_at: now,
            }],
            dates: ContractDates::default(),
            parties: Vec::new(),
            alert_thresholds_days: DEFAULT_ALERT_THRESHOLDS.to_vec(),
            alerts_sent: Vec::new(),
            deleted: false,
            created_at: now,
            updated_at: now,
        }
    }

    /// Append a new version, becoming the current body/fingerprint.
    pub fn append_version(&mut self, body: String) -> &ContractVersion {
        let fingerprint = crate::fingerprint::fingerprint(&body);
        let version = self.versions.len() as u32 + 1;
        let now = Utc::now();
        self.body = body.clone();
        self.fingerprint = fingerprint.clone();
        self.updated_at = now;
        self.versions.push(ContractVersion {
            version,
            body,
            fingerprint,
            created_at: now,
        });
        self.versions.last().expect("just pushed")
    }

    /// Resolve a specific version number, or the current version if `None`.
    pub fn resolve_version(&self, requested: Option<u32>) -> Option<&ContractVersion> {
        match requested {
            Some(v) => self.versions.iter().find(|cv| cv.version == v),
            None => self.versions.last(),
        }
    }

    /// Days remaining until `dates.expiry_date`, if known.
    pub fn days_until_expiry(&self, now: DateTime<Utc>) -> Option<i64> {
        self.dates
            .expiry_date
            .map(|expiry| (expiry.date_naive() - now.date_naive()).num_days())
    }

    /// Whether threshold `t` has already fired for this contract.
    pub fn has_fired(&self, threshold_days: i64) -> bool {
        self.alerts_sent
            .iter()
            .any(|a| a.threshold_days == threshold_days)
    }

    /// Record a firing. Caller is responsible for the atomic
    /// conditional-append semantics at the store layer (§5); this is the
    /// in-memory mirror of that operation.
    pub fn record_fired(&mut self, threshold_days: i64, fired_at: DateTime<Utc>) {
        if !self.has_fired(threshold_days) {
            self.alerts_sent.push(AlertRecord {
                threshold_days,
                fired_at,
            });
        }
    }

    /// Merge AI-extracted dates, never overwriting a known field with an
    /// absent one (§4.6c).
    pub fn merge_dates(&mut self, extracted: ContractDates) {
        if extracted.effective_date.is_some() {
            self.dates.effective_date = extracted.effective_date;
        }
        if extracted.expiry_date.is_some() {
            self.dates.expiry_date = extracted.expiry_date;
        }
        if extracted.renewal_date.is_some() {
            self.dates.renewal_date = extracted.renewal_date;
        }
    }

    /// Merge an extracted parties list, never overwriting with empty.
    pub fn merge_parties(&mut self, parties: Vec<String>) {
        if !parties.is_empty() {
            self.parties = parties;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fingerprint_tracks_current_body() {
        let mut c = Contract::new("tenant-a", "NDA", "a very long contract body".repeat(3));
        assert_eq!(c.fingerprint, crate::fingerprint::fingerprint(&c.body));
        c.append_version("a different, longer contract body".repeat(3));
        assert_eq!(c.fingerprint, crate::fingerprint::fingerprint(&c.body));
        assert_eq!(c.versions.len(), 2);
    }

    #[test]
    fn alert_records_are_unique_by_threshold() {
        let mut c = Contract::new("tenant-a", "NDA", "x".repeat(60));
        let now = Utc::now();
        c.record_fired(30, now);
        c.record_fired(30, now);
        assert_eq!(c.alerts_sent.len(), 1);
    }

    #[test]
    fn merge_never_overwrites_with_empty() {
        let mut c = Contract::new("tenant-a", "NDA", "x".repeat(60));
        c.merge_parties(vec!["Acme Corp".into()]);
        c.merge_parties(vec![]);
        assert_eq!(c.parties, vec!["Acme Corp".to_string()]);
    }
}
