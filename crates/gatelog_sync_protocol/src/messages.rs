//! Protocol messages for the remote sync gateway.

use crate::error::{ProtocolError, ProtocolResult};
use chrono::{DateTime, SecondsFormat, Utc};
use gatelog_core::{Record, RecordId};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;

/// Path of the push endpoint.
pub const PUSH_PATH: &str = "/sync/push";
/// Path of the pull endpoint.
pub const PULL_PATH: &str = "/sync/pull";

/// JSON encoding shared by every wire message.
pub trait WireMessage: Serialize + DeserializeOwned {
    /// Message name used in errors.
    const NAME: &'static str;

    /// Encodes to JSON bytes.
    fn encode(&self) -> ProtocolResult<Vec<u8>> {
        serde_json::to_vec(self).map_err(|e| ProtocolError::Encode {
            message: Self::NAME,
            reason: e.to_string(),
        })
    }

    /// Decodes from JSON bytes.
    ///
    /// Records inside the message are validated as they are decoded.
    fn decode(bytes: &[u8]) -> ProtocolResult<Self> {
        serde_json::from_slice(bytes).map_err(|e| ProtocolError::Decode {
            message: Self::NAME,
            reason: e.to_string(),
        })
    }
}

/// Push request: the records the client wants the authority to accept.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PushRequest {
    /// Records to push.
    pub entries: Vec<Record>,
}

impl PushRequest {
    /// Creates a push request.
    pub fn new(entries: Vec<Record>) -> Self {
        Self { entries }
    }

    /// Returns the ids of the submitted records, in order.
    #[must_use]
    pub fn ids(&self) -> Vec<RecordId> {
        self.entries.iter().map(Record::id).collect()
    }
}

impl WireMessage for PushRequest {
    const NAME: &'static str = "push request";
}

/// Push response from the authority.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PushResponse {
    /// Number of accepted records.
    pub accepted: u32,
    /// Number of rejected records.
    pub rejected: u32,
    /// Ids of the rejected records.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rejected_ids: Option<Vec<String>>,
    /// Human-readable message.
    #[serde(default)]
    pub message: String,
}

impl PushResponse {
    /// Creates a response accepting `accepted` records.
    pub fn accepted(accepted: u32) -> Self {
        Self {
            accepted,
            rejected: 0,
            rejected_ids: None,
            message: String::new(),
        }
    }

    /// Creates a response listing explicit rejections.
    pub fn with_rejections(accepted: u32, rejected_ids: &[RecordId]) -> Self {
        Self {
            accepted,
            rejected: rejected_ids.len() as u32,
            rejected_ids: Some(rejected_ids.iter().map(ToString::to_string).collect()),
            message: String::new(),
        }
    }

    /// Sets the message.
    #[must_use]
    pub fn with_message(mut self, message: impl Into<String>) -> Self {
        self.message = message.into();
        self
    }

    /// Decides, per submitted record, whether it was accepted.
    ///
    /// Only explicitly confirmed records count as accepted:
    /// - with `rejectedIds`, every submitted id not listed is accepted
    /// - `rejected > 0` without `rejectedIds` accepts nothing
    /// - an `accepted` count that disagrees with the submission accepts nothing
    #[must_use]
    pub fn resolve(&self, submitted: &[RecordId]) -> PushResolution {
        match &self.rejected_ids {
            Some(ids) => {
                let listed: HashSet<RecordId> =
                    ids.iter().filter_map(|s| RecordId::parse_str(s)).collect();
                let (rejected, accepted): (Vec<_>, Vec<_>) =
                    submitted.iter().copied().partition(|id| listed.contains(id));
                let consistent = accepted.len() == self.accepted as usize
                    && rejected.len() == self.rejected as usize;
                PushResolution {
                    accepted,
                    rejected,
                    unconfirmed: Vec::new(),
                    consistent,
                }
            }
            None if self.rejected == 0 && self.accepted as usize == submitted.len() => {
                PushResolution {
                    accepted: submitted.to_vec(),
                    rejected: Vec::new(),
                    unconfirmed: Vec::new(),
                    consistent: true,
                }
            }
            None => PushResolution {
                accepted: Vec::new(),
                rejected: Vec::new(),
                unconfirmed: submitted.to_vec(),
                consistent: false,
            },
        }
    }
}

impl WireMessage for PushResponse {
    const NAME: &'static str = "push response";
}

/// Per-record interpretation of a [`PushResponse`].
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct PushResolution {
    /// Records confirmed accepted.
    pub accepted: Vec<RecordId>,
    /// Records explicitly rejected.
    pub rejected: Vec<RecordId>,
    /// Records whose fate the response left undefined.
    pub unconfirmed: Vec<RecordId>,
    /// Whether the counts in the response agree with the per-record outcome.
    pub consistent: bool,
}

impl PushResolution {
    /// Returns every record that stays pending (rejected or unconfirmed).
    #[must_use]
    pub fn still_pending(&self) -> Vec<RecordId> {
        self.rejected
            .iter()
            .chain(&self.unconfirmed)
            .copied()
            .collect()
    }
}

/// Pull request: everything changed since a watermark.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct PullRequest {
    /// Lower bound; `None` requests full history.
    pub since: Option<DateTime<Utc>>,
}

impl PullRequest {
    /// Creates a pull request.
    pub fn new(since: Option<DateTime<Utc>>) -> Self {
        Self { since }
    }

    /// Renders the query string, including the leading `?` when non-empty.
    #[must_use]
    pub fn to_query(&self) -> String {
        match self.since {
            Some(since) => format!(
                "?since={}",
                since.to_rfc3339_opts(SecondsFormat::Millis, true)
            ),
            None => String::new(),
        }
    }

    /// Parses a query string produced by [`to_query`](Self::to_query).
    ///
    /// # Errors
    ///
    /// Returns [`ProtocolError::Decode`] if `since` is not RFC 3339.
    pub fn from_query(query: &str) -> ProtocolResult<Self> {
        let query = query.trim_start_matches('?');
        let since = query
            .split('&')
            .filter_map(|pair| pair.split_once('='))
            .find(|(k, _)| *k == "since")
            .map(|(_, v)| {
                DateTime::parse_from_rfc3339(v)
                    .map(|dt| dt.with_timezone(&Utc))
                    .map_err(|e| ProtocolError::Decode {
                        message: "pull request",
                        reason: format!("bad `since` {v:?}: {e}"),
                    })
            })
            .transpose()?;
        Ok(Self { since })
    }
}

/// Pull response from the authority.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PullResponse {
    /// Changed records. Always authoritative.
    pub entries: Vec<Record>,
    /// Number of entries.
    pub count: u32,
    /// Instant up to which the response is complete, if the authority reports it.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub as_of: Option<DateTime<Utc>>,
}

impl PullResponse {
    /// Creates a pull response.
    pub fn new(entries: Vec<Record>) -> Self {
        let count = entries.len() as u32;
        Self {
            entries,
            count,
            as_of: None,
        }
    }

    /// Creates an empty pull response.
    pub fn empty() -> Self {
        Self::new(Vec::new())
    }

    /// Sets the coverage instant.
    #[must_use]
    pub fn with_as_of(mut self, as_of: DateTime<Utc>) -> Self {
        self.as_of = Some(as_of);
        self
    }

    /// Checks that the response is complete.
    ///
    /// # Errors
    ///
    /// Returns [`ProtocolError::Inconsistent`] if `count` disagrees with the
    /// number of entries, which indicates a truncated response.
    pub fn validate(&self) -> ProtocolResult<()> {
        if self.count as usize != self.entries.len() {
            return Err(ProtocolError::Inconsistent {
                message: "pull response",
                reason: format!(
                    "count is {} but {} entries were sent",
                    self.count,
                    self.entries.len()
                ),
            });
        }
        Ok(())
    }
}

impl WireMessage for PullResponse {
    const NAME: &'static str = "pull response";
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use gatelog_core::EntryPayload;

    fn ids(n: u8) -> Vec<RecordId> {
        (0..n).map(|i| RecordId::from_bytes([i; 16])).collect()
    }

    #[test]
    fn resolve_all_accepted() {
        let submitted = ids(3);
        let res = PushResponse::accepted(3).resolve(&submitted);
        assert_eq!(res.accepted, submitted);
        assert!(res.still_pending().is_empty());
        assert!(res.consistent);
    }

    #[test]
    fn resolve_explicit_rejections() {
        let submitted = ids(3);
        let res = PushResponse::with_rejections(2, &submitted[1..2]).resolve(&submitted);
        assert_eq!(res.accepted, vec![submitted[0], submitted[2]]);
        assert_eq!(res.rejected, vec![submitted[1]]);
        assert!(res.consistent);
    }

    #[test]
    fn resolve_rejections_without_ids_keeps_everything_pending() {
        let submitted = ids(2);
        let response = PushResponse {
            accepted: 1,
            rejected: 1,
            rejected_ids: None,
            message: "one bad".into(),
        };
        let res = response.resolve(&submitted);
        assert!(res.accepted.is_empty());
        assert_eq!(res.still_pending(), submitted);
        assert!(!res.consistent);
    }

    #[test]
    fn resolve_short_accept_count_keeps_everything_pending() {
        let submitted = ids(3);
        let res = PushResponse::accepted(2).resolve(&submitted);
        assert!(res.accepted.is_empty());
        assert_eq!(res.unconfirmed, submitted);
    }

    #[test]
    fn resolve_ignores_unknown_rejected_ids() {
        let submitted = ids(1);
        let response = PushResponse {
            accepted: 1,
            rejected: 1,
            rejected_ids: Some(vec!["garbage".into(), RecordId::new().to_string()]),
            message: String::new(),
        };
        let res = response.resolve(&submitted);
        assert_eq!(res.accepted, submitted);
        assert!(!res.consistent);
    }

    #[test]
    fn push_response_wire_names() {
        let json = r#"{"accepted":0,"rejected":1,"rejectedIds":["00000000-0000-0000-0000-000000000000"],"message":"dup"}"#;
        let response = PushResponse::decode(json.as_bytes()).unwrap();
        assert_eq!(response.rejected, 1);
        assert_eq!(response.rejected_ids.as_ref().map(Vec::len), Some(1));
        assert_eq!(response.message, "dup");

        let bare = PushResponse::decode(br#"{"accepted":2,"rejected":0}"#).unwrap();
        assert_eq!(bare, PushResponse::accepted(2));
    }

    #[test]
    fn pull_query() {
        assert_eq!(PullRequest::new(None).to_query(), "");
        let since = Utc.with_ymd_and_hms(2024, 3, 1, 12, 30, 0).unwrap();
        let request = PullRequest::new(Some(since));
        assert_eq!(request.to_query(), "?since=2024-03-01T12:30:00.000Z");
        assert_eq!(PullRequest::from_query(&request.to_query()).unwrap(), request);
        assert_eq!(PullRequest::from_query("").unwrap(), PullRequest::default());
        assert!(PullRequest::from_query("?since=soon").is_err());
    }

    #[test]
    fn pull_response_rejects_invalid_record() {
        let record = Record::new("g", "u", EntryPayload::other("x"), Utc::now()).unwrap();
        let mut json = serde_json::to_value(PullResponse::new(vec![record])).unwrap();
        json["entries"][0]["payload"]["type"] = "VEHICLE".into();
        let bytes = serde_json::to_vec(&json).unwrap();
        assert!(matches!(
            PullResponse::decode(&bytes),
            Err(ProtocolError::Decode { .. })
        ));
    }

    #[test]
    fn pull_response_count_checked() {
        let mut response = PullResponse::empty();
        assert!(response.validate().is_ok());
        response.count = 4;
        assert!(matches!(
            response.validate(),
            Err(ProtocolError::Inconsistent { .. })
        ));
    }
}
