use std::fmt;

use serde::{Deserialize, Serialize};

/// Identifier the backend sends either as a JSON number or a string.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum RemoteId {
    Number(i64),
    Text(String),
}

impl fmt::Display for RemoteId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RemoteId::Number(n) => write!(f, "{n}"),
            RemoteId::Text(s) => f.write_str(s),
        }
    }
}

/// Raw response of `POST /endpoint`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LocationMatchResponse {
    #[serde(default)]
    pub status: Option<String>,
    #[serde(default)]
    pub location: Option<String>,
    #[serde(default, rename = "type")]
    pub location_type: Option<String>,
    #[serde(default)]
    pub location_id: Option<RemoteId>,
    #[serde(default)]
    pub notification_id: Option<RemoteId>,
}

/// A proximity match: the submitted coordinates fell inside a registered
/// location's notification radius.
#[derive(Debug, Clone, PartialEq)]
pub struct LocationMatch {
    pub location_name: String,
    pub location_type: String,
    pub location_id: Option<String>,
    pub notification_id: Option<String>,
}

impl LocationMatchResponse {
    pub fn is_success(&self) -> bool {
        self.status
            .as_deref()
            .is_some_and(|s| s.eq_ignore_ascii_case("success"))
    }

    /// Validated match, or `None` when the backend reported no match.
    pub fn into_match(self) -> Option<LocationMatch> {
        if !self.is_success() {
            return None;
        }
        let location_type = self
            .location_type
            .map(|t| t.trim().to_string())
            .filter(|t| !t.is_empty())?;
        let location_name = self
            .location
            .map(|l| l.trim().to_string())
            .filter(|l| !l.is_empty())
            .unwrap_or_else(|| location_type.clone());

        Some(LocationMatch {
            location_name,
            location_type,
            location_id: self.location_id.map(|id| id.to_string()),
            notification_id: self.notification_id.map(|id| id.to_string()),
        })
    }
}
