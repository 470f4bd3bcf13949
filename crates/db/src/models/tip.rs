use serde::{Deserialize, Serialize};

/// A short piece of parenting advice served for a location type.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Tip {
    pub title: String,
    #[serde(default)]
    pub description: String,
}

impl Tip {
    pub fn new(title: impl Into<String>, description: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            description: description.into(),
        }
    }

    pub fn is_blank(&self) -> bool {
        self.title.trim().is_empty() && self.description.trim().is_empty()
    }
}

/// Body of `POST /api/tips/get-tips`.
#[derive(Debug, Clone, Serialize)]
pub struct TipsRequest<'a> {
    #[serde(rename = "type")]
    pub location_type: &'a str,
    #[serde(rename = "AI")]
    pub ai: bool,
}
