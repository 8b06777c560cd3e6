use serde::Serialize;
use time::OffsetDateTime;

use crate::conversions::repo_types::Conversion;
use crate::convert::{Arity, Tool};

/// Body of every `/convert` response.
#[derive(Debug, Serialize)]
pub struct ConvertResponse {
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub download_url: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub filename: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

pub fn download_url(name: &str) -> String {
    format!("/download/{}", name)
}

impl ConvertResponse {
    pub fn done(name: String) -> Self {
        Self {
            success: true,
            download_url: Some(download_url(&name)),
            filename: Some(name),
            error: None,
        }
    }

    pub fn failed(error: impl Into<String>) -> Self {
        Self {
            success: false,
            download_url: None,
            filename: None,
            error: Some(error.into()),
        }
    }
}

#[derive(Debug, Serialize)]
pub struct ToolInfo {
    pub id: &'static str,
    pub accepts: &'static [&'static str],
    pub arity: Arity,
}

impl From<Tool> for ToolInfo {
    fn from(tool: Tool) -> Self {
        Self {
            id: tool.id(),
            accepts: tool.accepts(),
            arity: tool.arity(),
        }
    }
}

#[derive(Debug, Serialize)]
pub struct HistoryEntry {
    pub tool: String,
    pub original_filename: String,
    pub converted_filename: String,
    pub download_url: String,
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
}

impl From<Conversion> for HistoryEntry {
    fn from(c: Conversion) -> Self {
        Self {
            download_url: download_url(&c.converted_filename),
            tool: c.tool,
            original_filename: c.original_filename,
            converted_filename: c.converted_filename,
            created_at: c.created_at.assume_utc(),
        }
    }
}
