//! On-disk tape document.
//!
//! Field names follow the tape file format: `tapeName`, `routingUrl`,
//! `readOnly`, `chapters[].mockUses`, `requestData`, `responseData`.

use super::interaction::{Interaction, USES_ALWAYS};
use super::snapshot::{RequestSnapshot, ResponseSnapshot};
use crate::attractor::AttractorGroup;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TapeFile {
    #[serde(default)]
    pub tape_name: Option<String>,
    #[serde(default)]
    pub attractors: Option<AttractorGroup>,
    #[serde(default)]
    pub routing_url: Option<String>,
    #[serde(default)]
    pub read_only: Option<bool>,
    #[serde(default, deserialize_with = "nullable_chapters")]
    pub chapters: Vec<InteractionFile>,
}

fn nullable_chapters<'de, D>(deserializer: D) -> Result<Vec<InteractionFile>, D::Error>
where
    D: serde::Deserializer<'de>,
{
    Option::<Vec<InteractionFile>>::deserialize(deserializer).map(Option::unwrap_or_default)
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InteractionFile {
    #[serde(default)]
    pub chapter_name: Option<String>,
    #[serde(default = "Utc::now")]
    pub recorded_date: DateTime<Utc>,
    #[serde(default)]
    pub always_live: Option<bool>,
    #[serde(default)]
    pub attractors: Option<AttractorGroup>,
    #[serde(default = "default_uses")]
    pub mock_uses: i32,
    #[serde(default)]
    pub request_data: Option<RequestSnapshot>,
    #[serde(default)]
    pub response_data: Option<ResponseSnapshot>,
}

fn default_uses() -> i32 {
    USES_ALWAYS
}

impl From<&Interaction> for InteractionFile {
    fn from(chapter: &Interaction) -> Self {
        Self {
            chapter_name: Some(chapter.name().to_string()),
            recorded_date: chapter.recorded_at(),
            always_live: chapter.always_live(),
            attractors: chapter.attractors().cloned(),
            mock_uses: chapter.raw_uses(),
            request_data: chapter.request().cloned(),
            response_data: chapter.response(),
        }
    }
}

impl From<InteractionFile> for Interaction {
    fn from(file: InteractionFile) -> Self {
        let chapter = Interaction::new(file.chapter_name)
            .with_attractors(file.attractors)
            .with_response(file.response_data)
            .with_always_live(file.always_live)
            .with_recorded_at(file.recorded_date)
            .with_raw_uses(file.mock_uses);
        match file.request_data {
            Some(request) => chapter.with_request(request),
            None => chapter,
        }
    }
}
