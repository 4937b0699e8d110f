//! Trigger event DTOs

use serde::{Deserialize, Serialize};
use std::collections::HashMap;

use crate::domain::instance::DefinitionName;

/// Inbound event consumed by the dispatcher
///
/// Wire form: `{ "name": "video.create", "data": { "videoId": "..." } }`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "name", content = "data")]
pub enum TriggerEvent {
    #[serde(rename = "video.create", rename_all = "camelCase")]
    VideoCreate { video_id: String },
    #[serde(rename = "video.cancel", rename_all = "camelCase")]
    VideoCancel { video_id: String },
    #[serde(rename = "image.generate", rename_all = "camelCase")]
    ImageGenerate { image_id: String },
    #[serde(rename = "image.cancel", rename_all = "camelCase")]
    ImageCancel { image_id: String },
    #[serde(rename = "schedule.upload", rename_all = "camelCase")]
    ScheduleUpload {
        schedule_id: String,
        refresh_token: String,
    },
    #[serde(rename = "schedule.cancel", rename_all = "camelCase")]
    ScheduleCancel { schedule_id: String },
    #[serde(rename = "render.video", rename_all = "camelCase")]
    RenderVideo { video_id: String },
    #[serde(rename = "render.cancel", rename_all = "camelCase")]
    RenderCancel { video_id: String },
}

/// What a trigger event asks the dispatcher to do
#[derive(Debug, Clone, PartialEq)]
pub enum EventAction {
    /// Start a new instance with the given parameters
    Start(HashMap<String, serde_json::Value>),
    /// Cancel the in-flight instance for the correlation key
    Cancel,
}

impl TriggerEvent {
    /// Event name as it appears on the wire
    pub fn name(&self) -> &'static str {
        match self {
            TriggerEvent::VideoCreate { .. } => "video.create",
            TriggerEvent::VideoCancel { .. } => "video.cancel",
            TriggerEvent::ImageGenerate { .. } => "image.generate",
            TriggerEvent::ImageCancel { .. } => "image.cancel",
            TriggerEvent::ScheduleUpload { .. } => "schedule.upload",
            TriggerEvent::ScheduleCancel { .. } => "schedule.cancel",
            TriggerEvent::RenderVideo { .. } => "render.video",
            TriggerEvent::RenderCancel { .. } => "render.cancel",
        }
    }

    /// The pipeline implied by the event type
    pub fn definition(&self) -> DefinitionName {
        match self {
            TriggerEvent::VideoCreate { .. } | TriggerEvent::VideoCancel { .. } => {
                DefinitionName::VideoCreate
            }
            TriggerEvent::ImageGenerate { .. } | TriggerEvent::ImageCancel { .. } => {
                DefinitionName::ImageGenerate
            }
            TriggerEvent::ScheduleUpload { .. } | TriggerEvent::ScheduleCancel { .. } => {
                DefinitionName::SchedulePublish
            }
            TriggerEvent::RenderVideo { .. } | TriggerEvent::RenderCancel { .. } => {
                DefinitionName::VideoRender
            }
        }
    }

    pub fn correlation_key(&self) -> &str {
        match self {
            TriggerEvent::VideoCreate { video_id }
            | TriggerEvent::VideoCancel { video_id }
            | TriggerEvent::RenderVideo { video_id }
            | TriggerEvent::RenderCancel { video_id } => video_id,
            TriggerEvent::ImageGenerate { image_id } | TriggerEvent::ImageCancel { image_id } => {
                image_id
            }
            TriggerEvent::ScheduleUpload { schedule_id, .. }
            | TriggerEvent::ScheduleCancel { schedule_id } => schedule_id,
        }
    }

    pub fn action(&self) -> EventAction {
        let mut parameters = HashMap::new();
        match self {
            TriggerEvent::VideoCreate { video_id } | TriggerEvent::RenderVideo { video_id } => {
                parameters.insert("videoId".to_string(), video_id.clone().into());
            }
            TriggerEvent::ImageGenerate { image_id } => {
                parameters.insert("imageId".to_string(), image_id.clone().into());
            }
            TriggerEvent::ScheduleUpload {
                schedule_id,
                refresh_token,
            } => {
                parameters.insert("scheduleId".to_string(), schedule_id.clone().into());
                parameters.insert("refreshToken".to_string(), refresh_token.clone().into());
            }
            TriggerEvent::VideoCancel { .. }
            | TriggerEvent::ImageCancel { .. }
            | TriggerEvent::ScheduleCancel { .. }
            | TriggerEvent::RenderCancel { .. } => return EventAction::Cancel,
        }
        EventAction::Start(parameters)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_wire_format() {
        let event: TriggerEvent = serde_json::from_str(
            r#"{"name":"schedule.upload","data":{"scheduleId":"s1","refreshToken":"rt"}}"#,
        )
        .unwrap();

        assert_eq!(
            event,
            TriggerEvent::ScheduleUpload {
                schedule_id: "s1".to_string(),
                refresh_token: "rt".to_string(),
            }
        );
        assert_eq!(event.definition(), DefinitionName::SchedulePublish);
        assert_eq!(event.correlation_key(), "s1");
    }

    #[test]
    fn test_cancel_events_share_definition_with_start() {
        let start = TriggerEvent::RenderVideo {
            video_id: "v1".to_string(),
        };
        let cancel = TriggerEvent::RenderCancel {
            video_id: "v1".to_string(),
        };

        assert_eq!(start.definition(), cancel.definition());
        assert_eq!(cancel.action(), EventAction::Cancel);
        assert!(matches!(start.action(), EventAction::Start(p) if p["videoId"] == "v1"));
    }

    #[test]
    fn test_name_matches_serde_tag() {
        let event = TriggerEvent::ImageCancel {
            image_id: "i1".to_string(),
        };
        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["name"], event.name());
        assert_eq!(json["data"]["imageId"], "i1");
    }
}
