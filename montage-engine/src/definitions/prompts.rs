//! Prompt templates for the text model

use serde::de::DeserializeOwned;

use crate::error::StepError;

const SCENE_PROMPTS: &str = "Write image prompts in the {{STYLE}} style for the key scenes of a short narrated video.

Script: {{SCRIPT}}

Rules:
- Describe only what is seen; no camera angles or film terminology.
- Each prompt must be vivid and carry the mood and setting of its scene.
- Return 4 to 5 prompts as a JSON array of objects with the keys
  \"imagePrompt\" (the visual description) and \"sceneContent\" (the matching part of the script).
- Keep the script unchanged and do not label scenes as opening or closing.";

const TITLE: &str = "Write one title for the following content: {{CONTENT}}

Rules:
- 3 to 5 words
- Lead with the most surprising element
- Title Case, no quotes, no trailing punctuation

Return only the title as plain text.";

const PUBLISH_METADATA: &str = "Write YouTube SEO metadata for the content below as JSON:

{\"title\": \"\", \"description\": \"\", \"tags\": [\"tag1\", \"tag2\"]}

- title: clear and searchable, at most 60 characters
- description: 120 to 160 characters summarising the main point
- tags: 10 to 12 relevant tags

Content:
{{SCRIPT}}";

pub fn scene_prompts(style: &str, script: &str) -> String {
    SCENE_PROMPTS
        .replace("{{STYLE}}", style)
        .replace("{{SCRIPT}}", script)
}

pub fn title(content: &str) -> String {
    TITLE.replace("{{CONTENT}}", content)
}

pub fn publish_metadata(script: &str) -> String {
    PUBLISH_METADATA.replace("{{SCRIPT}}", script)
}

/// Parses a model response that may be wrapped in a markdown code fence
pub fn parse_json_response<T: DeserializeOwned>(raw: &str) -> Result<T, StepError> {
    let trimmed = raw.trim();
    let body = trimmed
        .strip_prefix("```json")
        .or_else(|| trimmed.strip_prefix("```"))
        .unwrap_or(trimmed);
    let body = body.strip_suffix("```").unwrap_or(body).trim();

    serde_json::from_str(body)
        .map_err(|e| StepError::terminal(format!("model returned invalid JSON: {e}")))
}

/// Strips quotes and whitespace the model tends to add around a title
pub fn clean_title(raw: &str) -> String {
    raw.trim()
        .trim_matches(|c| c == '"' || c == '\'' || c == '*')
        .trim()
        .to_string()
}
