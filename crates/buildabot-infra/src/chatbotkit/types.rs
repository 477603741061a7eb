//! Wire types specific to the ChatBotKit REST API.
//!
//! Create/update payloads reuse the request types from `buildabot_types::remote`,
//! which already serialize in the service's camelCase shape.

use serde::{Deserialize, Serialize};

use buildabot_types::remote::AttachKind;

/// Body returned by every `*/create` endpoint.
#[derive(Debug, Deserialize)]
pub struct IdResponse {
    pub id: String,
}

/// Body returned by every `*/list` endpoint.
#[derive(Debug, Deserialize)]
pub struct ListResponse<T> {
    #[serde(default = "Vec::new")]
    pub items: Vec<T>,
}

#[derive(Debug, Serialize)]
pub struct AttachRequest {
    #[serde(rename = "type")]
    pub kind: AttachKind,
}

/// File contents sent inline as a base64 data URI.
#[derive(Debug, Serialize)]
pub struct UploadRequest<'a> {
    pub file: String,
    pub name: &'a str,
    #[serde(rename = "type")]
    pub content_type: &'a str,
}

/// Body for endpoints that take no parameters.
#[derive(Debug, Default, Serialize)]
pub struct Empty {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_list_response_without_items() {
        let list: ListResponse<IdResponse> = serde_json::from_str("{}").unwrap();
        assert!(list.items.is_empty());
    }

    #[test]
    fn test_attach_request_shape() {
        let json = serde_json::to_value(AttachRequest {
            kind: AttachKind::Source,
        })
        .unwrap();
        assert_eq!(json, serde_json::json!({"type": "source"}));
    }
}
