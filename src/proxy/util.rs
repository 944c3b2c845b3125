use axum::{
    body::{Body, Bytes},
    extract::Request,
};
use cyder_tools::log::{debug, warn};
use serde_json::Value;

use crate::controller::GatewayError;

pub(super) async fn read_body(request: Request<Body>) -> Result<Bytes, GatewayError> {
    axum::body::to_bytes(request.into_body(), usize::MAX)
        .await
        .map_err(|e| GatewayError::BadRequest(format!("Failed to read body: {}", e)))
}

pub(super) fn parse_json_body(body: &[u8]) -> Result<Value, GatewayError> {
    if body.is_empty() {
        return Ok(Value::Null);
    }
    serde_json::from_slice(body)
        .map_err(|e| GatewayError::BadRequest(format!("Failed to parse JSON body: {}", e)))
}

/// Non-empty `model` string of a JSON request.
pub(super) fn json_model(data: &Value) -> Option<&str> {
    data.get("model").and_then(Value::as_str).filter(|m| !m.is_empty())
}

pub(super) fn wants_stream(data: &Value) -> bool {
    data.get("stream").and_then(Value::as_bool).unwrap_or(false)
}

/// Re-encodes the JSON body with `model` set to the name the provider serves.
pub(super) fn with_upstream_model(mut data: Value, model_name: &str) -> Result<Bytes, GatewayError> {
    if data.is_null() {
        data = Value::Object(serde_json::Map::new());
    }
    match data.as_object_mut() {
        Some(obj) => {
            obj.insert("model".to_string(), Value::String(model_name.to_string()));
        }
        None => return Err(GatewayError::BadRequest("JSON body must be an object".to_string())),
    }
    serde_json::to_vec(&data)
        .map(Bytes::from)
        .map_err(|e| GatewayError::Internal(format!("Failed to encode request body: {}", e)))
}

/// Reads one text part of a multipart body without consuming or re-encoding it.
pub(super) async fn multipart_text_field(content_type: &str, body: &Bytes, name: &str) -> Option<String> {
    let boundary = match multer::parse_boundary(content_type) {
        Ok(boundary) => boundary,
        Err(e) => {
            warn!("Multipart request without a usable boundary: {}", e);
            return None;
        }
    };
    let body = body.clone();
    let stream = futures::stream::once(async move { Ok::<_, std::io::Error>(body) });
    let mut multipart = multer::Multipart::new(stream, boundary);

    loop {
        match multipart.next_field().await {
            Ok(Some(field)) if field.name() == Some(name) => {
                return field.text().await.ok().filter(|text| !text.is_empty());
            }
            Ok(Some(_)) => continue,
            Ok(None) => return None,
            Err(e) => {
                debug!("Stopped scanning multipart body: {}", e);
                return None;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const CONTENT_TYPE: &str = "multipart/form-data; boundary=XyZ";

    #[test]
    fn upstream_model_replaces_requested_name() {
        let body = with_upstream_model(serde_json::json!({"model": "fast", "stream": true}), "llama3:8b").unwrap();
        let data: Value = serde_json::from_slice(&body).unwrap();
        assert_eq!(data, serde_json::json!({"model": "llama3:8b", "stream": true}));

        let body = with_upstream_model(Value::Null, "dall-e-3").unwrap();
        assert_eq!(&body[..], br#"{"model":"dall-e-3"}"#);

        assert!(matches!(
            with_upstream_model(serde_json::json!([1]), "m"),
            Err(GatewayError::BadRequest(_))
        ));
    }

    fn form(parts: &[(&str, &str)]) -> Bytes {
        let mut body = String::new();
        for (name, value) in parts {
            body.push_str(&format!(
                "--XyZ\r\nContent-Disposition: form-data; name=\"{}\"\r\n\r\n{}\r\n",
                name, value
            ));
        }
        body.push_str("--XyZ--\r\n");
        Bytes::from(body)
    }

    #[tokio::test]
    async fn finds_model_after_other_parts() {
        let body = form(&[("file", "RIFF...."), ("model", "whisper-1")]);
        assert_eq!(
            multipart_text_field(CONTENT_TYPE, &body, "model").await.as_deref(),
            Some("whisper-1")
        );
    }

    #[tokio::test]
    async fn missing_or_unparsable_model() {
        let body = form(&[("prompt", "a cat")]);
        assert_eq!(multipart_text_field(CONTENT_TYPE, &body, "model").await, None);
        assert_eq!(multipart_text_field("application/json", &body, "model").await, None);
    }

    #[test]
    fn json_model_and_stream_flags() {
        let data: Value = serde_json::json!({"model": "gpt-4", "stream": true});
        assert_eq!(json_model(&data), Some("gpt-4"));
        assert!(wants_stream(&data));
        assert_eq!(json_model(&serde_json::json!({"model": ""})), None);
        assert!(!wants_stream(&Value::Null));
    }
}
