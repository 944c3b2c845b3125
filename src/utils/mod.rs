use std::io::{Read, Write};

use axum::response::{IntoResponse, Response};
use axum::Json;
use bytes::Bytes;
use cyder_tools::log::error;
use cyder_tools::snow_flake::Snowflake;
use flate2::{read::GzDecoder, write::GzEncoder, Compression};
use once_cell::sync::Lazy;
use serde::Serialize;

pub mod auth;
pub mod billing;

pub static ID_GENERATOR: Lazy<Snowflake> = Lazy::new(|| Snowflake::new(1));

#[derive(Serialize)]
pub struct HttpResult<T> {
    pub code: usize,
    pub data: T,
}

impl<T> HttpResult<T> {
    pub fn new(data: T) -> HttpResult<T> {
        HttpResult { code: 0, data }
    }
}

impl<T> IntoResponse for HttpResult<T>
where
    T: Serialize,
{
    fn into_response(self) -> Response {
        Json(self).into_response()
    }
}

pub fn gzip_compress(data: &[u8]) -> std::io::Result<Vec<u8>> {
    let mut encoder = GzEncoder::new(Vec::new(), Compression::default());
    encoder.write_all(data)?;
    encoder.finish()
}

pub fn gzip_decompress(data: &[u8]) -> std::io::Result<Vec<u8>> {
    let mut decoder = GzDecoder::new(data);
    let mut decompressed = Vec::new();
    decoder.read_to_end(&mut decompressed)?;
    Ok(decompressed)
}

/// Decodes an upstream body when it arrived gzip encoded. Falls back to the raw bytes on decode failure.
pub fn decode_body(body_bytes: Bytes, is_gzip: bool) -> Bytes {
    if !is_gzip || body_bytes.is_empty() {
        return body_bytes;
    }
    match gzip_decompress(&body_bytes) {
        Ok(decompressed) => Bytes::from(decompressed),
        Err(e) => {
            error!("Gzip decoding failed: {}", e);
            body_bytes
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn gzip_bodies_are_decoded() {
        let raw = br#"{"error":{"message":"slow down"}}"#;
        let compressed = gzip_compress(raw).unwrap();
        assert_ne!(compressed.as_slice(), raw.as_slice());

        let decoded = decode_body(Bytes::from(compressed), true);
        assert_eq!(decoded.as_ref(), raw.as_slice());
    }

    #[test]
    fn undecodable_body_passes_through() {
        let body = Bytes::from_static(b"plain text");
        assert_eq!(decode_body(body.clone(), true), body);
        assert_eq!(decode_body(body.clone(), false), body);
    }
}
