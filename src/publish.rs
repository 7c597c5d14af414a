//! Uploading reports to S3.

use anyhow::{Context, Result};
use aws_sdk_s3::primitives::ByteStream;
use flate2::Compression;
use flate2::write::GzEncoder;
use serde::Serialize;
use std::io::Write;
use tracing::info;

/// Serializes `value` to JSON, gzip-compressed when `gzip` is set.
pub fn encode_json(value: &impl Serialize, gzip: bool) -> Result<Vec<u8>> {
    let body = serde_json::to_vec(value)?;
    if !gzip {
        return Ok(body);
    }
    let mut encoder = GzEncoder::new(Vec::new(), Compression::default());
    encoder.write_all(&body)?;
    Ok(encoder.finish()?)
}

/// Object key for a report, with `.gz` appended when compressed.
pub fn report_key(prefix: &str, name: &str, gzip: bool) -> String {
    let prefix = prefix.trim_matches('/');
    let base = if prefix.is_empty() {
        name.to_string()
    } else {
        format!("{prefix}/{name}")
    };
    if gzip { format!("{base}.gz") } else { base }
}

/// Serializes a value to JSON and uploads it to an S3 bucket with
/// `application/json` content type.
#[tracing::instrument(skip(client, value))]
pub async fn write_json_to_s3(
    client: &aws_sdk_s3::Client,
    bucket: &str,
    key: &str,
    value: &impl Serialize,
    gzip: bool,
) -> Result<()> {
    let body = encode_json(value, gzip)?;
    let bytes = body.len();

    let request = client
        .put_object()
        .bucket(bucket)
        .key(key)
        .body(ByteStream::from(body))
        .content_type("application/json");
    let request = if gzip {
        request.content_encoding("gzip")
    } else {
        request
    };

    request
        .send()
        .await
        .with_context(|| format!("uploading s3://{bucket}/{key}"))?;

    info!(bucket, key, bytes, "Report uploaded to S3");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use flate2::read::GzDecoder;
    use std::io::Read;

    #[test]
    fn test_gzip_body_decodes_to_json() {
        let value = serde_json::json!({ "sites": [{ "id": "MAIN ST", "crashes": 15 }] });
        let compressed = encode_json(&value, true).unwrap();

        let mut decoded = String::new();
        GzDecoder::new(compressed.as_slice())
            .read_to_string(&mut decoded)
            .unwrap();
        let round: serde_json::Value = serde_json::from_str(&decoded).unwrap();
        assert_eq!(round, value);
    }

    #[test]
    fn test_plain_body_is_json() {
        let body = encode_json(&vec![1, 2, 3], false).unwrap();
        assert_eq!(body, b"[1,2,3]");
    }

    #[test]
    fn test_report_key() {
        assert_eq!(report_key("", "screening.json", false), "screening.json");
        assert_eq!(
            report_key("/reports/2025/", "screening.json", true),
            "reports/2025/screening.json.gz"
        );
    }
}
