//! Webhook body decompression.

use flate2::read::{GzDecoder, ZlibDecoder};
use std::io::Read;

use crate::error::IngestError;

/// Upper bound on a decompressed delivery.
pub const MAX_DECODED_BYTES: u64 = 8 * 1024 * 1024;

/// Check if data is gzip compressed (magic bytes check)
#[inline]
pub fn is_gzip(data: &[u8]) -> bool {
    data.len() >= 2 && data[0] == 0x1f && data[1] == 0x8b
}

/// zlib stream header: deflate method and a valid check value.
#[inline]
pub fn is_zlib(data: &[u8]) -> bool {
    data.len() >= 2
        && data[0] & 0x0f == 0x08
        && (u16::from(data[0]) << 8 | u16::from(data[1])) % 31 == 0
}

/// Decompresses a delivery body.
///
/// An explicit `Content-Encoding` is trusted; without one the body is
/// sniffed and anything that is neither gzip nor zlib passes through.
pub fn decode_body(body: &[u8], content_encoding: Option<&str>) -> Result<Vec<u8>, IngestError> {
    let encoding = content_encoding
        .map(|e| e.trim().to_ascii_lowercase())
        .filter(|e| !e.is_empty());

    match encoding.as_deref() {
        Some("gzip") | Some("x-gzip") => inflate(GzDecoder::new(body)),
        Some("deflate") => inflate(ZlibDecoder::new(body)),
        Some("identity") | None => {
            if is_gzip(body) {
                inflate(GzDecoder::new(body))
            } else if is_zlib(body) {
                inflate(ZlibDecoder::new(body))
            } else {
                Ok(body.to_vec())
            }
        }
        Some(other) => Err(IngestError::InvalidPayload(format!(
            "unsupported content-encoding {}",
            other
        ))),
    }
}

fn inflate<R: Read>(decoder: R) -> Result<Vec<u8>, IngestError> {
    let mut out = Vec::new();
    decoder
        .take(MAX_DECODED_BYTES + 1)
        .read_to_end(&mut out)
        .map_err(|e| IngestError::InvalidPayload(format!("decompression failed: {}", e)))?;
    if out.len() as u64 > MAX_DECODED_BYTES {
        return Err(IngestError::InvalidPayload(
            "decompressed body too large".to_string(),
        ));
    }
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;
    use flate2::write::{GzEncoder, ZlibEncoder};
    use flate2::Compression;
    use std::io::Write;

    const BODY: &[u8] = br#"{"data":{"key":"m1","status":"started"}}"#;

    fn gzip(data: &[u8]) -> Vec<u8> {
        let mut enc = GzEncoder::new(Vec::new(), Compression::fast());
        enc.write_all(data).unwrap();
        enc.finish().unwrap()
    }

    fn zlib(data: &[u8]) -> Vec<u8> {
        let mut enc = ZlibEncoder::new(Vec::new(), Compression::default());
        enc.write_all(data).unwrap();
        enc.finish().unwrap()
    }

    #[test]
    fn test_sniffs_gzip_and_zlib() {
        assert_eq!(decode_body(&gzip(BODY), None).unwrap(), BODY);
        assert_eq!(decode_body(&zlib(BODY), None).unwrap(), BODY);
        assert_eq!(decode_body(BODY, None).unwrap(), BODY);
    }

    #[test]
    fn test_declared_encoding() {
        assert_eq!(decode_body(&gzip(BODY), Some("gzip")).unwrap(), BODY);
        assert_eq!(decode_body(&zlib(BODY), Some("Deflate")).unwrap(), BODY);
        assert!(matches!(
            decode_body(BODY, Some("br")),
            Err(IngestError::InvalidPayload(_))
        ));
    }

    #[test]
    fn test_corrupt_stream_is_invalid() {
        let mut broken = gzip(BODY);
        broken.truncate(broken.len() / 2);
        assert!(matches!(
            decode_body(&broken, None),
            Err(IngestError::InvalidPayload(_))
        ));
        assert!(matches!(
            decode_body(BODY, Some("gzip")),
            Err(IngestError::InvalidPayload(_))
        ));
    }

    #[test]
    fn test_magic_checks() {
        assert!(is_gzip(&[0x1f, 0x8b, 0x08]));
        assert!(!is_gzip(b"{}"));
        assert!(is_zlib(&[0x78, 0x9c]));
        assert!(!is_zlib(b"{\""));
    }
}
