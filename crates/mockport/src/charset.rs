//! Response body transcoding.

use crate::endpoint::Charset;
use thiserror::Error;

#[derive(Debug, Error, PartialEq, Eq)]
#[error("content cannot be represented in {charset}")]
pub struct CharsetError {
    pub charset: Charset,
}

/// Encode `content` into the bytes sent on the wire for `charset`.
///
/// UTF-8 content passes through untouched. GBK fails on characters the
/// encoding has no mapping for instead of emitting numeric character references.
pub fn encode(content: &str, charset: Charset) -> Result<Vec<u8>, CharsetError> {
    match charset {
        Charset::Utf8 => Ok(content.as_bytes().to_vec()),
        Charset::Gbk => {
            let (bytes, _, had_unmappable) = encoding_rs::GBK.encode(content);
            if had_unmappable {
                return Err(CharsetError { charset });
            }
            Ok(bytes.into_owned())
        }
    }
}

/// `Content-Type` header value advertised by HTTP endpoints.
pub fn content_type(charset: Charset) -> &'static str {
    match charset {
        Charset::Utf8 => "text/plain; charset=UTF-8",
        Charset::Gbk => "text/plain; charset=GBK",
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_utf8_passthrough() {
        let bytes = encode("héllo 世界", Charset::Utf8).unwrap();
        assert_eq!(bytes, "héllo 世界".as_bytes());
    }

    #[test]
    fn test_gbk_encodes_chinese() {
        // 中文 in GBK
        let bytes = encode("中文", Charset::Gbk).unwrap();
        assert_eq!(bytes, vec![0xD6, 0xD0, 0xCE, 0xC4]);
    }

    #[test]
    fn test_gbk_ascii_unchanged() {
        assert_eq!(encode("pong", Charset::Gbk).unwrap(), b"pong".to_vec());
    }

    #[test]
    fn test_gbk_rejects_unmappable() {
        let err = encode("emoji 😀", Charset::Gbk).unwrap_err();
        assert_eq!(err.charset, Charset::Gbk);
    }

    #[test]
    fn test_content_type_header() {
        assert_eq!(content_type(Charset::Utf8), "text/plain; charset=UTF-8");
        assert_eq!(content_type(Charset::Gbk), "text/plain; charset=GBK");
    }
}
