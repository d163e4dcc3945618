//! `Content-Encoding` dispatch.
//!
//! The decompressors come from `flate2` and `brotli`; this module only maps
//! encoding names to them and their failures to [`Error`].

use std::io::Read;

use bytes::Bytes;

use crate::error::{Error, Result};

/// Encodings advertised in `Accept-Encoding` by default.
pub const SUPPORTED_ENCODINGS: &str = "gzip, br";

/// A single content coding.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ContentEncoding {
    Identity,
    Gzip,
    Brotli,
    /// Recognised but not implemented.
    Deflate,
}

impl ContentEncoding {
    /// Map a coding token. `None` for tokens we do not know at all.
    pub fn from_token(token: &str) -> Option<Self> {
        match token.trim().to_ascii_lowercase().as_str() {
            "" | "identity" => Some(Self::Identity),
            "gzip" | "x-gzip" => Some(Self::Gzip),
            "br" => Some(Self::Brotli),
            "deflate" => Some(Self::Deflate),
            _ => None,
        }
    }

    fn decode(self, data: Bytes) -> Result<Bytes> {
        match self {
            Self::Identity => Ok(data),
            Self::Gzip => decode_gzip(&data),
            Self::Brotli => decode_brotli(&data),
            Self::Deflate => Err(Error::UnsupportedEncoding("deflate".into())),
        }
    }
}

/// Decode a body according to its `Content-Encoding` header value.
///
/// Multiple codings are undone in reverse order of application.
pub fn decode_body(content_encoding: Option<&str>, body: Bytes) -> Result<Bytes> {
    let Some(header) = content_encoding else {
        return Ok(body);
    };

    let mut codings = Vec::new();
    for token in header.split(',') {
        let coding = ContentEncoding::from_token(token)
            .ok_or_else(|| Error::UnsupportedEncoding(token.trim().to_string()))?;
        codings.push(coding);
    }

    codings
        .into_iter()
        .rev()
        .try_fold(body, |data, coding| coding.decode(data))
}

fn decode_gzip(data: &[u8]) -> Result<Bytes> {
    let mut decoder = flate2::read::MultiGzDecoder::new(data);
    let mut decoded = Vec::new();
    decoder
        .read_to_end(&mut decoded)
        .map_err(|e| Error::Decompression(format!("gzip: {}", e)))?;
    Ok(Bytes::from(decoded))
}

fn decode_brotli(data: &[u8]) -> Result<Bytes> {
    let mut decoder = brotli::Decompressor::new(data, 4096);
    let mut decoded = Vec::new();
    decoder
        .read_to_end(&mut decoded)
        .map_err(|e| Error::Decompression(format!("brotli: {}", e)))?;
    Ok(Bytes::from(decoded))
}
