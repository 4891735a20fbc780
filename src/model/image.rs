//! The embedded image and the MIME strings derived from it.

use std::path::Path;
use std::time::Duration;

use base64::engine::general_purpose::STANDARD;
use base64::Engine as _;

use super::part::{Header, Headers, LineEnding, MessagePart};
use crate::config::ImageConfig;
use crate::error::{Result, StampError};
use crate::store::reader::read_bounded;

/// Marker in HTML bodies that is replaced by the image reference.
///
/// It is an HTML comment so that it stays invisible when no image is attached.
pub const PLACEHOLDER: &str = "<!-- IMAGEHEREPLACEHOLDER -->";

/// Content type of every image part we generate or recognize.
pub const IMAGE_CONTENT_TYPE: &str = "image/jpeg";

/// Base64 line length for the generated image body (RFC 2045 §6.8).
const BASE64_LINE_LEN: usize = 76;

/// Transfer encodings of HTML parts we can safely insert a reference into.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransferEncoding {
    SevenBit,
    QuotedPrintable,
}

impl TransferEncoding {
    /// Resolve a `Content-Transfer-Encoding` header value.
    ///
    /// A missing header is not guessed at: the part is skipped like any
    /// other unknown encoding.
    pub fn from_header(value: Option<&str>) -> Result<Self> {
        let value = value.unwrap_or("").trim();
        if value.eq_ignore_ascii_case("7bit") {
            Ok(Self::SevenBit)
        } else if value.eq_ignore_ascii_case("quoted-printable") {
            Ok(Self::QuotedPrintable)
        } else if value.is_empty() {
            Err(StampError::UnsupportedEncoding("<none>".to_string()))
        } else {
            Err(StampError::UnsupportedEncoding(value.to_string()))
        }
    }
}

/// The image that gets attached, plus its naming.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImageAsset {
    /// Versioned file name written into `Content-Disposition`.
    pub filename: String,
    /// Version-independent name used in `Content-ID`.
    pub base_filename: String,
    pub cid_domain: String,
    pub bytes: Vec<u8>,
}

impl ImageAsset {
    pub fn new(
        filename: impl Into<String>,
        base_filename: impl Into<String>,
        cid_domain: impl Into<String>,
        bytes: Vec<u8>,
    ) -> Self {
        Self {
            filename: filename.into(),
            base_filename: base_filename.into(),
            cid_domain: cid_domain.into(),
            bytes,
        }
    }

    /// Read the configured image from disk.
    ///
    /// Any failure, including a read that exceeds `timeout`, is reported as
    /// [`StampError::MissingResource`].
    pub fn load(config: &ImageConfig, timeout: Duration) -> Result<Self> {
        let path = config.path();
        let bytes = read_bounded(&path, timeout).map_err(|e| missing(&path, e))?;
        if bytes.is_empty() {
            return Err(missing(&path, "file is empty"));
        }
        tracing::debug!(path = %path.display(), size = bytes.len(), "Loaded image");
        Ok(Self::from_config(config, bytes))
    }

    /// Naming from `config` with the given bytes. Recognizing an existing
    /// copy only needs the naming, so `bytes` may be empty for that.
    pub fn from_config(config: &ImageConfig, bytes: Vec<u8>) -> Self {
        Self::new(
            &config.filename,
            &config.base_filename,
            &config.cid_domain,
            bytes,
        )
    }

    /// `<base@domain>`
    pub fn content_id(&self) -> String {
        format!("<{}@{}>", self.base_filename, self.cid_domain)
    }

    /// `attachment; filename="<versioned name>"`
    pub fn content_disposition(&self) -> String {
        format!("attachment; filename=\"{}\"", self.filename)
    }

    /// HTML snippet that replaces the placeholder, quoted for `encoding`.
    pub fn reference(&self, encoding: TransferEncoding, eol: LineEnding) -> String {
        let equals = match encoding {
            TransferEncoding::SevenBit => "=",
            TransferEncoding::QuotedPrintable => "=3D",
        };
        format!(
            "<br /><img src{equals}\"cid:{}@{}\"><br />{}",
            self.base_filename,
            self.cid_domain,
            eol.as_str()
        )
    }

    /// Build the inline image part.
    pub fn to_part(&self, eol: LineEnding) -> MessagePart {
        let headers: Headers = [
            Header::new("Content-Type", IMAGE_CONTENT_TYPE),
            Header::new("MIME-Version", "1.0"),
            Header::new("Content-Transfer-Encoding", "base64"),
            Header::new("Content-Disposition", &self.content_disposition()),
            Header::new("Content-ID", &self.content_id()),
        ]
        .into_iter()
        .collect();

        MessagePart::leaf(IMAGE_CONTENT_TYPE, headers, encode_base64_lines(&self.bytes, eol))
    }
}

fn missing(path: &Path, reason: impl ToString) -> StampError {
    StampError::MissingResource {
        path: path.to_path_buf(),
        reason: reason.to_string(),
    }
}

/// Base64 with lines of at most 76 characters, each terminated by `eol`.
fn encode_base64_lines(bytes: &[u8], eol: LineEnding) -> Vec<u8> {
    let encoded = STANDARD.encode(bytes);
    let mut out = Vec::with_capacity(encoded.len() + encoded.len() / BASE64_LINE_LEN * 2 + 2);
    for line in encoded.as_bytes().chunks(BASE64_LINE_LEN) {
        out.extend_from_slice(line);
        out.extend_from_slice(eol.as_bytes());
    }
    out
}
