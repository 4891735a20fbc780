//! RFC 5322 header value helpers: charset fallback, unfolding and
//! encoded-words (RFC 2047).

use base64::engine::general_purpose::{STANDARD, STANDARD_NO_PAD};
use base64::Engine as _;
use tracing::warn;

/// Decode raw header bytes to a string.
///
/// Tries UTF-8 first, then falls back to Windows-1252 (which accepts every byte).
pub fn decode_header_bytes(bytes: &[u8]) -> String {
    match std::str::from_utf8(bytes) {
        Ok(s) => s.to_string(),
        Err(_) => {
            let (decoded, _, _) = encoding_rs::WINDOWS_1252.decode(bytes);
            decoded.into_owned()
        }
    }
}

/// Join folded lines of one header value into a single trimmed line.
pub fn unfold_value(value: &str) -> String {
    value
        .lines()
        .map(str::trim)
        .filter(|l| !l.is_empty())
        .collect::<Vec<_>>()
        .join(" ")
}

/// Strip a trailing `\n` or `\r\n`.
pub fn trim_line_end(line: &[u8]) -> &[u8] {
    let line = line.strip_suffix(b"\n").unwrap_or(line);
    line.strip_suffix(b"\r").unwrap_or(line)
}

/// Decode RFC 2047 encoded-words in a header value.
///
/// Example: `"=?UTF-8?B?SG9sYQ==?= =?UTF-8?B?IG11bmRv?="` → `"Hola mundo"`
///
/// If decoding fails for any token, the original text is preserved.
pub fn decode_encoded_words(input: &str) -> String {
    let mut result = String::with_capacity(input.len());
    let mut remaining = input;
    let mut last_was_encoded = false;

    while let Some(start) = remaining.find("=?") {
        let before = &remaining[..start];
        // If the gap between two encoded words is only whitespace, skip it (RFC 2047 §6.2)
        if !last_was_encoded || !before.trim().is_empty() {
            result.push_str(before);
        }

        let after_start = &remaining[start + 2..];

        if let Some(decoded) = try_decode_one_word(after_start) {
            result.push_str(&decoded.text);
            remaining = &remaining[start + 2 + decoded.consumed..];
            last_was_encoded = true;
        } else {
            result.push_str("=?");
            remaining = after_start;
            last_was_encoded = false;
        }
    }

    result.push_str(remaining);
    result
}

struct DecodedWord {
    text: String,
    consumed: usize, // bytes consumed from the string *after* the initial "=?"
}

fn try_decode_one_word(s: &str) -> Option<DecodedWord> {
    // Format: charset?encoding?encoded_text?=
    let first_q = s.find('?')?;
    let charset = &s[..first_q];

    let rest = &s[first_q + 1..];
    let second_q = rest.find('?')?;
    let encoding = &rest[..second_q];

    let rest2 = &rest[second_q + 1..];
    let end = rest2.find("?=")?;
    let encoded_text = &rest2[..end];

    let total_consumed = first_q + 1 + second_q + 1 + end + 2;

    let bytes = match encoding.to_uppercase().as_str() {
        "B" => STANDARD
            .decode(encoded_text)
            .or_else(|_| STANDARD_NO_PAD.decode(encoded_text.trim_end_matches('=')))
            .ok()?,
        "Q" => decode_q_encoding(encoded_text),
        _ => return None,
    };

    Some(DecodedWord {
        text: decode_charset(charset, &bytes),
        consumed: total_consumed,
    })
}

/// Decode Q-encoding (RFC 2047): underscores → spaces, `=XX` → byte.
fn decode_q_encoding(input: &str) -> Vec<u8> {
    let mut result = Vec::with_capacity(input.len());
    let bytes = input.as_bytes();
    let mut i = 0;
    while i < bytes.len() {
        match bytes[i] {
            b'_' => {
                result.push(b' ');
                i += 1;
            }
            b'=' if i + 2 < bytes.len() => {
                if let Ok(byte) = u8::from_str_radix(
                    std::str::from_utf8(&bytes[i + 1..i + 3]).unwrap_or("00"),
                    16,
                ) {
                    result.push(byte);
                    i += 3;
                } else {
                    result.push(b'=');
                    i += 1;
                }
            }
            b => {
                result.push(b);
                i += 1;
            }
        }
    }
    result
}

/// Decode bytes using a named charset.
fn decode_charset(charset: &str, bytes: &[u8]) -> String {
    let charset_lower = charset.to_lowercase();
    match charset_lower.as_str() {
        "utf-8" | "utf8" => String::from_utf8_lossy(bytes).into_owned(),
        _ => {
            if let Some(encoding) = encoding_rs::Encoding::for_label(charset.as_bytes()) {
                let (decoded, _, _) = encoding.decode(bytes);
                decoded.into_owned()
            } else {
                warn!(
                    charset = charset,
                    "Unknown charset, falling back to UTF-8 lossy"
                );
                String::from_utf8_lossy(bytes).into_owned()
            }
        }
    }
}
