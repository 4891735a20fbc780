//! Placeholder substitution and MIME restructuring.
//!
//! The rewriter only runs when no copy of the image exists yet. It replaces
//! the placeholder in every `text/html` leaf and attaches the image next to
//! each modified leaf, with the nesting depending on the leaf's parent:
//!
//! - `multipart/alternative`: the leaf becomes a new `multipart/related`
//!   holding the leaf and the image, so the alternatives stay exclusive.
//! - `multipart/related`: the image is added as the leaf's next sibling.
//! - anything else: only the leaf is replaced; no image is attached.

use tracing::{debug, warn};

use crate::model::image::{ImageAsset, TransferEncoding, PLACEHOLDER};
use crate::model::part::{Header, Headers, LineEnding, MessagePart};

const ALTERNATIVE: &str = "multipart/alternative";
const RELATED: &str = "multipart/related";

/// Rewrite `part`'s subtree in place.
///
/// Returns true iff at least one placeholder was substituted anywhere below
/// `part`. Leaves and containers without HTML pass through untouched.
pub fn rewrite(part: &mut MessagePart, image: &ImageAsset, eol: LineEnding) -> bool {
    let parent_type = part.content_type().to_string();
    let Some(children) = part.children_mut() else {
        return false;
    };

    let mut substituted = false;
    let mut rebuilt = Vec::with_capacity(children.len() + 1);

    for mut child in std::mem::take(children) {
        if child.is_multipart() {
            substituted |= rewrite(&mut child, image, eol);
            rebuilt.push(child);
            continue;
        }
        if !is_html_body(&child) {
            rebuilt.push(child);
            continue;
        }
        match substitute(&child, image, eol) {
            Some(html) => {
                substituted = true;
                place(&parent_type, html, image, eol, &mut rebuilt);
            }
            None => rebuilt.push(child),
        }
    }

    *children = rebuilt;
    substituted
}

pub fn is_html_body(part: &MessagePart) -> bool {
    !part.is_multipart() && part.content_type() == "text/html"
}

/// Whether [`rewrite`] would substitute at least one placeholder below `part`.
pub fn has_placeholder(part: &MessagePart) -> bool {
    part.children().is_some_and(|children| {
        children.iter().any(|child| {
            if child.is_multipart() {
                has_placeholder(child)
            } else {
                is_html_body(child) && substitutable(child)
            }
        })
    })
}

/// Supported transfer encoding and a placeholder in the body.
fn substitutable(leaf: &MessagePart) -> bool {
    let encoding = leaf.header("Content-Transfer-Encoding");
    TransferEncoding::from_header(encoding.as_deref()).is_ok()
        && leaf
            .body()
            .is_some_and(|body| find(body, PLACEHOLDER.as_bytes()).is_some())
}

/// Copy of `leaf` with every placeholder replaced, or `None` when the leaf
/// has to stay as it is.
fn substitute(leaf: &MessagePart, image: &ImageAsset, eol: LineEnding) -> Option<MessagePart> {
    let encoding = leaf.header("Content-Transfer-Encoding");
    let encoding = match TransferEncoding::from_header(encoding.as_deref()) {
        Ok(encoding) => encoding,
        Err(e) => {
            warn!(error = %e, "Skipping HTML part");
            return None;
        }
    };

    let body = leaf.body()?;
    let reference = image.reference(encoding, eol);
    let Some(body) = replace_all(body, PLACEHOLDER.as_bytes(), reference.as_bytes()) else {
        debug!("HTML part has no placeholder");
        return None;
    };

    debug!(?encoding, "Placeholder replaced");
    Some(leaf.with_body(body))
}

/// Append the modified HTML leaf, and the image where the parent allows it.
fn place(
    parent_type: &str,
    html: MessagePart,
    image: &ImageAsset,
    eol: LineEnding,
    out: &mut Vec<MessagePart>,
) {
    match parent_type {
        ALTERNATIVE => {
            debug!("Wrapping HTML part and image in a new multipart/related");
            out.push(related_container(vec![html, image.to_part(eol)]));
        }
        RELATED => {
            debug!("Adding image to existing multipart/related");
            out.push(html);
            out.push(image.to_part(eol));
        }
        other => {
            debug!(parent = other, "HTML part is not inside alternative or related, image not attached");
            out.push(html);
        }
    }
}

fn related_container(children: Vec<MessagePart>) -> MessagePart {
    let boundary = format!("=_mimestamp_{}", uuid::Uuid::new_v4().simple());
    let headers: Headers = [
        Header::new("Content-Type", &format!("{RELATED}; boundary=\"{boundary}\"")),
        Header::new("MIME-Version", "1.0"),
    ]
    .into_iter()
    .collect();
    MessagePart::multipart(RELATED, headers, boundary, children)
}

/// Replace every occurrence of `needle`. `None` when there is none.
fn replace_all(haystack: &[u8], needle: &[u8], replacement: &[u8]) -> Option<Vec<u8>> {
    let mut out = Vec::new();
    let mut rest = haystack;
    let mut found = false;

    while let Some(pos) = find(rest, needle) {
        out.extend_from_slice(&rest[..pos]);
        out.extend_from_slice(replacement);
        rest = &rest[pos + needle.len()..];
        found = true;
    }

    if !found {
        return None;
    }
    out.extend_from_slice(rest);
    Some(out)
}

fn find(haystack: &[u8], needle: &[u8]) -> Option<usize> {
    haystack.windows(needle.len()).position(|w| w == needle)
}
