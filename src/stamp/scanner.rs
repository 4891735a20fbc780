//! Detection of a previously embedded image.
//!
//! The scan walks the tree post-order. A current copy of the image anywhere
//! stops the whole scan: the message was already processed and nothing in
//! it may change. A stale copy (older file name) is swapped for a freshly
//! built part while the rest of the tree is rebuilt around it.

use tracing::{debug, trace};

use crate::model::image::{ImageAsset, IMAGE_CONTENT_TYPE};
use crate::model::part::{LineEnding, MessagePart};

/// Result of scanning one container.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Scan {
    /// The current image was found; scanning stopped and nothing was rebuilt.
    Current,
    /// The scan visited every child.
    Continued(ScanReport),
}

/// What a completed scan found, with the container's rebuilt children.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ScanReport {
    /// A copy of the image exists somewhere in the subtree.
    pub found: bool,
    /// At least one stale copy was replaced. Implies `found`.
    pub changed: bool,
    /// The container's children with every replacement applied.
    pub children: Vec<MessagePart>,
}

/// How a single leaf relates to the configured image.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Classification {
    NotTarget,
    Current,
    Stale,
}

/// Classify a leaf.
///
/// It is the image only if it is `image/jpeg` and carries both a
/// `Content-Disposition` and the expected `Content-ID`. It is current when
/// the disposition names the configured file.
pub fn classify(part: &MessagePart, image: &ImageAsset) -> Classification {
    if part.content_type() != IMAGE_CONTENT_TYPE {
        return Classification::NotTarget;
    }
    let (Some(disposition), Some(content_id)) = (
        part.header("Content-Disposition"),
        part.header("Content-ID"),
    ) else {
        trace!("Image part without Content-Disposition or Content-ID");
        return Classification::NotTarget;
    };
    if content_id != image.content_id() {
        trace!(%content_id, "Content-ID doesn't have expected value");
        return Classification::NotTarget;
    }
    if disposition == image.content_disposition() {
        Classification::Current
    } else {
        debug!(%disposition, "Embedded image has an outdated Content-Disposition");
        Classification::Stale
    }
}

/// Scan a container's children.
///
/// A leaf has nothing to scan and yields an empty, not-found report.
pub fn scan(part: &MessagePart, image: &ImageAsset, eol: LineEnding) -> Scan {
    let Some(children) = part.children() else {
        return Scan::Continued(ScanReport::default());
    };

    let mut report = ScanReport {
        children: Vec::with_capacity(children.len()),
        ..ScanReport::default()
    };

    for child in children {
        let (found, changed, rebuilt) = if child.is_multipart() {
            match scan(child, image, eol) {
                Scan::Current => return Scan::Current,
                Scan::Continued(sub) => (sub.found, sub.changed, child.with_children(sub.children)),
            }
        } else {
            match classify(child, image) {
                Classification::Current => {
                    debug!("Current image already embedded");
                    return Scan::Current;
                }
                Classification::Stale => {
                    debug!("Replacing existing image attachment");
                    (true, true, image.to_part(eol))
                }
                Classification::NotTarget => (false, false, child.clone()),
            }
        };

        report.found |= found;
        report.changed |= changed;
        report.children.push(rebuilt);
    }

    Scan::Continued(report)
}
