//! Read-only view of a message as the filter sees it.

use serde::Serialize;

use super::process::{gate, Gate};
use super::rewriter::is_html_body;
use super::scanner::{classify, scan, Classification, Scan};
use crate::config::Config;
use crate::model::image::{ImageAsset, PLACEHOLDER};
use crate::model::part::{LineEnding, Message, MessagePart};

/// State of the embedded image, for the whole message or a single part.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ImageState {
    Current,
    Stale,
    Absent,
}

impl ImageState {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Current => "current",
            Self::Stale => "stale",
            Self::Absent => "absent",
        }
    }
}

/// One node of the MIME tree, in depth-first order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct OutlineEntry {
    pub depth: usize,
    pub content_type: String,
    /// Raw body size; zero for containers.
    pub size: usize,
    pub transfer_encoding: Option<String>,
    /// HTML part containing the placeholder.
    pub placeholder: bool,
    /// Set on parts recognized as the image.
    pub image: Option<ImageState>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Inspection {
    pub message_id: Option<String>,
    pub from: Option<String>,
    pub to: Option<String>,
    pub cc: Option<String>,
    pub line_ending: LineEnding,
    /// `None` when the message passes every gate, else the skip reason.
    pub skip: Option<String>,
    pub image: ImageState,
    pub outline: Vec<OutlineEntry>,
}

/// Describe `message` without changing it. The image file is not read.
pub fn inspect(message: &Message, config: &Config) -> Inspection {
    let image = ImageAsset::from_config(&config.image, Vec::new());

    let skip = match gate(message, &config.filter) {
        Gate::Pass => None,
        Gate::Skip(reason) => Some(reason.to_string()),
    };

    let state = match scan(&message.root, &image, message.line_ending) {
        Scan::Current => ImageState::Current,
        Scan::Continued(report) if report.found => ImageState::Stale,
        Scan::Continued(_) => ImageState::Absent,
    };

    let mut outline = Vec::with_capacity(message.root.node_count());
    walk(&message.root, &image, 0, &mut outline);

    Inspection {
        message_id: message.message_id(),
        from: message.from(),
        to: message.to(),
        cc: message.cc(),
        line_ending: message.line_ending,
        skip,
        image: state,
        outline,
    }
}

fn walk(part: &MessagePart, image: &ImageAsset, depth: usize, out: &mut Vec<OutlineEntry>) {
    let body = part.body().unwrap_or_default();
    let image_state = match classify(part, image) {
        Classification::Current => Some(ImageState::Current),
        Classification::Stale => Some(ImageState::Stale),
        Classification::NotTarget => None,
    };

    out.push(OutlineEntry {
        depth,
        content_type: part.content_type().to_string(),
        size: body.len(),
        transfer_encoding: part.header("Content-Transfer-Encoding"),
        placeholder: is_html_body(part) && contains(body, PLACEHOLDER.as_bytes()),
        image: image_state,
    });

    for child in part.children().unwrap_or_default() {
        walk(child, image, depth + 1, out);
    }
}

fn contains(haystack: &[u8], needle: &[u8]) -> bool {
    haystack.windows(needle.len()).any(|w| w == needle)
}
