//! One filter run: gate, scan, rewrite, persist.

use std::fmt;
use std::path::Path;

use chrono::Local;
use tracing::{debug, error, info, warn};

use super::rewriter::{has_placeholder, rewrite};
use super::scanner::{scan, Scan};
use crate::config::{Config, FilterConfig};
use crate::error::Result;
use crate::export::archive::{self, CopyKind};
use crate::export::eml::write_atomic;
use crate::model::address::{first_match, matches_any, Envelope};
use crate::model::image::ImageAsset;
use crate::model::part::Message;
use crate::parser::mime::parse_message;
use crate::store::reader::read_bounded;

/// Why a message was left alone before the tree was looked at.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SkipReason {
    /// Single-part messages are never modified.
    NotMultipart,
    /// Every recipient is inside the target domain.
    Internal,
    /// Matched this sender blacklist entry.
    SenderBlacklisted(String),
    /// The sender whitelist is set and nothing matched it.
    NotWhitelisted,
    /// Matched this receiver blacklist entry.
    ReceiverBlacklisted(String),
}

impl fmt::Display for SkipReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::NotMultipart => write!(f, "message is not multipart"),
            Self::Internal => write!(f, "all recipients are internal"),
            Self::SenderBlacklisted(entry) => write!(f, "sender blacklisted ({entry})"),
            Self::NotWhitelisted => write!(f, "sender not whitelisted"),
            Self::ReceiverBlacklisted(entry) => write!(f, "receiver blacklisted ({entry})"),
        }
    }
}

/// Result of the eligibility checks.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Gate {
    Pass,
    Skip(SkipReason),
}

/// Terminal state of a run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outcome {
    Skipped(SkipReason),
    /// The current image is already embedded.
    AlreadyCurrent,
    /// An older version of the image was replaced.
    Refreshed,
    /// The placeholder was substituted and the image attached.
    Inserted,
    /// No HTML part carried a usable placeholder.
    NoPlaceholder,
}

impl Outcome {
    /// Whether the run produced a new version of the message.
    pub fn modifies_message(&self) -> bool {
        matches!(self, Self::Refreshed | Self::Inserted)
    }
}

impl fmt::Display for Outcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Skipped(reason) => write!(f, "skipped: {reason}"),
            Self::AlreadyCurrent => write!(f, "image already current"),
            Self::Refreshed => write!(f, "image refreshed"),
            Self::Inserted => write!(f, "image inserted"),
            Self::NoPlaceholder => write!(f, "no placeholder found"),
        }
    }
}

/// Outcome of [`process_bytes`] plus the new message bytes, if any.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Processed {
    pub outcome: Outcome,
    /// Set iff the outcome modifies the message.
    pub output: Option<Vec<u8>>,
}

/// Outcome of [`process_mail_file`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Report {
    pub outcome: Outcome,
    /// The message file was replaced.
    pub written: bool,
}

/// Run the eligibility checks in order; the first one that applies wins.
pub fn gate(message: &Message, filter: &FilterConfig) -> Gate {
    if !message.is_multipart() {
        info!("Message is not multipart, skipping");
        return Gate::Skip(SkipReason::NotMultipart);
    }

    let envelope = Envelope::from_message(message);
    debug!(
        senders = ?envelope.senders,
        recipients = ?envelope.recipients,
        "Extracted addresses"
    );

    // An empty recipient list counts as internal.
    if envelope
        .recipients
        .iter()
        .all(|r| r.contains(&filter.target_domain))
    {
        info!(domain = %filter.target_domain, "All recipients are internal, skipping");
        return Gate::Skip(SkipReason::Internal);
    }

    let senders = envelope.addresses(filter.sender_source);
    if let Some(entry) = first_match(senders, filter.sender_blacklist.as_slice()) {
        info!(entry, "Sender is blacklisted, skipping");
        return Gate::Skip(SkipReason::SenderBlacklisted(entry.to_string()));
    }
    if !filter.sender_whitelist.is_empty()
        && !senders
            .iter()
            .any(|sender| matches_any(sender, filter.sender_whitelist.as_slice()))
    {
        info!("Sender is not whitelisted, skipping");
        return Gate::Skip(SkipReason::NotWhitelisted);
    }

    let receivers = envelope.addresses(filter.receiver_source);
    if let Some(entry) = first_match(receivers, filter.receiver_blacklist.as_slice()) {
        info!(entry, "Receiver is blacklisted, skipping");
        return Gate::Skip(SkipReason::ReceiverBlacklisted(entry.to_string()));
    }

    Gate::Pass
}

/// Process one message held in memory. Never touches the message file.
///
/// Detection only needs the image's naming, so `load_image` is called only
/// when a stale copy gets replaced or a placeholder gets substituted. A
/// missing image therefore fails no message that would stay unchanged.
pub fn process_bytes<F>(raw: &[u8], config: &Config, load_image: F) -> Result<Processed>
where
    F: FnOnce() -> Result<ImageAsset>,
{
    let mut message = parse_message(raw)?;

    if let Gate::Skip(reason) = gate(&message, &config.filter) {
        return Ok(Processed {
            outcome: Outcome::Skipped(reason),
            output: None,
        });
    }

    let eol = message.line_ending;
    let naming = ImageAsset::from_config(&config.image, Vec::new());

    match scan(&message.root, &naming, eol) {
        Scan::Current => {
            info!("Current image already attached, nothing to do");
            return Ok(Processed {
                outcome: Outcome::AlreadyCurrent,
                output: None,
            });
        }
        Scan::Continued(report) if report.changed => {
            let image = load_image()?;
            // Same tree and naming as above, so this scan replaces the same parts.
            if let Scan::Continued(report) = scan(&message.root, &image, eol) {
                message.root = message.root.with_children(report.children);
            }
            info!(filename = %image.filename, "Refreshed outdated image");
            return Ok(Processed {
                outcome: Outcome::Refreshed,
                output: Some(message.to_bytes()),
            });
        }
        Scan::Continued(_) => debug!("No image attached yet"),
    }

    if !has_placeholder(&message.root) {
        info!("No placeholder found, message unchanged");
        return Ok(Processed {
            outcome: Outcome::NoPlaceholder,
            output: None,
        });
    }

    let image = load_image()?;
    rewrite(&mut message.root, &image, eol);
    info!(filename = %image.filename, "Inserted image");
    Ok(Processed {
        outcome: Outcome::Inserted,
        output: Some(message.to_bytes()),
    })
}

/// Process the message stored at `path` and write the result back in place.
///
/// Nothing is written in dry-run mode. When archiving is configured, the
/// input and output are copied into the archive directory, and the input is
/// always copied there as `.error.eml` if processing fails.
pub fn process_mail_file(path: &Path, config: &Config) -> Result<Report> {
    let timeout = config.general.read_timeout();
    let base = archive::base_name(Local::now());

    let raw = read_bounded(path, timeout)?;
    debug!(path = %path.display(), size = raw.len(), "Read message");
    archive::save_copy(&config.archive, &base, CopyKind::Input, &raw);

    let processed = match process_bytes(&raw, config, || ImageAsset::load(&config.image, timeout)) {
        Ok(processed) => processed,
        Err(e) => {
            error!(path = %path.display(), error = %e, "Failed to process message");
            archive::save_copy(&config.archive, &base, CopyKind::Error, &raw);
            return Err(e);
        }
    };

    let written = match &processed.output {
        Some(_) if config.general.dry_run => {
            warn!(outcome = %processed.outcome, "Dry run, message not written");
            false
        }
        Some(output) => {
            if let Err(e) = write_atomic(path, output) {
                error!(path = %path.display(), error = %e, "Failed to write message");
                archive::save_copy(&config.archive, &base, CopyKind::Error, &raw);
                return Err(e);
            }
            true
        }
        None => false,
    };

    let final_bytes = match &processed.output {
        Some(output) if written => output.as_slice(),
        _ => raw.as_slice(),
    };
    archive::save_copy(&config.archive, &base, CopyKind::Output, final_bytes);

    Ok(Report {
        outcome: processed.outcome,
        written,
    })
}
