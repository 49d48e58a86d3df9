//! Attachment decoding and classification
//!
//! Text attachments are inlined into the prompt. Everything else is kept out
//! of the prompt, referenced by name only, and returned for the caller to
//! commit as a `.b64` side-file. Nothing here is fatal: a bad or oversized
//! attachment is skipped with a warning.

use base64::Engine as _;
use kiln_core::{sanitize_name, Attachment, KilnError, Result};
use tracing::warn;

use crate::types::BinaryFile;

const TEXT_MIME_TYPES: &[&str] = &["application/json", "application/javascript"];

/// How an attachment will be used
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AttachmentKind {
    /// UTF-8 text, inlined into the prompt
    Text(String),
    /// Declared as text but not valid UTF-8
    UndecodableText,
    /// Opaque bytes, committed as a side-file
    Binary(Vec<u8>),
    /// Decoded payload above the size cap
    Oversized { size: usize },
    /// Not a usable data URI
    Malformed(String),
}

/// An attachment after decoding
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DecodedAttachment {
    pub name: String,
    pub safe_name: String,
    pub mime: String,
    pub kind: AttachmentKind,
}

/// Prompt text and side-files derived from a job's attachments
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AttachmentBundle {
    pub prompt_section: String,
    pub binary_files: Vec<BinaryFile>,
}

/// Split a `data:<mime>[;base64],<payload>` URI into its MIME type and bytes
pub fn parse_data_uri(uri: &str) -> Result<(String, Vec<u8>)> {
    let rest = uri
        .strip_prefix("data:")
        .ok_or_else(|| KilnError::Attachment("not a data URI".to_string()))?;
    let (header, payload) = rest
        .split_once(',')
        .ok_or_else(|| KilnError::Attachment("data URI has no payload separator".to_string()))?;

    let mut params = header.split(';');
    let mime = match params.next() {
        Some(m) if !m.trim().is_empty() => m.trim().to_ascii_lowercase(),
        _ => "text/plain".to_string(),
    };
    let is_base64 = params.any(|p| p.trim().eq_ignore_ascii_case("base64"));

    let bytes = if is_base64 {
        base64::engine::general_purpose::STANDARD
            .decode(payload.trim())
            .map_err(|e| KilnError::Attachment(format!("invalid base64 payload: {}", e)))?
    } else {
        payload.as_bytes().to_vec()
    };

    Ok((mime, bytes))
}

fn is_text_mime(mime: &str) -> bool {
    mime.starts_with("text/") || TEXT_MIME_TYPES.contains(&mime)
}

/// Decode and classify one attachment against the size cap
pub fn classify(attachment: &Attachment, max_bytes: usize) -> DecodedAttachment {
    let safe_name = sanitize_name(&attachment.name);

    let (mime, kind) = match parse_data_uri(&attachment.data_uri) {
        Err(e) => (String::new(), AttachmentKind::Malformed(e.to_string())),
        Ok((mime, bytes)) if bytes.len() > max_bytes => {
            let size = bytes.len();
            (mime, AttachmentKind::Oversized { size })
        }
        Ok((mime, bytes)) if is_text_mime(&mime) => {
            let kind = match String::from_utf8(bytes) {
                Ok(text) => AttachmentKind::Text(text),
                Err(_) => AttachmentKind::UndecodableText,
            };
            (mime, kind)
        }
        Ok((mime, bytes)) => (mime, AttachmentKind::Binary(bytes)),
    };

    DecodedAttachment {
        name: attachment.name.clone(),
        safe_name,
        mime,
        kind,
    }
}

/// Classify every attachment and assemble the prompt section and side-files
///
/// Binary files are keyed by sanitized name; a later attachment with the same
/// name replaces an earlier one.
pub fn prepare_attachments(attachments: &[Attachment], max_bytes: usize) -> AttachmentBundle {
    let mut bundle = AttachmentBundle::default();

    for attachment in attachments {
        let decoded = classify(attachment, max_bytes);
        let section = match decoded.kind {
            AttachmentKind::Text(text) => {
                format!("\n\n--- Attachment: `{}` ---\n```\n{}\n```", decoded.name, text)
            }
            AttachmentKind::UndecodableText => {
                warn!("Attachment {} is not valid UTF-8 text", decoded.name);
                format!(
                    "\n\n--- Attachment: `{}` (text but decode failed) ---",
                    decoded.name
                )
            }
            AttachmentKind::Binary(bytes) => {
                let section = format!(
                    "\n\n--- Attachment: `{0}` (Binary file saved to repo as `{0}.b64`) ---",
                    decoded.safe_name
                );
                let file = BinaryFile {
                    name: decoded.safe_name,
                    bytes,
                };
                match bundle.binary_files.iter_mut().find(|f| f.name == file.name) {
                    Some(existing) => *existing = file,
                    None => bundle.binary_files.push(file),
                }
                section
            }
            AttachmentKind::Oversized { size } => {
                warn!(
                    "Attachment {} too large ({} bytes, limit {}). Skipping.",
                    decoded.name, size, max_bytes
                );
                format!(
                    "\n\n--- Attachment: `{}` (skipped: {} bytes exceeds the {} byte limit; not embedded) ---",
                    decoded.safe_name, size, max_bytes
                )
            }
            AttachmentKind::Malformed(reason) => {
                warn!("Could not process attachment '{}': {}", decoded.name, reason);
                format!(
                    "\n\n--- Attachment: `{}` (skipped: could not be decoded) ---",
                    decoded.safe_name
                )
            }
        };
        bundle.prompt_section.push_str(&section);
    }

    bundle
}
