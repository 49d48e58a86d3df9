//! # kiln-agent
//!
//! Text-generation client and content generator for Kiln.
//!
//! A generation call is stateless: the prompt carries the brief, the prior
//! page on revision rounds, inlined text attachments and the mandatory
//! checks. Binary attachments are never sent to the model; they are returned
//! to the caller to be committed as base64 side-files.

mod attachments;
mod client;
mod generator;
mod prompt;
mod types;

pub use attachments::{
    classify, parse_data_uri, prepare_attachments, AttachmentBundle, AttachmentKind,
    DecodedAttachment,
};
pub use client::{ChatClient, TextGenerator};
pub use generator::{strip_code_fences, ContentGenerator};
pub use prompt::{build_prompt, PromptInput};
pub use types::*;
