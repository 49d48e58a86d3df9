//! Content generator: brief in, single HTML page plus side-files out

use kiln_core::{Attachment, KilnError, Result};
use tracing::{debug, info};

use crate::attachments::prepare_attachments;
use crate::client::TextGenerator;
use crate::prompt::{build_prompt, PromptInput};
use crate::types::GeneratedArtifact;

/// Turns a brief into a page via one text-generation call
pub struct ContentGenerator<G: TextGenerator> {
    client: G,
    max_attachment_bytes: usize,
}

impl<G: TextGenerator> ContentGenerator<G> {
    pub fn new(client: G, max_attachment_bytes: usize) -> Self {
        Self {
            client,
            max_attachment_bytes,
        }
    }

    /// Generate the page for a brief
    ///
    /// `prior_artifact` switches the prompt to "modify". Binary attachments
    /// never reach the model; they come back in `binary_files`. Any
    /// transport failure, timeout or empty completion is a `Generation` error.
    pub async fn generate(
        &self,
        brief: &str,
        prior_artifact: Option<&str>,
        attachments: &[Attachment],
        checks: &[String],
    ) -> Result<GeneratedArtifact> {
        let bundle = prepare_attachments(attachments, self.max_attachment_bytes);

        let prompt = build_prompt(&PromptInput {
            prior_artifact,
            brief,
            attachments: &bundle.prompt_section,
            checks,
        });
        debug!("Built prompt ({} chars)", prompt.len());

        let raw = self.client.complete(&prompt).await.map_err(|e| match e {
            KilnError::Generation(_) => e,
            other => KilnError::Generation(other.to_string()),
        })?;

        let html = strip_code_fences(&raw);
        if html.is_empty() {
            return Err(KilnError::Generation(
                "model returned an empty document".to_string(),
            ));
        }

        info!(
            "Generated page ({} chars, {} binary side-files)",
            html.len(),
            bundle.binary_files.len()
        );

        Ok(GeneratedArtifact {
            html: html.to_string(),
            binary_files: bundle.binary_files,
        })
    }
}

/// Remove a surrounding markdown code fence, with or without a language tag
pub fn strip_code_fences(raw: &str) -> &str {
    let trimmed = raw.trim();
    let Some(rest) = trimmed.strip_prefix("```") else {
        return trimmed;
    };
    let body = rest.trim_start_matches(|c: char| c.is_ascii_alphanumeric());
    let body = body.trim_end();
    body.strip_suffix("```").unwrap_or(body).trim()
}
