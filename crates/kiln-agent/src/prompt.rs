//! Prompt assembly for page generation

/// Everything the prompt embeds
#[derive(Debug, Clone, Default)]
pub struct PromptInput<'a> {
    /// Current published page, present on revision rounds
    pub prior_artifact: Option<&'a str>,
    pub brief: &'a str,
    /// Pre-rendered attachment section
    pub attachments: &'a str,
    pub checks: &'a [String],
}

/// Build the single prompt message sent to the text-generation service
pub fn build_prompt(input: &PromptInput<'_>) -> String {
    let action = if input.prior_artifact.is_some() {
        "modify an existing HTML file"
    } else {
        "create a new, self-contained `index.html` file"
    };

    let mut prompt = format!(
        "You are an elite software engineer. Your task is to {action}.\n\
         Analyze the user's brief, attachments, and technical requirements.\n\
         Your output must be ONLY the complete, final, raw HTML code, starting with `<!DOCTYPE html>`.\n\
         Do not include any explanations, comments, or markdown. For external libraries, use public CDNs.\n\
         All technical requirements are mandatory.\n\n"
    );

    if let Some(existing) = input.prior_artifact {
        prompt.push_str(&format!("**EXISTING CODE:**\n```html\n{}\n```\n", existing));
    }

    prompt.push_str(&format!("**USER'S BRIEF:** \"{}\"\n", input.brief));
    prompt.push_str(input.attachments);

    if !input.checks.is_empty() {
        prompt.push_str("\n\n**Technical Implementation Requirements (CRITICAL):**\n");
        for (i, check) in input.checks.iter().enumerate() {
            prompt.push_str(&format!(
                "{}. The generated webpage MUST pass this JavaScript evaluation: `{}`\n",
                i + 1,
                check
            ));
        }
    }

    prompt
}
