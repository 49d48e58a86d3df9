//! Project file set: page, readme, license and binary side-files

use base64::Engine as _;
use chrono::{Datelike, NaiveDate};
use kiln_agent::GeneratedArtifact;

pub const PAGE_PATH: &str = "index.html";
pub const README_PATH: &str = "README.md";
pub const LICENSE_PATH: &str = "LICENSE";

/// One file to publish for a round
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SiteFile {
    pub path: String,
    pub message: String,
    pub content: Vec<u8>,
}

impl SiteFile {
    fn new(path: &str, message: String, content: impl Into<Vec<u8>>) -> Self {
        Self {
            path: path.to_string(),
            message,
            content: content.into(),
        }
    }
}

/// What the file set depends on besides the artifact
#[derive(Debug, Clone)]
pub struct SiteContext<'a> {
    pub round: u32,
    pub repo_name: &'a str,
    pub owner: &'a str,
    pub brief: &'a str,
    pub pages_url: &'a str,
    pub today: NaiveDate,
    /// Current readme, read before a revision round
    pub existing_readme: Option<&'a str>,
}

/// Human title for a repository name: dashes become spaces, words title-cased
pub fn title_from_name(name: &str) -> String {
    let mut title = String::with_capacity(name.len());
    let mut prev_alpha = false;
    for c in name.chars() {
        let c = if c == '-' { ' ' } else { c };
        if c.is_alphabetic() {
            if prev_alpha {
                title.extend(c.to_lowercase());
            } else {
                title.extend(c.to_uppercase());
            }
            prev_alpha = true;
        } else {
            title.push(c);
            prev_alpha = false;
        }
    }
    title
}

pub fn initial_readme(repo_name: &str, brief: &str, pages_url: &str) -> String {
    format!(
        "# {title}\n\n\
         ## Project Summary\n\n\
         This repository hosts a web application automatically generated from a natural-language brief.\n\n\
         **Brief:** \"{brief}\"\n\n\
         ## Live Application\n\n\
         The deployed application can be viewed at:\n\
         {pages_url}\n",
        title = title_from_name(repo_name),
    )
}

/// Existing readme followed by a dated section for this round
///
/// The existing content is always an unchanged prefix of the result.
pub fn append_revision(existing: &str, round: u32, brief: &str, today: NaiveDate) -> String {
    format!(
        "{existing}\n\n### Round {round} Update ({date})\n\n> {brief}",
        date = today.format("%Y-%m-%d"),
    )
}

pub fn mit_license(year: i32, holder: &str) -> String {
    format!(
        "MIT License\n\n\
         Copyright (c) {year} {holder}\n\n\
         Permission is hereby granted, free of charge, to any person obtaining a copy\n\
         of this software and associated documentation files (the \"Software\"), to deal\n\
         in the Software without restriction, including without limitation the rights\n\
         to use, copy, modify, merge, publish, distribute, sublicense, and/or sell\n\
         copies of the Software, and to permit persons to whom the Software is\n\
         furnished to do so, subject to the following conditions:\n\n\
         The above copyright notice and this permission notice shall be included in all\n\
         copies or substantial portions of the Software.\n\n\
         THE SOFTWARE IS PROVIDED \"AS IS\", WITHOUT WARRANTY OF ANY KIND, EXPRESS OR\n\
         IMPLIED, INCLUDING BUT NOT LIMITED TO THE WARRANTIES OF MERCHANTABILITY,\n\
         FITNESS FOR A PARTICULAR PURPOSE AND NONINFRINGEMENT. IN NO EVENT SHALL THE\n\
         AUTHORS OR COPYRIGHT HOLDERS BE LIABLE FOR ANY CLAIM, DAMAGES OR OTHER\n\
         LIABILITY, WHETHER IN AN ACTION OF CONTRACT, TORT OR OTHERWISE, ARISING FROM,\n\
         OUT OF OR IN CONNECTION WITH THE SOFTWARE OR THE USE OR OTHER DEALINGS IN THE\n\
         SOFTWARE.\n"
    )
}

/// Repository path for a binary side-file
pub fn side_file_path(name: &str) -> String {
    format!("{}.b64", name)
}

/// Files to publish for a round, in write order
///
/// Round 1: page, fresh readme, license, side-files. Later rounds: page,
/// appended readme, side-files.
pub fn plan_files(ctx: &SiteContext<'_>, artifact: &GeneratedArtifact) -> Vec<SiteFile> {
    let mut files = if ctx.round <= 1 {
        vec![
            SiteFile::new(
                PAGE_PATH,
                "Create/Update application code".to_string(),
                artifact.html.as_bytes(),
            ),
            SiteFile::new(
                README_PATH,
                "Create/Update README".to_string(),
                initial_readme(ctx.repo_name, ctx.brief, ctx.pages_url),
            ),
            SiteFile::new(
                LICENSE_PATH,
                "Create/Update LICENSE".to_string(),
                mit_license(ctx.today.year(), ctx.owner),
            ),
        ]
    } else {
        vec![
            SiteFile::new(
                PAGE_PATH,
                format!("Update webpage for Round {}", ctx.round),
                artifact.html.as_bytes(),
            ),
            SiteFile::new(
                README_PATH,
                format!("Update README for Round {}", ctx.round),
                append_revision(
                    ctx.existing_readme.unwrap_or_default(),
                    ctx.round,
                    ctx.brief,
                    ctx.today,
                ),
            ),
        ]
    };

    for binary in &artifact.binary_files {
        let path = side_file_path(&binary.name);
        files.push(SiteFile {
            message: format!("Add/Update binary attachment {}", path),
            content: base64::engine::general_purpose::STANDARD
                .encode(&binary.bytes)
                .into_bytes(),
            path,
        });
    }

    files
}
