//! Built-in prompts, prompt assembly, and parsing of model replies.
//!
//! Organisations can override each [`PromptKey`]; the override (or the
//! default below) becomes the system instruction, and the builders here
//! produce the user turn from the brief or client at hand.

use once_cell::sync::Lazy;
use regex::Regex;
use serde::Deserialize;

use bastion_core::defaults::CONVERSATION_TITLE_LEN;
use bastion_core::{
    Brief, BriefSection, Client, Error, NewBriefSection, PromptKey, Result, SectionTemplate,
};

pub const DEFAULT_BRIEF_EXPANSION_PROMPT: &str = "\
You are a senior strategist at a creative agency. Expand the client brief you are given \
into a complete working brief. Write one entry per requested section, in the order given, \
following each section's instructions. Use the attached documents and the client summary \
for facts about the client; do not invent figures, names, or claims. Write in clear, \
direct British English.

Respond with JSON only, in the form {\"sections\": [{\"title\": \"...\", \"content\": \"...\"}]}. \
Section content may use Markdown.";

pub const DEFAULT_SECTION_REGENERATION_PROMPT: &str = "\
You are a senior strategist at a creative agency, revising one section of a client brief. \
Rewrite the section so it follows its instructions and any extra direction from the user, \
stays consistent with the rest of the brief, and uses only facts found in the brief, the \
client summary, or the attached documents. Respond with the new section content only, in \
Markdown, without repeating the section title.";

pub const DEFAULT_KB_CHAT_PROMPT: &str = "\
You are the knowledge base assistant for an agency client. Answer questions using the \
attached client documents. When the documents do not contain the answer, say so plainly \
rather than guessing. Mention which document an answer comes from when it helps. Keep \
answers concise and use Markdown for lists and tables.";

pub const DEFAULT_KB_DIGEST_PROMPT: &str = "\
You maintain a briefing summary of an agency client, built from the documents they have \
shared. Summarise who the client is, what they sell, their audiences, brand voice, \
competitors, recent campaigns, and any constraints or mandatories. Prefer concrete facts \
over generalities, and note where documents disagree. Respond in Markdown, under 800 words.";

/// Built-in prompt for a key.
pub fn default_prompt(key: PromptKey) -> &'static str {
    match key {
        PromptKey::BriefExpansion => DEFAULT_BRIEF_EXPANSION_PROMPT,
        PromptKey::SectionRegeneration => DEFAULT_SECTION_REGENERATION_PROMPT,
        PromptKey::KbChat => DEFAULT_KB_CHAT_PROMPT,
        PromptKey::KbDigest => DEFAULT_KB_DIGEST_PROMPT,
    }
}

fn push_client(out: &mut String, client: &Client) {
    out.push_str(&format!("Client: {}\n", client.name));
    if let Some(industry) = client.industry.as_deref().filter(|s| !s.trim().is_empty()) {
        out.push_str(&format!("Industry: {}\n", industry));
    }
    if let Some(description) = client
        .description
        .as_deref()
        .filter(|s| !s.trim().is_empty())
    {
        out.push_str(&format!("About: {}\n", description.trim()));
    }
}

fn push_digest(out: &mut String, digest: Option<&str>) {
    if let Some(digest) = digest.filter(|d| !d.trim().is_empty()) {
        out.push_str("\n## Client summary\n\n");
        out.push_str(digest.trim());
        out.push('\n');
    }
}

/// User turn for expanding a brief into the template's sections.
pub fn expansion_prompt(brief: &Brief, sections: &[SectionTemplate], client: &Client) -> String {
    let mut out = String::new();
    push_client(&mut out, client);
    out.push_str(&format!("Brief title: {}\n", brief.title));

    out.push_str("\n## Sections\n\n");
    if sections.is_empty() {
        out.push_str("Choose sections appropriate to a campaign brief.\n");
    }
    for (i, section) in sections.iter().enumerate() {
        out.push_str(&format!("{}. {}\n", i + 1, section.title));
        if let Some(instructions) = section
            .instructions
            .as_deref()
            .filter(|s| !s.trim().is_empty())
        {
            out.push_str(&format!("   Instructions: {}\n", instructions.trim()));
        }
    }

    out.push_str("\n## Brief input\n\n");
    if brief.input.trim().is_empty() {
        out.push_str("(No written input. Work from the attached documents.)\n");
    } else {
        out.push_str(brief.input.trim());
        out.push('\n');
    }

    push_digest(&mut out, client.kb_digest.as_deref());
    out
}

/// User turn for rewriting one section of an expanded brief.
pub fn regeneration_prompt(
    brief: &Brief,
    all_sections: &[BriefSection],
    target: &BriefSection,
    section_instructions: Option<&str>,
    user_instructions: Option<&str>,
    client: &Client,
) -> String {
    let mut out = String::new();
    push_client(&mut out, client);
    out.push_str(&format!("Brief title: {}\n", brief.title));

    out.push_str("\n## Brief input\n\n");
    out.push_str(brief.input.trim());
    out.push('\n');

    out.push_str("\n## Current brief\n");
    for section in all_sections {
        out.push_str(&format!("\n### {}\n\n{}\n", section.title, section.content.trim()));
    }

    out.push_str(&format!("\n## Section to rewrite: {}\n", target.title));
    if let Some(instructions) = section_instructions.filter(|s| !s.trim().is_empty()) {
        out.push_str(&format!("\nSection instructions: {}\n", instructions.trim()));
    }
    if let Some(direction) = user_instructions.filter(|s| !s.trim().is_empty()) {
        out.push_str(&format!("\nDirection from the user: {}\n", direction.trim()));
    }

    push_digest(&mut out, client.kb_digest.as_deref());
    out
}

/// System instruction for KB chat: the effective prompt plus client context.
pub fn kb_chat_system(base_prompt: &str, client: &Client) -> String {
    let mut out = String::with_capacity(base_prompt.len() + 256);
    out.push_str(base_prompt.trim());
    out.push_str("\n\n");
    push_client(&mut out, client);
    push_digest(&mut out, client.kb_digest.as_deref());
    out
}

/// User turn asking for a fresh client digest over `file_count` documents.
pub fn digest_prompt(client: &Client, file_count: usize) -> String {
    let mut out = String::new();
    push_client(&mut out, client);
    out.push_str(&format!(
        "\nWrite the client summary from the {} attached document{}.\n",
        file_count,
        if file_count == 1 { "" } else { "s" }
    ));
    out
}

static OUTER_FENCE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?s)```[\w-]*[ \t]*\r?\n(.*)\n[ \t]*```").expect("valid fence regex")
});

/// Body between the first opening and the last closing Markdown fence, or the
/// trimmed text when the reply is not fenced.
///
/// Fences nested inside the body are kept.
///
/// ```
/// use bastion_inference::prompts::strip_code_fences;
///
/// assert_eq!(strip_code_fences("```json\n{\"a\": 1}\n```"), "{\"a\": 1}");
/// assert_eq!(strip_code_fences("  {\"a\": 1} "), "{\"a\": 1}");
/// ```
pub fn strip_code_fences(text: &str) -> &str {
    match OUTER_FENCE.captures(text).and_then(|c| c.get(1)) {
        Some(body) => body.as_str().trim(),
        None => text.trim(),
    }
}

#[derive(Debug, Deserialize)]
struct ExpandedSection {
    #[serde(default)]
    title: Option<String>,
    #[serde(default)]
    content: String,
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum ExpansionReply {
    Wrapped { sections: Vec<ExpandedSection> },
    Bare(Vec<ExpandedSection>),
}

/// Parse the model's expansion reply and map it onto the template sections.
///
/// Sections are matched by position. Template sections the reply leaves out
/// get empty content and extra reply entries are ignored. With no template
/// sections the reply's own titles are used.
pub fn parse_expansion_response(
    text: &str,
    sections: &[SectionTemplate],
) -> Result<Vec<NewBriefSection>> {
    let reply: ExpansionReply = match serde_json::from_str(text.trim()) {
        Ok(reply) => reply,
        Err(_) => serde_json::from_str(strip_code_fences(text)).map_err(|e| {
            Error::Inference(format!("Could not parse expansion response: {}", e))
        })?,
    };
    let mut expanded = match reply {
        ExpansionReply::Wrapped { sections } | ExpansionReply::Bare(sections) => sections,
    }
    .into_iter();

    if sections.is_empty() {
        return Ok(expanded
            .enumerate()
            .map(|(i, s)| NewBriefSection {
                section_template_id: None,
                title: s
                    .title
                    .filter(|t| !t.trim().is_empty())
                    .unwrap_or_else(|| format!("Section {}", i + 1)),
                content: s.content.trim().to_string(),
            })
            .collect());
    }

    Ok(sections
        .iter()
        .map(|template| NewBriefSection {
            section_template_id: Some(template.id),
            title: template.title.clone(),
            content: expanded
                .next()
                .map(|s| s.content.trim().to_string())
                .unwrap_or_default(),
        })
        .collect())
}

/// Conversation title derived from the first message.
///
/// Whitespace is collapsed and long messages are cut at a word boundary.
pub fn conversation_title(first_message: &str) -> String {
    let collapsed = first_message.split_whitespace().collect::<Vec<_>>().join(" ");
    if collapsed.chars().count() <= CONVERSATION_TITLE_LEN {
        return collapsed;
    }

    let cut: String = collapsed.chars().take(CONVERSATION_TITLE_LEN).collect();
    let trimmed = match cut.rfind(' ') {
        Some(pos) if pos > CONVERSATION_TITLE_LEN / 2 => &cut[..pos],
        _ => cut.as_str(),
    };
    format!("{}...", trimmed.trim_end())
}
