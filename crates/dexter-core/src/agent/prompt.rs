//! System prompt assembly.
//!
//! [`SystemPromptBuilder`] joins a preamble and headed sections with blank
//! lines, skipping empty ones. [`build_system_prompt`] uses it to produce
//! the prompt every run starts with.

use crate::tools::core::ToolRegistry;
use chrono::Local;

/// Preamble used when the config does not supply one.
pub const DEFAULT_PREAMBLE: &str = "You are Dexter, an autonomous research agent for financial analysis. \
Break the user's question into the data you need, gather it with the available tools, \
and answer with specific figures and their sources. \
Do not call a tool again with arguments you have already used; reuse the earlier result.";

/// Builder for multi-section system prompts.
///
/// ```
/// use dexter_core::agent::prompt::SystemPromptBuilder;
///
/// let prompt = SystemPromptBuilder::new("You are a research agent.")
///     .section("Current date", "Monday, March 2, 2026")
///     .section_opt("Missing", None::<String>)
///     .build();
///
/// assert!(prompt.contains("## Current date"));
/// assert!(!prompt.contains("## Missing"));
/// ```
pub struct SystemPromptBuilder {
    sections: Vec<String>,
}

impl SystemPromptBuilder {
    /// Start with a preamble, included as-is.
    pub fn new(preamble: impl Into<String>) -> Self {
        Self {
            sections: vec![preamble.into()],
        }
    }

    /// Append a `## heading` section. Skipped if `content` is empty.
    pub fn section(mut self, heading: &str, content: impl Into<String>) -> Self {
        let content = content.into();
        if !content.is_empty() {
            self.sections.push(format!("## {heading}\n\n{content}"));
        }
        self
    }

    /// Append a section only if `condition` holds. `content_fn` is only
    /// called in that case.
    pub fn section_if(
        self,
        condition: bool,
        heading: &str,
        content_fn: impl FnOnce() -> String,
    ) -> Self {
        if condition {
            self.section(heading, content_fn())
        } else {
            self
        }
    }

    /// Append a section only if the content is `Some`.
    pub fn section_opt(self, heading: &str, content: Option<impl Into<String>>) -> Self {
        match content {
            Some(c) => self.section(heading, c),
            None => self,
        }
    }

    pub fn build(self) -> String {
        self.sections.join("\n\n")
    }
}

/// Today's date in the local timezone, e.g. "Monday, March 2, 2026".
pub fn current_date() -> String {
    Local::now().format("%A, %B %-d, %Y").to_string()
}

/// The system prompt for a run: preamble, current date, and the registered
/// tools with their descriptions.
pub fn build_system_prompt(preamble: Option<&str>, tools: &ToolRegistry) -> String {
    SystemPromptBuilder::new(preamble.unwrap_or(DEFAULT_PREAMBLE))
        .section("Current date", current_date())
        .section_if(!tools.is_empty(), "Available tools", || {
            tools.build_tool_descriptions()
        })
        .build()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ToolDef;
    use crate::tools::core::FnTool;
    use crate::tools::progress::ToolContext;

    #[test]
    fn preamble_only() {
        assert_eq!(SystemPromptBuilder::new("Hi.").build(), "Hi.");
    }

    #[test]
    fn sections_are_headed_and_separated() {
        let prompt = SystemPromptBuilder::new("P")
            .section("A", "one")
            .section("Empty", "")
            .section_if(false, "Hidden", || "x".into())
            .section_opt("B", Some("two"))
            .build();
        assert_eq!(prompt, "P\n\n## A\n\none\n\n## B\n\ntwo");
    }

    #[test]
    fn default_prompt_without_tools() {
        let prompt = build_system_prompt(None, &ToolRegistry::new());
        assert!(prompt.starts_with(DEFAULT_PREAMBLE));
        assert!(prompt.contains("## Current date"));
        assert!(!prompt.contains("## Available tools"));
    }

    #[test]
    fn custom_preamble_and_tools() {
        let tools = ToolRegistry::new().with(FnTool::new(
            ToolDef::new(
                "get_prices",
                "Daily prices for a ticker.",
                serde_json::json!({"type": "object"}),
            ),
            |_: serde_json::Value, _: ToolContext| async { Ok(String::new()) },
        ));
        let prompt = build_system_prompt(Some("Be brief."), &tools);
        assert!(prompt.starts_with("Be brief."));
        assert!(prompt.contains("## Available tools"));
        assert!(prompt.contains("### get_prices"));
        assert!(prompt.contains("Daily prices for a ticker."));
    }
}
