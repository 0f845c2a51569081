//! Token budget constants and the length-based token estimate.
//!
//! Costs are approximations (characters divided by a fixed ratio), not
//! tokenizer-exact counts. Eviction trigger points are therefore approximate
//! too; they only need to fire well before the provider's real limit.

/// Default characters per token (conservative estimate for English text).
/// Most tokenizers average 3-4 chars per token; we use 3.5 as a middle ground.
pub const DEFAULT_CHARS_PER_TOKEN: f64 = 3.5;

/// Hard ceiling on the estimated size of a request.
pub const TOKEN_BUDGET: usize = 150_000;

/// Soft trigger: eviction runs once the estimate exceeds this.
pub const CONTEXT_THRESHOLD: usize = 100_000;

/// Most recent tool uses always kept, whatever their cost.
pub const KEEP_TOOL_USES: usize = 5;

/// Estimate the token cost of `text` with the default ratio.
pub fn estimate_tokens(text: &str) -> usize {
    estimate_tokens_with(text, DEFAULT_CHARS_PER_TOKEN)
}

/// Estimate the token cost of `text` with a custom chars-per-token ratio.
pub fn estimate_tokens_with(text: &str, chars_per_token: f64) -> usize {
    if text.is_empty() {
        return 0;
    }
    (text.chars().count() as f64 / chars_per_token).ceil() as usize
}

/// Thresholds used by the [`ContextManager`](super::ContextManager).
#[derive(Debug, Clone, PartialEq)]
pub struct ContextConfig {
    /// Hard ceiling. Exceeding it after eviction is logged, never fatal.
    pub token_budget: usize,
    /// Soft trigger for eviction. Kept below `token_budget`.
    pub context_threshold: usize,
    /// Minimum number of most-recent tool uses retained.
    pub keep_tool_uses: usize,
    /// Characters per token for estimation.
    pub chars_per_token: f64,
}

impl Default for ContextConfig {
    fn default() -> Self {
        Self {
            token_budget: TOKEN_BUDGET,
            context_threshold: CONTEXT_THRESHOLD,
            keep_tool_uses: KEEP_TOOL_USES,
            chars_per_token: DEFAULT_CHARS_PER_TOKEN,
        }
    }
}

impl ContextConfig {
    pub fn with_token_budget(mut self, tokens: usize) -> Self {
        self.token_budget = tokens;
        self
    }

    pub fn with_context_threshold(mut self, tokens: usize) -> Self {
        self.context_threshold = tokens;
        self
    }

    pub fn with_keep_tool_uses(mut self, keep: usize) -> Self {
        self.keep_tool_uses = keep;
        self
    }

    pub fn with_chars_per_token(mut self, ratio: f64) -> Self {
        self.chars_per_token = ratio;
        self
    }
}

/// Snapshot of context usage at a point in time.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ContextUsage {
    /// Estimated tokens consumed.
    pub estimated_tokens: usize,
    /// Token budget the estimate is measured against.
    pub budget: usize,
    /// Usage as a fraction (0.0 to 1.0+).
    pub usage_pct: f64,
}

impl ContextUsage {
    pub fn new(estimated_tokens: usize, budget: usize) -> Self {
        let usage_pct = if budget > 0 {
            estimated_tokens as f64 / budget as f64
        } else {
            1.0
        };
        Self {
            estimated_tokens,
            budget,
            usage_pct,
        }
    }

    /// Whether the estimate is above the budget.
    pub fn over_budget(&self) -> bool {
        self.estimated_tokens > self.budget
    }

    /// Format as a short log-friendly string.
    pub fn to_log_string(&self) -> String {
        format!(
            "context: ~{} tokens ({:.0}% of {})",
            self.estimated_tokens,
            self.usage_pct * 100.0,
            self.budget,
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn estimate_rounds_up() {
        assert_eq!(estimate_tokens(""), 0);
        assert_eq!(estimate_tokens("a"), 1);
        assert_eq!(estimate_tokens(&"a".repeat(7)), 2);
        assert_eq!(estimate_tokens(&"a".repeat(8)), 3);
    }

    #[test]
    fn estimate_counts_chars_not_bytes() {
        assert_eq!(estimate_tokens_with("ééé", 1.0), 3);
    }

    #[test]
    fn custom_ratio_changes_estimate() {
        let text = "a".repeat(40_000);
        assert!(estimate_tokens_with(&text, 4.0) < estimate_tokens(&text));
    }

    #[test]
    fn default_thresholds_are_ordered() {
        let config = ContextConfig::default();
        assert!(config.context_threshold < config.token_budget);
        assert_eq!(config.keep_tool_uses, KEEP_TOOL_USES);
    }

    #[test]
    fn usage_log_string_format() {
        let usage = ContextUsage::new(75_000, 150_000);
        assert_eq!(usage.to_log_string(), "context: ~75000 tokens (50% of 150000)");
        assert!(!usage.over_budget());
        assert!(ContextUsage::new(150_001, 150_000).over_budget());
    }

    #[test]
    fn zero_budget_reports_full() {
        assert_eq!(ContextUsage::new(10, 0).usage_pct, 1.0);
    }
}
