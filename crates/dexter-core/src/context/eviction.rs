//! Tool-use eviction: drop the oldest tool uses once the context grows too big.
//!
//! Tool results are the single largest context consumer in an agent loop. A
//! filings lookup can inject tens of kilobytes, and most of it is irrelevant
//! once the model has read it. Before every decision step the
//! [`ContextManager`] estimates the scratchpad's cost. Above the threshold it
//! removes every completed tool use except the most recent few. Messages and
//! the system prompt are never touched, and the policy is purely structural:
//! oldest first, no relevance ranking, no LLM call.

use super::budget::{ContextConfig, ContextUsage, estimate_tokens_with};
use super::scratchpad::Scratchpad;
use tracing::{debug, info, warn};

/// Prefix of the notice that replaces evicted tool results in the rendered
/// conversation.
pub const EVICTED_PREFIX: &str = "[Cleared:";

/// Result of one [`ContextManager::enforce`] pass.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct EvictionReport {
    /// Number of tool-use entries removed by this pass.
    pub evicted: usize,
    pub before: ContextUsage,
    pub after: ContextUsage,
}

/// Keeps a run's scratchpad inside its token budget.
#[derive(Debug, Clone, Default)]
pub struct ContextManager {
    config: ContextConfig,
}

impl ContextManager {
    pub fn new(config: ContextConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &ContextConfig {
        &self.config
    }

    /// Estimated usage of the system prompt plus the scratchpad.
    pub fn usage(&self, system_prompt: &str, scratchpad: &Scratchpad) -> ContextUsage {
        let tokens = estimate_tokens_with(system_prompt, self.config.chars_per_token)
            + scratchpad.estimated_tokens();
        ContextUsage::new(tokens, self.config.token_budget)
    }

    /// Evict if the estimate exceeds the threshold.
    ///
    /// Everything but the `keep_tool_uses` most recent completed tool uses
    /// is removed. Staying above the hard budget afterwards is logged as a
    /// warning and otherwise ignored: messages are never dropped.
    pub fn enforce(&self, system_prompt: &str, scratchpad: &mut Scratchpad) -> EvictionReport {
        let before = self.usage(system_prompt, scratchpad);
        debug!("{}", before.to_log_string());

        if before.estimated_tokens <= self.config.context_threshold {
            return EvictionReport {
                evicted: 0,
                before,
                after: before,
            };
        }

        let evicted = scratchpad.evict_oldest_tool_uses(self.config.keep_tool_uses);
        let after = self.usage(system_prompt, scratchpad);

        if evicted > 0 {
            info!(
                "Context over threshold ({} > {}): evicted {evicted} tool use(s), {} -> {} tokens",
                before.estimated_tokens,
                self.config.context_threshold,
                before.estimated_tokens,
                after.estimated_tokens,
            );
        }
        if after.over_budget() {
            warn!(
                "Context still over budget after eviction: {}",
                after.to_log_string()
            );
        }

        EvictionReport {
            evicted,
            before,
            after,
        }
    }
}
