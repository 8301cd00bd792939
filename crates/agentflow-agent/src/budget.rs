use std::sync::OnceLock;

use tiktoken_rs::CoreBPE;
use tracing::warn;

use agentflow_core::types::{ActionContract, Message};

/// Fixed cost of the catalog wrapper, charged once when any contract is sent.
pub const CATALOG_OVERHEAD_TOKENS: usize = 12;

/// Per-message framing cost.
const MESSAGE_OVERHEAD_TOKENS: usize = 4;

/// Tokenizer for cl100k_base, loaded on first use.
fn tokenizer() -> Option<&'static CoreBPE> {
    static TOKENIZER: OnceLock<Option<CoreBPE>> = OnceLock::new();
    TOKENIZER
        .get_or_init(|| match tiktoken_rs::cl100k_base() {
            Ok(bpe) => Some(bpe),
            Err(e) => {
                warn!(error = %e, "Tokenizer unavailable, falling back to character estimate");
                None
            }
        })
        .as_ref()
}

/// Token count of `text`.
///
/// Uses BPE tokenization when the tokenizer loads, otherwise roughly four
/// characters per token.
pub fn estimate_tokens(text: &str) -> usize {
    match tokenizer() {
        Some(bpe) => bpe.encode_ordinary(text).len(),
        None => text.chars().count().div_ceil(4),
    }
}

/// Token estimate for one conversation message.
pub fn estimate_message_tokens(msg: &Message) -> usize {
    let body = serde_json::to_string(msg).unwrap_or_default();
    estimate_tokens(&body) + MESSAGE_OVERHEAD_TOKENS
}

/// Token estimate for one catalog entry.
pub fn estimate_contract_tokens(contract: &ActionContract) -> usize {
    let body = serde_json::to_string(contract).unwrap_or_default();
    estimate_tokens(&body)
}

/// Token estimate for a full model request.
///
/// The estimate is a sum of per-item costs, so removing a catalog entry
/// never increases it.
pub fn estimate_payload(messages: &[Message], contracts: &[ActionContract]) -> usize {
    let conversation: usize = messages.iter().map(estimate_message_tokens).sum();
    if contracts.is_empty() {
        return conversation;
    }
    let catalog: usize = contracts.iter().map(estimate_contract_tokens).sum();
    conversation + CATALOG_OVERHEAD_TOKENS + catalog
}

/// Catalog entries that fit the input budget.
#[derive(Debug, Clone, PartialEq)]
pub struct PruneOutcome {
    /// Entries to send, in declaration order.
    pub kept: Vec<ActionContract>,
    /// Names of dropped entries, in drop order.
    pub dropped: Vec<String>,
    /// Estimate for the messages plus the kept entries.
    pub estimate: usize,
}

impl PruneOutcome {
    pub fn pruned(&self) -> bool {
        !self.dropped.is_empty()
    }
}

/// Drop catalog entries from the end until the request fits `budget`.
///
/// Messages are never touched. If the messages alone exceed the budget, every
/// entry is dropped and the request is sent anyway.
pub fn prune_catalog(messages: &[Message], contracts: &[ActionContract], budget: usize) -> PruneOutcome {
    let conversation: usize = messages.iter().map(estimate_message_tokens).sum();
    let costs: Vec<usize> = contracts.iter().map(estimate_contract_tokens).collect();

    let mut keep = contracts.len();
    let mut catalog: usize = costs.iter().sum();
    let total = |keep: usize, catalog: usize| {
        if keep == 0 {
            conversation
        } else {
            conversation + CATALOG_OVERHEAD_TOKENS + catalog
        }
    };

    while keep > 0 && total(keep, catalog) > budget {
        keep -= 1;
        catalog -= costs[keep];
    }

    PruneOutcome {
        kept: contracts[..keep].to_vec(),
        dropped: contracts[keep..]
            .iter()
            .rev()
            .map(|c| c.name.clone())
            .collect(),
        estimate: total(keep, catalog),
    }
}
