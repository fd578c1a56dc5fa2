//! Back-references to items listed in the previous answer ("o produto 2").

use regex::Regex;
use std::sync::LazyLock;

use crate::types::{ChatMessage, Role};

static ITEM_REFERENCE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)\b(?:produto|item|número|numero|opção|opcao|ar)\s+(\d{1,2})\b")
        .expect("item reference regex is valid")
});

/// Replace the first "produto N" style reference in `message` with the name
/// of item N from the latest assistant answer. Returns `message` unchanged
/// when there is no reference or the item cannot be found.
pub fn resolve_reference(message: &str, history: &[ChatMessage]) -> String {
    let Some(caps) = ITEM_REFERENCE.captures(message) else {
        return message.to_string();
    };
    let (Some(whole), Some(index)) = (caps.get(0), caps.get(1)) else {
        return message.to_string();
    };

    let Some(last_answer) = history
        .iter()
        .rev()
        .find(|m| m.role == Role::Assistant)
        .map(|m| m.content.as_str())
    else {
        return message.to_string();
    };

    match item_name(last_answer, index.as_str()) {
        Some(name) => {
            tracing::debug!(reference = whole.as_str(), resolved = %name, "Resolved item reference");
            format!(
                "{}{}{}",
                &message[..whole.start()],
                name,
                &message[whole.end()..]
            )
        }
        None => message.to_string(),
    }
}

/// Item name from a markdown list ("2. **Nome**") or, failing that, from an
/// echoed context block ("Item 2:\nProduto: Nome").
fn item_name(answer: &str, index: &str) -> Option<String> {
    let list = Regex::new(&format!(r"(?m)^\s*{}\.\s*(?:\*\*)?([^\n*]+)", index)).ok()?;
    if let Some(caps) = list.captures(answer) {
        let name = caps[1].trim();
        if !name.is_empty() {
            return Some(name.to_string());
        }
    }

    let block = Regex::new(&format!(r"(?i)Item\s+{}:\s*\nProduto:\s*(.*?)\n", index)).ok()?;
    block
        .captures(answer)
        .map(|caps| caps[1].trim().to_string())
        .filter(|name| !name.is_empty())
}
