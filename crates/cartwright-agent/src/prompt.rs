//! Prompt and context assembly.
//!
//! Pure functions: given the same conversation state and inputs the output
//! is identical. The prompt window truncates old history rather than
//! summarizing it.

use cartwright_core::types::{CartContextEntry, Conversation, Message, MessageMetadata, Role};
use cartwright_tools::ToolRegistry;

/// Build the fixed system prompt: persona, available tools, and the
/// cart-quantity disambiguation rules.
pub fn build_system_prompt(registry: &ToolRegistry) -> String {
    let mut parts = Vec::new();

    parts.push(
        "You are Cartwright, a procurement assistant. You help the user search the catalog, \
         manage their shopping cart, and submit purchase requests. Be concise and factual."
            .to_string(),
    );

    let tool_lines: Vec<String> = registry
        .specs()
        .iter()
        .map(|t| format!("- {}: {}", t.name, t.description))
        .collect();
    parts.push(format!("Available tools:\n{}", tool_lines.join("\n")));

    parts.push(
        "Cart rules:\n\
         - A [Cart Context: ...] annotation on a user message lists what is currently in the cart.\n\
         - If the requested item already appears in the cart context, use update_cart_quantity \
           with the new total quantity (current quantity plus the requested change). Never use \
           add_to_cart for an item already in the cart.\n\
         - Only use add_to_cart for items not present in the cart context.\n\
         - Quantities must stay between 1 and 999; to drop an item entirely, use remove_from_cart."
            .to_string(),
    );

    parts.join("\n\n")
}

/// Render the advisory cart snapshot as a plain-text annotation.
pub fn render_cart_context(entries: &[CartContextEntry]) -> String {
    let rendered: Vec<String> = entries
        .iter()
        .map(|e| {
            format!(
                "{{itemId: \"{}\", itemName: \"{}\", quantity: {}}}",
                e.item_id, e.item_name, e.quantity
            )
        })
        .collect();
    format!("[Cart Context: {}]", rendered.join(", "))
}

fn annotate(message: &Message) -> Message {
    let mut out = message.clone();
    if message.role == Role::User {
        if let Some(MessageMetadata::CartContext { entries }) = &message.metadata {
            if !entries.is_empty() {
                out.content = format!("{}\n{}", out.content, render_cart_context(entries));
            }
        }
    }
    out
}

/// Assemble the prompt message list: the most recent `window` messages of
/// the conversation followed by the new user message, with cart snapshots
/// rendered inline as text.
pub fn build_messages(
    conversation: &Conversation,
    window: usize,
    new_user_message: &Message,
) -> Vec<Message> {
    let mut messages: Vec<Message> = conversation
        .recent_messages(window)
        .iter()
        .map(annotate)
        .collect();
    messages.push(annotate(new_user_message));
    messages
}
