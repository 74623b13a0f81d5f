// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Conversation history carried across instance generations.
//!
//! A fresh instance starts with an agent that remembers nothing. The last
//! few stored turns are rendered into a context block and prepended to the
//! first message the agent sees, so the conversation picks up naturally.

use roost_core::model::{ConversationTurn, DEFAULT_CONVERSATION};
use roost_core::store::StateStore;
use tokio::sync::Mutex;

/// How many recent turns are replayed to a fresh agent.
pub const CONTEXT_TURN_LIMIT: i64 = 20;

/// Load the user's recent conversation as a context block.
///
/// Returns `None` when no turns survive, a brand-new user or one whose
/// history has expired.
pub async fn load_context_block(
    store: &dyn StateStore,
    user_key: &str,
) -> roost_core::error::Result<Option<String>> {
    let turns = store
        .recent_turns(user_key, DEFAULT_CONVERSATION, CONTEXT_TURN_LIMIT)
        .await?;
    if turns.is_empty() {
        return Ok(None);
    }
    Ok(Some(format_context_block(&turns)))
}

fn format_context_block(turns: &[ConversationTurn]) -> String {
    let mut block = String::from("<conversation_history>\n");
    for turn in turns {
        block.push_str("<message role=\"");
        block.push_str(turn.role.as_str());
        block.push_str("\">");
        block.push_str(&turn.content);
        block.push_str("</message>\n");
    }
    block.push_str("</conversation_history>");
    block
}

/// Context block handed out exactly once.
///
/// Whichever message is processed first after boot carries the block as a
/// prefix; every later message goes through bare, the agent already has
/// the context by then.
#[derive(Debug)]
pub struct ContextPrefix {
    block: Mutex<Option<String>>,
}

impl ContextPrefix {
    /// Wrap the block loaded at boot, if any.
    pub fn new(block: Option<String>) -> Self {
        Self {
            block: Mutex::new(block),
        }
    }

    /// Take the block, leaving `None` behind for every later caller.
    pub async fn take(&self) -> Option<String> {
        self.block.lock().await.take()
    }
}
