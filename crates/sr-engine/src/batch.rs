//! The batch submitted to the engine per decode/encode call.
//!
//! A batch is ephemeral: built, submitted, and dropped within one call.
//! Position assignment and output-flag selection live in the session
//! layer's builders; this type only carries the tuples.

use crate::types::{Pos, SeqId, Token};

/// One (token, position, sequence ids, output flag) row.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BatchItem {
    pub token: Token,
    pub pos: Pos,
    pub seq_ids: Vec<SeqId>,
    /// Request logits (or embeddings) for this row.
    pub output: bool,
}

/// Ordered sequence of rows for a single decode/encode invocation.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Batch {
    items: Vec<BatchItem>,
}

impl Batch {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_capacity(n: usize) -> Self {
        Self {
            items: Vec::with_capacity(n),
        }
    }

    /// Append a row bound to a single sequence id.
    pub fn push(&mut self, token: Token, pos: Pos, seq_id: SeqId, output: bool) {
        self.items.push(BatchItem {
            token,
            pos,
            seq_ids: vec![seq_id],
            output,
        });
    }

    pub fn items(&self) -> &[BatchItem] {
        &self.items
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }
}
