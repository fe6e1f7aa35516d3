//! Batch builders encoding the standard layout conventions.
//!
//! Every builder assigns position `start + index`, binds rows to
//! sequence 0, and sets output flags according to the variant: decode
//! batches request logits for the last row only, all-logits batches for
//! every row, encoder batches for every row starting at position 0.

use sr_engine::{Batch, Pos, Token};

/// Decode batch: positions `start..start + tokens.len()`, logits for
/// the final row only.
pub fn positioned(tokens: &[Token], start: Pos) -> Batch {
    let mut batch = Batch::with_capacity(tokens.len());
    let last = tokens.len().saturating_sub(1);
    for (i, &token) in tokens.iter().enumerate() {
        batch.push(token, start + i as Pos, 0, i == last);
    }
    batch
}

/// Decode batch requesting logits for every row. Used by verification
/// passes that need per-position distributions.
pub fn positioned_all_logits(tokens: &[Token], start: Pos) -> Batch {
    let mut batch = Batch::with_capacity(tokens.len());
    for (i, &token) in tokens.iter().enumerate() {
        batch.push(token, start + i as Pos, 0, true);
    }
    batch
}

/// Encoder batch: positions from 0, outputs everywhere.
pub fn encoder(tokens: &[Token]) -> Batch {
    let mut batch = Batch::with_capacity(tokens.len());
    for (i, &token) in tokens.iter().enumerate() {
        batch.push(token, i as Pos, 0, true);
    }
    batch
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn positioned_flags_last_row_only() {
        let batch = positioned(&[10, 11, 12], 5);
        let items = batch.items();
        assert_eq!(items.len(), 3);
        assert_eq!(items[0].pos, 5);
        assert_eq!(items[2].pos, 7);
        assert!(!items[0].output);
        assert!(!items[1].output);
        assert!(items[2].output);
        assert!(items.iter().all(|i| i.seq_ids == [0]));
    }

    #[test]
    fn all_logits_flags_every_row() {
        let batch = positioned_all_logits(&[10, 11], 0);
        assert!(batch.items().iter().all(|i| i.output));
    }

    #[test]
    fn encoder_starts_at_zero() {
        let batch = encoder(&[10, 11, 12]);
        let items = batch.items();
        assert_eq!(items[0].pos, 0);
        assert_eq!(items[2].pos, 2);
        assert!(items.iter().all(|i| i.output));
    }

    #[test]
    fn empty_token_slice_builds_empty_batch() {
        assert!(positioned(&[], 0).is_empty());
    }
}
