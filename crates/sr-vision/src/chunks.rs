//! Multimodal prompt tokenization.

use sr_engine::{EncodedImage, Engine, RawBitmap, RawVision, Token};
use sr_session::Model;

use crate::error::{Result, VisionError};

/// One evaluatable segment of a multimodal prompt.
#[derive(Debug, Clone)]
pub enum Chunk {
    Text(Vec<Token>),
    Image(EncodedImage),
}

/// Split `prompt` at media markers and tokenize, pairing each marker
/// with one bitmap in order. Image segments are encoded here, so the
/// bitmaps can be freed as soon as this returns.
pub(crate) fn tokenize_prompt(
    engine: &dyn Engine,
    vision: RawVision,
    model: &Model,
    marker: &str,
    prompt: &str,
    bitmaps: &[RawBitmap],
) -> Result<Vec<Chunk>> {
    let parts: Vec<&str> = prompt.split(marker).collect();
    let markers = parts.len() - 1;
    if markers != bitmaps.len() {
        return Err(VisionError::MarkerMismatch {
            markers,
            images: bitmaps.len(),
        });
    }

    let mut chunks = Vec::with_capacity(parts.len() + bitmaps.len());
    for (i, part) in parts.iter().enumerate() {
        // BOS goes on the opening text run only.
        let add_special = i == 0;
        if !part.is_empty() || add_special {
            let tokens = model.tokenize(part, add_special, true);
            if tokens.is_empty() {
                return Err(VisionError::Tokenize);
            }
            chunks.push(Chunk::Text(tokens));
        }
        if i < bitmaps.len() {
            let encoded = engine
                .encode_bitmap(vision, bitmaps[i])
                .ok_or(VisionError::Alloc)?;
            chunks.push(Chunk::Image(encoded));
        }
    }
    Ok(chunks)
}
