//! Bitmap lifetime management and chunk evaluation.

use std::path::PathBuf;
use std::sync::Arc;

use sr_engine::{DecodeStatus, Engine, Pos, RawBitmap, RawVision};
use sr_session::Context;
use tracing::trace;

use crate::chunks::Chunk;
use crate::error::{Result, VisionError};

/// Owns one loaded bitmap; frees it on drop. Load failures part-way
/// through a set unwind cleanly because earlier guards drop.
pub(crate) struct BitmapGuard {
    engine: Arc<dyn Engine>,
    raw: RawBitmap,
}

impl BitmapGuard {
    pub(crate) fn raw(&self) -> RawBitmap {
        self.raw
    }
}

impl Drop for BitmapGuard {
    fn drop(&mut self) {
        self.engine.bitmap_free(self.raw);
    }
}

/// Load every image or none.
pub(crate) fn load_bitmaps(
    engine: &Arc<dyn Engine>,
    vision: RawVision,
    paths: &[PathBuf],
) -> Result<Vec<BitmapGuard>> {
    let mut guards = Vec::with_capacity(paths.len());
    for path in paths {
        let raw = engine
            .bitmap_load(vision, path)
            .ok_or_else(|| VisionError::ImageLoad(path.clone()))?;
        guards.push(BitmapGuard {
            engine: Arc::clone(engine),
            raw,
        });
    }
    Ok(guards)
}

/// Evaluate chunks in order at the context cursor. Text goes through
/// the normal decode path in `n_batch` slices; image segments occupy
/// their positions without producing logits.
pub(crate) fn eval_chunks(
    engine: &dyn Engine,
    ctx: &mut Context,
    chunks: &[Chunk],
) -> Result<Pos> {
    let n_batch = ctx.n_batch() as usize;
    for chunk in chunks {
        match chunk {
            Chunk::Text(tokens) => {
                for slice in tokens.chunks(n_batch) {
                    ctx.decode(slice).map_err(|_| VisionError::Eval)?;
                }
                trace!(n = tokens.len(), pos = ctx.pos(), "text chunk");
            }
            Chunk::Image(encoded) => {
                let pos = ctx.pos();
                let status = engine.decode_image(ctx.raw(), encoded, 0, pos);
                if status != DecodeStatus::Ok {
                    return Err(VisionError::Eval);
                }
                ctx.set_pos(pos + encoded.n_positions() as Pos);
                trace!(cells = encoded.n_positions(), pos = ctx.pos(), "image chunk");
            }
        }
    }
    Ok(ctx.pos())
}
