//! Text embedding extraction.

use sr_engine::SeqId;
use tracing::debug;

use crate::context::Context;
use crate::error::{Result, SessionError};
use crate::model::Model;

const EMBED_SEQ: SeqId = 0;

/// Embed `text`, returning an L2-normalized vector of the model's
/// embedding dimension.
///
/// Encoder models run the encoder pass; decoder-only models decode the
/// text with embedding extraction enabled. Either way the pooled
/// sequence embedding is preferred, falling back to the last token's
/// hidden state when the engine does no pooling.
pub fn embed(model: &Model, ctx: &mut Context, text: &str) -> Result<Vec<f32>> {
    if text.is_empty() {
        return Err(SessionError::InvalidArgument("empty embedding input"));
    }
    let tokens = model.tokenize(text, true, true);
    if tokens.is_empty() {
        return Err(SessionError::InvalidArgument("input tokenized to nothing"));
    }

    if model.info().has_encoder {
        ctx.encode(&tokens)?;
    } else {
        ctx.clear_memory();
        ctx.set_embeddings_mode(true);
        let outcome = ctx.decode_all_logits(&tokens);
        ctx.set_embeddings_mode(false);
        outcome?;
    }

    let mut vec = ctx
        .embeddings_seq(EMBED_SEQ)
        .or_else(|| ctx.embeddings_at(tokens.len() as i32 - 1))
        .ok_or(SessionError::Encode)?;

    let expected = model.info().n_embd as usize;
    if vec.len() != expected {
        return Err(SessionError::EmbeddingDim {
            got: vec.len(),
            expected,
        });
    }

    l2_normalize(&mut vec);
    debug!(tokens = tokens.len(), dim = vec.len(), "embedded text");
    Ok(vec)
}

/// Scale to unit length. Zero vectors are left untouched.
pub(crate) fn l2_normalize(v: &mut [f32]) {
    let norm = v.iter().map(|x| x * x).sum::<f32>().sqrt();
    if norm > 0.0 {
        for x in v.iter_mut() {
            *x /= norm;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::Backend;
    use approx::assert_relative_eq;
    use sr_engine::{ContextParams, ModelParams, SimEngine};
    use std::io::Write;
    use std::sync::Arc;

    fn load(name: &str) -> (Backend, Model, tempfile::TempDir) {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join(name);
        std::fs::File::create(&path)
            .unwrap()
            .write_all(b"weights")
            .unwrap();
        let backend = Backend::init(Arc::new(SimEngine::new()));
        let model = backend.load_model(&path, &ModelParams::default()).unwrap();
        (backend, model, dir)
    }

    #[test]
    fn decoder_embedding_is_unit_length() {
        let (_b, model, _dir) = load("decoder.gguf");
        let mut ctx = model.new_context(&ContextParams::default()).unwrap();
        let v = embed(&model, &mut ctx, "hello world").unwrap();
        assert_eq!(v.len(), model.info().n_embd as usize);
        let norm: f32 = v.iter().map(|x| x * x).sum::<f32>().sqrt();
        assert_relative_eq!(norm, 1.0, epsilon = 1e-5);
    }

    #[test]
    fn encoder_models_take_the_encoder_path() {
        let (_b, model, _dir) = load("encoder.gguf");
        assert!(model.info().has_encoder);
        let mut ctx = model.new_context(&ContextParams::default()).unwrap();
        let v = embed(&model, &mut ctx, "hello world").unwrap();
        assert_eq!(v.len(), model.info().n_embd as usize);
        // Encoding leaves the KV cache untouched.
        assert_eq!(ctx.max_position(0), -1);
    }

    #[test]
    fn same_text_same_vector() {
        let (_b, model, _dir) = load("decoder.gguf");
        let mut ctx = model.new_context(&ContextParams::default()).unwrap();
        let a = embed(&model, &mut ctx, "deterministic").unwrap();
        let b = embed(&model, &mut ctx, "deterministic").unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn empty_input_is_rejected() {
        let (_b, model, _dir) = load("decoder.gguf");
        let mut ctx = model.new_context(&ContextParams::default()).unwrap();
        assert!(matches!(
            embed(&model, &mut ctx, ""),
            Err(SessionError::InvalidArgument(_))
        ));
    }

    #[test]
    fn normalize_handles_zero_vectors() {
        let mut v = vec![0.0f32; 4];
        l2_normalize(&mut v);
        assert!(v.iter().all(|&x| x == 0.0));

        let mut v = vec![3.0f32, 4.0];
        l2_normalize(&mut v);
        assert_relative_eq!(v[0], 0.6);
        assert_relative_eq!(v[1], 0.8);
    }
}
