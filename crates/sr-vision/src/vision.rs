//! Vision projector context and multimodal prompt evaluation.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use sr_engine::{Engine, Pos, RawVision};
use sr_session::{Context, Model};
use tracing::info;

use crate::chunks::tokenize_prompt;
use crate::error::{Result, VisionError};
use crate::eval::{eval_chunks, load_bitmaps};

/// A loaded multimodal projector bound to one model. Frees the
/// engine-side handle on drop.
pub struct VisionContext {
    engine: Arc<dyn Engine>,
    raw: RawVision,
}

impl VisionContext {
    /// Load the projector at `mmproj` for `model`.
    ///
    /// Fails with [`VisionError::Projector`] when the file cannot be
    /// loaded and [`VisionError::Unsupported`] when it loads but has no
    /// image encoder.
    pub fn new(
        engine: Arc<dyn Engine>,
        model: &Model,
        mmproj: &Path,
        n_threads: i32,
        use_gpu: bool,
    ) -> Result<Self> {
        let raw = engine
            .vision_init(mmproj, model.raw(), n_threads, use_gpu)
            .ok_or_else(|| VisionError::Projector {
                path: mmproj.to_path_buf(),
            })?;
        let ctx = Self { engine, raw };
        if !ctx.engine.vision_supported(ctx.raw) {
            return Err(VisionError::Unsupported {
                path: mmproj.to_path_buf(),
            });
        }
        info!(path = %mmproj.display(), "projector loaded");
        Ok(ctx)
    }

    /// The marker that stands in for one image in a prompt.
    pub fn default_marker(&self) -> String {
        self.engine.media_marker()
    }

    /// Whether the loaded projector can encode images. Construction
    /// already enforces this; exposed for capability checks.
    pub fn supports_vision(&self) -> bool {
        self.engine.vision_supported(self.raw)
    }

    /// Evaluate a prompt containing media markers, pairing the i-th
    /// marker with `images[i]`. Text and image segments land in the KV
    /// cache in prompt order, starting at the context cursor; returns
    /// the cursor after evaluation.
    ///
    /// Images are loaded all-or-nothing and freed before evaluation
    /// begins, whether or not tokenization succeeded.
    pub fn eval_with_images(
        &self,
        model: &Model,
        ctx: &mut Context,
        prompt: &str,
        images: &[PathBuf],
    ) -> Result<Pos> {
        if prompt.is_empty() {
            return Err(VisionError::InvalidArgument("empty prompt"));
        }
        let marker = self.default_marker();
        let bitmaps = load_bitmaps(&self.engine, self.raw, images)?;
        let raws: Vec<_> = bitmaps.iter().map(|b| b.raw()).collect();
        let chunks = tokenize_prompt(
            self.engine.as_ref(),
            self.raw,
            model,
            &marker,
            prompt,
            &raws,
        );
        // Encoded segments are self-contained; release the bitmaps
        // before evaluation either way.
        drop(bitmaps);
        let chunks = chunks?;
        eval_chunks(self.engine.as_ref(), ctx, &chunks)
    }
}

impl Drop for VisionContext {
    fn drop(&mut self) {
        self.engine.vision_free(self.raw);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use sr_engine::{ContextParams, ModelParams, SimEngine};
    use sr_session::Backend;
    use std::io::Write;

    struct Fixture {
        engine: Arc<SimEngine>,
        _backend: Backend,
        model: Model,
        dir: tempfile::TempDir,
    }

    fn fixture() -> Fixture {
        let dir = tempfile::tempdir().unwrap();
        let engine = Arc::new(SimEngine::new());
        let backend = Backend::init(engine.clone());
        let path = write_file(&dir, "tiny.gguf");
        let model = backend.load_model(&path, &ModelParams::default()).unwrap();
        Fixture {
            engine,
            _backend: backend,
            model,
            dir,
        }
    }

    fn write_file(dir: &tempfile::TempDir, name: &str) -> PathBuf {
        let path = dir.path().join(name);
        std::fs::File::create(&path)
            .unwrap()
            .write_all(name.as_bytes())
            .unwrap();
        path
    }

    fn projector(f: &Fixture) -> VisionContext {
        let mmproj = write_file(&f.dir, "mmproj.gguf");
        VisionContext::new(f.engine.clone(), &f.model, &mmproj, 4, false).unwrap()
    }

    #[test]
    fn missing_projector_file() {
        let f = fixture();
        let result = VisionContext::new(
            f.engine.clone(),
            &f.model,
            Path::new("/nope/mmproj.gguf"),
            4,
            false,
        );
        assert!(matches!(result, Err(VisionError::Projector { .. })));
    }

    #[test]
    fn text_only_projector_is_rejected() {
        let f = fixture();
        let mmproj = write_file(&f.dir, "text-only.gguf");
        let result = VisionContext::new(f.engine.clone(), &f.model, &mmproj, 4, false);
        assert!(matches!(result, Err(VisionError::Unsupported { .. })));
    }

    #[test]
    fn eval_advances_past_text_and_image_cells() {
        let f = fixture();
        let vision = projector(&f);
        let mut ctx = f.model.new_context(&ContextParams::default()).unwrap();

        assert!(vision.supports_vision());
        let image = write_file(&f.dir, "cat.png");
        let prompt = format!("look: {} describe", vision.default_marker());
        let pos = vision
            .eval_with_images(&f.model, &mut ctx, &prompt, &[image])
            .unwrap();

        // BOS + "look: " (6 bytes), 16 image cells, " describe" (9 bytes).
        assert_eq!(pos, 7 + 16 + 9);
        assert_eq!(ctx.pos(), pos);
        assert_eq!(ctx.max_position(0), pos - 1);
        assert_eq!(f.engine.live_bitmaps(), 0);
    }

    #[test]
    fn marker_count_must_match_image_count() {
        let f = fixture();
        let vision = projector(&f);
        let mut ctx = f.model.new_context(&ContextParams::default()).unwrap();

        let a = write_file(&f.dir, "a.png");
        let b = write_file(&f.dir, "b.png");
        let prompt = format!("one {} image", vision.default_marker());
        let err = vision
            .eval_with_images(&f.model, &mut ctx, &prompt, &[a, b])
            .unwrap_err();
        assert!(matches!(
            err,
            VisionError::MarkerMismatch {
                markers: 1,
                images: 2
            }
        ));
        // The loaded bitmaps were released on the error path.
        assert_eq!(f.engine.live_bitmaps(), 0);
    }

    #[test]
    fn one_bad_image_unwinds_the_rest() {
        let f = fixture();
        let vision = projector(&f);
        let mut ctx = f.model.new_context(&ContextParams::default()).unwrap();

        let good = write_file(&f.dir, "good.png");
        let missing = f.dir.path().join("missing.png");
        let marker = vision.default_marker();
        let prompt = format!("{m} and {m}", m = marker);
        let err = vision
            .eval_with_images(&f.model, &mut ctx, &prompt, &[good, missing])
            .unwrap_err();
        assert!(matches!(err, VisionError::ImageLoad(_)));
        assert_eq!(f.engine.live_bitmaps(), 0);
        // Nothing was evaluated.
        assert_eq!(ctx.max_position(0), -1);
    }

    #[test]
    fn generation_can_continue_after_images() {
        let f = fixture();
        let vision = projector(&f);
        let mut ctx = f.model.new_context(&ContextParams::default()).unwrap();

        let image = write_file(&f.dir, "dog.png");
        let prompt = format!("see {}!", vision.default_marker());
        vision
            .eval_with_images(&f.model, &mut ctx, &prompt, &[image])
            .unwrap();

        // The trailing text chunk left fresh logits behind.
        let logits = ctx.logits_at(-1).unwrap();
        assert!(!logits.is_empty());
        ctx.decode_one(65).unwrap();
        assert_eq!(ctx.max_position(0), ctx.pos() - 1);
    }
}
