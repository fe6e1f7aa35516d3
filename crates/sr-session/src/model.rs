//! Owned model handle and vocabulary helpers.

use std::sync::Arc;

use sr_engine::{ContextParams, Engine, ModelInfo, RawModel, Token};

use crate::context::Context;
use crate::error::{Result, SessionError};

/// Outcome of tokenizing into a caller-provided buffer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TokenizeFit {
    /// The buffer was large enough; this many tokens were written.
    Fits(usize),
    /// The buffer was too small; this capacity is required.
    TooSmall(usize),
}

/// A loaded model. Frees the engine-side handle on drop.
pub struct Model {
    engine: Arc<dyn Engine>,
    raw: RawModel,
    info: ModelInfo,
}

impl Model {
    pub(crate) fn from_raw(engine: Arc<dyn Engine>, raw: RawModel, info: ModelInfo) -> Self {
        Self { engine, raw, info }
    }

    /// Metadata captured at load time.
    pub fn info(&self) -> &ModelInfo {
        &self.info
    }

    pub fn raw(&self) -> RawModel {
        self.raw
    }

    pub(crate) fn engine(&self) -> &Arc<dyn Engine> {
        &self.engine
    }

    /// Create a new inference context over this model.
    pub fn new_context(&self, params: &ContextParams) -> Result<Context> {
        let raw = self
            .engine
            .context_new(self.raw, params)
            .ok_or(SessionError::ContextCreate)?;
        // Resolve the defaults the engine applies so the session's view
        // of capacity matches the engine's.
        let n_ctx = if params.n_ctx == 0 {
            self.info.n_ctx_train.max(1) as u32
        } else {
            params.n_ctx
        };
        let n_batch = if params.n_batch == 0 { 512 } else { params.n_batch };
        Ok(Context::from_raw(
            Arc::clone(&self.engine),
            raw,
            self.raw,
            n_ctx,
            n_batch,
        ))
    }

    /// Tokenize `text` into `out` without allocating.
    pub fn tokenize_into(
        &self,
        text: &str,
        out: &mut [Token],
        add_special: bool,
        parse_special: bool,
    ) -> TokenizeFit {
        let n = self
            .engine
            .tokenize(self.raw, text, out, add_special, parse_special);
        if n < 0 {
            TokenizeFit::TooSmall((-n) as usize)
        } else {
            TokenizeFit::Fits(n as usize)
        }
    }

    /// Tokenize `text`, sizing the buffer automatically.
    pub fn tokenize(&self, text: &str, add_special: bool, parse_special: bool) -> Vec<Token> {
        // A guess that covers most prompts in one pass.
        let mut buf = vec![0 as Token; text.len() + 8];
        match self.tokenize_into(text, &mut buf, add_special, parse_special) {
            TokenizeFit::Fits(n) => {
                buf.truncate(n);
                buf
            }
            TokenizeFit::TooSmall(required) => {
                buf.resize(required, 0);
                match self.tokenize_into(text, &mut buf, add_special, parse_special) {
                    TokenizeFit::Fits(n) => {
                        buf.truncate(n);
                        buf
                    }
                    TokenizeFit::TooSmall(_) => Vec::new(),
                }
            }
        }
    }

    /// Render one token to text. Invalid bytes are replaced.
    pub fn token_to_piece(&self, token: Token) -> String {
        let mut buf = [0u8; 128];
        let n = self.engine.token_piece(self.raw, token, &mut buf);
        if n >= 0 {
            return String::from_utf8_lossy(&buf[..n as usize]).into_owned();
        }
        let mut big = vec![0u8; (-n) as usize];
        let n = self.engine.token_piece(self.raw, token, &mut big);
        if n < 0 {
            return String::new();
        }
        String::from_utf8_lossy(&big[..n as usize]).into_owned()
    }

    /// Detokenize a whole token slice.
    pub fn detokenize(&self, tokens: &[Token]) -> String {
        tokens.iter().map(|&t| self.token_to_piece(t)).collect()
    }

    /// Whether `token` ends generation.
    pub fn token_is_eog(&self, token: Token) -> bool {
        self.engine.token_is_eog(self.raw, token)
    }

    pub fn token_bos(&self) -> Token {
        self.engine.token_bos(self.raw)
    }

    pub fn token_eos(&self) -> Token {
        self.engine.token_eos(self.raw)
    }

    pub fn vocab_len(&self) -> usize {
        self.engine.vocab_len(self.raw)
    }
}

impl Drop for Model {
    fn drop(&mut self) {
        self.engine.model_free(self.raw);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::Backend;
    use sr_engine::{ModelParams, SimEngine};
    use std::io::Write;
    use std::path::PathBuf;

    fn load_model(dir: &tempfile::TempDir) -> (Backend, Model) {
        let path: PathBuf = dir.path().join("tiny.gguf");
        std::fs::File::create(&path)
            .unwrap()
            .write_all(b"weights")
            .unwrap();
        let backend = Backend::init(Arc::new(SimEngine::new()));
        let model = backend.load_model(&path, &ModelParams::default()).unwrap();
        (backend, model)
    }

    #[test]
    fn tokenize_into_reports_required_capacity() {
        let dir = tempfile::tempdir().unwrap();
        let (_backend, model) = load_model(&dir);

        let mut small = [0 as Token; 2];
        let fit = model.tokenize_into("hello", &mut small, false, false);
        assert_eq!(fit, TokenizeFit::TooSmall(5));

        let mut buf = [0 as Token; 8];
        let fit = model.tokenize_into("hello", &mut buf, false, false);
        assert_eq!(fit, TokenizeFit::Fits(5));
    }

    #[test]
    fn tokenize_round_trips_through_pieces() {
        let dir = tempfile::tempdir().unwrap();
        let (_backend, model) = load_model(&dir);

        let tokens = model.tokenize("abc", false, false);
        assert_eq!(tokens.len(), 3);
        assert_eq!(model.detokenize(&tokens), "abc");
    }

    #[test]
    fn special_tokens() {
        let dir = tempfile::tempdir().unwrap();
        let (_backend, model) = load_model(&dir);

        let tokens = model.tokenize("x", true, false);
        assert_eq!(tokens[0], model.token_bos());
        assert!(model.token_is_eog(model.token_eos()));
        assert!(!model.token_is_eog(tokens[1]));
    }
}
