//! Engine lifetime bracket.

use std::path::Path;
use std::sync::Arc;

use sr_engine::{Engine, ModelParams};
use tracing::info;

use crate::error::{Result, SessionError};
use crate::model::Model;

/// Owns the engine-wide init/shutdown bracket.
///
/// Create one `Backend` per process, load models through it, and drop
/// it last. Dropping it shuts the engine down, so models and contexts
/// must not outlive it.
pub struct Backend {
    engine: Arc<dyn Engine>,
}

impl Backend {
    /// Initialize the engine and return the process-wide handle.
    pub fn init(engine: Arc<dyn Engine>) -> Self {
        engine.init();
        info!("engine initialized");
        Self { engine }
    }

    /// Load a model from `path`.
    pub fn load_model(&self, path: &Path, params: &ModelParams) -> Result<Model> {
        let raw = self
            .engine
            .model_load(path, params)
            .ok_or_else(|| SessionError::ModelLoad {
                path: path.to_path_buf(),
            })?;
        let info = self.engine.model_info(raw);
        info!(path = %path.display(), desc = %info.description, "model loaded");
        Ok(Model::from_raw(Arc::clone(&self.engine), raw, info))
    }

    /// Build/feature description of the running engine.
    pub fn system_info(&self) -> String {
        self.engine.system_info()
    }

    pub fn engine(&self) -> &Arc<dyn Engine> {
        &self.engine
    }
}

impl Drop for Backend {
    fn drop(&mut self) {
        self.engine.shutdown();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use sr_engine::SimEngine;
    use std::io::Write;

    #[test]
    fn load_model_surfaces_missing_files() {
        let backend = Backend::init(Arc::new(SimEngine::new()));
        let result = backend.load_model(Path::new("/nope/model.gguf"), &ModelParams::default());
        assert!(matches!(result, Err(SessionError::ModelLoad { .. })));
    }

    #[test]
    fn load_model_caches_metadata() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("tiny.gguf");
        std::fs::File::create(&path)
            .unwrap()
            .write_all(b"weights")
            .unwrap();

        let backend = Backend::init(Arc::new(SimEngine::new()));
        let model = backend
            .load_model(&path, &ModelParams::default())
            .unwrap();
        assert!(model.info().n_embd > 0);
        assert!(model.info().description.contains("tiny.gguf"));
    }
}
