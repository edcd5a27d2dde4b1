//! ONNX Runtime inference engine

use std::borrow::Cow;
use std::path::Path;
use std::sync::{Arc, Mutex};

use demix_core::{
    InferenceEngine, ModelInput, ModelSignature, NamedTensors, Result, SeparationError, Tensor,
};
use ndarray::{Array3, Array4};
use ort::environment::Environment;
use ort::session::builder::SessionBuilder;
use ort::session::{Session, SessionInputValue};

use crate::config::OrtConfig;

/// Input names a loaded session is fed with
#[derive(Debug, Clone, PartialEq, Eq)]
struct InputNames {
    waveform: String,
    spectrogram: Option<String>,
}

impl InputNames {
    /// Match the configured names against the inputs the model declares
    ///
    /// A configured name the model lacks falls back to declaration order:
    /// first input is the waveform, the next one the spectrogram. A model
    /// declaring a single input gets no spectrogram.
    fn resolve(declared: &[&str], signature: &ModelSignature) -> Result<Self> {
        let Some(&first) = declared.first() else {
            return Err(SeparationError::BackendInitFailed(
                "model declares no inputs".into(),
            ));
        };

        let waveform = if declared.contains(&signature.waveform_input.as_str()) {
            signature.waveform_input.clone()
        } else {
            log::warn!(
                "Model has no input '{}', feeding the waveform to '{}'",
                signature.waveform_input,
                first
            );
            first.to_string()
        };

        let spectrogram = match &signature.spectrogram_input {
            _ if declared.len() < 2 => None,
            None => None,
            Some(name) if name != &waveform && declared.contains(&name.as_str()) => {
                Some(name.clone())
            }
            Some(name) => {
                let fallback = declared.iter().find(|&&d| d != waveform).map(|d| d.to_string());
                log::warn!(
                    "Model has no input '{}', feeding the spectrogram to {:?}",
                    name,
                    fallback
                );
                fallback
            }
        };

        Ok(Self {
            waveform,
            spectrogram,
        })
    }
}

/// Session plus everything needed to feed it
struct LoadedModel {
    session: Mutex<Session>,
    inputs: InputNames,
    // Sessions must not outlive their environment
    _environment: Environment,
}

/// Separation model running in an ONNX Runtime session
///
/// Starts without a model; [`is_ready`](InferenceEngine::is_ready) stays false
/// and inference fails with `EngineNotLoaded` until one of the `load_model_*`
/// methods succeeds.
pub struct OrtEngine {
    config: OrtConfig,
    model: Option<Arc<LoadedModel>>,
}

impl OrtEngine {
    pub fn new(config: OrtConfig) -> Self {
        Self {
            config,
            model: None,
        }
    }

    pub fn config(&self) -> &OrtConfig {
        &self.config
    }

    /// Build a session from an `.onnx` file, replacing any loaded model
    pub fn load_model_from_file(&mut self, path: impl AsRef<Path>) -> Result<()> {
        let path = path.as_ref();
        match std::fs::metadata(path) {
            Ok(_) => {}
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Err(SeparationError::ModelNotFound(path.to_path_buf()));
            }
            Err(e) => return Err(e.into()),
        }

        log::info!(
            "Loading ONNX model from {:?} ({})",
            path,
            self.config.provider_name()
        );
        let environment = build_environment()?;
        let session = self
            .session_builder(&environment)?
            .commit_from_file(path)
            .map_err(|e| {
                SeparationError::BackendInitFailed(format!("Failed to load ONNX model: {}", e))
            })?;
        self.install(session, environment)
    }

    /// Build a session from model bytes already in memory
    pub fn load_model_from_memory(&mut self, model: &[u8]) -> Result<()> {
        log::info!(
            "Loading ONNX model from {} bytes ({})",
            model.len(),
            self.config.provider_name()
        );
        let environment = build_environment()?;
        let session = self
            .session_builder(&environment)?
            .commit_from_memory(model)
            .map_err(|e| {
                SeparationError::BackendInitFailed(format!("Failed to load ONNX model: {}", e))
            })?;
        self.install(session, environment)
    }

    fn install(&mut self, session: Session, environment: Environment) -> Result<()> {
        let declared: Vec<&str> = session.inputs().iter().map(|i| i.name()).collect();
        let inputs = InputNames::resolve(&declared, &self.config.signature)?;
        log::info!(
            "ONNX session ready: inputs {:?}, waveform -> '{}', spectrogram -> {:?}",
            declared,
            inputs.waveform,
            inputs.spectrogram
        );

        self.model = Some(Arc::new(LoadedModel {
            session: Mutex::new(session),
            inputs,
            _environment: environment,
        }));
        Ok(())
    }

    fn session_builder(&self, environment: &Environment) -> Result<SessionBuilder> {
        let mut builder = Session::builder(environment)
            .map_err(init_failed)?
            .with_optimization_level(self.config.optimization.into())
            .map_err(init_failed)?;
        if self.config.intra_threads > 0 {
            builder = builder
                .with_intra_threads(self.config.intra_threads)
                .map_err(init_failed)?;
        }
        if self.config.use_gpu {
            builder = with_gpu_providers(builder)?;
        }
        Ok(builder)
    }
}

fn build_environment() -> Result<Environment> {
    ort::init().with_name("demix").build().map_err(init_failed)
}

fn init_failed(e: impl std::fmt::Display) -> SeparationError {
    SeparationError::BackendInitFailed(e.to_string())
}

/// Register the compiled-in GPU providers; ONNX Runtime falls back to the
/// CPU when none of them can be initialized
#[cfg(any(feature = "cuda", feature = "directml"))]
fn with_gpu_providers(builder: SessionBuilder) -> Result<SessionBuilder> {
    let mut providers = Vec::new();
    #[cfg(feature = "cuda")]
    providers.push(ort::ep::CUDA::default().build());
    #[cfg(feature = "directml")]
    providers.push(ort::ep::DirectML::default().build());
    builder.with_execution_providers(providers).map_err(init_failed)
}

#[cfg(not(any(feature = "cuda", feature = "directml")))]
fn with_gpu_providers(builder: SessionBuilder) -> Result<SessionBuilder> {
    log::debug!("Built without GPU execution providers, using CPU");
    Ok(builder)
}

impl InferenceEngine for OrtEngine {
    fn name(&self) -> &str {
        "onnxruntime"
    }

    fn signature(&self) -> &ModelSignature {
        &self.config.signature
    }

    fn is_ready(&self) -> bool {
        self.model.is_some()
    }

    async fn infer(&self, input: ModelInput) -> Result<NamedTensors> {
        let model = self.model.clone().ok_or(SeparationError::EngineNotLoaded)?;

        tokio::task::spawn_blocking(move || run_session(&model, input))
            .await
            .map_err(|e| SeparationError::InferenceFailed(format!("Inference task failed: {}", e)))?
    }
}

/// Run one segment through the session (blocking)
fn run_session(model: &LoadedModel, input: ModelInput) -> Result<NamedTensors> {
    let [_, channels, samples] = input.waveform_shape;
    let waveform = Array3::from_shape_vec((1, channels, samples), input.waveform)
        .map_err(|e| SeparationError::InvalidInput(format!("waveform tensor: {}", e)))?;

    let mut inputs: Vec<(Cow<'static, str>, SessionInputValue<'static>)> = Vec::with_capacity(2);
    inputs.push((
        Cow::Owned(model.inputs.waveform.clone()),
        to_value(ort::value::Tensor::from_array(waveform))?,
    ));

    if let Some(name) = &model.inputs.spectrogram {
        let [_, planes, bins, frames] = input.spectrogram_shape;
        let spectrogram = Array4::from_shape_vec((1, planes, bins, frames), input.spectrogram)
            .map_err(|e| SeparationError::InvalidInput(format!("spectrogram tensor: {}", e)))?;
        inputs.push((
            Cow::Owned(name.clone()),
            to_value(ort::value::Tensor::from_array(spectrogram))?,
        ));
    }

    let mut session = model
        .session
        .lock()
        .map_err(|_| SeparationError::InferenceFailed("ONNX session lock poisoned".into()))?;
    let outputs = session
        .run(inputs)
        .map_err(|e| SeparationError::InferenceFailed(format!("Inference failed: {}", e)))?;

    let mut named = Vec::new();
    for (name, value) in outputs.iter() {
        let (shape, data) = match value.try_extract_tensor::<f32>() {
            Ok(tensor) => tensor,
            Err(e) => {
                log::debug!("Skipping non-f32 output '{}': {}", name, e);
                continue;
            }
        };
        let dims = shape
            .iter()
            .map(|&d| usize::try_from(d))
            .collect::<std::result::Result<Vec<_>, _>>()
            .map_err(|_| SeparationError::UnexpectedShape {
                name: name.to_string(),
                expected: "static non-negative dimensions".into(),
                got: Vec::new(),
            })?;
        log::debug!("Output '{}' shape {:?}", name, dims);
        named.push((name.to_string(), Tensor::new(dims, data.to_vec())?));
    }

    Ok(named)
}

fn to_value<E: std::fmt::Display>(
    tensor: std::result::Result<ort::value::Tensor<f32>, E>,
) -> Result<SessionInputValue<'static>> {
    tensor.map(SessionInputValue::from).map_err(|e| {
        SeparationError::InferenceFailed(format!("Failed to create input tensor: {}", e))
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use demix_core::config::ModelGeometry;
    use demix_core::packing::prepare_model_input;

    #[test]
    fn test_new_engine_is_not_ready() {
        let engine = OrtEngine::new(OrtConfig::default());
        assert!(!engine.is_ready());
        assert_eq!(engine.name(), "onnxruntime");
        assert_eq!(engine.signature(), &ModelSignature::default());
    }

    #[tokio::test]
    async fn test_infer_before_load_fails() {
        let engine = OrtEngine::new(OrtConfig::default());
        let g = ModelGeometry::HTDEMUCS;
        let input = prepare_model_input(&[0.0; 16], &[0.0; 16], &g).unwrap();
        let err = engine.infer(input).await.unwrap_err();
        assert!(matches!(err, SeparationError::EngineNotLoaded));
    }

    #[test]
    fn test_missing_model_file() {
        let temp_dir = tempfile::TempDir::new().unwrap();
        let mut engine = OrtEngine::new(OrtConfig::default());
        let err = engine
            .load_model_from_file(temp_dir.path().join("htdemucs.onnx"))
            .unwrap_err();
        assert!(matches!(err, SeparationError::ModelNotFound(_)));
        assert!(!engine.is_ready());
    }

    #[test]
    fn test_unreadable_model_path_is_io_error() {
        let temp_dir = tempfile::TempDir::new().unwrap();
        let file = temp_dir.path().join("htdemucs.onnx");
        std::fs::write(&file, b"not a directory").unwrap();

        let mut engine = OrtEngine::new(OrtConfig::default());
        let err = engine.load_model_from_file(file.join("nested.onnx")).unwrap_err();
        assert!(matches!(err, SeparationError::Io(_)));
    }

    fn signature(waveform: &str, spectrogram: Option<&str>) -> ModelSignature {
        ModelSignature {
            waveform_input: waveform.into(),
            spectrogram_input: spectrogram.map(String::from),
            ..Default::default()
        }
    }

    #[test]
    fn test_inputs_use_configured_names() {
        let names =
            InputNames::resolve(&["x", "input"], &signature("input", Some("x"))).unwrap();
        assert_eq!(names.waveform, "input");
        assert_eq!(names.spectrogram.as_deref(), Some("x"));
    }

    #[test]
    fn test_inputs_fall_back_to_declaration_order() {
        let names =
            InputNames::resolve(&["mix", "mag"], &ModelSignature::default()).unwrap();
        assert_eq!(names.waveform, "mix");
        assert_eq!(names.spectrogram.as_deref(), Some("mag"));
    }

    #[test]
    fn test_single_input_model_gets_no_spectrogram() {
        let names = InputNames::resolve(&["mix"], &ModelSignature::default()).unwrap();
        assert_eq!(names.waveform, "mix");
        assert_eq!(names.spectrogram, None);
    }

    #[test]
    fn test_spectrogram_disabled_by_signature() {
        let names = InputNames::resolve(&["input", "x"], &signature("input", None)).unwrap();
        assert_eq!(names.spectrogram, None);
    }

    #[test]
    fn test_spectrogram_never_shares_the_waveform_input() {
        // Configured spectrogram name is the waveform's fallback
        let names =
            InputNames::resolve(&["mix", "spec"], &signature("wave", Some("mix"))).unwrap();
        assert_eq!(names.waveform, "mix");
        assert_eq!(names.spectrogram.as_deref(), Some("spec"));
    }

    #[test]
    fn test_model_without_inputs_is_rejected() {
        let err = InputNames::resolve(&[], &ModelSignature::default()).unwrap_err();
        assert!(matches!(err, SeparationError::BackendInitFailed(_)));
    }
}
