//! Local fallback model.
//!
//! The local model is expensive to bring up (runtime + weights), so it is
//! loaded lazily, at most once per process, and shared read-only afterwards.
//! The host owns the [`LocalModelHandle`] and injects it into every pipeline
//! it builds; nothing here is global.

use std::io::Write;
use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};
use std::sync::Arc;

use image::RgbImage;
use parking_lot::Mutex;

use crate::media::backend::{encode_jpeg, BackendFailure, ClassifierBackend};
use crate::media::labels::{parse_label_scores, LabelScore};
use crate::security::logging::diagnostic_snippet;

/// A loaded in-process (or process-adjacent) classifier.
pub trait LocalModel: Send + Sync {
    fn classify(&self, image: &RgbImage) -> Result<Vec<LabelScore>, BackendFailure>;
}

type Loader = dyn Fn() -> Result<Arc<dyn LocalModel>, BackendFailure> + Send + Sync;

/// Lazily initialized, process-lifetime handle to the local model.
///
/// The loader runs under a mutex so concurrent first calls cannot load the
/// model twice. A successful load is kept forever; a failed load is reported
/// to the caller and attempted again on the next call.
pub struct LocalModelHandle {
    loader: Box<Loader>,
    model: Mutex<Option<Arc<dyn LocalModel>>>,
}

impl std::fmt::Debug for LocalModelHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LocalModelHandle")
            .field("loaded", &self.is_loaded())
            .finish()
    }
}

impl LocalModelHandle {
    pub fn new<F>(loader: F) -> Self
    where
        F: Fn() -> Result<Arc<dyn LocalModel>, BackendFailure> + Send + Sync + 'static,
    {
        Self {
            loader: Box::new(loader),
            model: Mutex::new(None),
        }
    }

    /// Handle backed by a [`ProcessModel`] built from `config`.
    pub fn process(config: ProcessModelConfig) -> Self {
        Self::new(move || {
            let model = ProcessModel::load(config.clone())?;
            Ok(Arc::new(model) as Arc<dyn LocalModel>)
        })
    }

    pub fn is_loaded(&self) -> bool {
        self.model.lock().is_some()
    }

    /// Get the model, loading it on first use.
    pub fn get(&self) -> Result<Arc<dyn LocalModel>, BackendFailure> {
        let mut slot = self.model.lock();
        if let Some(model) = slot.as_ref() {
            return Ok(Arc::clone(model));
        }

        tracing::info!(target: "classifier", "Loading local fallback model");
        let model = (self.loader)()?;
        *slot = Some(Arc::clone(&model));
        Ok(model)
    }
}

/// Chain adapter that classifies through a shared [`LocalModelHandle`].
#[derive(Debug, Clone)]
pub struct LocalClassifier {
    handle: Arc<LocalModelHandle>,
}

impl LocalClassifier {
    pub fn new(handle: Arc<LocalModelHandle>) -> Self {
        Self { handle }
    }
}

impl ClassifierBackend for LocalClassifier {
    fn name(&self) -> &str {
        "local"
    }

    fn classify(&self, image: &RgbImage) -> Result<Vec<LabelScore>, BackendFailure> {
        self.handle.get()?.classify(image)
    }
}

/// How to launch the local inference program.
#[derive(Debug, Clone, PartialEq)]
pub struct ProcessModelConfig {
    pub program: String,
    pub args: Vec<String>,
    pub model: String,
}

/// Local model served by an external inference program.
///
/// The program is started as `<program> <args..> --model <model>` for each
/// image, reads one JPEG from stdin and prints the same
/// `[{"label": ..., "score": ...}]` array a remote endpoint would return.
#[derive(Debug, Clone)]
pub struct ProcessModel {
    program: PathBuf,
    args: Vec<String>,
    model: String,
}

impl ProcessModel {
    /// Resolve the program on disk. A missing runtime is reported as
    /// [`BackendFailure::Unavailable`].
    pub fn load(config: ProcessModelConfig) -> Result<Self, BackendFailure> {
        let program = resolve_program(&config.program).ok_or_else(|| {
            BackendFailure::Unavailable(format!(
                "local model program not found: {}",
                config.program
            ))
        })?;
        tracing::info!(
            target: "classifier",
            program = %program.display(),
            model = %config.model,
            "Local fallback model ready"
        );
        Ok(Self {
            program,
            args: config.args,
            model: config.model,
        })
    }
}

impl LocalModel for ProcessModel {
    fn classify(&self, image: &RgbImage) -> Result<Vec<LabelScore>, BackendFailure> {
        let jpeg = encode_jpeg(image)?;

        let mut child = Command::new(&self.program)
            .args(&self.args)
            .arg("--model")
            .arg(&self.model)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()
            .map_err(|e| BackendFailure::Unavailable(format!("failed to start local model: {e}")))?;

        // stdin is fed from its own thread while stdout and stderr drain here,
        // so a chatty runtime cannot fill a pipe and stall both sides.
        let stdin = child.stdin.take();
        let output = std::thread::scope(|scope| {
            if let Some(mut stdin) = stdin {
                let jpeg = jpeg.as_slice();
                scope.spawn(move || {
                    // A program that exits early closes the pipe; its exit status says why.
                    if let Err(e) = stdin.write_all(jpeg) {
                        tracing::debug!(target: "classifier", error = %e, "Local model closed stdin early");
                    }
                });
            }
            child.wait_with_output()
        })
        .map_err(|e| BackendFailure::Request(format!("local model did not finish: {e}")))?;

        if !output.status.success() {
            return Err(BackendFailure::Unavailable(format!(
                "local model exited with {}: {}",
                output.status,
                diagnostic_snippet(&String::from_utf8_lossy(&output.stderr))
            )));
        }

        parse_label_scores(&output.stdout)
    }
}

/// Find an executable: paths containing a separator are taken as-is,
/// bare names are looked up on `PATH`.
fn resolve_program(program: &str) -> Option<PathBuf> {
    let program = program.trim();
    if program.is_empty() {
        return None;
    }
    let candidate = Path::new(program);
    if candidate.components().count() > 1 {
        return candidate.is_file().then(|| candidate.to_path_buf());
    }
    let path = std::env::var_os("PATH")?;
    std::env::split_paths(&path)
        .map(|dir| dir.join(program))
        .find(|p| p.is_file())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct FixedModel(f64);

    impl LocalModel for FixedModel {
        fn classify(&self, _image: &RgbImage) -> Result<Vec<LabelScore>, BackendFailure> {
            Ok(vec![LabelScore::new("Fake", self.0)])
        }
    }

    fn image() -> RgbImage {
        RgbImage::from_pixel(2, 2, image::Rgb([0, 0, 0]))
    }

    #[test]
    fn test_handle_loads_once() {
        let loads = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&loads);
        let handle = Arc::new(LocalModelHandle::new(move || {
            counter.fetch_add(1, Ordering::SeqCst);
            Ok(Arc::new(FixedModel(0.7)) as Arc<dyn LocalModel>)
        }));
        assert!(!handle.is_loaded());

        let backend = LocalClassifier::new(Arc::clone(&handle));
        for _ in 0..5 {
            assert_eq!(backend.classify(&image()).unwrap()[0].score, 0.7);
        }
        assert!(handle.is_loaded());
        assert_eq!(loads.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_handle_concurrent_first_use_loads_once() {
        let loads = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&loads);
        let handle = Arc::new(LocalModelHandle::new(move || {
            counter.fetch_add(1, Ordering::SeqCst);
            std::thread::sleep(std::time::Duration::from_millis(20));
            Ok(Arc::new(FixedModel(0.4)) as Arc<dyn LocalModel>)
        }));

        let threads: Vec<_> = (0..8)
            .map(|_| {
                let handle = Arc::clone(&handle);
                std::thread::spawn(move || handle.get().map(|_| ()))
            })
            .collect();
        for t in threads {
            t.join().unwrap().unwrap();
        }
        assert_eq!(loads.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_failed_load_is_reported_and_retried() {
        let attempts = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&attempts);
        let handle = LocalModelHandle::new(move || {
            let n = counter.fetch_add(1, Ordering::SeqCst);
            if n == 0 {
                Err(BackendFailure::Unavailable("weights missing".into()))
            } else {
                Ok(Arc::new(FixedModel(0.2)) as Arc<dyn LocalModel>)
            }
        });

        assert!(matches!(handle.get(), Err(BackendFailure::Unavailable(_))));
        assert!(!handle.is_loaded());
        assert!(handle.get().is_ok());
        assert!(handle.is_loaded());
        assert_eq!(attempts.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn test_process_model_missing_program() {
        let err = ProcessModel::load(ProcessModelConfig {
            program: "/nonexistent/shadowfix-local-model".into(),
            args: vec![],
            model: "m".into(),
        })
        .unwrap_err();
        assert!(matches!(err, BackendFailure::Unavailable(_)));
    }

    #[test]
    fn test_resolve_program_blank() {
        assert_eq!(resolve_program(""), None);
        assert_eq!(resolve_program("   "), None);
    }

    #[cfg(unix)]
    #[test]
    fn test_process_model_round_trip_through_script() {
        let dir = tempfile::tempdir().unwrap();
        let script = dir.path().join("model.sh");
        std::fs::write(
            &script,
            "cat > /dev/null\necho '[{\"label\": \"Fake\", \"score\": 0.83}]'\n",
        )
        .unwrap();

        let handle = LocalModelHandle::process(ProcessModelConfig {
            program: "/bin/sh".into(),
            args: vec![script.to_string_lossy().into_owned()],
            model: "dima806/deepfake_vs_real_image_detection".into(),
        });
        let scores = handle.get().unwrap().classify(&image()).unwrap();
        assert_eq!(scores, vec![LabelScore::new("Fake", 0.83)]);
    }

    #[cfg(unix)]
    #[test]
    fn test_process_model_survives_stderr_flood_before_reading_stdin() {
        let dir = tempfile::tempdir().unwrap();
        let script = dir.path().join("noisy.sh");
        std::fs::write(
            &script,
            "head -c 200000 /dev/zero >&2\n\
             cat > /dev/null\n\
             echo '[{\"label\": \"Real\", \"score\": 0.9}]'\n",
        )
        .unwrap();

        let model = ProcessModel::load(ProcessModelConfig {
            program: "/bin/sh".into(),
            args: vec![script.to_string_lossy().into_owned()],
            model: "m".into(),
        })
        .unwrap();

        // High-frequency pixels so the JPEG is larger than a pipe buffer.
        let mut seed: u32 = 0x2545_f491;
        let frame = RgbImage::from_fn(1024, 1024, |_, _| {
            seed = seed.wrapping_mul(1_664_525).wrapping_add(1_013_904_223);
            let [a, b, c, _] = seed.to_le_bytes();
            image::Rgb([a, b, c])
        });
        assert!(encode_jpeg(&frame).unwrap().len() > 256 * 1024);

        let (tx, rx) = std::sync::mpsc::channel();
        std::thread::spawn(move || {
            let _ = tx.send(model.classify(&frame));
        });
        let scores = rx
            .recv_timeout(std::time::Duration::from_secs(30))
            .expect("local model classify did not return")
            .unwrap();
        assert_eq!(scores, vec![LabelScore::new("Real", 0.9)]);
    }

    #[cfg(unix)]
    #[test]
    fn test_process_model_nonzero_exit_is_failure() {
        let dir = tempfile::tempdir().unwrap();
        let script = dir.path().join("broken.sh");
        std::fs::write(&script, "cat > /dev/null\necho 'no torch' >&2\nexit 3\n").unwrap();

        let model = ProcessModel::load(ProcessModelConfig {
            program: "/bin/sh".into(),
            args: vec![script.to_string_lossy().into_owned()],
            model: "m".into(),
        })
        .unwrap();
        match model.classify(&image()) {
            Err(BackendFailure::Unavailable(msg)) => assert!(msg.contains("no torch")),
            other => panic!("expected Unavailable, got {other:?}"),
        }
    }
}
