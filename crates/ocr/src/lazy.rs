//! Deferred engine construction
//!
//! Loading an engine can be expensive (language data, model files), and a
//! job may never need its fallback. `LazyEngine` runs the constructor on the
//! first `recognize` call and caches the outcome, including failure: a
//! constructor that failed once is never retried, and every later call
//! reports `Unavailable` with the original reason.

use image::RgbImage;
use once_cell::sync::OnceCell;
use tracing::{info, warn};

use crate::{EngineError, Recognition, RecognitionEngine, RecognitionOptions};

type Constructor =
    Box<dyn Fn() -> Result<Box<dyn RecognitionEngine>, EngineError> + Send + Sync>;

pub struct LazyEngine {
    name: String,
    constructor: Constructor,
    engine: OnceCell<Result<Box<dyn RecognitionEngine>, String>>,
}

impl LazyEngine {
    pub fn new<F>(name: impl Into<String>, constructor: F) -> Self
    where
        F: Fn() -> Result<Box<dyn RecognitionEngine>, EngineError> + Send + Sync + 'static,
    {
        Self {
            name: name.into(),
            constructor: Box::new(constructor),
            engine: OnceCell::new(),
        }
    }

    /// Whether the constructor has run
    #[must_use]
    pub fn is_initialized(&self) -> bool {
        self.engine.get().is_some()
    }

    fn engine(&self) -> Result<&dyn RecognitionEngine, EngineError> {
        let slot = self.engine.get_or_init(|| match (self.constructor)() {
            Ok(engine) => {
                info!("Initialized recognition engine {}", self.name);
                Ok(engine)
            }
            Err(e) => {
                warn!("Recognition engine {} unavailable: {}", self.name, e);
                Err(e.to_string())
            }
        });
        match slot {
            Ok(engine) => Ok(engine.as_ref()),
            Err(reason) => Err(EngineError::Unavailable(reason.clone())),
        }
    }
}

impl RecognitionEngine for LazyEngine {
    fn name(&self) -> &str {
        &self.name
    }

    fn recognize(
        &self,
        image: &RgbImage,
        options: &RecognitionOptions,
    ) -> Result<Recognition, EngineError> {
        self.engine()?.recognize(image, options)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    struct Echo;

    impl RecognitionEngine for Echo {
        fn name(&self) -> &str {
            "echo"
        }

        fn recognize(
            &self,
            _image: &RgbImage,
            options: &RecognitionOptions,
        ) -> Result<Recognition, EngineError> {
            Ok(Recognition {
                lines: vec![options.language.clone()],
                confidences: None,
            })
        }
    }

    #[test]
    fn test_constructor_runs_once() {
        let calls = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&calls);
        let engine = LazyEngine::new("echo", move || {
            counter.fetch_add(1, Ordering::SeqCst);
            Ok(Box::new(Echo) as Box<dyn RecognitionEngine>)
        });

        assert!(!engine.is_initialized());
        assert_eq!(calls.load(Ordering::SeqCst), 0);

        let image = RgbImage::new(2, 2);
        for _ in 0..3 {
            let recognition = engine.recognize(&image, &RecognitionOptions::default()).unwrap();
            assert_eq!(recognition.lines, vec!["eng"]);
        }
        assert!(engine.is_initialized());
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_failed_constructor_is_cached() {
        let calls = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&calls);
        let engine = LazyEngine::new("broken", move || {
            counter.fetch_add(1, Ordering::SeqCst);
            Err(EngineError::Unavailable("no language data".to_string()))
        });

        let image = RgbImage::new(2, 2);
        for _ in 0..2 {
            match engine.recognize(&image, &RecognitionOptions::default()) {
                Err(EngineError::Unavailable(reason)) => assert!(reason.contains("no language data")),
                other => panic!("expected Unavailable, got {other:?}"),
            }
        }
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_shared_across_threads() {
        let calls = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&calls);
        let engine = Arc::new(LazyEngine::new("echo", move || {
            counter.fetch_add(1, Ordering::SeqCst);
            Ok(Box::new(Echo) as Box<dyn RecognitionEngine>)
        }));

        let handles: Vec<_> = (0..4)
            .map(|_| {
                let engine = Arc::clone(&engine);
                std::thread::spawn(move || {
                    engine
                        .recognize(&RgbImage::new(2, 2), &RecognitionOptions::default())
                        .is_ok()
                })
            })
            .collect();
        for handle in handles {
            assert!(handle.join().unwrap());
        }
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }
}
