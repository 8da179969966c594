// Deterministic embedding provider shared by unit tests

use std::collections::HashMap;
use std::sync::Mutex;

use crate::embeddings::EmbeddingProvider;
use crate::{KbError, Result};

pub(crate) struct FakeProvider {
    model: String,
    overrides: HashMap<String, Vec<f32>>,
    fail_after: Option<usize>,
    calls: Mutex<Vec<usize>>,
}

impl FakeProvider {
    pub(crate) fn new(model: &str) -> Self {
        Self {
            model: model.to_string(),
            overrides: HashMap::new(),
            fail_after: None,
            calls: Mutex::new(Vec::new()),
        }
    }

    /// Pins the vector returned for one exact text.
    pub(crate) fn with_vector(mut self, text: &str, vector: Vec<f32>) -> Self {
        self.overrides.insert(text.to_string(), vector);
        self
    }

    /// Fails every call after the first `calls` succeed.
    pub(crate) fn failing_after(mut self, calls: usize) -> Self {
        self.fail_after = Some(calls);
        self
    }

    /// Batch sizes of every call made so far, failed ones included.
    pub(crate) fn calls(&self) -> Vec<usize> {
        self.calls.lock().expect("calls lock").clone()
    }

    /// Vector for texts without an override: letter-class counts plus a bias
    /// so no vector is zero.
    pub(crate) fn vector_for(&self, text: &str) -> Vec<f32> {
        if let Some(vector) = self.overrides.get(text) {
            return vector.clone();
        }
        let mut vector = vec![1.0_f32, 0.0, 0.0, 0.0];
        for byte in text.bytes() {
            vector[usize::from(byte % 3) + 1] += 1.0;
        }
        vector
    }
}

impl EmbeddingProvider for FakeProvider {
    fn model(&self) -> &str {
        &self.model
    }

    fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        let call = {
            let mut calls = self.calls.lock().expect("calls lock");
            calls.push(texts.len());
            calls.len()
        };
        if self.fail_after.is_some_and(|limit| call > limit) {
            return Err(KbError::Embedding("connection refused".to_string()));
        }
        Ok(texts.iter().map(|text| self.vector_for(text)).collect())
    }
}
