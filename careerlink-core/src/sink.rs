use crate::model::{DetectionMethod, ResolutionResult};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// Running totals handed to the result callback after every result.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Counters {
    pub processed: usize,
    pub ok: usize,
    pub replaced: usize,
    pub unresolved: usize,
    pub error: usize,
}

impl Counters {
    pub fn record(&mut self, method: DetectionMethod) {
        self.processed += 1;
        match method {
            DetectionMethod::OriginalOk => self.ok += 1,
            m if m.is_replacement() => self.replaced += 1,
            _ => self.unresolved += 1,
        }
    }

    /// A target whose worker failed; its row is still written.
    pub fn record_error(&mut self) {
        self.processed += 1;
        self.error += 1;
    }
}

/// Called once per finished target, in completion order.
pub type ResultCallback = Arc<dyn Fn(&ResolutionResult, &Counters) + Send + Sync>;

/// One finished target as it leaves a worker.
#[derive(Debug)]
pub struct Completion {
    pub result: ResolutionResult,
    pub errored: bool,
}

impl Completion {
    pub fn ok(result: ResolutionResult) -> Self {
        Self {
            result,
            errored: false,
        }
    }

    pub fn errored(result: ResolutionResult) -> Self {
        Self {
            result,
            errored: true,
        }
    }
}

/// Owns every result of a batch. Only the collector touches it.
#[derive(Default)]
pub struct ResultSink {
    results: Vec<ResolutionResult>,
    counters: Counters,
    callback: Option<ResultCallback>,
}

impl ResultSink {
    pub fn new(callback: Option<ResultCallback>) -> Self {
        Self {
            results: Vec::new(),
            counters: Counters::default(),
            callback,
        }
    }

    pub fn push(&mut self, completion: Completion) {
        if completion.errored {
            self.counters.record_error();
        } else {
            self.counters.record(completion.result.detection_method);
        }
        if let Some(callback) = &self.callback {
            callback(&completion.result, &self.counters);
        }
        self.results.push(completion.result);
    }

    pub fn counters(&self) -> Counters {
        self.counters
    }

    pub fn len(&self) -> usize {
        self.results.len()
    }

    pub fn is_empty(&self) -> bool {
        self.results.is_empty()
    }

    /// Results restored to input order.
    pub fn into_results(self) -> (Vec<ResolutionResult>, Counters) {
        let mut results = self.results;
        results.sort_by_key(|r| r.index);
        (results, self.counters)
    }
}
