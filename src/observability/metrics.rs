//! Metrics collection and exposition.
//!
//! # Responsibilities
//! - Declare counters once per registry
//! - Record request counts keyed by method, route template, status
//! - Render Prometheus text exposition for the scrape endpoint
//!
//! # Metrics
//! - `http_requests_total` (counter): total requests by method, path, status
//!
//! # Design Decisions
//! - Each registry owns its own recorder instead of installing a global one,
//!   so independent registries never share state
//! - Route template (not raw path) as label to bound cardinality
//! - Rendering is uncached; every scrape reads the live atomics

use std::collections::HashSet;
use std::sync::{Arc, Mutex, PoisonError};

use metrics::{counter, describe_counter, Label};
use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle, PrometheusRecorder};

/// Content type of the text exposition format.
pub const EXPOSITION_CONTENT_TYPE: &str = "text/plain; version=0.0.4";

/// A named counter and its label dimensions.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CounterDefinition {
    pub name: &'static str,
    pub help: &'static str,
    pub labels: &'static [&'static str],
}

/// Request counter recorded by the instrumentation middleware.
pub const HTTP_REQUESTS_TOTAL: CounterDefinition = CounterDefinition {
    name: "http_requests_total",
    help: "Total number of HTTP requests",
    labels: &["method", "path", "status"],
};

#[derive(Debug, thiserror::Error)]
pub enum MetricsError {
    #[error("counter '{0}' is already registered")]
    AlreadyRegistered(&'static str),
    #[error("counter '{name}' expects {expected} label values, got {actual}")]
    LabelMismatch {
        name: &'static str,
        expected: usize,
        actual: usize,
    },
}

struct RegistryInner {
    recorder: PrometheusRecorder,
    handle: PrometheusHandle,
    registered: Mutex<HashSet<&'static str>>,
}

/// Process metrics registry backed by a Prometheus recorder.
#[derive(Clone)]
pub struct MetricsRegistry {
    inner: Arc<RegistryInner>,
}

impl MetricsRegistry {
    pub fn new() -> Self {
        let recorder = PrometheusBuilder::new().build_recorder();
        let handle = recorder.handle();
        Self {
            inner: Arc::new(RegistryInner {
                recorder,
                handle,
                registered: Mutex::new(HashSet::new()),
            }),
        }
    }

    /// Declare a counter. Declaring the same name twice is an error.
    pub fn register(&self, definition: CounterDefinition) -> Result<CounterHandle, MetricsError> {
        let newly_added = self
            .inner
            .registered
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(definition.name);
        if !newly_added {
            return Err(MetricsError::AlreadyRegistered(definition.name));
        }

        metrics::with_local_recorder(&self.inner.recorder, || {
            describe_counter!(definition.name, definition.help);
        });

        tracing::info!(
            counter = definition.name,
            labels = ?definition.labels,
            "Counter registered"
        );

        Ok(CounterHandle {
            registry: self.clone(),
            definition,
        })
    }

    /// Render every series in the text exposition format.
    pub fn render(&self) -> String {
        self.inner.handle.render()
    }
}

impl Default for MetricsRegistry {
    fn default() -> Self {
        Self::new()
    }
}

/// Write handle for one registered counter.
#[derive(Clone)]
pub struct CounterHandle {
    registry: MetricsRegistry,
    definition: CounterDefinition,
}

impl CounterHandle {
    pub fn definition(&self) -> &CounterDefinition {
        &self.definition
    }

    /// Add one to the series identified by `values`, in label order.
    pub fn increment(&self, values: &[&str]) -> Result<(), MetricsError> {
        let expected = self.definition.labels.len();
        if values.len() != expected {
            return Err(MetricsError::LabelMismatch {
                name: self.definition.name,
                expected,
                actual: values.len(),
            });
        }

        let labels: Vec<Label> = self
            .definition
            .labels
            .iter()
            .zip(values)
            .map(|(key, value)| Label::new(*key, value.to_string()))
            .collect();

        metrics::with_local_recorder(&self.registry.inner.recorder, || {
            counter!(self.definition.name, labels).increment(1);
        });
        Ok(())
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use std::thread;

    /// Find the value of the series whose labels include every pair in `labels`.
    pub(crate) fn sample(exposition: &str, name: &str, labels: &[(&str, &str)]) -> Option<u64> {
        exposition
            .lines()
            .filter(|line| line.starts_with(&format!("{}{{", name)))
            .find(|line| {
                labels
                    .iter()
                    .all(|(k, v)| line.contains(&format!("{}=\"{}\"", k, v)))
            })
            .and_then(|line| line.rsplit(' ').next())
            .and_then(|value| value.parse().ok())
    }

    #[test]
    fn test_double_registration_fails() {
        let registry = MetricsRegistry::new();
        assert!(registry.register(HTTP_REQUESTS_TOTAL).is_ok());

        let err = registry.register(HTTP_REQUESTS_TOTAL).err().unwrap();
        assert!(matches!(err, MetricsError::AlreadyRegistered("http_requests_total")));
    }

    #[test]
    fn test_registries_are_independent() {
        let first = MetricsRegistry::new();
        let second = MetricsRegistry::new();
        let a = first.register(HTTP_REQUESTS_TOTAL).unwrap();
        second.register(HTTP_REQUESTS_TOTAL).unwrap();

        a.increment(&["GET", "/a", "200"]).unwrap();

        let labels = [("method", "GET"), ("path", "/a"), ("status", "200")];
        assert_eq!(sample(&first.render(), "http_requests_total", &labels), Some(1));
        assert_eq!(sample(&second.render(), "http_requests_total", &labels), None);
    }

    #[test]
    fn test_label_count_must_match() {
        let registry = MetricsRegistry::new();
        let counter = registry.register(HTTP_REQUESTS_TOTAL).unwrap();

        let err = counter.increment(&["GET", "/a"]).unwrap_err();
        assert!(matches!(
            err,
            MetricsError::LabelMismatch { expected: 3, actual: 2, .. }
        ));
        assert!(sample(&registry.render(), "http_requests_total", &[]).is_none());
    }

    #[test]
    fn test_concurrent_increments_are_exact() {
        let registry = MetricsRegistry::new();
        let counter = registry.register(HTTP_REQUESTS_TOTAL).unwrap();

        let workers: Vec<_> = (0..8)
            .map(|i| {
                let counter = counter.clone();
                thread::spawn(move || {
                    let status = if i % 2 == 0 { "200" } else { "500" };
                    for _ in 0..1_000 {
                        counter.increment(&["POST", "/users/{id}", status]).unwrap();
                    }
                })
            })
            .collect();
        for worker in workers {
            worker.join().unwrap();
        }

        let body = registry.render();
        let ok = [("method", "POST"), ("path", "/users/{id}"), ("status", "200")];
        let failed = [("method", "POST"), ("path", "/users/{id}"), ("status", "500")];
        assert_eq!(sample(&body, "http_requests_total", &ok), Some(4_000));
        assert_eq!(sample(&body, "http_requests_total", &failed), Some(4_000));
    }

    #[test]
    fn test_render_is_exposition_format() {
        let registry = MetricsRegistry::new();
        let counter = registry.register(HTTP_REQUESTS_TOTAL).unwrap();
        counter.increment(&["GET", "/metrics", "200"]).unwrap();
        counter.increment(&["GET", "", "404"]).unwrap();

        let body = registry.render();
        assert!(body.contains("# TYPE http_requests_total counter"));
        assert!(body.contains("# HELP http_requests_total Total number of HTTP requests"));

        for line in body.lines().filter(|l| !l.is_empty() && !l.starts_with('#')) {
            let (series, value) = line.rsplit_once(' ').unwrap();
            assert!(series.starts_with("http_requests_total{"), "{}", line);
            assert!(series.ends_with('}'), "{}", line);
            assert!(value.parse::<f64>().is_ok(), "{}", line);
        }

        let unmatched = [("method", "GET"), ("path", ""), ("status", "404")];
        assert_eq!(sample(&body, "http_requests_total", &unmatched), Some(1));
    }
}
