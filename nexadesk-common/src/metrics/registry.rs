use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use metrics::{Key, KeyName, Label, Level, Metadata, Recorder, SharedString};
use metrics_exporter_prometheus::{Matcher, PrometheusBuilder, PrometheusHandle, PrometheusRecorder};
use thiserror::Error;

use super::process::ProcessCollector;

/// Content type of the Prometheus text exposition format.
pub const CONTENT_TYPE: &str = "text/plain; version=0.0.4";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MetricKind {
    Counter,
    Gauge,
    Histogram,
}

impl fmt::Display for MetricKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            MetricKind::Counter => "counter",
            MetricKind::Gauge => "gauge",
            MetricKind::Histogram => "histogram",
        };
        f.write_str(name)
    }
}

#[derive(Error, Debug, PartialEq)]
pub enum MetricsError {
    #[error("metric {name} is already registered as a {existing}, not a {requested}")]
    DuplicateMetricKind {
        name: String,
        existing: MetricKind,
        requested: MetricKind,
    },
    #[error("metric {name} is a {actual}, cannot use it as a {expected}")]
    KindMismatch {
        name: String,
        expected: MetricKind,
        actual: MetricKind,
    },
    #[error("metric {name} takes {expected} label values, got {got}")]
    LabelCardinality {
        name: String,
        expected: usize,
        got: usize,
    },
    #[error("histogram {0} needs non-empty, finite, strictly increasing buckets")]
    InvalidBuckets(String),
    #[error("cannot record {value} on {name}: value must be finite")]
    InvalidValue { name: String, value: f64 },
    #[error("metric {0} is not registered in this registry")]
    Unknown(String),
    #[error("failed to build the prometheus recorder: {0}")]
    Build(String),
}

/// Declaration of a metric, handed to [`RegistryBuilder::register`].
#[derive(Debug, Clone, PartialEq)]
pub struct MetricSpec {
    name: String,
    help: String,
    kind: MetricKind,
    label_names: Vec<String>,
    buckets: Vec<f64>,
}

impl MetricSpec {
    pub fn counter(name: impl Into<String>, help: impl Into<String>) -> Self {
        Self::new(name, help, MetricKind::Counter, Vec::new())
    }

    pub fn gauge(name: impl Into<String>, help: impl Into<String>) -> Self {
        Self::new(name, help, MetricKind::Gauge, Vec::new())
    }

    pub fn histogram(name: impl Into<String>, help: impl Into<String>, buckets: &[f64]) -> Self {
        Self::new(name, help, MetricKind::Histogram, buckets.to_vec())
    }

    pub fn with_labels(mut self, label_names: &[&str]) -> Self {
        self.label_names = label_names.iter().map(|name| (*name).to_owned()).collect();
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn kind(&self) -> MetricKind {
        self.kind
    }

    fn new(
        name: impl Into<String>,
        help: impl Into<String>,
        kind: MetricKind,
        buckets: Vec<f64>,
    ) -> Self {
        Self {
            name: name.into(),
            help: help.into(),
            kind,
            label_names: Vec::new(),
            buckets,
        }
    }

    fn valid_buckets(&self) -> bool {
        !self.buckets.is_empty()
            && self.buckets.iter().all(|bound| bound.is_finite())
            && self.buckets.windows(2).all(|pair| pair[0] < pair[1])
    }
}

/// Handle to a registered metric. Cheap to clone, pass it to the registry to record samples.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Metric {
    name: Arc<str>,
    kind: MetricKind,
    label_names: Arc<[String]>,
}

impl Metric {
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn kind(&self) -> MetricKind {
        self.kind
    }

    pub fn label_names(&self) -> &[String] {
        &self.label_names
    }
}

/// Collects metric declarations at startup, then freezes them into a [`MetricsRegistry`].
pub struct RegistryBuilder {
    namespace: String,
    specs: Vec<(MetricSpec, Metric)>,
}

impl RegistryBuilder {
    /// Start a registry whose process metrics are prefixed with `namespace` (e.g. `nexadesk_`).
    pub fn new(namespace: &str) -> Self {
        let mut builder = Self {
            namespace: namespace.to_owned(),
            specs: Vec::new(),
        };
        for spec in ProcessCollector::specs(namespace) {
            builder.insert(spec);
        }
        builder
    }

    /// Register a metric, or return the existing one with the same name and kind.
    pub fn register(&mut self, spec: MetricSpec) -> Result<Metric, MetricsError> {
        if let Some((existing, metric)) = self.specs.iter().find(|(s, _)| s.name == spec.name) {
            if existing.kind != spec.kind {
                return Err(MetricsError::DuplicateMetricKind {
                    name: spec.name,
                    existing: existing.kind,
                    requested: spec.kind,
                });
            }
            return Ok(metric.clone());
        }

        if spec.kind == MetricKind::Histogram && !spec.valid_buckets() {
            return Err(MetricsError::InvalidBuckets(spec.name));
        }

        Ok(self.insert(spec))
    }

    fn insert(&mut self, spec: MetricSpec) -> Metric {
        let metric = Metric {
            name: Arc::from(spec.name.as_str()),
            kind: spec.kind,
            label_names: spec.label_names.clone().into(),
        };
        self.specs.push((spec, metric.clone()));
        metric
    }

    pub fn build(self) -> Result<MetricsRegistry, MetricsError> {
        let mut builder = PrometheusBuilder::new();
        for (spec, _) in self.specs.iter() {
            if spec.kind == MetricKind::Histogram {
                builder = builder
                    .set_buckets_for_metric(Matcher::Full(spec.name.clone()), &spec.buckets)
                    .map_err(|e| MetricsError::Build(e.to_string()))?;
            }
        }

        let recorder = builder.build_recorder();
        for (spec, _) in self.specs.iter() {
            let name = KeyName::from(spec.name.clone());
            let help = SharedString::from(spec.help.clone());
            match spec.kind {
                MetricKind::Counter => recorder.describe_counter(name, None, help),
                MetricKind::Gauge => recorder.describe_gauge(name, None, help),
                MetricKind::Histogram => recorder.describe_histogram(name, None, help),
            }
        }

        let handle = recorder.handle();
        let metrics = self
            .specs
            .into_iter()
            .map(|(spec, metric)| (spec.name, metric))
            .collect();

        Ok(MetricsRegistry {
            inner: Arc::new(Inner {
                process: ProcessCollector::new(&self.namespace),
                namespace: self.namespace,
                recorder,
                handle,
                metrics,
            }),
        })
    }
}

struct Inner {
    namespace: String,
    recorder: PrometheusRecorder,
    handle: PrometheusHandle,
    metrics: HashMap<String, Metric>,
    process: ProcessCollector,
}

/// Explicit metrics registry, shared by the request path and the worker loop.
///
/// Samples go through a dedicated `PrometheusRecorder` instead of the global
/// `metrics` recorder, so every test can build its own registry. Label
/// combinations are created on first use and kept for the process lifetime.
#[derive(Clone)]
pub struct MetricsRegistry {
    inner: Arc<Inner>,
}

impl MetricsRegistry {
    pub fn namespace(&self) -> &str {
        &self.inner.namespace
    }

    pub fn metric(&self, name: &str) -> Option<Metric> {
        self.inner.metrics.get(name).cloned()
    }

    /// Increment a counter by one.
    pub fn inc(&self, metric: &Metric, label_values: &[&str]) -> Result<(), MetricsError> {
        self.increment(metric, label_values, 1)
    }

    pub fn increment(
        &self,
        metric: &Metric,
        label_values: &[&str],
        by: u64,
    ) -> Result<(), MetricsError> {
        expect_kind(metric, MetricKind::Counter)?;
        let key = self.key(metric, label_values)?;
        self.inner
            .recorder
            .register_counter(&key, &metadata())
            .increment(by);
        Ok(())
    }

    /// Record a histogram sample or set a gauge.
    pub fn observe(
        &self,
        metric: &Metric,
        label_values: &[&str],
        value: f64,
    ) -> Result<(), MetricsError> {
        if !value.is_finite() {
            return Err(MetricsError::InvalidValue {
                name: metric.name().to_owned(),
                value,
            });
        }

        match metric.kind {
            MetricKind::Histogram => {
                let key = self.key(metric, label_values)?;
                self.inner
                    .recorder
                    .register_histogram(&key, &metadata())
                    .record(value);
            }
            MetricKind::Gauge => {
                let key = self.key(metric, label_values)?;
                self.inner
                    .recorder
                    .register_gauge(&key, &metadata())
                    .set(value);
            }
            MetricKind::Counter => {
                return Err(MetricsError::KindMismatch {
                    name: metric.name().to_owned(),
                    expected: MetricKind::Histogram,
                    actual: MetricKind::Counter,
                })
            }
        }
        Ok(())
    }

    /// Render every metric, process defaults included, in the text exposition format.
    pub fn snapshot(&self) -> String {
        for (name, value) in self.inner.process.collect() {
            let Some(metric) = self.inner.metrics.get(&name) else {
                continue;
            };
            if let Err(error) = self.observe(metric, &[], value) {
                tracing::debug!(%error, "skipping process metric");
            }
        }

        sort_families(&self.inner.handle.render())
    }

    fn key(&self, metric: &Metric, label_values: &[&str]) -> Result<Key, MetricsError> {
        if self.inner.metrics.get(metric.name()) != Some(metric) {
            return Err(MetricsError::Unknown(metric.name().to_owned()));
        }
        if label_values.len() != metric.label_names.len() {
            return Err(MetricsError::LabelCardinality {
                name: metric.name().to_owned(),
                expected: metric.label_names.len(),
                got: label_values.len(),
            });
        }

        let labels: Vec<Label> = metric
            .label_names
            .iter()
            .zip(label_values)
            .map(|(name, value)| Label::new(name.clone(), (*value).to_owned()))
            .collect();
        Ok(Key::from_parts(metric.name().to_owned(), labels))
    }
}

fn expect_kind(metric: &Metric, expected: MetricKind) -> Result<(), MetricsError> {
    if metric.kind == expected {
        Ok(())
    } else {
        Err(MetricsError::KindMismatch {
            name: metric.name().to_owned(),
            expected,
            actual: metric.kind,
        })
    }
}

fn metadata() -> Metadata<'static> {
    Metadata::new(module_path!(), Level::INFO, Some(module_path!()))
}

/// The exporter renders families and the series inside them in hash order.
/// Sort both so two scrapes of the same state render identically.
fn sort_families(rendered: &str) -> String {
    let mut families: Vec<String> = rendered
        .split("\n\n")
        .map(str::trim)
        .filter(|block| !block.is_empty())
        .map(sort_series)
        .collect();
    families.sort_by(|a, b| family_name(a).cmp(family_name(b)));

    let mut out = families.join("\n\n");
    if !out.is_empty() {
        out.push('\n');
    }
    out
}

/// Order the samples of one family block by label set, comments first.
/// Consecutive samples sharing a label set (the buckets, sum and count of one
/// histogram series) move as a group and keep their `le` order.
fn sort_series(block: &str) -> String {
    let (comments, samples): (Vec<&str>, Vec<&str>) =
        block.lines().partition(|line| line.starts_with('#'));

    let mut groups: Vec<(String, Vec<&str>)> = Vec::new();
    for sample in samples {
        let key = series_key(sample);
        if let Some((last, lines)) = groups.last_mut() {
            if *last == key {
                lines.push(sample);
                continue;
            }
        }
        groups.push((key, vec![sample]));
    }
    groups.sort_by(|a, b| a.0.cmp(&b.0));

    comments
        .into_iter()
        .chain(groups.into_iter().flat_map(|(_, lines)| lines))
        .collect::<Vec<_>>()
        .join("\n")
}

/// Label set of a sample line without the bucket bound.
fn series_key(sample: &str) -> String {
    let Some(open) = sample.find('{') else {
        return String::new();
    };
    let Some(close) = sample.rfind('}').filter(|close| *close > open) else {
        return String::new();
    };
    sample[open + 1..close]
        .split(',')
        .filter(|label| !label.starts_with("le=") && !label.starts_with("quantile="))
        .collect::<Vec<_>>()
        .join(",")
}

fn family_name(block: &str) -> &str {
    let first = block.lines().next().unwrap_or_default();
    let rest = first
        .strip_prefix("# HELP ")
        .or_else(|| first.strip_prefix("# TYPE "))
        .unwrap_or(first);
    rest.split(|c: char| c == ' ' || c == '{')
        .next()
        .unwrap_or_default()
}
