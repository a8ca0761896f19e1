//! Declarative description of what a plugin emits.
//!
//! A [`Schema`] is the emission contract: the emitter only writes metrics it
//! names, the rate helper only converts metrics it marks as counters, and the
//! graph-definition handshake is rendered straight from it.

use serde::Serialize;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Unit {
    Integer,
    Float,
    Bytes,
    Percentage,
}

/// Whether the backend sees the raw value or its per-second rate.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Kind {
    Counter,
    Gauge,
}

#[derive(Debug, Clone, PartialEq)]
pub struct MetricDef {
    pub name: &'static str,
    pub label: &'static str,
    pub kind: Kind,
    pub stacked: bool,
}

impl MetricDef {
    pub const fn counter(name: &'static str, label: &'static str) -> Self {
        Self { name, label, kind: Kind::Counter, stacked: false }
    }

    pub const fn gauge(name: &'static str, label: &'static str) -> Self {
        Self { name, label, kind: Kind::Gauge, stacked: false }
    }

    pub const fn stacked(self) -> Self {
        Self { stacked: true, ..self }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Graph {
    /// Dotted group key below the metric-key prefix, e.g. `total.bytes`.
    pub key: &'static str,
    pub label: String,
    pub unit: Unit,
    pub metrics: Vec<MetricDef>,
}

impl Graph {
    pub fn new(key: &'static str, label: String, unit: Unit, metrics: &[MetricDef]) -> Self {
        Self { key, label, unit, metrics: metrics.to_vec() }
    }
}

#[derive(Debug, Clone, PartialEq, Default)]
pub struct Schema {
    pub graphs: Vec<Graph>,
}

impl Schema {
    pub fn new(graphs: Vec<Graph>) -> Self {
        Self { graphs }
    }

    /// `(graph key, metric)` pairs in declaration order.
    pub fn metrics(&self) -> impl Iterator<Item = (&'static str, &MetricDef)> {
        self.graphs
            .iter()
            .flat_map(|g| g.metrics.iter().map(move |m| (g.key, m)))
    }

    pub fn get(&self, name: &str) -> Option<&MetricDef> {
        self.metrics().map(|(_, m)| m).find(|m| m.name == name)
    }

    pub fn has_counters(&self) -> bool {
        self.metrics().any(|(_, m)| m.kind == Kind::Counter)
    }

    pub fn names(&self) -> Vec<&'static str> {
        self.metrics().map(|(_, m)| m.name).collect()
    }
}
