//! Metric registry: declared families and their live values.
//!
//! The registry is `Clone` + `Send` + `Sync` (backed by `Arc<RwLock<..>>`)
//! and is shared between the collection loop and the HTTP exporter. Each
//! write takes the write lock once, so a scrape never observes a torn
//! family; [`MetricRegistry::apply_all`] extends that to a whole batch.

use std::collections::{BTreeMap, HashMap};
use std::sync::{Arc, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};

use tracing::debug;

use crate::error::{MetricsError, MetricsResult};

/// Position of a family inside its registry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct MetricId(usize);

/// Live value of one metric family.
#[derive(Debug, Clone, PartialEq)]
pub enum FamilyValue {
    /// Samples keyed by label values. Unlabeled gauges use the empty key.
    Gauge(BTreeMap<Vec<String>, f64>),
    /// One active state out of a closed set.
    EnumState {
        states: Vec<String>,
        current: Option<usize>,
    },
    /// A string → string record replaced as a whole.
    Info(Option<BTreeMap<String, String>>),
}

impl FamilyValue {
    fn kind(&self) -> &'static str {
        match self {
            FamilyValue::Gauge(_) => "gauge",
            FamilyValue::EnumState { .. } => "enum",
            FamilyValue::Info(_) => "info",
        }
    }
}

/// A declared metric: fixed name, help text and label schema, plus its value.
#[derive(Debug, Clone, PartialEq)]
pub struct MetricFamily {
    pub name: String,
    pub help: String,
    pub label_names: Vec<String>,
    pub value: FamilyValue,
}

/// A pending write, produced by a metric handle.
#[derive(Debug, Clone, PartialEq)]
pub enum Update {
    Gauge {
        id: MetricId,
        labels: Vec<String>,
        value: f64,
    },
    State {
        id: MetricId,
        state: String,
    },
    Info {
        id: MetricId,
        record: BTreeMap<String, String>,
    },
}

/// Handle to an unlabeled gauge.
#[derive(Debug, Clone, Copy)]
pub struct Gauge {
    id: MetricId,
}

impl Gauge {
    pub fn set(&self, value: f64) -> Update {
        Update::Gauge {
            id: self.id,
            labels: Vec::new(),
            value,
        }
    }
}

/// Handle to a gauge keyed by label values.
#[derive(Debug, Clone, Copy)]
pub struct GaugeVec {
    id: MetricId,
}

impl GaugeVec {
    /// Set the sample for one label combination. Label values are given in
    /// declaration order.
    pub fn set(&self, labels: &[&str], value: f64) -> Update {
        Update::Gauge {
            id: self.id,
            labels: labels.iter().map(|l| l.to_string()).collect(),
            value,
        }
    }
}

/// Handle to an enumerated-state metric.
#[derive(Debug, Clone, Copy)]
pub struct EnumState {
    id: MetricId,
}

impl EnumState {
    pub fn state(&self, state: &str) -> Update {
        Update::State {
            id: self.id,
            state: state.to_string(),
        }
    }
}

/// Handle to an informational record.
#[derive(Debug, Clone, Copy)]
pub struct Info {
    id: MetricId,
}

impl Info {
    pub fn info<I, K, V>(&self, record: I) -> Update
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        Update::Info {
            id: self.id,
            record: record
                .into_iter()
                .map(|(k, v)| (k.into(), v.into()))
                .collect(),
        }
    }
}

#[derive(Default)]
struct Inner {
    /// Families in declaration order.
    families: Vec<MetricFamily>,
    /// name → index into `families`.
    by_name: HashMap<String, usize>,
}

impl Inner {
    fn declare(
        &mut self,
        name: &str,
        help: &str,
        label_names: &[&str],
        value: FamilyValue,
    ) -> MetricsResult<MetricId> {
        if !valid_name(name) {
            return Err(MetricsError::InvalidName(name.to_string()));
        }
        if let Some(bad) = label_names.iter().find(|l| !valid_name(l) || l.contains(':')) {
            return Err(MetricsError::InvalidName(bad.to_string()));
        }
        if self.by_name.contains_key(name) {
            return Err(MetricsError::Duplicate(name.to_string()));
        }

        let index = self.families.len();
        self.families.push(MetricFamily {
            name: name.to_string(),
            help: help.to_string(),
            label_names: label_names.iter().map(|l| l.to_string()).collect(),
            value,
        });
        self.by_name.insert(name.to_string(), index);
        debug!(metric = %name, "metric declared");
        Ok(MetricId(index))
    }

    fn family(&self, id: MetricId) -> MetricsResult<&MetricFamily> {
        self.families.get(id.0).ok_or(MetricsError::UnknownMetric(id.0))
    }

    /// Check an update against the declared schema without writing it.
    fn validate(&self, update: &Update) -> MetricsResult<()> {
        match update {
            Update::Gauge { id, labels, .. } => {
                let family = self.family(*id)?;
                if !matches!(family.value, FamilyValue::Gauge(_)) {
                    return Err(kind_mismatch(family, "gauge"));
                }
                if labels.len() != family.label_names.len() {
                    return Err(MetricsError::LabelArity {
                        name: family.name.clone(),
                        expected: family.label_names.len(),
                        actual: labels.len(),
                    });
                }
            }
            Update::State { id, state } => {
                let family = self.family(*id)?;
                match &family.value {
                    FamilyValue::EnumState { states, .. } => {
                        if !states.iter().any(|s| s == state) {
                            return Err(MetricsError::UnknownState {
                                name: family.name.clone(),
                                state: state.clone(),
                            });
                        }
                    }
                    _ => return Err(kind_mismatch(family, "enum")),
                }
            }
            Update::Info { id, .. } => {
                let family = self.family(*id)?;
                if !matches!(family.value, FamilyValue::Info(_)) {
                    return Err(kind_mismatch(family, "info"));
                }
            }
        }
        Ok(())
    }

    /// Write a validated update.
    fn write(&mut self, update: Update) {
        match update {
            Update::Gauge { id, labels, value } => {
                if let Some(FamilyValue::Gauge(samples)) =
                    self.families.get_mut(id.0).map(|f| &mut f.value)
                {
                    samples.insert(labels, value);
                }
            }
            Update::State { id, state } => {
                if let Some(FamilyValue::EnumState { states, current }) =
                    self.families.get_mut(id.0).map(|f| &mut f.value)
                {
                    *current = states.iter().position(|s| *s == state);
                }
            }
            Update::Info { id, record } => {
                if let Some(FamilyValue::Info(slot)) =
                    self.families.get_mut(id.0).map(|f| &mut f.value)
                {
                    *slot = Some(record);
                }
            }
        }
    }

    fn by_name(&self, name: &str) -> Option<&MetricFamily> {
        self.by_name.get(name).map(|&i| &self.families[i])
    }
}

fn kind_mismatch(family: &MetricFamily, expected: &'static str) -> MetricsError {
    MetricsError::KindMismatch {
        name: family.name.clone(),
        expected,
        actual: family.value.kind(),
    }
}

/// Prometheus metric name rule: `[a-zA-Z_:][a-zA-Z0-9_:]*`.
fn valid_name(name: &str) -> bool {
    let mut chars = name.chars();
    match chars.next() {
        Some(c) if c.is_ascii_alphabetic() || c == '_' || c == ':' => {}
        _ => return false,
    }
    chars.all(|c| c.is_ascii_alphanumeric() || c == '_' || c == ':')
}

/// Holder of every declared metric and its latest value.
#[derive(Clone, Default)]
pub struct MetricRegistry {
    inner: Arc<RwLock<Inner>>,
}

impl std::fmt::Debug for MetricRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MetricRegistry")
            .field("families", &self.read().families.len())
            .finish()
    }
}

impl MetricRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    fn read(&self) -> RwLockReadGuard<'_, Inner> {
        self.inner.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write_lock(&self) -> RwLockWriteGuard<'_, Inner> {
        self.inner.write().unwrap_or_else(PoisonError::into_inner)
    }

    /// Declare an unlabeled gauge. It reads as `0` until first written.
    pub fn gauge(&self, name: &str, help: &str) -> MetricsResult<Gauge> {
        let mut samples = BTreeMap::new();
        samples.insert(Vec::new(), 0.0);
        let id = self
            .write_lock()
            .declare(name, help, &[], FamilyValue::Gauge(samples))?;
        Ok(Gauge { id })
    }

    /// Declare a gauge keyed by the given label names.
    pub fn gauge_vec(&self, name: &str, help: &str, labels: &[&str]) -> MetricsResult<GaugeVec> {
        let id = self
            .write_lock()
            .declare(name, help, labels, FamilyValue::Gauge(BTreeMap::new()))?;
        Ok(GaugeVec { id })
    }

    /// Declare an enumerated-state metric over a closed set of states.
    pub fn enum_state(&self, name: &str, help: &str, states: &[&str]) -> MetricsResult<EnumState> {
        let value = FamilyValue::EnumState {
            states: states.iter().map(|s| s.to_string()).collect(),
            current: None,
        };
        let id = self.write_lock().declare(name, help, &[], value)?;
        Ok(EnumState { id })
    }

    /// Declare an informational record.
    pub fn info(&self, name: &str, help: &str) -> MetricsResult<Info> {
        let id = self
            .write_lock()
            .declare(name, help, &[], FamilyValue::Info(None))?;
        Ok(Info { id })
    }

    /// Apply a single update.
    pub fn apply(&self, update: Update) -> MetricsResult<()> {
        let mut inner = self.write_lock();
        inner.validate(&update)?;
        inner.write(update);
        Ok(())
    }

    /// Validate every update, then apply them all under one write lock.
    ///
    /// If any update is invalid nothing is written. Returns the number of
    /// updates applied.
    pub fn apply_all(&self, updates: Vec<Update>) -> MetricsResult<usize> {
        let mut inner = self.write_lock();
        for update in &updates {
            inner.validate(update)?;
        }
        let count = updates.len();
        for update in updates {
            inner.write(update);
        }
        Ok(count)
    }

    /// Current value of a gauge sample, if it has been written.
    pub fn gauge_value(&self, name: &str, labels: &[&str]) -> Option<f64> {
        let inner = self.read();
        match &inner.by_name(name)?.value {
            FamilyValue::Gauge(samples) => samples
                .iter()
                .find(|(key, _)| key.iter().map(String::as_str).eq(labels.iter().copied()))
                .map(|(_, value)| *value),
            _ => None,
        }
    }

    /// Number of label combinations recorded for a gauge.
    pub fn sample_count(&self, name: &str) -> usize {
        let inner = self.read();
        match inner.by_name(name).map(|f| &f.value) {
            Some(FamilyValue::Gauge(samples)) => samples.len(),
            _ => 0,
        }
    }

    /// Active state of an enum metric.
    pub fn enum_value(&self, name: &str) -> Option<String> {
        let inner = self.read();
        match &inner.by_name(name)?.value {
            FamilyValue::EnumState { states, current } => current.map(|i| states[i].clone()),
            _ => None,
        }
    }

    /// Current record of an info metric.
    pub fn info_value(&self, name: &str) -> Option<BTreeMap<String, String>> {
        let inner = self.read();
        match &inner.by_name(name)?.value {
            FamilyValue::Info(record) => record.clone(),
            _ => None,
        }
    }

    /// Cloned view of every family, in declaration order.
    pub fn snapshot(&self) -> Vec<MetricFamily> {
        self.read().families.clone()
    }

    /// Number of declared families.
    pub fn len(&self) -> usize {
        self.read().families.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
