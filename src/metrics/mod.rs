//! Instrument factory over a `prometheus::Registry`.
//!
//! Handlers describe instruments with dotted names, a unit and a fixed set
//! of attribute keys. The [`Meter`] turns those into Prometheus collectors,
//! sharing one collector per exported name.

pub mod observable;
pub mod profile;
pub mod unit;

use std::collections::HashMap;
use std::marker::PhantomData;
use std::sync::Arc;

use parking_lot::Mutex;
use prometheus::{CounterVec, Gauge, HistogramOpts, HistogramVec, Opts, Registry};
use thiserror::Error;
use tracing::debug;

pub use observable::{CallbackGauge, ObservedValue};
pub use profile::ExecutionProfile;
pub use unit::Unit;

/// Errors raised while creating or binding instruments.
#[derive(Error, Debug)]
pub enum MetricsError {
    #[error("registering {name}: {source}")]
    Register {
        name: String,
        #[source]
        source: prometheus::Error,
    },

    #[error("binding {name}: expected {expected} attribute values, got {got}")]
    Bind {
        name: String,
        expected: usize,
        got: usize,
    },

    #[error("{name} is already registered as a {existing}")]
    KindConflict { name: String, existing: &'static str },

    #[error("{name} is already registered with attributes {existing:?}")]
    AttributeConflict { name: String, existing: Vec<String> },
}

/// Histogram instrument; bind attribute values to get a recorder.
#[derive(Clone)]
pub struct HistogramInstrument {
    name: Arc<str>,
    keys: Arc<[String]>,
    vec: HistogramVec,
}

impl HistogramInstrument {
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Binds one value per attribute key, in declaration order.
    pub fn bind(&self, values: &[&str]) -> Result<BoundHistogram, MetricsError> {
        check_arity(&self.name, &self.keys, values)?;
        let histogram = self
            .vec
            .get_metric_with_label_values(values)
            .map_err(|source| MetricsError::Register {
                name: self.name.to_string(),
                source,
            })?;
        Ok(BoundHistogram { histogram })
    }
}

/// A histogram with all attributes bound.
#[derive(Clone)]
pub struct BoundHistogram {
    histogram: prometheus::Histogram,
}

impl BoundHistogram {
    pub fn record(&self, value: f64) {
        self.histogram.observe(value);
    }
}

/// Monotonic counter instrument.
#[derive(Clone)]
pub struct CounterInstrument {
    name: Arc<str>,
    keys: Arc<[String]>,
    vec: CounterVec,
}

impl CounterInstrument {
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn bind(&self, values: &[&str]) -> Result<BoundCounter, MetricsError> {
        check_arity(&self.name, &self.keys, values)?;
        let counter = self
            .vec
            .get_metric_with_label_values(values)
            .map_err(|source| MetricsError::Register {
                name: self.name.to_string(),
                source,
            })?;
        Ok(BoundCounter { counter })
    }
}

#[derive(Clone)]
pub struct BoundCounter {
    counter: prometheus::Counter,
}

impl BoundCounter {
    pub fn inc(&self) {
        self.counter.inc();
    }
}

fn check_arity(name: &str, keys: &[String], values: &[&str]) -> Result<(), MetricsError> {
    if keys.len() != values.len() {
        return Err(MetricsError::Bind {
            name: name.to_string(),
            expected: keys.len(),
            got: values.len(),
        });
    }
    Ok(())
}

enum Instrument {
    Histogram(HistogramInstrument),
    Counter(CounterInstrument),
    Callback,
}

impl Instrument {
    fn kind(&self) -> &'static str {
        match self {
            Self::Histogram(_) => "histogram",
            Self::Counter(_) => "counter",
            Self::Callback => "up/down counter",
        }
    }
}

/// Creates instruments in a shared registry.
///
/// Clones share the registry and the instrument table, so a handler can
/// keep a `Meter` for creating per-thread-group children later.
#[derive(Clone)]
pub struct Meter {
    registry: Registry,
    instruments: Arc<Mutex<HashMap<String, Instrument>>>,
}

impl Meter {
    pub fn new(registry: Registry) -> Self {
        Self {
            registry,
            instruments: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    pub fn registry(&self) -> &Registry {
        &self.registry
    }

    pub fn histogram(&self, name: &str) -> InstrumentBuilder<'_, HistogramKind> {
        InstrumentBuilder::new(self, name)
    }

    pub fn counter(&self, name: &str) -> InstrumentBuilder<'_, CounterKind> {
        InstrumentBuilder::new(self, name)
    }

    pub fn up_down_counter(&self, name: &str) -> InstrumentBuilder<'_, UpDownCounterKind> {
        InstrumentBuilder::new(self, name)
    }

    /// Number of distinct instruments created so far.
    #[cfg(test)]
    pub fn instrument_count(&self) -> usize {
        self.instruments.lock().len()
    }
}

/// Marker for histogram builders.
pub struct HistogramKind;
/// Marker for counter builders.
pub struct CounterKind;
/// Marker for callback-driven up/down counter builders.
pub struct UpDownCounterKind;

/// Describes an instrument before it is created.
pub struct InstrumentBuilder<'a, K> {
    meter: &'a Meter,
    name: String,
    description: String,
    unit: Option<Unit>,
    attribute_keys: Vec<String>,
    _kind: PhantomData<K>,
}

impl<'a, K> InstrumentBuilder<'a, K> {
    fn new(meter: &'a Meter, name: &str) -> Self {
        Self {
            meter,
            name: name.to_string(),
            description: String::new(),
            unit: None,
            attribute_keys: Vec::new(),
            _kind: PhantomData,
        }
    }

    pub fn description(mut self, description: &str) -> Self {
        self.description = description.to_string();
        self
    }

    pub fn unit(mut self, unit: Unit) -> Self {
        self.unit = Some(unit);
        self
    }

    pub fn attribute_keys(mut self, keys: &[&str]) -> Self {
        self.attribute_keys = keys.iter().map(|k| sanitize_label(k)).collect();
        self
    }

    fn exported_name(&self, total: bool) -> String {
        let mut name = sanitize_name(&self.name);
        if let Some(suffix) = self.unit.and_then(Unit::suffix) {
            append_suffix(&mut name, suffix);
        }
        if total {
            append_suffix(&mut name, "total");
        }
        name
    }

    fn help(&self) -> &str {
        // prometheus rejects empty help text.
        if self.description.is_empty() {
            &self.name
        } else {
            &self.description
        }
    }

    fn label_refs(&self) -> Vec<&str> {
        self.attribute_keys.iter().map(String::as_str).collect()
    }
}

fn register_err(name: &str) -> impl FnOnce(prometheus::Error) -> MetricsError + '_ {
    move |source| MetricsError::Register {
        name: name.to_string(),
        source,
    }
}

impl InstrumentBuilder<'_, HistogramKind> {
    pub fn build(self) -> Result<HistogramInstrument, MetricsError> {
        let name = self.exported_name(false);
        let mut instruments = self.meter.instruments.lock();

        if let Some(existing) = instruments.get(&name) {
            return match existing {
                Instrument::Histogram(h) if *h.keys == *self.attribute_keys => Ok(h.clone()),
                Instrument::Histogram(h) => Err(MetricsError::AttributeConflict {
                    name,
                    existing: h.keys.to_vec(),
                }),
                other => Err(MetricsError::KindConflict {
                    name,
                    existing: other.kind(),
                }),
            };
        }

        let buckets = self.unit.unwrap_or(Unit::Count).buckets();
        let opts = HistogramOpts::new(name.clone(), self.help()).buckets(buckets);
        let vec = HistogramVec::new(opts, &self.label_refs()).map_err(register_err(&name))?;
        self.meter
            .registry
            .register(Box::new(vec.clone()))
            .map_err(register_err(&name))?;

        debug!(name = %name, "Created histogram");
        let instrument = HistogramInstrument {
            name: Arc::from(name.as_str()),
            keys: Arc::from(self.attribute_keys),
            vec,
        };
        instruments.insert(name, Instrument::Histogram(instrument.clone()));
        Ok(instrument)
    }
}

impl InstrumentBuilder<'_, CounterKind> {
    pub fn build(self) -> Result<CounterInstrument, MetricsError> {
        let name = self.exported_name(true);
        let mut instruments = self.meter.instruments.lock();

        if let Some(existing) = instruments.get(&name) {
            return match existing {
                Instrument::Counter(c) if *c.keys == *self.attribute_keys => Ok(c.clone()),
                Instrument::Counter(c) => Err(MetricsError::AttributeConflict {
                    name,
                    existing: c.keys.to_vec(),
                }),
                other => Err(MetricsError::KindConflict {
                    name,
                    existing: other.kind(),
                }),
            };
        }

        let vec = CounterVec::new(Opts::new(name.clone(), self.help()), &self.label_refs())
            .map_err(register_err(&name))?;
        self.meter
            .registry
            .register(Box::new(vec.clone()))
            .map_err(register_err(&name))?;

        debug!(name = %name, "Created counter");
        let instrument = CounterInstrument {
            name: Arc::from(name.as_str()),
            keys: Arc::from(self.attribute_keys),
            vec,
        };
        instruments.insert(name, Instrument::Counter(instrument.clone()));
        Ok(instrument)
    }
}

impl InstrumentBuilder<'_, UpDownCounterKind> {
    /// Registers a gauge whose value comes from `callback` at gather time.
    ///
    /// Attribute keys are ignored. If an instrument with the same name was
    /// already built with a callback, the first callback stays in place.
    pub fn build_with_callback<F>(self, callback: F) -> Result<(), MetricsError>
    where
        F: Fn() -> f64 + Send + Sync + 'static,
    {
        let name = self.exported_name(false);
        let mut instruments = self.meter.instruments.lock();

        if let Some(existing) = instruments.get(&name) {
            return match existing {
                Instrument::Callback => Ok(()),
                other => Err(MetricsError::KindConflict {
                    name,
                    existing: other.kind(),
                }),
            };
        }

        let gauge = Gauge::with_opts(Opts::new(name.clone(), self.help()))
            .map_err(register_err(&name))?;
        self.meter
            .registry
            .register(Box::new(CallbackGauge::new(gauge, callback)))
            .map_err(register_err(&name))?;

        debug!(name = %name, "Created callback gauge");
        instruments.insert(name, Instrument::Callback);
        Ok(())
    }
}

/// Maps a dotted instrument name to a valid Prometheus metric name.
pub fn sanitize_name(name: &str) -> String {
    sanitize(name, true)
}

/// Maps an attribute key to a valid Prometheus label name.
pub fn sanitize_label(key: &str) -> String {
    sanitize(key, false)
}

fn sanitize(raw: &str, allow_colon: bool) -> String {
    let mut out = String::with_capacity(raw.len() + 1);
    for (i, c) in raw.chars().enumerate() {
        if i == 0 && c.is_ascii_digit() {
            out.push('_');
        }
        let valid = c.is_ascii_alphanumeric() || c == '_' || (allow_colon && c == ':');
        out.push(if valid { c } else { '_' });
    }
    if out.is_empty() {
        out.push('_');
    }
    out
}

fn append_suffix(name: &mut String, suffix: &str) {
    let already = name
        .strip_suffix(suffix)
        .is_some_and(|rest| rest.ends_with('_'));
    if !already {
        name.push('_');
        name.push_str(suffix);
    }
}
