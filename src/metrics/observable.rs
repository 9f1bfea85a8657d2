use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use prometheus::core::{Collector, Desc};
use prometheus::proto::MetricFamily;
use prometheus::Gauge;

/// A scalar shared between the event consumer and the export reader.
///
/// Holds `f64` bits in a single atomic word so a reader never observes a
/// torn value. Clones share the same cell.
#[derive(Clone, Default)]
pub struct ObservedValue {
    bits: Arc<AtomicU64>,
}

impl ObservedValue {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set(&self, value: f64) {
        self.bits.store(value.to_bits(), Ordering::Release);
    }

    pub fn get(&self) -> f64 {
        f64::from_bits(self.bits.load(Ordering::Acquire))
    }
}

impl fmt::Debug for ObservedValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("ObservedValue").field(&self.get()).finish()
    }
}

/// A gauge whose value is produced by a callback at gather time.
pub struct CallbackGauge {
    gauge: Gauge,
    callback: Box<dyn Fn() -> f64 + Send + Sync>,
}

impl CallbackGauge {
    pub fn new<F>(gauge: Gauge, callback: F) -> Self
    where
        F: Fn() -> f64 + Send + Sync + 'static,
    {
        Self {
            gauge,
            callback: Box::new(callback),
        }
    }
}

impl Collector for CallbackGauge {
    fn desc(&self) -> Vec<&Desc> {
        self.gauge.desc()
    }

    fn collect(&self) -> Vec<MetricFamily> {
        self.gauge.set((self.callback)());
        self.gauge.collect()
    }
}
