use std::time::Duration;

use anyhow::Context;
use tracing::{debug, info};

use super::{HandlerContext, HandlerKind, RecordedEventHandler};
use crate::event::{EventKind, RecordedEvent, EVENT_KIND_COUNT};
use crate::metrics::Meter;

/// The active handler set and the event-kind routing table.
///
/// Built once; handlers are neither added nor removed afterwards.
pub struct HandlerRegistry {
    handlers: Vec<Box<dyn RecordedEventHandler>>,
    /// Handler indices per `EventKind::index()`, in registration order.
    routes: Vec<Vec<usize>>,
}

impl HandlerRegistry {
    /// Creates and initializes the selected handlers.
    ///
    /// Any `init` failure aborts the build.
    pub fn build(
        kinds: &[HandlerKind],
        ctx: &HandlerContext,
        meter: &Meter,
    ) -> anyhow::Result<Self> {
        let handlers = kinds.iter().map(|k| k.create(ctx)).collect();
        Self::from_handlers(handlers, meter)
    }

    /// Builds every supported handler with default settings.
    pub fn build_default(meter: &Meter) -> anyhow::Result<Self> {
        Self::build(HandlerKind::all(), &HandlerContext::default(), meter)
    }

    /// Initializes externally constructed handlers and routes them.
    pub fn from_handlers(
        mut handlers: Vec<Box<dyn RecordedEventHandler>>,
        meter: &Meter,
    ) -> anyhow::Result<Self> {
        let mut routes = vec![Vec::new(); EVENT_KIND_COUNT];

        for (i, handler) in handlers.iter_mut().enumerate() {
            handler
                .init(meter)
                .with_context(|| format!("initializing handler for {}", handler.event_name()))?;
            routes[handler.event_kind().index()].push(i);
            debug!(event = handler.event_name(), "Initialized handler");
        }

        info!(handlers = handlers.len(), "Handler registry built");

        Ok(Self { handlers, routes })
    }

    /// Routes one event to every handler registered for its kind.
    ///
    /// Returns how many handlers were invoked; unknown type names are
    /// ignored and yield 0.
    pub fn dispatch(&mut self, event: &RecordedEvent) -> usize {
        let Some(kind) = event.kind() else {
            return 0;
        };
        self.dispatch_kind(kind, event)
    }

    /// Like [`dispatch`](Self::dispatch) with the kind already resolved.
    pub fn dispatch_kind(&mut self, kind: EventKind, event: &RecordedEvent) -> usize {
        let route = &self.routes[kind.index()];
        for &i in route {
            self.handlers[i].accept(event);
        }
        route.len()
    }

    /// Handlers in registration order.
    pub fn all(&self) -> impl Iterator<Item = &dyn RecordedEventHandler> {
        self.handlers.iter().map(|h| h.as_ref())
    }

    /// `(event name, interval)` for every handler that asks for polling.
    pub fn polling_intervals(&self) -> Vec<(&'static str, Duration)> {
        self.handlers
            .iter()
            .filter_map(|h| h.polling_interval().map(|d| (h.event_name(), d)))
            .collect()
    }

    /// Whether any handler consumes `kind`.
    #[cfg(test)]
    pub fn handles(&self, kind: EventKind) -> bool {
        !self.routes[kind.index()].is_empty()
    }

    pub fn len(&self) -> usize {
        self.handlers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.handlers.is_empty()
    }
}
