//! Tick Dispatch Fan-Out
//!
//! Delivers each decoded tick to every registered handler in registration
//! order, capturing failures per handler so one bad handler cannot block
//! delivery to the others or bring the connection down.

use crate::domain::market::Tick;

use super::ports::TickHandler;

/// Ordered fan-out over registered tick handlers.
///
/// A message is dispatched to all handlers or (when it never decodes) to
/// none; there is no partial-dispatch state to clean up after a failure,
/// because errors are captured per call rather than unwinding the loop.
#[derive(Default)]
pub struct Dispatcher {
    handlers: Vec<Box<dyn TickHandler>>,
}

impl Dispatcher {
    /// Create an empty dispatcher.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a handler; handlers run in registration order.
    pub fn register(&mut self, handler: Box<dyn TickHandler>) {
        self.handlers.push(handler);
    }

    /// Number of registered handlers.
    #[must_use]
    pub fn len(&self) -> usize {
        self.handlers.len()
    }

    /// Whether no handlers are registered.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.handlers.is_empty()
    }

    /// Deliver one tick to every handler.
    pub fn dispatch(&mut self, tick: &Tick) {
        for handler in &mut self.handlers {
            if let Err(error) = handler.on_tick(tick) {
                tracing::error!(
                    handler = handler.name(),
                    symbol = %tick.symbol,
                    %error,
                    "tick handler failed"
                );
            }
        }
    }
}

impl std::fmt::Debug for Dispatcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Dispatcher")
            .field("handlers", &self.handlers.len())
            .finish()
    }
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::sync::atomic::{AtomicUsize, Ordering};

    use chrono::Utc;
    use rust_decimal::Decimal;

    use crate::application::ports::HandlerError;
    use crate::domain::market::AssetClass;

    use super::*;

    struct Counting {
        calls: Arc<AtomicUsize>,
    }

    impl TickHandler for Counting {
        fn name(&self) -> &'static str {
            "counting"
        }

        fn on_tick(&mut self, _tick: &Tick) -> Result<(), HandlerError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }
    }

    struct AlwaysFailing;

    impl TickHandler for AlwaysFailing {
        fn name(&self) -> &'static str {
            "always-failing"
        }

        fn on_tick(&mut self, _tick: &Tick) -> Result<(), HandlerError> {
            Err(HandlerError::new("boom"))
        }
    }

    fn tick() -> Tick {
        Tick {
            timestamp: Utc::now(),
            symbol: "AAPL".to_string(),
            asset_class: AssetClass::Equities,
            price: Decimal::new(100, 0),
            volume: 1.0,
            open: None,
            high: None,
            low: None,
            vwap: None,
            raw: String::new(),
        }
    }

    #[test]
    fn failing_handler_does_not_block_later_handlers() {
        let calls = Arc::new(AtomicUsize::new(0));
        let mut dispatcher = Dispatcher::new();
        dispatcher.register(Box::new(AlwaysFailing));
        dispatcher.register(Box::new(Counting {
            calls: Arc::clone(&calls),
        }));

        for _ in 0..3 {
            dispatcher.dispatch(&tick());
        }

        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[test]
    fn handlers_run_in_registration_order() {
        struct Recording {
            id: usize,
            log: Arc<parking_lot::Mutex<Vec<usize>>>,
        }

        impl TickHandler for Recording {
            fn name(&self) -> &'static str {
                "recording"
            }

            fn on_tick(&mut self, _tick: &Tick) -> Result<(), HandlerError> {
                self.log.lock().push(self.id);
                Ok(())
            }
        }

        let log = Arc::new(parking_lot::Mutex::new(Vec::new()));
        let mut dispatcher = Dispatcher::new();
        for id in 0..4 {
            dispatcher.register(Box::new(Recording {
                id,
                log: Arc::clone(&log),
            }));
        }

        dispatcher.dispatch(&tick());
        assert_eq!(*log.lock(), vec![0, 1, 2, 3]);
    }

    #[test]
    fn empty_dispatcher_is_a_no_op() {
        let mut dispatcher = Dispatcher::new();
        assert!(dispatcher.is_empty());
        dispatcher.dispatch(&tick());
        assert_eq!(dispatcher.len(), 0);
    }
}
