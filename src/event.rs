//! # Event Channels
//!
//! Named multicast callback channels linking the demultiplexer to the
//! statistics engine and any presenter. A publisher owns one [`Event`] per
//! channel; subscribers register handlers and receive every publication
//! synchronously on the publisher's thread.
//!
//! Handler delivery never fails the publisher. Removing a handler that was
//! never registered returns a recoverable [`TsmonError::Event`] to the
//! caller and leaves the channel untouched.
//!
//! ```rust
//! use tsmon::event::Event;
//!
//! let mut channel: Event<u32> = Event::new("onPacketDecoded");
//! let sub = channel.subscribe(|value| println!("got {value}"));
//! channel.fire(&7);
//! channel.unsubscribe(&sub).unwrap();
//! assert!(!channel.has_subscribers());
//! ```

use crate::error::{Result, TsmonError};

type Handler<T> = Box<dyn Fn(&T) + Send>;

/// Token returned by [`Event::subscribe`]; passed back to unsubscribe.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Subscription {
    id: u64,
}

/// A single named event channel.
///
/// Publications are delivered to all currently registered handlers in
/// unspecified order. Handlers run on the publishing thread and must not
/// block; the packet path depends on every delivery running to completion
/// before the next packet is processed.
pub struct Event<T> {
    name: &'static str,
    next_id: u64,
    handlers: Vec<(u64, Handler<T>)>,
}

impl<T> Event<T> {
    /// Creates an empty channel with the given name.
    ///
    /// The name only appears in bookkeeping errors and debug output.
    pub fn new(name: &'static str) -> Self {
        Self {
            name,
            next_id: 0,
            handlers: Vec::new(),
        }
    }

    /// Channel name this event was created with.
    pub fn name(&self) -> &'static str {
        self.name
    }

    /// Registers a handler and returns its subscription token.
    pub fn subscribe<F>(&mut self, handler: F) -> Subscription
    where
        F: Fn(&T) + Send + 'static,
    {
        let id = self.next_id;
        self.next_id += 1;
        self.handlers.push((id, Box::new(handler)));
        Subscription { id }
    }

    /// Removes a previously registered handler.
    ///
    /// # Errors
    ///
    /// Returns [`TsmonError::Event`] if the subscription is not registered
    /// on this channel. The error is recoverable and the channel state is
    /// unchanged.
    pub fn unsubscribe(&mut self, sub: &Subscription) -> Result<()> {
        let before = self.handlers.len();
        self.handlers.retain(|(id, _)| *id != sub.id);
        if self.handlers.len() == before {
            return Err(TsmonError::Event(format!(
                "handler is not registered on channel {}",
                self.name
            )));
        }
        Ok(())
    }

    /// Delivers `payload` to every registered handler.
    pub fn fire(&self, payload: &T) {
        for (_, handler) in &self.handlers {
            handler(payload);
        }
    }

    /// True if at least one handler is registered.
    ///
    /// The demultiplexer uses this to skip decoding table bodies nobody
    /// listens for.
    pub fn has_subscribers(&self) -> bool {
        !self.handlers.is_empty()
    }

    /// Number of registered handlers.
    pub fn handler_count(&self) -> usize {
        self.handlers.len()
    }
}

impl<T> std::fmt::Debug for Event<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Event")
            .field("name", &self.name)
            .field("handlers", &self.handlers.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::sync::Arc;

    #[test]
    fn test_fire_reaches_all_handlers() {
        let counter = Arc::new(AtomicU32::new(0));
        let mut event: Event<u32> = Event::new("test");

        let c1 = Arc::clone(&counter);
        event.subscribe(move |v| {
            c1.fetch_add(*v, Ordering::SeqCst);
        });
        let c2 = Arc::clone(&counter);
        event.subscribe(move |v| {
            c2.fetch_add(*v * 10, Ordering::SeqCst);
        });

        event.fire(&3);
        assert_eq!(counter.load(Ordering::SeqCst), 33);
    }

    #[test]
    fn test_unsubscribe_removes_handler() {
        let counter = Arc::new(AtomicU32::new(0));
        let mut event: Event<()> = Event::new("test");

        let c = Arc::clone(&counter);
        let sub = event.subscribe(move |_| {
            c.fetch_add(1, Ordering::SeqCst);
        });
        assert!(event.has_subscribers());

        event.unsubscribe(&sub).unwrap();
        assert!(!event.has_subscribers());
        event.fire(&());
        assert_eq!(counter.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn test_unsubscribe_unknown_is_recoverable() {
        let mut event: Event<()> = Event::new("test");
        let sub = event.subscribe(|_| {});
        event.unsubscribe(&sub).unwrap();

        let err = event.unsubscribe(&sub).unwrap_err();
        assert!(matches!(err, TsmonError::Event(_)));
        // The channel still works after the failed removal.
        event.subscribe(|_| {});
        event.fire(&());
    }
}
