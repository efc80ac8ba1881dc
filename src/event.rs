// Event bus - routes window-system events to registered listeners
//
// One mailbox per event code. Listeners are called in registration order and
// the first one returning `true` consumes the event. Single-threaded; the
// context type `C` is whatever the listeners need to mutate (the renderer in
// the demo application).

use std::collections::HashMap;

/// Event kinds a listener can register for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EventCode {
    Quit,
    KeyPressed,
    KeyReleased,
    MouseButtonPressed,
    MouseButtonReleased,
    MouseMoved,
    MouseWheel,
    Resized,
}

/// An event together with its payload.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Event {
    Quit,
    KeyPressed { key_code: u32 },
    KeyReleased { key_code: u32 },
    MouseButtonPressed { button: u16 },
    MouseButtonReleased { button: u16 },
    MouseMoved { x: f64, y: f64 },
    MouseWheel { delta: f32 },
    Resized { width: u32, height: u32 },
}

impl Event {
    pub fn code(&self) -> EventCode {
        match self {
            Event::Quit => EventCode::Quit,
            Event::KeyPressed { .. } => EventCode::KeyPressed,
            Event::KeyReleased { .. } => EventCode::KeyReleased,
            Event::MouseButtonPressed { .. } => EventCode::MouseButtonPressed,
            Event::MouseButtonReleased { .. } => EventCode::MouseButtonReleased,
            Event::MouseMoved { .. } => EventCode::MouseMoved,
            Event::MouseWheel { .. } => EventCode::MouseWheel,
            Event::Resized { .. } => EventCode::Resized,
        }
    }
}

/// Identifies a listener across register/unregister calls.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ListenerId(pub u32);

/// Returns `true` to consume the event.
pub type Callback<C> = Box<dyn FnMut(&Event, &mut C) -> bool>;

struct Registration<C> {
    listener: ListenerId,
    callback: Callback<C>,
}

pub struct EventBus<C> {
    registered: HashMap<EventCode, Vec<Registration<C>>>,
}

impl<C> Default for EventBus<C> {
    fn default() -> Self {
        Self::new()
    }
}

impl<C> EventBus<C> {
    pub fn new() -> Self {
        Self {
            registered: HashMap::new(),
        }
    }

    /// Returns false (and warns) if `listener` is already registered for `code`.
    pub fn register<F>(&mut self, code: EventCode, listener: ListenerId, callback: F) -> bool
    where
        F: FnMut(&Event, &mut C) -> bool + 'static,
    {
        let entries = self.registered.entry(code).or_default();
        if entries.iter().any(|entry| entry.listener == listener) {
            log::warn!("Listener {:?} is already registered for {:?}", listener, code);
            return false;
        }

        entries.push(Registration {
            listener,
            callback: Box::new(callback),
        });
        true
    }

    /// Returns false (and warns) if `listener` was never registered for `code`.
    pub fn unregister(&mut self, code: EventCode, listener: ListenerId) -> bool {
        let Some(entries) = self.registered.get_mut(&code) else {
            log::warn!("Trying to unregister {:?} which has no listeners", code);
            return false;
        };

        match entries.iter().position(|entry| entry.listener == listener) {
            Some(index) => {
                entries.remove(index);
                true
            }
            None => {
                log::warn!("Listener {:?} is not registered for {:?}", listener, code);
                false
            }
        }
    }

    /// Delivers `event` to its listeners until one consumes it. Returns
    /// whether it was consumed.
    pub fn fire(&mut self, event: &Event, context: &mut C) -> bool {
        let Some(entries) = self.registered.get_mut(&event.code()) else {
            return false;
        };

        for entry in entries.iter_mut() {
            if (entry.callback)(event, context) {
                return true;
            }
        }
        false
    }

    pub fn listener_count(&self, code: EventCode) -> usize {
        self.registered.get(&code).map_or(0, Vec::len)
    }

    pub fn clear(&mut self) {
        self.registered.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_event_codes() {
        assert_eq!(Event::Quit.code(), EventCode::Quit);
        assert_eq!(Event::KeyPressed { key_code: 1 }.code(), EventCode::KeyPressed);
        assert_eq!(
            Event::Resized { width: 1, height: 2 }.code(),
            EventCode::Resized
        );
    }

    #[test]
    fn test_double_registration_rejected() {
        let mut bus: EventBus<u32> = EventBus::new();
        assert!(bus.register(EventCode::Quit, ListenerId(1), |_, _| false));
        assert!(!bus.register(EventCode::Quit, ListenerId(1), |_, _| false));
        assert!(bus.register(EventCode::Resized, ListenerId(1), |_, _| false));
        assert_eq!(bus.listener_count(EventCode::Quit), 1);
    }

    #[test]
    fn test_unregister_unknown_listener() {
        let mut bus: EventBus<()> = EventBus::new();
        assert!(!bus.unregister(EventCode::Quit, ListenerId(7)));
        bus.register(EventCode::Quit, ListenerId(1), |_, _| true);
        assert!(!bus.unregister(EventCode::Quit, ListenerId(7)));
        assert!(bus.unregister(EventCode::Quit, ListenerId(1)));
        assert_eq!(bus.listener_count(EventCode::Quit), 0);
    }

    #[test]
    fn test_fire_stops_at_first_consumer() {
        let mut bus: EventBus<Vec<u32>> = EventBus::new();
        bus.register(EventCode::KeyPressed, ListenerId(1), |_, log| {
            log.push(1);
            false
        });
        bus.register(EventCode::KeyPressed, ListenerId(2), |_, log| {
            log.push(2);
            true
        });
        bus.register(EventCode::KeyPressed, ListenerId(3), |_, log| {
            log.push(3);
            true
        });

        let mut calls = Vec::new();
        assert!(bus.fire(&Event::KeyPressed { key_code: 65 }, &mut calls));
        assert_eq!(calls, vec![1, 2]);
    }

    #[test]
    fn test_fire_without_listeners() {
        let mut bus: EventBus<()> = EventBus::new();
        assert!(!bus.fire(&Event::Quit, &mut ()));
    }

    #[test]
    fn test_resize_payload_reaches_listener() {
        let mut bus: EventBus<Option<(u32, u32)>> = EventBus::new();
        bus.register(EventCode::Resized, ListenerId(1), |event, pending| {
            if let Event::Resized { width, height } = *event {
                *pending = Some((width, height));
            }
            false
        });

        let mut pending = None;
        assert!(!bus.fire(&Event::Resized { width: 640, height: 480 }, &mut pending));
        assert_eq!(pending, Some((640, 480)));
    }
}
