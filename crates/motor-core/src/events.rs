// SPDX-License-Identifier: CEPL-1.0
//! Engine-level events and a kind-keyed dispatcher.
//!
//! Each [`EventKind`] has zero or one handler. Registering a handler for a
//! kind that already has one displaces (and returns) the old handler.

use std::collections::HashMap;

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub enum DeviceType {
    #[default]
    Unknown,
    Keyboard,
    Mouse,
    Gamepad,
}

#[derive(Clone, Debug, PartialEq)]
pub struct KeyInput {
    pub device: DeviceType,
    pub key: String,
    pub is_down: bool,
}

#[derive(Clone, Debug, PartialEq)]
pub struct AxisInput {
    pub device: DeviceType,
    pub axis: u32,
    /// In [-1, 1].
    pub value: f32,
}

impl AxisInput {
    pub fn new(device: DeviceType, axis: u32, value: f32) -> Self {
        Self {
            device,
            axis,
            value: value.clamp(-1.0, 1.0),
        }
    }
}

/// Snapshot of input state. Not an "on change" event: receivers that care
/// about transitions keep their own bookkeeping.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct InputState {
    pub keys: Vec<KeyInput>,
    pub axes: Vec<AxisInput>,
}

#[derive(Clone, Debug, PartialEq)]
pub enum Event {
    WindowClose,
    Input(InputState),
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum EventKind {
    WindowClose,
    Input,
}

impl Event {
    pub fn kind(&self) -> EventKind {
        match self {
            Event::WindowClose => EventKind::WindowClose,
            Event::Input(_) => EventKind::Input,
        }
    }
}

pub type Handler = Box<dyn FnMut(&Event)>;

#[derive(Default)]
pub struct EventDispatcher {
    handlers: HashMap<EventKind, Handler>,
}

impl EventDispatcher {
    pub fn new() -> Self {
        Self::default()
    }

    /// Installs `handler` for `kind`, returning the handler it replaced.
    pub fn register(
        &mut self,
        kind: EventKind,
        handler: impl FnMut(&Event) + 'static,
    ) -> Option<Handler> {
        self.handlers.insert(kind, Box::new(handler))
    }

    pub fn unregister(&mut self, kind: EventKind) -> Option<Handler> {
        self.handlers.remove(&kind)
    }

    pub fn is_registered(&self, kind: EventKind) -> bool {
        self.handlers.contains_key(&kind)
    }

    /// Runs the handler for the event's kind. Returns false when none is set.
    pub fn dispatch(&mut self, event: &Event) -> bool {
        match self.handlers.get_mut(&event.kind()) {
            Some(handler) => {
                handler(event);
                true
            }
            None => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::{Cell, RefCell};
    use std::rc::Rc;

    #[test]
    fn dispatch_without_handler_is_ignored() {
        let mut d = EventDispatcher::new();
        assert!(!d.dispatch(&Event::WindowClose));
    }

    #[test]
    fn handler_runs_only_for_its_kind() {
        let mut d = EventDispatcher::new();
        let closes = Rc::new(Cell::new(0));
        let c = closes.clone();
        d.register(EventKind::WindowClose, move |_| c.set(c.get() + 1));

        assert!(d.dispatch(&Event::WindowClose));
        assert!(!d.dispatch(&Event::Input(InputState::default())));
        assert_eq!(closes.get(), 1);
    }

    #[test]
    fn register_replaces_previous_handler() {
        let mut d = EventDispatcher::new();
        let log = Rc::new(RefCell::new(Vec::new()));

        let l = log.clone();
        assert!(d
            .register(EventKind::WindowClose, move |_| l.borrow_mut().push("first"))
            .is_none());
        let l = log.clone();
        assert!(d
            .register(EventKind::WindowClose, move |_| l.borrow_mut().push("second"))
            .is_some());

        d.dispatch(&Event::WindowClose);
        assert_eq!(*log.borrow(), vec!["second"]);
    }

    #[test]
    fn unregister_clears_the_slot() {
        let mut d = EventDispatcher::new();
        d.register(EventKind::Input, |_| {});
        assert!(d.is_registered(EventKind::Input));
        assert!(d.unregister(EventKind::Input).is_some());
        assert!(!d.is_registered(EventKind::Input));
        assert!(d.unregister(EventKind::Input).is_none());
    }

    #[test]
    fn input_handler_sees_payload() {
        let mut d = EventDispatcher::new();
        let seen = Rc::new(RefCell::new(None));
        let s = seen.clone();
        d.register(EventKind::Input, move |e| {
            if let Event::Input(state) = e {
                *s.borrow_mut() = Some(state.keys.len());
            }
        });
        let state = InputState {
            keys: vec![KeyInput {
                device: DeviceType::Keyboard,
                key: "Space".into(),
                is_down: true,
            }],
            axes: vec![],
        };
        d.dispatch(&Event::Input(state));
        assert_eq!(*seen.borrow(), Some(1));
    }

    #[test]
    fn axis_values_are_clamped() {
        assert_eq!(AxisInput::new(DeviceType::Mouse, 0, 3.0).value, 1.0);
        assert_eq!(AxisInput::new(DeviceType::Mouse, 1, -7.5).value, -1.0);
        assert_eq!(AxisInput::new(DeviceType::Gamepad, 2, 0.25).value, 0.25);
    }
}
