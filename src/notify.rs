// src/notify.rs

//! Change notification for the GUI/CLI layer
//!
//! Each manager owns a `ListenerSet` for its entity kind. Events are
//! delivered synchronously after a mutation has been applied, never for a
//! rejected one. Dispatch iterates over a snapshot of the registered
//! listeners, so a listener may remove itself (or others) from inside its
//! callback without disturbing the current delivery.

use std::cell::RefCell;
use std::fmt;
use std::rc::Rc;

/// A single change notification
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChangeEvent<K> {
    /// ID of the entity that changed
    pub id: i32,
    /// What changed
    pub kind: K,
    /// Optional detail, such as the slot ID of a slot change
    pub sub_field: Option<i32>,
}

/// Receiver of change notifications
pub trait ChangeListener<K> {
    fn changed(&self, event: &ChangeEvent<K>);
}

impl<K, F> ChangeListener<K> for F
where
    F: Fn(&ChangeEvent<K>),
{
    fn changed(&self, event: &ChangeEvent<K>) {
        self(event)
    }
}

/// Registered listeners for one entity kind
pub struct ListenerSet<K> {
    listeners: RefCell<Vec<Rc<dyn ChangeListener<K>>>>,
}

impl<K> Default for ListenerSet<K> {
    fn default() -> Self {
        Self {
            listeners: RefCell::new(Vec::new()),
        }
    }
}

impl<K> fmt::Debug for ListenerSet<K> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ListenerSet")
            .field("listeners", &self.len())
            .finish()
    }
}

impl<K> ListenerSet<K> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a listener; registering the same `Rc` twice is a no-op
    pub fn add(&self, listener: Rc<dyn ChangeListener<K>>) {
        let mut listeners = self.listeners.borrow_mut();
        if !listeners.iter().any(|l| Rc::ptr_eq(l, &listener)) {
            listeners.push(listener);
        }
    }

    /// Unregister a listener previously passed to `add`
    pub fn remove(&self, listener: &Rc<dyn ChangeListener<K>>) {
        self.listeners
            .borrow_mut()
            .retain(|l| !Rc::ptr_eq(l, listener));
    }

    pub fn len(&self) -> usize {
        self.listeners.borrow().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Deliver an event to every listener registered at the time of the call
    pub fn notify(&self, id: i32, kind: K, sub_field: Option<i32>) {
        let snapshot: Vec<Rc<dyn ChangeListener<K>>> = self.listeners.borrow().clone();
        let event = ChangeEvent {
            id,
            kind,
            sub_field,
        };
        for listener in snapshot {
            listener.changed(&event);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::Cell;

    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    enum Kind {
        Touched,
    }

    #[test]
    fn test_notify_reaches_all_listeners() {
        let set: ListenerSet<Kind> = ListenerSet::new();
        let count = Rc::new(Cell::new(0));

        for _ in 0..3 {
            let count = count.clone();
            set.add(Rc::new(move |_: &ChangeEvent<Kind>| {
                count.set(count.get() + 1)
            }));
        }

        set.notify(7, Kind::Touched, None);
        assert_eq!(count.get(), 3);
    }

    #[test]
    fn test_event_fields() {
        let set: ListenerSet<Kind> = ListenerSet::new();
        let seen = Rc::new(RefCell::new(Vec::new()));
        let sink = seen.clone();
        set.add(Rc::new(move |e: &ChangeEvent<Kind>| sink.borrow_mut().push(*e)));

        set.notify(4, Kind::Touched, Some(9));
        assert_eq!(
            seen.borrow().as_slice(),
            &[ChangeEvent {
                id: 4,
                kind: Kind::Touched,
                sub_field: Some(9)
            }]
        );
    }

    #[test]
    fn test_listener_can_remove_itself_during_dispatch() {
        let set: Rc<ListenerSet<Kind>> = Rc::new(ListenerSet::new());
        let calls = Rc::new(Cell::new(0));
        let slot: Rc<RefCell<Option<Rc<dyn ChangeListener<Kind>>>>> =
            Rc::new(RefCell::new(None));

        let weak_set = Rc::downgrade(&set);
        let self_ref = slot.clone();
        let counter = calls.clone();
        let listener: Rc<dyn ChangeListener<Kind>> = Rc::new(move |_: &ChangeEvent<Kind>| {
            counter.set(counter.get() + 1);
            if let (Some(set), Some(me)) = (weak_set.upgrade(), self_ref.borrow().as_ref()) {
                set.remove(me);
            }
        });
        *slot.borrow_mut() = Some(listener.clone());
        set.add(listener);

        set.notify(1, Kind::Touched, None);
        set.notify(2, Kind::Touched, None);
        assert_eq!(calls.get(), 1);
        assert!(set.is_empty());
    }

    #[test]
    fn test_duplicate_registration_ignored() {
        let set: ListenerSet<Kind> = ListenerSet::new();
        let listener: Rc<dyn ChangeListener<Kind>> = Rc::new(|_: &ChangeEvent<Kind>| {});
        set.add(listener.clone());
        set.add(listener.clone());
        assert_eq!(set.len(), 1);
        set.remove(&listener);
        assert!(set.is_empty());
    }
}
