//! Observers of the aggregate "has modifications" flag.
//!
//! Listeners are called synchronously, in subscription order, and only when the
//! flag actually flips. Every mutating overlay method samples the flag before it
//! mutates and hands both samples to [`ChangeNotifier::transition`].

use std::fmt;

use tracing::debug;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ListenerId(u64);

type Listener = Box<dyn FnMut(bool)>;

#[derive(Default)]
pub struct ChangeNotifier {
    listeners: Vec<(ListenerId, Listener)>,
    next_id: u64,
}

impl fmt::Debug for ChangeNotifier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ChangeNotifier")
            .field("listeners", &self.listeners.len())
            .finish()
    }
}

impl ChangeNotifier {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn subscribe(&mut self, listener: impl FnMut(bool) + 'static) -> ListenerId {
        let id = ListenerId(self.next_id);
        self.next_id += 1;
        self.listeners.push((id, Box::new(listener)));
        id
    }

    pub fn unsubscribe(&mut self, id: ListenerId) -> bool {
        let before = self.listeners.len();
        self.listeners.retain(|(existing, _)| *existing != id);
        self.listeners.len() != before
    }

    /// Deliver `after` to every listener if it differs from `before`.
    pub fn transition(&mut self, label: &str, before: bool, after: bool) {
        if before == after {
            return;
        }
        debug!(overlay = label, has_modifications = after, "modification state changed");
        for (_, listener) in self.listeners.iter_mut() {
            listener(after);
        }
    }
}
