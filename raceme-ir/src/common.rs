use std::cell::RefCell;
use std::rc::{Rc, Weak};

/// Alias for a RefCell contained in an Rc reference.
#[allow(clippy::upper_case_acronyms)]
pub type RRC<T> = Rc<RefCell<T>>;

/// Construct a new RRC.
pub fn rrc<T>(t: T) -> RRC<T> {
    Rc::new(RefCell::new(t))
}

/// A wrapper for a weak RefCell pointer. Used for back edges that would
/// otherwise form reference cycles, such as the driver of a sealed feedback
/// register.
#[allow(clippy::upper_case_acronyms)]
#[derive(Debug)]
pub struct WRC<T> {
    internal: Weak<RefCell<T>>,
}

impl<T> WRC<T> {
    /// Upgrade to the underlying strong pointer. Panics if the target has
    /// been dropped, which cannot happen while the owning graph is alive.
    pub fn upgrade(&self) -> RRC<T> {
        self.internal
            .upgrade()
            .unwrap_or_else(|| unreachable!("weak reference points to a dropped value"))
    }
}

/// From implementation with the same signature as `Rc::downgrade`.
impl<T> From<&RRC<T>> for WRC<T> {
    fn from(internal: &RRC<T>) -> Self {
        Self {
            internal: Rc::downgrade(internal),
        }
    }
}

impl<T> Clone for WRC<T> {
    fn clone(&self) -> Self {
        Self {
            internal: Weak::clone(&self.internal),
        }
    }
}
