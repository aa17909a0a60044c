use std::cell::Cell;
use std::rc::Rc;

/// Logical dispatch time. Units are arbitrary; the session driver uses ticks.
pub type DispatchTime = u64;

/// A shared, manually advanced clock.
///
/// Clones observe the same time, so a store's dispatch-time closure and the
/// loop that drives it can hold one each.
#[derive(Debug, Clone, Default)]
pub struct LogicalClock(Rc<Cell<DispatchTime>>);

impl LogicalClock {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn now(&self) -> DispatchTime {
        self.0.get()
    }

    pub fn set(&self, time: DispatchTime) {
        self.0.set(time);
    }

    /// Advance by `by` and return the new time.
    pub fn advance(&self, by: DispatchTime) -> DispatchTime {
        let next = self.0.get().saturating_add(by);
        self.0.set(next);
        next
    }
}
