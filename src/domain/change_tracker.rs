//! "Has this value changed since I last looked?" for a single observable.

/// Last value seen by a [`ChangeTracker`].
#[derive(Debug, Clone, PartialEq)]
enum Observed<T> {
    Unobserved,
    Seen(T),
}

/// Remembers the previous observation of one field and reports changes.
///
/// A fresh tracker is `Unobserved`, so the first observation always counts as
/// a change, even if the observed value is itself empty (`None`).
#[derive(Debug, Clone)]
pub struct ChangeTracker<T> {
    last: Observed<T>,
}

impl<T: PartialEq> ChangeTracker<T> {
    pub fn new() -> Self {
        ChangeTracker {
            last: Observed::Unobserved,
        }
    }

    /// A tracker that treats `baseline` as already observed.
    pub fn seeded(baseline: T) -> Self {
        ChangeTracker {
            last: Observed::Seen(baseline),
        }
    }

    /// Compares `current` with the previous observation, then stores it.
    pub fn check_changed(&mut self, current: T) -> bool {
        let changed = match &self.last {
            Observed::Unobserved => true,
            Observed::Seen(previous) => *previous != current,
        };
        self.last = Observed::Seen(current);
        changed
    }

    pub fn last(&self) -> Option<&T> {
        match &self.last {
            Observed::Unobserved => None,
            Observed::Seen(value) => Some(value),
        }
    }
}

impl<T: PartialEq> Default for ChangeTracker<T> {
    fn default() -> Self {
        Self::new()
    }
}
