use crate::types::RecordId;
use rustc_hash::FxHashSet;
use std::sync::{Mutex, PoisonError};

/// Ids of every record handed to the map this session.
///
/// Append-only. [`insert`](DrawnSet::insert) is the only way in, and it is a
/// single check-and-insert, so two threads delivering the same record cannot
/// both win.
#[derive(Default)]
pub struct DrawnSet {
    ids: Mutex<FxHashSet<RecordId>>,
}

impl DrawnSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Claims `id` for delivery. Returns false when it was already drawn.
    pub fn insert(&self, id: &RecordId) -> bool {
        self.ids
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(id.clone())
    }

    pub fn contains(&self, id: &RecordId) -> bool {
        self.ids
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .contains(id)
    }

    pub fn len(&self) -> usize {
        self.ids.lock().unwrap_or_else(PoisonError::into_inner).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[test]
    fn second_insert_is_rejected() {
        let drawn = DrawnSet::new();
        let id = RecordId::from("{A1B2}");
        assert!(drawn.insert(&id));
        assert!(!drawn.insert(&id));
        assert!(drawn.contains(&id));
        assert_eq!(drawn.len(), 1);
    }

    #[test]
    fn racing_inserts_have_one_winner() {
        let drawn = DrawnSet::new();
        let wins = AtomicUsize::new(0);
        std::thread::scope(|scope| {
            for _ in 0..16 {
                scope.spawn(|| {
                    for i in 0..200 {
                        if drawn.insert(&RecordId(i.to_string())) {
                            wins.fetch_add(1, Ordering::SeqCst);
                        }
                    }
                });
            }
        });
        assert_eq!(wins.load(Ordering::SeqCst), 200);
        assert_eq!(drawn.len(), 200);
    }
}
