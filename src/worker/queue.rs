use std::sync::Mutex;

/// The shared collection of pending work.
///
/// Filled once before any worker starts and only ever drained. Every claim
/// pops under the lock, so no item can reach two workers.
#[derive(Debug)]
pub struct WorkList<T> {
    items: Mutex<Vec<T>>,
}

impl<T> WorkList<T> {
    #[must_use]
    pub fn new(items: Vec<T>) -> Self {
        Self { items: Mutex::new(items) }
    }

    /// Takes the item at the back of the list, or `None` once it is drained.
    ///
    /// The lock is released before the caller sees the item.
    pub fn claim(&self) -> Option<T> {
        self.items.lock().expect("work list poisoned").pop()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.items.lock().expect("work list poisoned").len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl<T> From<Vec<T>> for WorkList<T> {
    fn from(items: Vec<T>) -> Self {
        Self::new(items)
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashSet;
    use std::thread;

    use super::*;

    #[test]
    fn test_claims_from_the_back() {
        let list = WorkList::from(vec![1, 2, 3]);
        assert_eq!(list.claim(), Some(3));
        assert_eq!(list.claim(), Some(2));
        assert_eq!(list.len(), 1);
        assert_eq!(list.claim(), Some(1));
        assert_eq!(list.claim(), None);
        assert!(list.is_empty());
    }

    #[test]
    fn test_no_item_is_claimed_twice() {
        for workers in [1, 2, 5, 16] {
            let list = WorkList::from((0..2000).collect::<Vec<u32>>());

            let claimed: Vec<Vec<u32>> = thread::scope(|scope| {
                let handles: Vec<_> = (0..workers)
                    .map(|_| {
                        scope.spawn(|| {
                            let mut mine = Vec::new();
                            while let Some(item) = list.claim() {
                                mine.push(item);
                            }
                            mine
                        })
                    })
                    .collect();
                handles.into_iter().map(|h| h.join().unwrap()).collect()
            });

            let all: Vec<u32> = claimed.into_iter().flatten().collect();
            let unique: HashSet<u32> = all.iter().copied().collect();

            assert_eq!(all.len(), 2000, "{workers} workers");
            assert_eq!(unique, (0..2000).collect());
        }
    }
}
