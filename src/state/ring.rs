use std::collections::VecDeque;

/// Fixed-capacity FIFO buffer
///
/// Once full, each push evicts the oldest entry.
#[derive(Debug, Clone)]
pub struct BoundedRing<T> {
    items: VecDeque<T>,
    capacity: usize,
}

impl<T> BoundedRing<T> {
    pub fn new(capacity: usize) -> Self {
        Self {
            items: VecDeque::with_capacity(capacity),
            capacity,
        }
    }

    pub fn push(&mut self, item: T) {
        self.items.push_back(item);

        while self.items.len() > self.capacity {
            self.items.pop_front();
        }
    }
}

impl<T: Clone> BoundedRing<T> {
    /// Owned copy, oldest first
    pub fn to_vec(&self) -> Vec<T> {
        self.items.iter().cloned().collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_ring_is_empty() {
        let ring: BoundedRing<u32> = BoundedRing::new(5);
        assert!(ring.to_vec().is_empty());
    }

    #[test]
    fn test_evicts_oldest_at_capacity() {
        let mut ring = BoundedRing::new(5);
        for i in 0..10 {
            ring.push(i);
        }

        assert_eq!(ring.to_vec(), vec![5, 6, 7, 8, 9]);
    }

    #[test]
    fn test_below_capacity_keeps_everything() {
        let mut ring = BoundedRing::new(100);
        for i in 0..10 {
            ring.push(i);
        }

        assert_eq!(ring.to_vec(), (0..10).collect::<Vec<_>>());
    }

    #[test]
    fn test_zero_capacity_keeps_nothing() {
        let mut ring = BoundedRing::new(0);
        ring.push("dropped");
        assert!(ring.to_vec().is_empty());
    }
}
