use std::collections::VecDeque;

/// A rolling window data structure that keeps at most `capacity` elements,
/// dropping the oldest element when a new one is pushed into a full window.
///
/// Storage grows with the elements pushed, not with `capacity`, so huge
/// capacities cost nothing up front.
#[derive(Debug, Clone)]
pub(crate) struct Window<T> {
    data: VecDeque<T>,
    capacity: usize,
}

impl<T> Window<T> {
    /// Create a new window with the given capacity
    #[must_use]
    pub(crate) fn new(capacity: usize) -> Self {
        Self {
            data: VecDeque::new(),
            capacity,
        }
    }

    /// Push an element to the window, removing the oldest if at capacity
    pub(crate) fn push(&mut self, item: T) {
        if self.data.len() >= self.capacity {
            self.data.pop_front();
        }
        self.data.push_back(item);
    }

    /// The oldest element still in the window
    #[must_use]
    pub(crate) fn front(&self) -> Option<&T> {
        self.data.front()
    }

    /// Whether the next push evicts an element
    #[must_use]
    pub(crate) fn is_full(&self) -> bool {
        self.data.len() >= self.capacity
    }

    /// Get the number of elements currently in the window
    #[must_use]
    pub(crate) fn len(&self) -> usize {
        self.data.len()
    }
}
