//! FIFO sequence used to hand chunks from the readiness loop to the hand-off loop.
//!
//! The queue carries no synchronization of its own; the resolver guards it with a
//! single lock.

use std::collections::VecDeque;


/// Strict first-in first-out queue
#[derive(Debug)]
pub struct Queue<T> {
    elements: VecDeque<T>,
}

impl<T> Default for Queue<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> Queue<T> {
    pub fn new() -> Self {
        Self {
            elements: VecDeque::new(),
        }
    }

    /// Appends an element to the back of the queue
    pub fn enqueue(
        &mut self,
        element: T,
    ) {
        self.elements.push_back(element);
    }

    /// Removes and returns the oldest element, `None` when empty
    pub fn dequeue(&mut self) -> Option<T> {
        self.elements.pop_front()
    }

    /// Returns the oldest element without removing it
    pub fn peek(&self) -> Option<&T> {
        self.elements.front()
    }

    pub fn is_empty(&self) -> bool {
        self.elements.is_empty()
    }

    pub fn size(&self) -> usize {
        self.elements.len()
    }

    pub fn clear(&mut self) {
        self.elements.clear();
    }
}
