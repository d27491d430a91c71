use crate::traits::Destructible;

/// A stack of teardown closures executed in reverse order of registration
#[derive(Default)]
pub struct DeletionQueue<'a> {
    stack: Vec<Box<dyn FnOnce() + 'a>>,
}

impl std::fmt::Debug for DeletionQueue<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DeletionQueue")
            .field("len", &self.stack.len())
            .finish()
    }
}

impl<'a> DeletionQueue<'a> {
    pub fn new() -> Self {
        Self { stack: Vec::new() }
    }

    /// Adds item onto the stack
    pub fn push<T>(&mut self, func: T)
    where
        T: FnOnce() + 'a,
    {
        self.stack.push(Box::new(func));
    }

    /// Registers destruction of a clone of `resource`
    pub fn push_resource<T: Clone + Destructible + 'a>(&mut self, resource: &T) {
        let mut resource_clone: T = resource.clone();
        self.push(move || {
            resource_clone.destroy();
        });
    }

    /// Registers destruction of every resource, last one first
    pub fn push_resources<T: Clone + Destructible + 'a>(&mut self, resources: &[T]) {
        let mut resources = Vec::from(resources);
        self.push(move || {
            while let Some(mut resource) = resources.pop() {
                resource.destroy();
            }
        });
    }

    /// Moves every pending entry into a new queue, leaving this one empty
    pub fn take(&mut self) -> Self {
        Self {
            stack: std::mem::take(&mut self.stack),
        }
    }

    /// Appends the entries of `other` so they run before anything already queued
    pub fn append(&mut self, mut other: Self) {
        self.stack.append(&mut other.stack);
    }

    pub fn len(&self) -> usize {
        self.stack.len()
    }

    pub fn is_empty(&self) -> bool {
        self.stack.is_empty()
    }

    pub fn flush(&mut self) {
        while let Some(element) = self.stack.pop() {
            element();
        }
    }
}

#[cfg(test)]
mod test {
    use std::cell::RefCell;

    use super::*;

    #[test]
    fn flush_runs_in_reverse_order() {
        let order = RefCell::new(Vec::new());
        let mut queue = DeletionQueue::new();
        for i in 0..5 {
            let order = &order;
            queue.push(move || order.borrow_mut().push(i));
        }
        assert_eq!(queue.len(), 5);
        queue.flush();
        assert!(queue.is_empty());
        assert_eq!(*order.borrow(), vec![4, 3, 2, 1, 0]);

        queue.flush();
        assert_eq!(order.borrow().len(), 5);
    }

    #[derive(Clone)]
    struct Tracked<'a> {
        id: u32,
        log: &'a RefCell<Vec<u32>>,
    }

    impl Destructible for Tracked<'_> {
        fn destroy(&mut self) {
            self.log.borrow_mut().push(self.id);
        }
    }

    #[test]
    fn resources_are_destroyed_last_first() {
        let log = RefCell::new(Vec::new());
        let mut queue = DeletionQueue::new();
        queue.push_resource(&Tracked { id: 1, log: &log });
        queue.push_resources(&[Tracked { id: 2, log: &log }, Tracked { id: 3, log: &log }]);
        queue.flush();
        assert_eq!(*log.borrow(), vec![3, 2, 1]);
    }

    #[test]
    fn take_moves_entries_out() {
        let log = RefCell::new(Vec::new());
        let mut queue = DeletionQueue::new();
        queue.push(|| log.borrow_mut().push(1));
        let mut taken = queue.take();
        assert!(queue.is_empty());
        queue.flush();
        assert!(log.borrow().is_empty());

        taken.flush();
        assert_eq!(*log.borrow(), vec![1]);
    }
}
