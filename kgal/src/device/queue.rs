use std::hash::{Hash, Hasher};

use ash::vk;

/// Represents a [`vk::Queue`] and it's indices
///
/// # Hashing
/// When hashing, the hasher will only hash the queue index and family index
#[derive(Debug, Clone, Copy)]
pub struct Queue {
    /// Handle to [`vk::Queue`]
    handle: vk::Queue,
    /// Index to the family queue
    family_index: u32,
    /// Queue's index in the family
    index: u32,
    /// Flags of the queue family
    queue_flags: vk::QueueFlags,
}

impl Queue {
    pub fn new(
        handle: vk::Queue,
        family_index: u32,
        index: u32,
        queue_flags: vk::QueueFlags,
    ) -> Self {
        Self {
            handle,
            family_index,
            index,
            queue_flags,
        }
    }

    pub fn handle(&self) -> vk::Queue {
        self.handle
    }

    pub fn get_family_index(&self) -> u32 {
        self.family_index
    }

    pub fn get_index(&self) -> u32 {
        self.index
    }

    pub fn get_queue_flags(&self) -> vk::QueueFlags {
        self.queue_flags
    }
}

impl PartialEq for Queue {
    fn eq(&self, other: &Self) -> bool {
        self.family_index == other.family_index && self.index == other.index
    }
}

impl Eq for Queue {}

impl Hash for Queue {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.family_index.hash(state);
        self.index.hash(state);
    }
}
