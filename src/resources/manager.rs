//! Generic pooled resource storage with generation-checked handles.
//!
//! [`ResourceManager<T>`] owns every `T` it hands out a [`ResourceHandle<T>`]
//! for. Freed slots are recycled, and each slot carries a version that is
//! bumped on destruction so stale handles are detected instead of silently
//! aliasing the slot's next occupant.
//!
//! # Example
//!
//! ```
//! use redlilium_renderer::resources::ResourceManager;
//!
//! let mut names = ResourceManager::<String>::new();
//! let handle = names.create("albedo".to_string());
//! assert_eq!(names.access(handle), "albedo");
//!
//! let stale = handle;
//! names.destroy(handle);
//! assert!(!names.is_valid(stale));
//! ```
//!
//! There is no reference counting: the manager is the only owner, and
//! [`ResourceManager::destroy`] is the only way a resource goes away.

use super::handle::ResourceHandle;

#[derive(Debug)]
struct ResourceSlot<T> {
    resource: Option<T>,
    version: u32,
}

/// Homogeneous pool of `T` addressed through [`ResourceHandle<T>`].
///
/// Lookups are O(1). The manager does no internal locking; callers serialize
/// mutation the same way they would for any other owned collection.
#[derive(Debug)]
pub struct ResourceManager<T> {
    slots: Vec<ResourceSlot<T>>,
    free_list: Vec<u32>,
}

impl<T> ResourceManager<T> {
    pub fn new() -> Self {
        Self {
            slots: Vec::new(),
            free_list: Vec::new(),
        }
    }

    /// Move `resource` into the pool and return its handle.
    ///
    /// The most recently freed slot is reused before the pool grows.
    pub fn create(&mut self, resource: T) -> ResourceHandle<T> {
        let index = match self.free_list.pop() {
            Some(index) => index,
            None => {
                self.slots.push(ResourceSlot {
                    resource: None,
                    version: 0,
                });
                (self.slots.len() - 1) as u32
            }
        };

        let slot = &mut self.slots[index as usize];
        slot.resource = Some(resource);
        ResourceHandle::new(index, slot.version)
    }

    /// Check whether `handle` still refers to a live resource. Never panics.
    pub fn is_valid(&self, handle: ResourceHandle<T>) -> bool {
        self.slots
            .get(handle.index() as usize)
            .is_some_and(|slot| slot.version == handle.version() && slot.resource.is_some())
    }

    pub fn get(&self, handle: ResourceHandle<T>) -> Option<&T> {
        let slot = self.slots.get(handle.index() as usize)?;
        if slot.version != handle.version() {
            return None;
        }
        slot.resource.as_ref()
    }

    pub fn get_mut(&mut self, handle: ResourceHandle<T>) -> Option<&mut T> {
        let slot = self.slots.get_mut(handle.index() as usize)?;
        if slot.version != handle.version() {
            return None;
        }
        slot.resource.as_mut()
    }

    /// Resolve a handle that the caller knows to be valid.
    ///
    /// # Panics
    ///
    /// Panics if the handle is null, was destroyed, or belongs to another
    /// manager. Holding such a handle is a programming error.
    pub fn access(&self, handle: ResourceHandle<T>) -> &T {
        match self.get(handle) {
            Some(resource) => resource,
            None => panic!(
                "accessed invalid {handle:?} (pool holds {} live resources)",
                self.len()
            ),
        }
    }

    /// Mutable counterpart of [`access`](Self::access).
    ///
    /// # Panics
    ///
    /// Same conditions as [`access`](Self::access).
    pub fn access_mut(&mut self, handle: ResourceHandle<T>) -> &mut T {
        let live = self.len();
        match self.get_mut(handle) {
            Some(resource) => resource,
            None => panic!("accessed invalid {handle:?} (pool holds {live} live resources)"),
        }
    }

    /// Destroy the resource behind `handle`, returning it.
    ///
    /// Dropping the returned value runs the resource's own release path
    /// (GPU memory for images and buffers). The slot's version is bumped so
    /// every copy of `handle` becomes invalid. Destroying an invalid handle
    /// is a no-op.
    pub fn destroy(&mut self, handle: ResourceHandle<T>) -> Option<T> {
        if !self.is_valid(handle) {
            log::warn!("Ignoring destroy of invalid {handle:?}");
            return None;
        }

        let slot = &mut self.slots[handle.index() as usize];
        let resource = slot.resource.take();
        slot.version = slot.version.wrapping_add(1);
        self.free_list.push(handle.index());
        resource
    }

    /// Number of live resources.
    pub fn len(&self) -> usize {
        self.slots.len() - self.free_list.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Number of slots ever allocated, live or free.
    pub fn capacity(&self) -> usize {
        self.slots.len()
    }

    /// Iterate over live resources together with their handles.
    pub fn iter(&self) -> impl Iterator<Item = (ResourceHandle<T>, &T)> {
        self.slots.iter().enumerate().filter_map(|(index, slot)| {
            slot.resource
                .as_ref()
                .map(|resource| (ResourceHandle::new(index as u32, slot.version), resource))
        })
    }

    /// Destroy every live resource, invalidating all outstanding handles.
    pub fn clear(&mut self) {
        for index in 0..self.slots.len() {
            let slot = &mut self.slots[index];
            if slot.resource.take().is_some() {
                slot.version = slot.version.wrapping_add(1);
                self.free_list.push(index as u32);
            }
        }
    }
}

impl<T> Default for ResourceManager<T> {
    fn default() -> Self {
        Self::new()
    }
}
