//! Type-tagged handles into a [`ResourceManager`](super::ResourceManager).

use std::fmt;
use std::hash::{Hash, Hasher};
use std::marker::PhantomData;

/// Index value reserved for the null handle.
const NULL_INDEX: u32 = u32::MAX;

/// Opaque reference to one pooled `T`.
///
/// A handle is a plain value: copying it never duplicates the resource and
/// dropping it never frees anything. The owning manager stores a version per
/// slot; destroying the resource bumps that version, which invalidates every
/// copy of the handle at once.
pub struct ResourceHandle<T> {
    index: u32,
    version: u32,
    _marker: PhantomData<fn() -> T>,
}

impl<T> ResourceHandle<T> {
    pub(crate) fn new(index: u32, version: u32) -> Self {
        Self {
            index,
            version,
            _marker: PhantomData,
        }
    }

    /// A handle that never refers to a live resource.
    pub fn null() -> Self {
        Self::new(NULL_INDEX, 0)
    }

    pub fn is_null(&self) -> bool {
        self.index == NULL_INDEX
    }

    /// Slot index inside the owning manager.
    ///
    /// Stable for the lifetime of the resource, so it doubles as a GPU-side table index.
    pub fn index(&self) -> u32 {
        self.index
    }

    pub fn version(&self) -> u32 {
        self.version
    }
}

impl<T> Default for ResourceHandle<T> {
    fn default() -> Self {
        Self::null()
    }
}

impl<T> Clone for ResourceHandle<T> {
    fn clone(&self) -> Self {
        *self
    }
}

impl<T> Copy for ResourceHandle<T> {}

impl<T> PartialEq for ResourceHandle<T> {
    fn eq(&self, other: &Self) -> bool {
        self.index == other.index && self.version == other.version
    }
}

impl<T> Eq for ResourceHandle<T> {}

impl<T> Hash for ResourceHandle<T> {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.index.hash(state);
        self.version.hash(state);
    }
}

impl<T> fmt::Debug for ResourceHandle<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = std::any::type_name::<T>().rsplit("::").next().unwrap_or("?");
        if self.is_null() {
            write!(f, "ResourceHandle<{name}>(null)")
        } else {
            write!(f, "ResourceHandle<{name}>({}v{})", self.index, self.version)
        }
    }
}
