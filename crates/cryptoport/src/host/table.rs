// SPDX-License-Identifier: Apache-2.0

use core::ffi::c_int;
use std::collections::HashMap;
use std::sync::{Arc, PoisonError, RwLock};

use libc::EEXIST;

/// Live host resources, keyed by the handle reported to the guest.
///
/// The table starts empty and is guarded by its own lock, independent of any channel.
#[derive(Debug)]
pub struct Table<R> {
    entries: RwLock<HashMap<c_int, Arc<R>>>,
}

impl<R> Default for Table<R> {
    fn default() -> Self {
        Self {
            entries: RwLock::new(HashMap::new()),
        }
    }
}

impl<R> Table<R> {
    #[inline]
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers `resource` under `fd`.
    ///
    /// Fails with `EEXIST` if `fd` is already live, dropping `resource`.
    pub fn insert(&self, fd: c_int, resource: R) -> Result<(), c_int> {
        let mut entries = self.entries.write().unwrap_or_else(PoisonError::into_inner);
        if entries.contains_key(&fd) {
            return Err(EEXIST);
        }
        entries.insert(fd, Arc::new(resource));
        Ok(())
    }

    #[inline]
    pub fn get(&self, fd: c_int) -> Option<Arc<R>> {
        let entries = self.entries.read().unwrap_or_else(PoisonError::into_inner);
        entries.get(&fd).cloned()
    }

    /// Unregisters `fd`. The resource is released once the last in-flight user drops it.
    #[inline]
    pub fn remove(&self, fd: c_int) -> Option<Arc<R>> {
        let mut entries = self.entries.write().unwrap_or_else(PoisonError::into_inner);
        entries.remove(&fd)
    }

    /// Unregisters every entry.
    pub fn drain(&self) -> Vec<(c_int, Arc<R>)> {
        let mut entries = self.entries.write().unwrap_or_else(PoisonError::into_inner);
        entries.drain().collect()
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.entries
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
