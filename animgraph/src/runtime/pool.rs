/// Slot inside a [`Pool`].
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct PoolHandle(pub(crate) usize);

/// Request/free pool. Freed slots keep their allocation and are handed out again, so steady-state
/// evaluation does not touch the heap.
#[derive(Debug)]
pub struct Pool<T> {
    items: Vec<T>,
    in_use: Vec<bool>,
    free: Vec<usize>,
}

impl<T> Default for Pool<T> {
    fn default() -> Self {
        Self {
            items: Vec::new(),
            in_use: Vec::new(),
            free: Vec::new(),
        }
    }
}

impl<T: Default> Pool<T> {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn request(&mut self) -> PoolHandle {
        if let Some(index) = self.free.pop() {
            self.in_use[index] = true;
            return PoolHandle(index);
        }
        self.items.push(T::default());
        self.in_use.push(true);
        PoolHandle(self.items.len() - 1)
    }

    /// Returns `false` when the handle was not in use.
    pub fn free(&mut self, handle: PoolHandle) -> bool {
        match self.in_use.get_mut(handle.0) {
            Some(used) if *used => {
                *used = false;
                self.free.push(handle.0);
                true
            }
            _ => false,
        }
    }

    pub fn free_all(&mut self) {
        self.free.clear();
        for (index, used) in self.in_use.iter_mut().enumerate() {
            *used = false;
            self.free.push(index);
        }
    }

    pub fn get(&self, handle: PoolHandle) -> Option<&T> {
        if self.is_in_use(handle) {
            self.items.get(handle.0)
        } else {
            None
        }
    }

    pub fn get_mut(&mut self, handle: PoolHandle) -> Option<&mut T> {
        if self.is_in_use(handle) {
            self.items.get_mut(handle.0)
        } else {
            None
        }
    }

    /// Moves the value out, leaving a default in its slot. Pair with [`Pool::restore`].
    pub fn take(&mut self, handle: PoolHandle) -> Option<T> {
        self.get_mut(handle).map(std::mem::take)
    }

    pub fn restore(&mut self, handle: PoolHandle, value: T) {
        if let Some(slot) = self.get_mut(handle) {
            *slot = value;
        }
    }

    pub fn is_in_use(&self, handle: PoolHandle) -> bool {
        self.in_use.get(handle.0).copied().unwrap_or(false)
    }

    pub fn num_used(&self) -> usize {
        self.items.len() - self.free.len()
    }

    pub fn num_allocated(&self) -> usize {
        self.items.len()
    }
}
