use std::sync::{Arc, Mutex, MutexGuard};

// TbObj lets tasks share testbench state (clock counters, driver bookkeeping, result slots).
// The executor is single threaded, so the lock is never contended; a failed try_lock means a
// guard was held across an await point.
pub struct TbObj<T>(Arc<Mutex<T>>);

impl<T> TbObj<T> {
    pub fn new(data: T) -> TbObj<T> {
        TbObj(Arc::new(Mutex::new(data)))
    }
    pub fn get(&self) -> MutexGuard<'_, T> {
        (*self.0)
            .try_lock()
            .expect("TbObj is already borrowed. Was a guard held across an await?")
    }
    pub fn with_mut<R>(&self, f: impl FnOnce(&mut T) -> R) -> R {
        f(&mut self.get())
    }
}

impl<T> Clone for TbObj<T> {
    fn clone(&self) -> Self {
        TbObj(self.0.clone())
    }
}

impl<T: Default> Default for TbObj<T> {
    fn default() -> Self {
        TbObj::new(T::default())
    }
}
