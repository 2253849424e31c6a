use super::decoder::LoadUnit;
use std::ops::{Deref, DerefMut};
use std::sync::{Arc, Mutex};

/// Units one worker sends in a single pipeline round, in arrival order.
#[derive(Debug, Default)]
pub struct Batch {
    units: Vec<LoadUnit>,
}

impl Batch {
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            units: Vec::with_capacity(capacity),
        }
    }

    pub fn append(&mut self, unit: LoadUnit) {
        self.units.push(unit);
    }

    pub fn len(&self) -> usize {
        self.units.len()
    }

    pub fn is_empty(&self) -> bool {
        self.units.is_empty()
    }

    pub fn iter(&self) -> std::slice::Iter<'_, LoadUnit> {
        self.units.iter()
    }

    /// Takes every unit out, FIFO, keeping the allocation.
    pub fn drain(&mut self) -> std::vec::Drain<'_, LoadUnit> {
        self.units.drain(..)
    }
}

/// Free list of batches so sustained loading does not reallocate a vector
/// per round.
#[derive(Debug)]
pub struct BatchPool {
    free: Mutex<Vec<Batch>>,
    batch_capacity: usize,
    max_idle: usize,
}

impl BatchPool {
    pub fn new(batch_capacity: usize, max_idle: usize) -> Arc<Self> {
        Arc::new(Self {
            free: Mutex::new(Vec::with_capacity(max_idle)),
            batch_capacity,
            max_idle,
        })
    }

    /// Hands out an empty batch; it returns to the pool when dropped.
    pub fn acquire(self: &Arc<Self>) -> PooledBatch {
        let reused = self.free.lock().unwrap_or_else(|e| e.into_inner()).pop();
        PooledBatch {
            batch: reused.unwrap_or_else(|| Batch::with_capacity(self.batch_capacity)),
            pool: Arc::clone(self),
        }
    }

    fn release(&self, mut batch: Batch) {
        batch.units.clear();
        let mut free = self.free.lock().unwrap_or_else(|e| e.into_inner());
        if free.len() < self.max_idle {
            free.push(batch);
        }
    }

    pub fn idle(&self) -> usize {
        self.free.lock().unwrap_or_else(|e| e.into_inner()).len()
    }
}

/// A batch on loan from a [`BatchPool`].
#[derive(Debug)]
pub struct PooledBatch {
    batch: Batch,
    pool: Arc<BatchPool>,
}

impl Deref for PooledBatch {
    type Target = Batch;

    fn deref(&self) -> &Batch {
        &self.batch
    }
}

impl DerefMut for PooledBatch {
    fn deref_mut(&mut self) -> &mut Batch {
        &mut self.batch
    }
}

impl Drop for PooledBatch {
    fn drop(&mut self) {
        self.pool.release(std::mem::take(&mut self.batch));
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn drain_is_fifo() {
        let mut batch = Batch::default();
        for i in 0..3 {
            batch.append(LoadUnit::new(format!("PING {}", i)));
        }
        assert_eq!(batch.len(), 3);
        let drained: Vec<String> = batch.drain().map(|u| u.as_str().to_string()).collect();
        assert_eq!(drained, vec!["PING 0", "PING 1", "PING 2"]);
        assert!(batch.is_empty());
    }

    #[test]
    fn released_batches_are_reused_empty() {
        let pool = BatchPool::new(16, 4);
        {
            let mut b = pool.acquire();
            b.append(LoadUnit::new("PING"));
            assert_eq!(pool.idle(), 0);
        }
        assert_eq!(pool.idle(), 1);
        let b = pool.acquire();
        assert!(b.is_empty());
        assert!(b.units.capacity() >= 16);
        assert_eq!(pool.idle(), 0);
    }

    #[test]
    fn idle_list_is_bounded() {
        let pool = BatchPool::new(1, 2);
        let held: Vec<_> = (0..5).map(|_| pool.acquire()).collect();
        drop(held);
        assert_eq!(pool.idle(), 2);
    }
}
