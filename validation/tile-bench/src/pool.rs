//! Bounded pool of reusable transport clients.
//!
//! Idle clients sit in a locked slot list guarded by a semaphore holding one
//! permit per idle client. Acquiring waits for a permit, then takes a client and
//! wraps it in a [`PooledClient`] guard; dropping the guard puts the client back
//! and restores the permit. Because the hand-back lives in `Drop`, a client
//! returns on every exit path of the borrowing task, including panics and
//! cancellation.
//!
//! The borrowed count and the idle list change in the same critical section, so
//! every [`ClientPool::stats`] snapshot satisfies `borrowed + available == capacity`.

use std::ops::Deref;
use std::sync::{Arc, Mutex, MutexGuard};

use tokio::sync::Semaphore;
use tracing::error;

use crate::error::{BenchError, Result};

/// Fixed-size pool of clients lent out one borrower at a time.
pub struct ClientPool<C> {
    slots: Mutex<Slots<C>>,
    permits: Semaphore,
    capacity: usize,
}

struct Slots<C> {
    idle: Vec<C>,
    borrowed: usize,
    acquired_total: u64,
    released_total: u64,
}

/// Acquire/release counters for pool accounting.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PoolStats {
    pub capacity: usize,
    pub borrowed: usize,
    pub available: usize,
    pub acquired_total: u64,
    pub released_total: u64,
}

impl<C: Send + 'static> ClientPool<C> {
    /// Create a pool fully populated with `clients`.
    pub fn new(clients: Vec<C>) -> Result<Arc<Self>> {
        if clients.is_empty() {
            return Err(BenchError::InvalidConfig(
                "client pool needs at least one client".to_string(),
            ));
        }

        let capacity = clients.len();
        Ok(Arc::new(Self {
            slots: Mutex::new(Slots {
                idle: clients,
                borrowed: 0,
                acquired_total: 0,
                released_total: 0,
            }),
            permits: Semaphore::new(capacity),
            capacity,
        }))
    }

    /// Build `size` clients with `make` and pool them.
    pub fn populate<E, F>(size: usize, mut make: F) -> Result<Arc<Self>>
    where
        F: FnMut() -> std::result::Result<C, E>,
        BenchError: From<E>,
    {
        let clients = (0..size)
            .map(|_| make().map_err(BenchError::from))
            .collect::<Result<Vec<_>>>()?;
        Self::new(clients)
    }

    /// Wait for an idle client and take exclusive ownership of it.
    pub async fn acquire(self: &Arc<Self>) -> Result<PooledClient<C>> {
        let permit = self
            .permits
            .acquire()
            .await
            .map_err(|_| BenchError::PoolClosed)?;

        let client = {
            let mut slots = self.lock_slots();
            let client = slots.idle.pop().ok_or(BenchError::PoolClosed)?;
            slots.borrowed += 1;
            slots.acquired_total += 1;
            client
        };
        // The permit comes back in `release`, once the client is idle again
        permit.forget();

        Ok(PooledClient {
            client: Some(client),
            pool: Arc::clone(self),
        })
    }

    fn release(&self, client: C) {
        {
            let mut slots = self.lock_slots();
            if slots.idle.len() >= self.capacity {
                error!(capacity = self.capacity, "Client pool rejected a returned client");
                return;
            }
            slots.idle.push(client);
            slots.borrowed = slots.borrowed.saturating_sub(1);
            slots.released_total += 1;
        }
        self.permits.add_permits(1);
    }
}

impl<C> ClientPool<C> {
    fn lock_slots(&self) -> MutexGuard<'_, Slots<C>> {
        // Slot updates cannot panic midway, so a poisoned lock still holds consistent counts
        self.slots.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Clients currently lent out.
    pub fn borrowed(&self) -> usize {
        self.lock_slots().borrowed
    }

    /// Clients currently idle in the pool.
    pub fn available(&self) -> usize {
        self.lock_slots().idle.len()
    }

    /// Consistent snapshot of every counter.
    pub fn stats(&self) -> PoolStats {
        let slots = self.lock_slots();
        PoolStats {
            capacity: self.capacity,
            borrowed: slots.borrowed,
            available: slots.idle.len(),
            acquired_total: slots.acquired_total,
            released_total: slots.released_total,
        }
    }
}

/// A client on loan from a [`ClientPool`]; returned when dropped.
pub struct PooledClient<C: Send + 'static> {
    client: Option<C>,
    pool: Arc<ClientPool<C>>,
}

impl<C: Send + 'static> Deref for PooledClient<C> {
    type Target = C;

    fn deref(&self) -> &C {
        // Only `drop` takes the client out
        match self.client.as_ref() {
            Some(client) => client,
            None => unreachable!("pooled client used after release"),
        }
    }
}

impl<C: Send + 'static> Drop for PooledClient<C> {
    fn drop(&mut self) {
        if let Some(client) = self.client.take() {
            self.pool.release(client);
        }
    }
}
