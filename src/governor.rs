//! Concurrency Governor
//! Admission control for token-processing workers.
//!
//! A single Governor instance is shared by scheduled runs and manual
//! requests, so total outbound request concurrency stays inside one safe
//! envelope no matter how work arrives. Retries are the source clients'
//! concern; the Governor only limits how many workers run at once.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use tokio::sync::{OwnedSemaphorePermit, Semaphore, TryAcquireError};

use crate::models::{AppError, AppResult, ErrorCode};

/// Bounded admission: at most `max` workers hold a permit at a time
pub struct Governor {
    semaphore: Arc<Semaphore>,
    max: usize,
    active: Arc<AtomicUsize>,
}

/// Held by an admitted worker; releases the slot on drop
pub struct Permit {
    _permit: OwnedSemaphorePermit,
    active: Arc<AtomicUsize>,
}

impl Drop for Permit {
    fn drop(&mut self) {
        self.active.fetch_sub(1, Ordering::SeqCst);
    }
}

impl Governor {
    pub fn new(max: usize) -> Self {
        let max = max.max(1);
        Self {
            semaphore: Arc::new(Semaphore::new(max)),
            max,
            active: Arc::new(AtomicUsize::new(0)),
        }
    }

    pub fn max_concurrency(&self) -> usize {
        self.max
    }

    /// Workers currently holding a permit
    pub fn active_count(&self) -> usize {
        self.active.load(Ordering::SeqCst)
    }

    /// Wait for a free slot
    pub async fn admit(&self) -> AppResult<Permit> {
        let permit = self
            .semaphore
            .clone()
            .acquire_owned()
            .await
            .map_err(|_| AppError::new(ErrorCode::Unknown, "governor semaphore closed"))?;
        self.active.fetch_add(1, Ordering::SeqCst);
        Ok(Permit {
            _permit: permit,
            active: self.active.clone(),
        })
    }

    /// Non-blocking variant; None when all slots are taken
    pub fn try_admit(&self) -> Option<Permit> {
        match self.semaphore.clone().try_acquire_owned() {
            Ok(permit) => {
                self.active.fetch_add(1, Ordering::SeqCst);
                Some(Permit {
                    _permit: permit,
                    active: self.active.clone(),
                })
            }
            Err(TryAcquireError::NoPermits) | Err(TryAcquireError::Closed) => None,
        }
    }
}
