// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

//! Groups of breakers that trip together.

use std::sync::{Arc, Mutex, Weak};

use crate::breaker::{BreakerCore, BreakerHandle, TripEvent, TripSink};

const ERR_POISONED_LOCK: &str = "poisoned lock - fuse box membership can no longer be trusted";

/// A group of breakers sharing one fate: when any member trips, every member is forced open.
///
/// Use a fuse box for operations that depend on the same downstream system, so that once one of
/// them gives up the others fail fast as well instead of each discovering the outage separately.
///
/// Members are held weakly; a breaker that is dropped simply leaves the box. Adding a breaker does
/// not check the state of the others, so a breaker added while its siblings are open stays closed
/// until it trips on its own or the box trips again. Adding a breaker that is already a member
/// has no effect.
///
/// Clones of a fuse box share the same membership. Breakers only hold a weak reference to the
/// box, so trips cascade only while at least one clone of the box is kept alive. Once the last
/// clone is dropped, its members go back to tripping on their own.
///
/// # Examples
///
/// ```
/// use layered::Execute;
/// use tick::Clock;
///
/// use circuit_fuses::{CircuitBreaker, FuseBox};
///
/// let clock = Clock::new_frozen();
/// let reads = CircuitBreaker::builder("db_reads", &clock)
///     .build(Execute::new(|key: String| async move { Ok::<_, String>(key) }));
/// let writes = CircuitBreaker::builder("db_writes", &clock)
///     .build(Execute::new(|(key, _value): (String, u64)| async move { Ok::<_, String>(key) }));
///
/// let fuse_box = FuseBox::new();
/// fuse_box.add_fuse(&reads);
/// fuse_box.add_fuse(&writes);
///
/// reads.force_open();
///
/// assert!(!writes.is_closed());
/// ```
#[derive(Debug, Clone, Default)]
pub struct FuseBox {
    shared: Arc<FuseBoxShared>,
}

#[derive(Debug, Default)]
struct FuseBoxShared {
    fuses: Mutex<Vec<Weak<BreakerCore>>>,
}

impl FuseBox {
    /// Creates an empty fuse box.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a breaker to the box.
    ///
    /// Accepts a [`CircuitBreaker`][crate::CircuitBreaker], a
    /// [`RetryController`][crate::RetryController] or a [`BreakerHandle`].
    pub fn add_fuse(&self, fuse: impl Into<BreakerHandle>) {
        let handle = fuse.into();
        let core = handle.downgrade();

        {
            let mut fuses = self.shared.fuses.lock().expect(ERR_POISONED_LOCK);
            if fuses.iter().any(|fuse| Weak::ptr_eq(fuse, &core)) {
                return;
            }
            fuses.push(core);
        }

        let sink = Arc::downgrade(&self.shared);
        handle.add_sink(sink);
    }

    /// Forces every breaker in the box open.
    ///
    /// Members that are already open are left untouched.
    pub fn trip_fuses(&self) {
        self.shared.trip(None);
    }

    /// Returns the number of live breakers in the box.
    #[must_use]
    pub fn len(&self) -> usize {
        self.shared.live().len()
    }

    /// Returns `true` if the box holds no live breakers.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl TripSink for FuseBoxShared {
    fn tripped(&self, event: &TripEvent) {
        self.trip(Some(event));
    }
}

impl FuseBoxShared {
    fn live(&self) -> Vec<Arc<BreakerCore>> {
        let mut fuses = self.fuses.lock().expect(ERR_POISONED_LOCK);
        fuses.retain(|fuse| fuse.strong_count() > 0);
        fuses.iter().filter_map(Weak::upgrade).collect()
    }

    fn trip(&self, cause: Option<&TripEvent>) {
        // Forcing members open notifies their listeners, which lands back here; the lock must
        // not be held at that point.
        let fuses = self.live();

        tracing::event!(
            name: "circuit_fuses.fuse_box.tripped",
            tracing::Level::WARN,
            fuse_box.size = fuses.len(),
            fuse_box.cause = cause.map_or("manual", |event| event.name.as_ref()),
        );

        for fuse in fuses {
            fuse.force_open();
        }
    }
}
