//! Publish/subscribe between producers of asynchronous results and the
//! consumers waiting for them.
//!
//! Observers are small `Copy` tokens naming the consumer (for example the
//! index of a job engine). The producer passes an update closure to
//! `notify`, which turns a token back into a call on the consumer.
//!
//! All subjects take `&self`, so an update closure may add or remove
//! observers of the very subject that is notifying. Such changes are
//! buffered while the sweep runs: additions land in a shadow list, removals
//! only clear the validity flag of the registration. Both are applied when
//! the outermost sweep finishes, so the running sweep always walks the
//! registrations present when it started.

use crate::{list::DlList, scheduler::EventMask};

use core::{
    cell::{Cell, RefCell},
    fmt::{Debug, Display, Formatter},
};
use heapless::Vec;

/// Mask matching every notification.
pub const MASK_ALL: EventMask = EventMask::MAX;

/// Outcome of adding an observer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SubjectAdd {
    /// The observer is registered.
    Added,
    /// The observer was already registered.
    AlreadyAdded,
    /// A notification is running; the observer is registered once it ends.
    Deferred,
}

/// Outcome of removing an observer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SubjectRemove {
    /// The observer will not receive further notifications.
    Removed,
    /// The observer was not registered.
    UnknownObserver,
}

/// An observer could not be registered.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SubjectError {
    /// All registration slots are in use.
    Capacity,
    /// A single-observer subject already holds a different observer.
    Occupied,
}

impl Display for SubjectError {
    fn fmt(&self, f: &mut Formatter<'_>) -> core::fmt::Result {
        match self {
            Self::Capacity => write!(f, "No free observer slot"),
            Self::Occupied => write!(f, "Subject already has an observer"),
        }
    }
}

#[derive(Debug, Clone, Copy)]
struct Registration<O> {
    observer: O,
    mask: EventMask,
    valid: bool,
}

#[derive(Debug)]
struct ObserverList<O, const N: usize> {
    live: RefCell<DlList<Registration<O>, N>>,
    shadow: RefCell<Vec<Registration<O>, N>>,
    depth: Cell<u8>,
}

impl<O: Copy + PartialEq, const N: usize> ObserverList<O, N> {
    fn new() -> Self {
        Self {
            live: RefCell::new(DlList::new()),
            shadow: RefCell::new(Vec::new()),
            depth: Cell::new(0),
        }
    }

    fn notifying(&self) -> bool {
        self.depth.get() > 0
    }

    fn valid_count(&self) -> usize {
        self.live.borrow().iter().filter(|(_, r)| r.valid).count()
    }

    fn contains(&self, observer: O) -> bool {
        self.live
            .borrow()
            .iter()
            .any(|(_, r)| r.valid && r.observer == observer)
            || self.shadow.borrow().iter().any(|r| r.observer == observer)
    }

    fn add(&self, observer: O, mask: EventMask) -> Result<SubjectAdd, SubjectError> {
        let registration = Registration {
            observer,
            mask,
            valid: true,
        };
        let live_valid = self
            .live
            .borrow()
            .iter()
            .any(|(_, r)| r.valid && r.observer == observer);
        if live_valid {
            return Ok(SubjectAdd::AlreadyAdded);
        }
        if !self.notifying() {
            return self
                .live
                .borrow_mut()
                .push_back(registration)
                .map(|_| SubjectAdd::Added)
                .map_err(|_| SubjectError::Capacity);
        }
        if self.shadow.borrow().iter().any(|r| r.observer == observer) {
            return Ok(SubjectAdd::Deferred);
        }
        if self.valid_count() + self.shadow.borrow().len() >= N {
            return Err(SubjectError::Capacity);
        }
        self.shadow
            .borrow_mut()
            .push(registration)
            .map_err(|_| SubjectError::Capacity)?;
        Ok(SubjectAdd::Deferred)
    }

    fn remove(&self, observer: O) -> SubjectRemove {
        {
            let mut shadow = self.shadow.borrow_mut();
            if let Some(pos) = shadow.iter().position(|r| r.observer == observer) {
                _ = shadow.remove(pos);
                return SubjectRemove::Removed;
            }
        }
        let mut live = self.live.borrow_mut();
        let Some(node) = live.find(|r| r.valid && r.observer == observer) else {
            return SubjectRemove::UnknownObserver;
        };
        if self.notifying() {
            if let Some(r) = live.get_mut(node) {
                r.valid = false;
            }
        } else {
            _ = live.remove(node);
        }
        SubjectRemove::Removed
    }

    fn notify<D: ?Sized, F: FnMut(O, &D)>(&self, data: &D, mask: EventMask, mut update: F) -> usize {
        self.depth.set(self.depth.get().saturating_add(1));
        let mut delivered = 0;
        let mut cursor = self.live.borrow().front();
        while let Some(node) = cursor {
            let (registration, next) = {
                let live = self.live.borrow();
                (live.get(node).copied(), live.next(node))
            };
            if let Some(r) = registration {
                if r.valid && r.mask & mask != 0 {
                    update(r.observer, data);
                    delivered += 1;
                }
            }
            cursor = next;
        }
        self.depth.set(self.depth.get() - 1);
        if !self.notifying() {
            self.reconcile();
        }
        delivered
    }

    fn reconcile(&self) {
        let added = core::mem::take(&mut *self.shadow.borrow_mut());
        let mut live = self.live.borrow_mut();
        live.retain(|r| r.valid);
        for r in added {
            if live.push_back(r).is_err() {
                inic_warn!("Dropped deferred observer: no free slot");
            }
        }
    }
}

/// Subject delivering every notification to all of its observers.
#[derive(Debug)]
pub struct Subject<O, const N: usize> {
    observers: ObserverList<O, N>,
}

impl<O: Copy + PartialEq, const N: usize> Default for Subject<O, N> {
    fn default() -> Self {
        Self::new()
    }
}

impl<O: Copy + PartialEq, const N: usize> Subject<O, N> {
    /// Creates a subject without observers.
    pub fn new() -> Self {
        Self {
            observers: ObserverList::new(),
        }
    }

    /// Registers `observer`.
    ///
    /// # Errors
    /// Returns [`SubjectError::Capacity`] if no slot is left.
    pub fn add_observer(&self, observer: O) -> Result<SubjectAdd, SubjectError> {
        self.observers.add(observer, MASK_ALL)
    }

    /// Unregisters `observer`.
    pub fn remove_observer(&self, observer: O) -> SubjectRemove {
        self.observers.remove(observer)
    }

    /// Whether `observer` is registered or about to be.
    pub fn contains(&self, observer: O) -> bool {
        self.observers.contains(observer)
    }

    /// Number of active registrations.
    pub fn len(&self) -> usize {
        self.observers.valid_count()
    }

    /// Whether no observer is registered.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Calls `update` for every registered observer. Returns the number of
    /// updated observers.
    pub fn notify<D: ?Sized, F: FnMut(O, &D)>(&self, data: &D, update: F) -> usize {
        self.observers.notify(data, MASK_ALL, update)
    }
}

/// Subject delivering a notification only to observers whose interest mask
/// intersects the mask of the notification.
#[derive(Debug)]
pub struct MaskedSubject<O, const N: usize> {
    observers: ObserverList<O, N>,
}

impl<O: Copy + PartialEq, const N: usize> Default for MaskedSubject<O, N> {
    fn default() -> Self {
        Self::new()
    }
}

impl<O: Copy + PartialEq, const N: usize> MaskedSubject<O, N> {
    /// Creates a subject without observers.
    pub fn new() -> Self {
        Self {
            observers: ObserverList::new(),
        }
    }

    /// Registers `observer` for notifications matching `mask`.
    ///
    /// # Errors
    /// Returns [`SubjectError::Capacity`] if no slot is left.
    pub fn add_observer(&self, observer: O, mask: EventMask) -> Result<SubjectAdd, SubjectError> {
        self.observers.add(observer, mask)
    }

    /// Unregisters `observer`.
    pub fn remove_observer(&self, observer: O) -> SubjectRemove {
        self.observers.remove(observer)
    }

    /// Number of active registrations.
    pub fn len(&self) -> usize {
        self.observers.valid_count()
    }

    /// Whether no observer is registered.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Calls `update` for every observer interested in `mask`.
    pub fn notify<D: ?Sized, F: FnMut(O, &D)>(&self, data: &D, mask: EventMask, update: F) -> usize {
        self.observers.notify(data, mask, update)
    }
}

/// Subject holding at most one observer, used as the future of a single
/// outstanding request.
pub struct SingleSubject<O> {
    observer: Cell<Option<O>>,
}

impl<O: Copy + Debug> Debug for SingleSubject<O> {
    fn fmt(&self, f: &mut Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("SingleSubject")
            .field("observer", &self.observer.get())
            .finish()
    }
}

impl<O: Copy + PartialEq> Default for SingleSubject<O> {
    fn default() -> Self {
        Self::new()
    }
}

impl<O: Copy + PartialEq> SingleSubject<O> {
    /// Creates an empty subject.
    pub fn new() -> Self {
        Self {
            observer: Cell::new(None),
        }
    }

    /// Registers `observer`.
    ///
    /// # Errors
    /// Returns [`SubjectError::Occupied`] if another observer is registered.
    pub fn add_observer(&self, observer: O) -> Result<SubjectAdd, SubjectError> {
        match self.observer.get() {
            Some(o) if o == observer => Ok(SubjectAdd::AlreadyAdded),
            Some(_) => Err(SubjectError::Occupied),
            None => {
                self.observer.set(Some(observer));
                Ok(SubjectAdd::Added)
            }
        }
    }

    /// Unregisters `observer`.
    pub fn remove_observer(&self, observer: O) -> SubjectRemove {
        match self.observer.get() {
            Some(o) if o == observer => {
                self.observer.set(None);
                SubjectRemove::Removed
            }
            _ => SubjectRemove::UnknownObserver,
        }
    }

    /// The registered observer.
    pub fn observer(&self) -> Option<O> {
        self.observer.get()
    }

    /// Whether no observer is registered.
    pub fn is_empty(&self) -> bool {
        self.observer.get().is_none()
    }

    /// Calls `update` for the registered observer. With `auto_remove` the
    /// registration is dropped before `update` runs, so `update` may
    /// register a follow-up observer. Returns whether an observer was
    /// updated.
    pub fn notify<D: ?Sized, F: FnOnce(O, &D)>(&self, data: &D, auto_remove: bool, update: F) -> bool {
        let Some(observer) = self.observer.get() else {
            return false;
        };
        if auto_remove {
            self.observer.set(None);
        }
        update(observer, data);
        true
    }
}
