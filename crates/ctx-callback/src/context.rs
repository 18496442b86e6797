//! Owning handles around an opaque context
//!
//! [`UniqueContext`] and [`SharedContext`] attach `Drop` and an atomic
//! refcount to the same [`Releaser`] the manual policy hands out. The refcount
//! lives in the holder header, so sharing costs no extra allocation. While a
//! handle is alive, [`as_ptr`](UniqueContext::as_ptr) yields the raw context
//! to pass to C code.

use crate::holder::{Header, Releaser};
use std::ffi::c_void;
use std::fmt;
use std::marker::PhantomData;
use std::mem::ManuallyDrop;
use std::ptr::NonNull;

/// A live holder plus the function that releases it.
struct OwnedHolder {
    context: NonNull<c_void>,
    release: Releaser,
}

impl OwnedHolder {
    fn into_raw(self) -> (*mut c_void, Releaser) {
        let this = ManuallyDrop::new(self);
        (this.context.as_ptr(), this.release)
    }
}

impl Drop for OwnedHolder {
    fn drop(&mut self) {
        // SAFETY: `release` was produced with `context` and runs exactly once,
        // here or never (after `into_raw`).
        unsafe { (self.release)(self.context.as_ptr()) }
    }
}

/// Exclusive owner of an adapted closure.
///
/// The holder is released when the handle is dropped. `'f` bounds everything
/// the closure borrows.
pub struct UniqueContext<'f> {
    holder: OwnedHolder,
    _closure: PhantomData<&'f ()>,
}

impl<'f> UniqueContext<'f> {
    /// # Safety
    ///
    /// `context` must be a live holder that `release` frees, owned by nobody
    /// else.
    pub(crate) unsafe fn new(context: NonNull<c_void>, release: Releaser) -> Self {
        Self {
            holder: OwnedHolder { context, release },
            _closure: PhantomData,
        }
    }

    /// The raw context to pass alongside the trampoline
    pub fn as_ptr(&self) -> *mut c_void {
        self.holder.context.as_ptr()
    }

    /// Give up ownership, e.g. to a C API that calls a "free userdata"
    /// callback when it is done with the context.
    ///
    /// The returned releaser must be called exactly once with the returned
    /// context, or the closure leaks.
    pub fn into_raw(self) -> (*mut c_void, Releaser) {
        self.holder.into_raw()
    }
}

impl fmt::Debug for UniqueContext<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("UniqueContext").field(&self.as_ptr()).finish()
    }
}

/// Reference-counted owner of an adapted closure.
///
/// Clones share one holder through the refcount in its header; the holder is
/// released when the last clone is dropped, on whichever thread that happens.
pub struct SharedContext<'f> {
    context: NonNull<c_void>,
    release: Releaser,
    _closure: PhantomData<&'f ()>,
}

// SAFETY: only built from closures that are `Send`, so the release may run on
// any thread. The refcount is atomic and the handle never touches the closure
// except to release it.
unsafe impl Send for SharedContext<'_> {}
unsafe impl Sync for SharedContext<'_> {}

impl<'f> SharedContext<'f> {
    /// # Safety
    ///
    /// Same as [`UniqueContext::new`]; additionally the closure behind
    /// `context` must be `Send` and its header must hold exactly one
    /// reference.
    pub(crate) unsafe fn new(context: NonNull<c_void>, release: Releaser) -> Self {
        Self {
            context,
            release,
            _closure: PhantomData,
        }
    }

    fn header(&self) -> &Header {
        // SAFETY: the holder stays alive while any handle exists.
        unsafe { Header::from_context(self.context) }
    }

    /// The raw context to pass alongside the trampoline
    pub fn as_ptr(&self) -> *mut c_void {
        self.context.as_ptr()
    }

    /// Number of handles currently sharing the holder
    pub fn strong_count(this: &Self) -> usize {
        this.header().refs()
    }

    /// Whether two handles share the same holder
    pub fn ptr_eq(this: &Self, other: &Self) -> bool {
        this.context == other.context
    }
}

impl Clone for SharedContext<'_> {
    fn clone(&self) -> Self {
        self.header().retain();
        Self {
            context: self.context,
            release: self.release,
            _closure: PhantomData,
        }
    }
}

impl Drop for SharedContext<'_> {
    fn drop(&mut self) {
        if self.header().unretain() {
            // SAFETY: this was the last handle, so nothing else can reach
            // the holder.
            unsafe { (self.release)(self.context.as_ptr()) }
        }
    }
}

impl fmt::Debug for SharedContext<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SharedContext")
            .field("context", &self.as_ptr())
            .field("strong_count", &Self::strong_count(self))
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::holder::{release, Holder, Policy};
    use std::cell::Cell;
    use std::sync::atomic::{AtomicUsize, Ordering};

    thread_local! {
        static RELEASED: Cell<usize> = const { Cell::new(0) };
    }

    unsafe extern "C-unwind" fn count_release(_: *mut c_void) {
        RELEASED.with(|released| released.set(released.get() + 1));
    }

    fn released() -> usize {
        RELEASED.with(Cell::get)
    }

    fn dangling() -> NonNull<c_void> {
        NonNull::<u64>::dangling().cast()
    }

    /// Closure stand-in that records its drop in a static counter
    struct Tally(&'static AtomicUsize);

    impl Drop for Tally {
        fn drop(&mut self) {
            self.0.fetch_add(1, Ordering::SeqCst);
        }
    }

    fn shared(drops: &'static AtomicUsize) -> SharedContext<'static> {
        let context = Holder::allocate(Policy::Shared, Tally(drops)).unwrap();
        unsafe { SharedContext::new(context, release::<Tally>) }
    }

    #[test]
    fn test_unique_releases_on_drop() {
        let before = released();
        let context = unsafe { UniqueContext::new(dangling(), count_release) };
        assert_eq!(context.as_ptr(), dangling().as_ptr());
        assert_eq!(released(), before);

        drop(context);
        assert_eq!(released(), before + 1);
    }

    #[test]
    fn test_unique_into_raw_skips_release() {
        let before = released();
        let context = unsafe { UniqueContext::new(dangling(), count_release) };

        let (raw, release) = context.into_raw();
        assert_eq!(raw, dangling().as_ptr());
        assert_eq!(released(), before);

        unsafe { release(raw) };
        assert_eq!(released(), before + 1);
    }

    #[test]
    fn test_shared_releases_after_last_clone() {
        static DROPS: AtomicUsize = AtomicUsize::new(0);
        let first = shared(&DROPS);
        let second = first.clone();
        assert!(SharedContext::ptr_eq(&first, &second));
        assert_eq!(SharedContext::strong_count(&first), 2);

        drop(first);
        assert_eq!(DROPS.load(Ordering::SeqCst), 0);
        assert_eq!(SharedContext::strong_count(&second), 1);

        drop(second);
        assert_eq!(DROPS.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_shared_release_from_another_thread() {
        static DROPS: AtomicUsize = AtomicUsize::new(0);
        let context = shared(&DROPS);
        let moved = context.clone();
        drop(context);

        std::thread::spawn(move || drop(moved)).join().unwrap();
        assert_eq!(DROPS.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_shared_handles_of_different_holders_differ() {
        static DROPS: AtomicUsize = AtomicUsize::new(0);
        let first = shared(&DROPS);
        let second = shared(&DROPS);
        assert!(!SharedContext::ptr_eq(&first, &second));
    }

    #[test]
    fn test_debug_shows_context() {
        static DROPS: AtomicUsize = AtomicUsize::new(0);
        let context = shared(&DROPS);
        let rendered = format!("{context:?}");
        assert!(rendered.starts_with("SharedContext"));
        assert!(rendered.contains("strong_count: 1"));
    }
}
