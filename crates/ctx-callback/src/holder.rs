//! Heap holder behind every opaque context
//!
//! A [`Holder`] owns one adapted closure together with the [`Policy`] it was
//! adapted under. Its address is the `void*` handed to C code. The holder is
//! allocated through the global allocator with its own layout, so it can be
//! turned back into a `Box` for release.

use crate::error::{AdaptError, AdaptResult};
use std::alloc::{self, Layout};
use std::any::type_name;
use std::ffi::c_void;
use std::fmt;
use std::process;
use std::ptr::{self, NonNull};
use std::sync::atomic::{fence, AtomicUsize, Ordering};

/// C-compatible function that releases a holder given its context.
pub type Releaser = unsafe extern "C-unwind" fn(*mut c_void);

/// How an adapted closure's holder gets released
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Policy {
    /// Released by an explicit call to the [`Releaser`]
    Manual,
    /// Released by its first (and only) invocation
    Oneshot,
    /// Released when the [`UniqueContext`](crate::UniqueContext) is dropped
    Unique,
    /// Released when the last [`SharedContext`](crate::SharedContext) is dropped
    Shared,
}

impl Policy {
    /// Whether a context under this policy may be invoked more than once
    pub fn is_reinvocable(self) -> bool {
        !matches!(self, Policy::Oneshot)
    }
}

impl fmt::Display for Policy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Policy::Manual => "manual",
            Policy::Oneshot => "oneshot",
            Policy::Unique => "unique",
            Policy::Shared => "shared",
        };
        f.write_str(name)
    }
}

/// Fixed prefix of every holder, reachable without knowing the closure type.
#[derive(Debug)]
pub(crate) struct Header {
    policy: Policy,
    /// Live [`SharedContext`](crate::SharedContext) handles; 1 for other policies
    refs: AtomicUsize,
}

impl Header {
    /// # Safety
    ///
    /// `context` must be a live holder returned by [`Holder::allocate`].
    pub(crate) unsafe fn from_context<'a>(context: NonNull<c_void>) -> &'a Self {
        // SAFETY: `Holder` is `repr(C)` with the header first.
        unsafe { context.cast::<Self>().as_ref() }
    }

    pub(crate) fn refs(&self) -> usize {
        self.refs.load(Ordering::Acquire)
    }

    /// Add a reference.
    pub(crate) fn retain(&self) {
        let previous = self.refs.fetch_add(1, Ordering::Relaxed);
        if previous > MAX_REFS {
            log::error!("{} holder refcount overflowed", self.policy);
            process::abort();
        }
    }

    /// Drop a reference; `true` when it was the last one.
    pub(crate) fn unretain(&self) -> bool {
        if self.refs.fetch_sub(1, Ordering::Release) != 1 {
            return false;
        }
        fence(Ordering::Acquire);
        true
    }
}

const MAX_REFS: usize = isize::MAX as usize;

/// Heap object owning an adapted closure.
///
/// The header is never zero-sized, so neither is the holder and every holder
/// gets a distinct, non-null address.
#[repr(C)]
pub(crate) struct Holder<F> {
    header: Header,
    closure: F,
}

impl<F> Holder<F> {
    /// Move `closure` into a fresh heap holder and return its address.
    ///
    /// This is the only allocation any policy makes. On failure the closure
    /// is dropped and nothing leaks.
    pub(crate) fn allocate(policy: Policy, closure: F) -> AdaptResult<NonNull<c_void>> {
        let layout = Layout::new::<Self>();

        // SAFETY: the layout is non-zero-sized (see `header`).
        let raw = unsafe { alloc::alloc(layout) }.cast::<Self>();
        let Some(holder) = NonNull::new(raw) else {
            log::warn!(
                "failed to allocate {policy} holder for {} ({} bytes)",
                type_name::<F>(),
                layout.size()
            );
            return Err(AdaptError::AllocationFailed {
                size: layout.size(),
                align: layout.align(),
            });
        };

        let header = Header {
            policy,
            refs: AtomicUsize::new(1),
        };
        // SAFETY: freshly allocated with the layout of `Self`.
        unsafe { holder.as_ptr().write(Holder { header, closure }) };

        log::trace!(
            "allocated {policy} holder for {} at {:p}",
            type_name::<F>(),
            holder
        );
        Ok(holder.cast())
    }

    /// Borrow the closure behind `context` for a re-invocable call.
    ///
    /// Only the closure field is borrowed mutably; shared handles on other
    /// threads may touch the header meanwhile.
    ///
    /// # Safety
    ///
    /// `context` must have been returned by [`Holder::allocate`] for this
    /// exact `F`, must not have been released, and no other borrow of the
    /// closure may be live for `'a`.
    pub(crate) unsafe fn closure_mut<'a>(context: *mut c_void) -> &'a mut F {
        let holder = context.cast::<Self>();
        // SAFETY: guaranteed by the caller.
        let policy = unsafe { (*holder).header.policy };
        debug_assert!(
            policy.is_reinvocable(),
            "{policy} context passed to a re-invocable trampoline"
        );
        // SAFETY: guaranteed by the caller.
        unsafe { &mut *ptr::addr_of_mut!((*holder).closure) }
    }

    /// Free the holder behind `context` and hand back its closure.
    ///
    /// The holder storage is gone by the time this returns, so whatever the
    /// closure does next, panicking included, the release has already
    /// happened exactly once.
    ///
    /// # Safety
    ///
    /// Same as [`Holder::closure_mut`]; additionally `context` is dangling
    /// afterwards.
    pub(crate) unsafe fn take(context: *mut c_void) -> F {
        // SAFETY: allocated by `allocate` with the global allocator and the
        // layout of `Self`, which is what `Box` expects.
        let holder = unsafe { Box::from_raw(context.cast::<Self>()) };
        let Holder { header, closure } = *holder;
        debug_assert_eq!(
            header.policy,
            Policy::Oneshot,
            "{} context passed to a oneshot trampoline",
            header.policy
        );

        log::trace!(
            "released {} holder for {} at {:p}",
            header.policy,
            type_name::<F>(),
            context
        );
        closure
    }
}

/// Drop the closure behind `context` and free its holder.
///
/// # Safety
///
/// `context` must have been returned by [`Holder::allocate`] for this exact
/// `F` and must not have been released already. It is dangling afterwards.
pub(crate) unsafe extern "C-unwind" fn release<F>(context: *mut c_void) {
    // SAFETY: see `Holder::take`.
    let holder = unsafe { Box::from_raw(context.cast::<Holder<F>>()) };
    log::trace!(
        "released {} holder for {} at {:p}",
        holder.header.policy,
        type_name::<F>(),
        context
    );
    drop(holder);
}
