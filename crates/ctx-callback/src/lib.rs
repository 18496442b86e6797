//! Closures as C-style callbacks
//!
//! C APIs without closures take a plain function pointer plus an opaque
//! `void*` context that is passed back on every call. This crate moves a Rust
//! closure onto the heap and hands back the matching pair: the holder's
//! address as the context, and an `extern "C-unwind"` trampoline that
//! re-enters the closure from that address.
//!
//! # Ownership policies
//!
//! - **manual** ([`prefix_deleter`], [`suffix_deleter`]): a [`Releaser`] frees
//!   the closure when called.
//! - **oneshot** ([`prefix_oneshot`], [`suffix_oneshot`]): the single
//!   invocation frees the closure. Fits completion callbacks.
//! - **unique** ([`prefix_unique`], [`suffix_unique`]): a [`UniqueContext`]
//!   frees the closure when dropped.
//! - **shared** ([`prefix_shared`], [`suffix_shared`]): a cloneable
//!   [`SharedContext`] frees the closure when the last clone is dropped.
//!
//! `prefix_*` trampolines take the context first (`fn(ctx, args...)`),
//! `suffix_*` trampolines take it last (`fn(args..., ctx)`).
//!
//! # Example
//!
//! ```
//! use ctx_callback::prefix_deleter;
//! use std::ffi::c_void;
//!
//! // Stand-in for `void visit(const int*, size_t, void (*)(void*, int), void*)`
//! unsafe extern "C-unwind" fn visit(
//!     values: *const i32,
//!     len: usize,
//!     callback: unsafe extern "C-unwind" fn(*mut c_void, i32),
//!     context: *mut c_void,
//! ) {
//!     for i in 0..len {
//!         unsafe { callback(context, *values.add(i)) };
//!     }
//! }
//!
//! let values = [3, 4, 5];
//! let mut sum = 0;
//! let adapted = prefix_deleter(|value: i32| sum += value)?;
//! unsafe {
//!     visit(values.as_ptr(), values.len(), adapted.trampoline, adapted.context);
//!     (adapted.release)(adapted.context);
//! }
//! assert_eq!(sum, 12);
//! # Ok::<(), ctx_callback::AdaptError>(())
//! ```
//!
//! # Safety
//!
//! Producing a context is safe; invoking a trampoline is not. See
//! [`signature`] for the full contract. Misuse (invoking after release,
//! invoking a oneshot context twice, releasing twice) is undefined behavior
//! and is not detected.

pub mod adapter;
pub mod context;
pub mod error;
mod holder;
pub mod signature;

pub use adapter::{
    prefix_deleter, prefix_oneshot, prefix_shared, prefix_unique, suffix_deleter, suffix_oneshot,
    suffix_shared, suffix_unique, Manual, Oneshot, Shared, Unique,
};
pub use context::{SharedContext, UniqueContext};
pub use error::{AdaptError, AdaptResult};
pub use holder::{Policy, Releaser};
pub use signature::{Callback, OnceCallback};
