//! Entry points: one per ownership policy and context ordering
//!
//! | Policy  | prefix             | suffix             | context slot          |
//! |---------|--------------------|--------------------|-----------------------|
//! | manual  | [`prefix_deleter`] | [`suffix_deleter`] | `*mut c_void`         |
//! | oneshot | [`prefix_oneshot`] | [`suffix_oneshot`] | `*mut c_void`         |
//! | unique  | [`prefix_unique`]  | [`suffix_unique`]  | [`UniqueContext`]     |
//! | shared  | [`prefix_shared`]  | [`suffix_shared`]  | [`SharedContext`]     |
//!
//! Every entry point performs exactly one heap allocation, the holder, and
//! reports its failure as [`AdaptError::AllocationFailed`](crate::AdaptError)
//! right away. The shared refcount lives inside that holder.
//! Calling the returned trampoline is `unsafe`; see
//! [`signature`](crate::signature) for its contract.

use crate::context::{SharedContext, UniqueContext};
use crate::error::AdaptResult;
use crate::holder::{release, Holder, Policy, Releaser};
use crate::signature::{Callback, OnceCallback};
use std::ffi::c_void;

/// Context, trampoline and releaser of a manually released closure.
///
/// Invoke `trampoline` with `context` as often as needed, then call
/// `release(context)` exactly once. Forgetting the release leaks the closure;
/// any use of `context` after it is undefined behavior.
#[derive(Debug)]
pub struct Manual<T> {
    pub context: *mut c_void,
    pub trampoline: T,
    pub release: Releaser,
}

impl<T> Manual<T> {
    pub const POLICY: Policy = Policy::Manual;
}

/// Context and trampoline of a self-releasing closure.
///
/// `trampoline` must be invoked exactly once with `context`. That call frees
/// the holder before the closure body runs. Never invoking it leaks the
/// closure; invoking it twice is undefined behavior.
#[derive(Debug)]
pub struct Oneshot<T> {
    pub context: *mut c_void,
    pub trampoline: T,
}

impl<T> Oneshot<T> {
    pub const POLICY: Policy = Policy::Oneshot;
}

/// Exclusively owned context and its trampoline.
#[derive(Debug)]
pub struct Unique<'f, T> {
    pub context: UniqueContext<'f>,
    pub trampoline: T,
}

impl<T> Unique<'_, T> {
    pub const POLICY: Policy = Policy::Unique;
}

/// Reference-counted context and its trampoline.
#[derive(Debug, Clone)]
pub struct Shared<'f, T> {
    pub context: SharedContext<'f>,
    pub trampoline: T,
}

impl<T> Shared<'_, T> {
    pub const POLICY: Policy = Policy::Shared;
}

fn manual<F, T>(closure: F, trampoline: T) -> AdaptResult<Manual<T>> {
    let context = Holder::allocate(Manual::<T>::POLICY, closure)?;
    Ok(Manual {
        context: context.as_ptr(),
        trampoline,
        release: release::<F>,
    })
}

fn oneshot<F, T>(closure: F, trampoline: T) -> AdaptResult<Oneshot<T>> {
    let context = Holder::allocate(Oneshot::<T>::POLICY, closure)?;
    Ok(Oneshot {
        context: context.as_ptr(),
        trampoline,
    })
}

fn unique<'f, F: 'f, T>(closure: F, trampoline: T) -> AdaptResult<Unique<'f, T>> {
    let context = Holder::allocate(Unique::<T>::POLICY, closure)?;
    // SAFETY: the holder was just allocated for `F` and is owned by nobody else.
    let context = unsafe { UniqueContext::new(context, release::<F>) };
    Ok(Unique {
        context,
        trampoline,
    })
}

fn shared<'f, F: Send + 'f, T>(closure: F, trampoline: T) -> AdaptResult<Shared<'f, T>> {
    let context = Holder::allocate(Shared::<T>::POLICY, closure)?;
    // SAFETY: as in `unique`; `F` is `Send` and the fresh header holds one
    // reference.
    let context = unsafe { SharedContext::new(context, release::<F>) };
    Ok(Shared {
        context,
        trampoline,
    })
}

/// Adapt `closure` to `fn(ctx, args...)`, released by an explicit call.
///
/// ```
/// use ctx_callback::prefix_deleter;
///
/// let mut total = 0;
/// let adapted = prefix_deleter(|value: i32| total += value)?;
/// unsafe {
///     (adapted.trampoline)(adapted.context, 1);
///     (adapted.trampoline)(adapted.context, 2);
///     (adapted.release)(adapted.context);
/// }
/// assert_eq!(total, 3);
/// # Ok::<(), ctx_callback::AdaptError>(())
/// ```
pub fn prefix_deleter<Args, Ret, F>(closure: F) -> AdaptResult<Manual<F::Prefix>>
where
    F: Callback<Args, Ret>,
{
    manual(closure, F::PREFIX)
}

/// Adapt `closure` to `fn(ctx, args...)`, released by its single invocation.
///
/// ```
/// use ctx_callback::prefix_oneshot;
///
/// let greeting = String::from("hello");
/// let adapted = prefix_oneshot(move |code: i32| format!("{greeting} {code}"))?;
/// let message = unsafe { (adapted.trampoline)(adapted.context, 7) };
/// assert_eq!(message, "hello 7");
/// # Ok::<(), ctx_callback::AdaptError>(())
/// ```
pub fn prefix_oneshot<Args, Ret, F>(closure: F) -> AdaptResult<Oneshot<F::Prefix>>
where
    F: OnceCallback<Args, Ret>,
{
    oneshot(closure, F::PREFIX)
}

/// Adapt `closure` to `fn(ctx, args...)`, released when the
/// [`UniqueContext`] drops.
pub fn prefix_unique<'f, Args, Ret, F>(closure: F) -> AdaptResult<Unique<'f, F::Prefix>>
where
    F: Callback<Args, Ret> + 'f,
{
    unique(closure, F::PREFIX)
}

/// Adapt `closure` to `fn(ctx, args...)`, released when the last
/// [`SharedContext`] clone drops.
pub fn prefix_shared<'f, Args, Ret, F>(closure: F) -> AdaptResult<Shared<'f, F::Prefix>>
where
    F: Callback<Args, Ret> + Send + 'f,
{
    shared(closure, F::PREFIX)
}

/// Adapt `closure` to `fn(args..., ctx)`, released by an explicit call.
pub fn suffix_deleter<Args, Ret, F>(closure: F) -> AdaptResult<Manual<F::Suffix>>
where
    F: Callback<Args, Ret>,
{
    manual(closure, F::SUFFIX)
}

/// Adapt `closure` to `fn(args..., ctx)`, released by its single invocation.
pub fn suffix_oneshot<Args, Ret, F>(closure: F) -> AdaptResult<Oneshot<F::Suffix>>
where
    F: OnceCallback<Args, Ret>,
{
    oneshot(closure, F::SUFFIX)
}

/// Adapt `closure` to `fn(args..., ctx)`, released when the
/// [`UniqueContext`] drops.
///
/// ```
/// use ctx_callback::suffix_unique;
///
/// let adapted = suffix_unique(|a: i32, b: i32| a.max(b))?;
/// let context = adapted.context.as_ptr();
/// assert_eq!(unsafe { (adapted.trampoline)(3, 7, context) }, 7);
/// drop(adapted);
/// # Ok::<(), ctx_callback::AdaptError>(())
/// ```
pub fn suffix_unique<'f, Args, Ret, F>(closure: F) -> AdaptResult<Unique<'f, F::Suffix>>
where
    F: Callback<Args, Ret> + 'f,
{
    unique(closure, F::SUFFIX)
}

/// Adapt `closure` to `fn(args..., ctx)`, released when the last
/// [`SharedContext`] clone drops.
pub fn suffix_shared<'f, Args, Ret, F>(closure: F) -> AdaptResult<Shared<'f, F::Suffix>>
where
    F: Callback<Args, Ret> + Send + 'f,
{
    shared(closure, F::SUFFIX)
}
