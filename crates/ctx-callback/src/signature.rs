//! Trampoline generation per callable signature
//!
//! [`Callback`] and [`OnceCallback`] are implemented for every callable of
//! arity 0 through 12, so the argument tuple and return type of an adapted
//! closure are inferred from the closure itself. Each implementation carries
//! the two trampolines matching that signature:
//!
//! - prefix: `unsafe extern "C-unwind" fn(*mut c_void, A1, ..., An) -> Ret`
//! - suffix: `unsafe extern "C-unwind" fn(A1, ..., An, *mut c_void) -> Ret`
//!
//! Closure parameters must be annotated (`|a: i32, b: i32| a + b`), since the
//! bounds here are not `Fn*` bounds and cannot drive closure inference. An
//! unannotated closure can first be normalized into a
//! `Box<dyn FnMut(i32, i32) -> i32>`, which implements the traits as well.
//! The signature can also be written out with turbofish
//! (`prefix_deleter::<(i32, i32), i32, _>(..)`).
//!
//! # Safety of the trampolines
//!
//! Calling a trampoline is `unsafe`. The caller must pass a context produced
//! together with that trampoline, which must still be alive (and, for
//! oneshot, never invoked before). Everything the closure borrows must
//! outlive the call. The trampolines do no locking: concurrent or re-entrant
//! invocation of one context must be ruled out by the caller.
//!
//! Trampolines use the `"C-unwind"` ABI, so a panic in the closure unwinds to
//! the caller exactly as a direct call would. A oneshot holder is already
//! freed by then. Unwinding through frames of real C code is only sound when
//! that code was built to allow it (e.g. `-fexceptions`); otherwise catch the
//! panic inside the closure.

use crate::holder::Holder;
use std::ffi::c_void;

/// A callable that can be invoked any number of times through a trampoline.
pub trait Callback<Args, Ret>: Sized {
    /// `unsafe extern "C-unwind" fn(*mut c_void, Args...) -> Ret`
    type Prefix: Copy;
    /// `unsafe extern "C-unwind" fn(Args..., *mut c_void) -> Ret`
    type Suffix: Copy;

    /// Context-first trampoline for a holder of `Self`
    const PREFIX: Self::Prefix;
    /// Context-last trampoline for a holder of `Self`
    const SUFFIX: Self::Suffix;
}

/// A callable that is invoked exactly once through a self-releasing
/// trampoline.
pub trait OnceCallback<Args, Ret>: Sized {
    /// `unsafe extern "C-unwind" fn(*mut c_void, Args...) -> Ret`
    type Prefix: Copy;
    /// `unsafe extern "C-unwind" fn(Args..., *mut c_void) -> Ret`
    type Suffix: Copy;

    /// Context-first trampoline that frees the holder of `Self`
    const PREFIX: Self::Prefix;
    /// Context-last trampoline that frees the holder of `Self`
    const SUFFIX: Self::Suffix;
}

macro_rules! impl_callback {
    ($( $arg:ident ),*) => {
        impl<Func, Ret, $( $arg ),*> Callback<($( $arg, )*), Ret> for Func
        where
            Func: FnMut($( $arg ),*) -> Ret,
        {
            type Prefix = unsafe extern "C-unwind" fn(*mut c_void, $( $arg ),*) -> Ret;
            type Suffix = unsafe extern "C-unwind" fn($( $arg, )* *mut c_void) -> Ret;

            const PREFIX: Self::Prefix = {
                #[allow(non_snake_case)]
                unsafe extern "C-unwind" fn prefix<T, R, $( $arg ),*>(
                    context: *mut c_void,
                    $( $arg: $arg ),*
                ) -> R
                where
                    T: FnMut($( $arg ),*) -> R,
                {
                    // SAFETY: the context was produced alongside this trampoline.
                    let closure = unsafe { Holder::<T>::closure_mut(context) };
                    closure($( $arg ),*)
                }

                prefix::<Func, Ret, $( $arg ),*>
            };

            const SUFFIX: Self::Suffix = {
                #[allow(non_snake_case)]
                unsafe extern "C-unwind" fn suffix<T, R, $( $arg ),*>(
                    $( $arg: $arg, )*
                    context: *mut c_void
                ) -> R
                where
                    T: FnMut($( $arg ),*) -> R,
                {
                    // SAFETY: the context was produced alongside this trampoline.
                    let closure = unsafe { Holder::<T>::closure_mut(context) };
                    closure($( $arg ),*)
                }

                suffix::<Func, Ret, $( $arg ),*>
            };
        }

        impl<Func, Ret, $( $arg ),*> OnceCallback<($( $arg, )*), Ret> for Func
        where
            Func: FnOnce($( $arg ),*) -> Ret,
        {
            type Prefix = unsafe extern "C-unwind" fn(*mut c_void, $( $arg ),*) -> Ret;
            type Suffix = unsafe extern "C-unwind" fn($( $arg, )* *mut c_void) -> Ret;

            const PREFIX: Self::Prefix = {
                #[allow(non_snake_case)]
                unsafe extern "C-unwind" fn prefix_once<T, R, $( $arg ),*>(
                    context: *mut c_void,
                    $( $arg: $arg ),*
                ) -> R
                where
                    T: FnOnce($( $arg ),*) -> R,
                {
                    // SAFETY: the context was produced alongside this trampoline
                    // and is consumed here.
                    let closure = unsafe { Holder::<T>::take(context) };
                    closure($( $arg ),*)
                }

                prefix_once::<Func, Ret, $( $arg ),*>
            };

            const SUFFIX: Self::Suffix = {
                #[allow(non_snake_case)]
                unsafe extern "C-unwind" fn suffix_once<T, R, $( $arg ),*>(
                    $( $arg: $arg, )*
                    context: *mut c_void
                ) -> R
                where
                    T: FnOnce($( $arg ),*) -> R,
                {
                    // SAFETY: the context was produced alongside this trampoline
                    // and is consumed here.
                    let closure = unsafe { Holder::<T>::take(context) };
                    closure($( $arg ),*)
                }

                suffix_once::<Func, Ret, $( $arg ),*>
            };
        }
    };
}

impl_callback!();
impl_callback!(A);
impl_callback!(A, B);
impl_callback!(A, B, C);
impl_callback!(A, B, C, D);
impl_callback!(A, B, C, D, E);
impl_callback!(A, B, C, D, E, F);
impl_callback!(A, B, C, D, E, F, G);
impl_callback!(A, B, C, D, E, F, G, H);
impl_callback!(A, B, C, D, E, F, G, H, I);
impl_callback!(A, B, C, D, E, F, G, H, I, J);
impl_callback!(A, B, C, D, E, F, G, H, I, J, K);
impl_callback!(A, B, C, D, E, F, G, H, I, J, K, L);
