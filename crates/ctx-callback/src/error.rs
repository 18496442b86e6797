//! Adapter errors

use thiserror::Error;

/// Errors reported while adapting a closure.
///
/// Allocation is the only step the adapter itself can fail at. Errors raised
/// by the wrapped closure are never wrapped in this type; they travel through
/// the trampoline's return value untouched.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum AdaptError {
    #[error("failed to allocate closure holder ({size} bytes, align {align})")]
    AllocationFailed { size: usize, align: usize },
}

/// Result type for adapt operations
pub type AdaptResult<T> = Result<T, AdaptError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_allocation_failed_message() {
        let err = AdaptError::AllocationFailed { size: 24, align: 8 };
        insta::assert_snapshot!(err.to_string(), @"failed to allocate closure holder (24 bytes, align 8)");
    }
}
