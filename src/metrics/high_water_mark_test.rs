use std::sync::Arc;
use std::thread;

use super::*;
use crate::test_utils;

/// # Case 1: sequential updates
///
/// ## Criterias:
/// 1. only strictly greater candidates return true
/// 2. the cell never decreases
#[test]
fn test_update_sequential_case1() {
    let hwm = HighWaterMark::new();

    assert!(hwm.update(5));
    assert!(!hwm.update(3));
    assert!(!hwm.update(5));
    assert!(hwm.update(9));
    assert_eq!(9, hwm.current());
}

/// # Case 2: N concurrent callers submitting the same value
///
/// ## Criterias:
/// 1. exactly one call returns true for the final maximum
#[test]
fn test_update_concurrent_same_value_case2() {
    test_utils::enable_logger();

    let hwm = Arc::new(HighWaterMark::new());
    let mut handles = Vec::new();
    for _ in 0..8 {
        let hwm = Arc::clone(&hwm);
        handles.push(thread::spawn(move || hwm.update(100)));
    }

    let winners: usize = handles
        .into_iter()
        .map(|handle| handle.join().expect("should succeed"))
        .filter(|won| *won)
        .count();
    assert_eq!(1, winners);
    assert_eq!(100, hwm.current());
}

/// # Case 3: concurrent callers submitting interleaved ranges
///
/// ## Criterias:
/// 1. the cell ends at the maximum of all submitted values
/// 2. no lost update despite contention on every submission
#[test]
fn test_update_concurrent_ranges_case3() {
    let hwm = Arc::new(HighWaterMark::new());
    let mut handles = Vec::new();
    for offset in 0..4i64 {
        let hwm = Arc::clone(&hwm);
        handles.push(thread::spawn(move || {
            // Strides overlap so every thread races on the same values.
            for candidate in (offset..1000).step_by(4) {
                hwm.update(candidate);
            }
        }));
    }
    for handle in handles {
        handle.join().expect("should succeed");
    }

    assert_eq!(999, hwm.current());
}
