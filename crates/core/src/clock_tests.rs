// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;

#[test]
fn deadline_is_offset_from_now() {
    let clock = FakeClock::new();
    let now = clock.now();
    let deadline = clock.deadline_after(Duration::from_millis(250));
    assert_eq!(deadline.duration_since(now), Duration::from_millis(250));
}

#[test]
fn deadline_passes_once_clock_advances_beyond_it() {
    let clock = FakeClock::new();
    let deadline = clock.deadline_after(Duration::from_secs(5));

    clock.advance(Duration::from_secs(4));
    assert!(clock.now() < deadline);

    clock.advance(Duration::from_secs(1));
    assert!(clock.now() >= deadline);
}

#[test]
fn huge_timeout_does_not_overflow() {
    let clock = SystemClock;
    let deadline = clock.deadline_after(Duration::MAX);
    assert!(deadline > clock.now());
}

#[test]
fn fake_clock_clones_share_time() {
    let clock1 = FakeClock::new();
    let clock2 = clock1.clone();
    let t1 = clock1.now();
    clock2.advance(Duration::from_secs(30));
    assert!(clock1.now().duration_since(t1) >= Duration::from_secs(30));
}
