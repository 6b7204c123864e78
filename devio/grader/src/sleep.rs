use crate::{Harness, Machine, wait_until};
use devio::Config;
use std::sync::{Arc, Mutex};

type Woken = Arc<Mutex<Vec<(usize, u64)>>>;

/// Puts one process to sleep per entry of `seconds`, and waits until all of
/// them are in the wait list.
fn sleepers(harness: &Harness, seconds: &[u64]) -> Woken {
    let asleep = harness.io.timer().pending();
    let woken: Woken = Arc::new(Mutex::new(Vec::new()));
    for (id, &seconds) in seconds.iter().enumerate() {
        let (io, woken) = (harness.io.clone(), woken.clone());
        std::thread::spawn(move || {
            io.sleep(seconds);
            let now = io.timer().now();
            woken.lock().unwrap().push((id, now));
        });
    }
    assert!(
        wait_until(|| harness.io.timer().pending() == asleep + seconds.len()),
        "Sleepers never reached the wait list"
    );
    woken
}

/// Ticks the clock `ticks` times. After each tick, waits until exactly the
/// sleepers whose deadline has passed are awake.
fn run_clock(harness: &Harness, woken: &Woken, deadlines: &[u64], ticks: u64) {
    for tick in 1..=ticks {
        harness.machine.tick();
        let due = deadlines.iter().filter(|&&d| d <= tick).count();
        assert!(
            wait_until(|| harness.io.timer().now() == tick && woken.lock().unwrap().len() == due),
            "At tick {tick}, expected {due} sleepers awake"
        );
    }
}

fn boot(ticks_per_second: u64) -> Harness {
    Harness::boot_with(
        Machine::new(),
        Config::new().ticks_per_second(ticks_per_second),
    )
}

#[test]
fn wake_in_deadline_order() {
    let harness = boot(10);
    let woken = sleepers(&harness, &[3, 1, 2]);
    run_clock(&harness, &woken, &[30, 10, 20], 30);

    let woken = woken.lock().unwrap();
    assert_eq!(
        &*woken,
        &[(1, 10), (2, 20), (0, 30)],
        "Sleepers must wake exactly at their deadline, in deadline order"
    );
}

#[test]
fn same_deadline() {
    let harness = boot(10);
    let woken = sleepers(&harness, &[1; 5]);
    run_clock(&harness, &woken, &[10; 5], 10);

    let mut woken = woken.lock().unwrap().clone();
    woken.sort();
    assert_eq!(woken, (0..5).map(|id| (id, 10)).collect::<Vec<_>>());
}

#[test]
fn zero_seconds_waits_for_next_tick() {
    let harness = boot(10);
    let woken = sleepers(&harness, &[0]);
    std::thread::sleep(std::time::Duration::from_millis(20));
    assert!(woken.lock().unwrap().is_empty(), "Woke up without a tick");
    run_clock(&harness, &woken, &[1], 1);
}

#[test]
fn staggered_children() {
    // Ten children sleeping 30, 27, ..., 3 seconds.
    let harness = boot(2);
    let seconds: Vec<u64> = (0..10).map(|i| (10 - i) * 3).collect();
    let deadlines: Vec<u64> = seconds.iter().map(|s| s * 2).collect();
    let woken = sleepers(&harness, &seconds);
    run_clock(&harness, &woken, &deadlines, 60);

    let order: Vec<usize> = woken.lock().unwrap().iter().map(|&(id, _)| id).collect();
    assert_eq!(order, (0..10).rev().collect::<Vec<_>>());
    assert_eq!(harness.io.timer().pending(), 0);
}

#[test]
fn sleepers_added_while_clock_runs() {
    let harness = boot(10);
    let first = sleepers(&harness, &[2]);
    run_clock(&harness, &first, &[20], 5);

    // Sleeping at tick 5 for one second ends at tick 15, before the first.
    let second = sleepers(&harness, &[1]);
    for tick in 6..=20 {
        harness.machine.tick();
        assert!(wait_until(|| harness.io.timer().now() == tick));
        let due_second = usize::from(tick >= 15);
        let due_first = usize::from(tick >= 20);
        assert!(
            wait_until(|| second.lock().unwrap().len() == due_second
                && first.lock().unwrap().len() == due_first),
            "At tick {tick}, wrong set of sleepers awake"
        );
    }
    assert_eq!(second.lock().unwrap()[0].1, 15);
    assert_eq!(first.lock().unwrap()[0].1, 20);
}
