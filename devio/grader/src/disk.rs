use crate::{
    Harness, wait_until,
    machine::{DiskOp, Machine},
};
use abyss::{
    Hardware,
    dev::disk::{DiskCommand, SECTOR_SIZE, TRACK_SIZE},
};
use devio::{Config, KernelError};
use std::{
    sync::{Arc, Mutex},
    thread::{self, JoinHandle},
    time::Duration,
};

fn pattern(seed: u8, sectors: usize) -> Vec<u8> {
    (0..sectors * SECTOR_SIZE)
        .map(|i| seed.wrapping_add((i / SECTOR_SIZE) as u8).wrapping_mul(31) ^ i as u8)
        .collect()
}

fn commands(machine: &Machine, unit: usize) -> Vec<DiskOp> {
    machine
        .disk_log(unit)
        .into_iter()
        .filter(|op| *op != DiskOp::Tracks)
        .collect()
}

fn seeks(machine: &Machine, unit: usize) -> Vec<usize> {
    machine
        .disk_log(unit)
        .into_iter()
        .filter_map(|op| match op {
            DiskOp::Seek(track) => Some(track),
            _ => None,
        })
        .collect()
}

/// Reads one sector at `track` from a new process, after the requests
/// already queued.
fn queue_read(harness: &Harness, unit: usize, track: usize) -> JoinHandle<Result<u32, KernelError>> {
    let queued = harness.io.disk(unit).unwrap().pending();
    let io = harness.io.clone();
    let reader = thread::spawn(move || {
        let mut buf = [0; SECTOR_SIZE];
        io.disk_read(unit, &mut buf, track, 0)
    });
    assert!(
        wait_until(|| harness.io.disk(unit).unwrap().pending() == queued + 1),
        "Request for track {track} never reached the queue"
    );
    reader
}

pub mod geometry {
    use super::*;

    #[test]
    fn size_waits_for_probe() {
        let machine = Machine::with_tracks([20, 7]);
        machine.hold_disk(0);
        let harness = Harness::boot_with(machine, Config::new());

        let answer = Arc::new(Mutex::new(None));
        let asker = {
            let (io, answer) = (harness.io.clone(), answer.clone());
            thread::spawn(move || {
                let size = io.disk_size(0);
                *answer.lock().unwrap() = Some(size);
            })
        };
        thread::sleep(Duration::from_millis(50));
        assert!(
            answer.lock().unwrap().is_none(),
            "DiskSize returned before the geometry probe completed"
        );

        harness.machine.release_disk(0);
        asker.join().unwrap();
        let size = answer.lock().unwrap().take().unwrap().unwrap();
        assert_eq!((size.sector_size, size.track_size, size.tracks), (512, 16, 20));

        // Known geometry is answered without touching the device.
        harness.machine.hold_disk(0);
        assert_eq!(harness.io.disk_size(0).map(|s| s.tracks), Ok(20));
        assert_eq!(harness.io.disk_size(1).map(|s| s.tracks), Ok(7));
        harness.machine.release_disk(0);
    }

    #[test]
    fn every_waiter_gets_the_same_answer() {
        let machine = Machine::with_tracks([11, 11]);
        machine.hold_disk(1);
        let harness = Harness::boot_with(machine, Config::new());

        let askers: Vec<_> = (0..4)
            .map(|_| {
                let io = harness.io.clone();
                thread::spawn(move || io.disk_size(1).map(|s| s.tracks))
            })
            .collect();
        thread::sleep(Duration::from_millis(20));
        harness.machine.release_disk(1);
        for asker in askers {
            assert_eq!(asker.join().unwrap(), Ok(11));
        }
        assert_eq!(
            harness.machine.disk_log(1).first(),
            Some(&DiskOp::Tracks),
            "The driver must probe the geometry first"
        );
    }

    #[test]
    fn track_count_stored_on_issue() {
        let machine = Machine::with_tracks([20, 7]);
        machine.hold_disk(1);
        let mut tracks = 0;
        assert_eq!(machine.disk_output(1, DiskCommand::Tracks { out: &mut tracks }), Ok(()));
        assert_eq!(tracks, 7, "Track count must be stored before the interrupt");
        machine.release_disk(1);
    }

    #[test]
    fn read_waits_for_probe() {
        let machine = Machine::new();
        machine.hold_disk(0);
        let harness = Harness::boot_with(machine, Config::new());

        let reader = {
            let io = harness.io.clone();
            thread::spawn(move || {
                let mut buf = [0; SECTOR_SIZE];
                io.disk_read(0, &mut buf, 3, 0)
            })
        };
        thread::sleep(Duration::from_millis(20));
        assert!(!reader.is_finished(), "Read finished before the geometry probe");
        assert_eq!(harness.io.disk(0).unwrap().pending(), 0);
        harness.machine.release_disk(0);
        assert_eq!(reader.join().unwrap(), Ok(0));
        assert_eq!(harness.machine.disk_overlaps(0), 0);
        assert_eq!(seeks(&harness.machine, 0), [3]);
    }
}

pub mod transfer {
    use super::*;

    #[test]
    fn crosses_track_boundary() {
        let harness = Harness::boot();
        let data = pattern(7, 20);
        assert_eq!(harness.io.disk_write(0, &data, 1, 10), Ok(0));

        let mut expected = vec![DiskOp::Seek(1)];
        expected.extend((10..TRACK_SIZE).map(|sector| DiskOp::Write { track: 1, sector }));
        expected.push(DiskOp::Seek(2));
        expected.extend((0..14).map(|sector| DiskOp::Write { track: 2, sector }));
        assert_eq!(commands(&harness.machine, 0), expected);

        assert_eq!(
            harness.machine.read_sector(0, 2, 13),
            &data[19 * SECTOR_SIZE..],
            "Last sector landed in the wrong place"
        );

        let mut back = vec![0; data.len()];
        assert_eq!(harness.io.disk_read(0, &mut back, 1, 10), Ok(0));
        assert!(back == data, "Read back different data");
    }

    #[test]
    fn exactly_one_transfer_per_sector() {
        let harness = Harness::boot();
        for count in [1, 15, 16, 17, 33] {
            let before = harness.machine.disk_log(1).len();
            let mut buf = vec![0; count * SECTOR_SIZE];
            assert_eq!(harness.io.disk_read(1, &mut buf, 0, 0), Ok(0));
            let transfers = harness.machine.disk_log(1)[before..]
                .iter()
                .filter(|op| op.is_transfer())
                .count();
            assert_eq!(transfers, count, "{count} sectors need {count} transfers");
        }
    }

    #[test]
    fn seek_error_aborts_request() {
        let harness = Harness::boot();
        // Sectors 14 and 15 of the last track exist, the rest does not.
        let mut buf = vec![0; 4 * SECTOR_SIZE];
        assert_eq!(
            harness.io.disk_read(0, &mut buf, Machine::DEFAULT_TRACKS - 1, 14),
            Ok(2),
            "Seeking past the last track must report the device error"
        );
        let last = Machine::DEFAULT_TRACKS - 1;
        assert_eq!(
            commands(&harness.machine, 0),
            [
                DiskOp::Seek(last),
                DiskOp::Read { track: last, sector: 14 },
                DiskOp::Read { track: last, sector: 15 },
                DiskOp::Seek(last + 1),
            ]
        );

        let mut buf = [0; SECTOR_SIZE];
        assert_eq!(harness.io.disk_read(0, &mut buf, 0, 0), Ok(0));
    }

    #[test]
    fn transfer_error_abandons_rest() {
        let harness = Harness::boot();
        harness.machine.fail_transfer_after(0, 2);
        let data = pattern(1, 5);
        assert_eq!(harness.io.disk_write(0, &data, 3, 0), Ok(2));
        let transfers = commands(&harness.machine, 0)
            .iter()
            .filter(|op| op.is_transfer())
            .count();
        assert_eq!(transfers, 3, "Remaining sectors must be abandoned after an error");

        assert_eq!(harness.io.disk_write(0, &data, 3, 0), Ok(0), "Errors are not sticky");
    }

    #[test]
    fn invalid_requests() {
        let harness = Harness::boot();
        let mut buf = [0; SECTOR_SIZE];
        assert_eq!(
            harness.io.disk_read(0, &mut buf, 0, TRACK_SIZE),
            Err(KernelError::InvalidArgument)
        );
        assert_eq!(
            harness.io.disk_read(2, &mut buf, 0, 0),
            Err(KernelError::InvalidArgument)
        );
        assert_eq!(
            harness.io.disk_write(0, &buf[..100], 0, 0),
            Err(KernelError::InvalidArgument)
        );
        assert!(
            commands(&harness.machine, 0).is_empty(),
            "Rejected requests must not reach the device"
        );
    }
}

pub mod scheduling {
    use super::*;

    fn serve(arrivals: &[usize]) -> Vec<usize> {
        let harness = Harness::boot();
        harness.io.disk_size(0).unwrap();
        harness.machine.hold_disk(0);
        let readers: Vec<_> = arrivals
            .iter()
            .map(|&track| queue_read(&harness, 0, track))
            .collect();
        harness.machine.release_disk(0);
        for reader in readers {
            assert_eq!(reader.join().unwrap(), Ok(0));
        }
        assert_eq!(harness.machine.disk_overlaps(0), 0);
        seeks(&harness.machine, 0)
    }

    #[test]
    fn one_directional_scan() {
        assert_eq!(serve(&[5, 7, 2, 6]), [5, 6, 7, 2]);
        assert_eq!(serve(&[5, 2]), [5, 2]);
    }

    #[test]
    fn repeatable() {
        let first = serve(&[9, 3, 12, 1, 9]);
        assert_eq!(first, [9, 1, 3, 9, 12]);
        assert_eq!(serve(&[9, 3, 12, 1, 9]), first, "Same arrivals, different order");
    }

    #[test]
    fn units_are_independent() {
        let harness = Harness::boot();
        harness.io.disk_size(1).unwrap();
        harness.machine.hold_disk(1);
        let stuck = queue_read(&harness, 1, 4);

        let mut buf = [0; SECTOR_SIZE];
        assert_eq!(harness.io.disk_read(0, &mut buf, 4, 0), Ok(0));
        assert!(!stuck.is_finished(), "Disk 1 served a request while held");

        harness.machine.release_disk(1);
        assert_eq!(stuck.join().unwrap(), Ok(0));
    }

    #[test]
    fn random_workload() {
        use rand::{Rng, SeedableRng, rngs::StdRng};

        const WORKERS: usize = 6;
        let harness = Harness::boot();
        let workers: Vec<_> = (0..WORKERS)
            .map(|id| {
                let io = harness.io.clone();
                thread::spawn(move || {
                    let mut rng = StdRng::seed_from_u64(id as u64);
                    let unit = id % 2;
                    // Each worker owns two tracks of its unit.
                    let base = (id / 2) * 2 * TRACK_SIZE;
                    for round in 0..8 {
                        let count = rng.gen_range(1..=TRACK_SIZE);
                        let first = rng.gen_range(0..=TRACK_SIZE);
                        let at = base + first;
                        let data = pattern((id * 16 + round) as u8, count);
                        let status = io.disk_write(unit, &data, at / TRACK_SIZE, at % TRACK_SIZE);
                        assert_eq!(status, Ok(0));
                        let mut back = vec![0; data.len()];
                        let status = io.disk_read(unit, &mut back, at / TRACK_SIZE, at % TRACK_SIZE);
                        assert_eq!(status, Ok(0));
                        assert!(back == data, "worker {id} round {round}: data mismatch");
                    }
                })
            })
            .collect();
        for worker in workers {
            worker.join().unwrap();
        }
        assert_eq!(harness.machine.disk_overlaps(0), 0, "Two commands in flight on disk 0");
        assert_eq!(harness.machine.disk_overlaps(1), 0, "Two commands in flight on disk 1");
    }
}
