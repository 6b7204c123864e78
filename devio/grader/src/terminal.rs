use crate::{Harness, Machine, wait_until};
use abyss::dev::terminal::TERM_UNITS;
use devio::{Config, KernelError, teletype::MAXLINE};
use std::thread;

fn read_line(harness: &Harness, unit: usize) -> Vec<u8> {
    let mut buf = [0; MAXLINE];
    let len = harness.io.term_read(unit, &mut buf).unwrap();
    buf[..len].to_vec()
}

fn wait_for_output(harness: &Harness, unit: usize, expected: &[u8]) {
    assert!(
        wait_until(|| harness.machine.transmitted(unit).len() >= expected.len()),
        "term{unit}: expected {:?}, got {:?}",
        String::from_utf8_lossy(expected),
        String::from_utf8_lossy(&harness.machine.transmitted(unit)),
    );
    assert_eq!(
        String::from_utf8_lossy(&harness.machine.transmitted(unit)),
        String::from_utf8_lossy(expected)
    );
}

pub mod input {
    use super::*;

    #[test]
    fn read_line_with_newline() {
        let harness = Harness::boot();
        harness.machine.type_input(0, b"hello\nworld\n");
        assert_eq!(read_line(&harness, 0), b"hello\n");
        assert_eq!(read_line(&harness, 0), b"world\n");
    }

    #[test]
    fn nul_ends_line() {
        let harness = Harness::boot();
        harness.machine.type_input(1, b"hi\0\0there\0");
        assert_eq!(read_line(&harness, 1), b"hi");
        assert_eq!(read_line(&harness, 1), b"there", "Empty lines must not be delivered");
    }

    #[test]
    fn short_buffer_discards_rest() {
        let harness = Harness::boot();
        harness.machine.type_input(0, b"abc\n");
        let mut buf = [0; 3];
        assert_eq!(harness.io.term_read(0, &mut buf), Ok(3));
        assert_eq!(&buf, b"abc");

        harness.machine.type_input(0, b"xy\n");
        assert_eq!(read_line(&harness, 0), b"xy\n", "Leftover of the previous line was read");
    }

    #[test]
    fn long_line_is_split() {
        let harness = Harness::boot();
        let mut input = vec![b'a'; MAXLINE + 5];
        input.push(b'\n');
        harness.machine.type_input(2, &input);
        assert_eq!(read_line(&harness, 2), [b'a'; MAXLINE]);
        assert_eq!(read_line(&harness, 2), b"aaaaa\n");
    }

    #[test]
    fn lines_dropped_when_nobody_reads() {
        let harness = Harness::boot();
        for i in 0..12 {
            harness.machine.type_input(3, format!("L{i:02}\n").as_bytes());
        }
        let term = harness.io.terminal(3).unwrap();
        assert!(
            wait_until(|| term.published() + term.dropped() == 12),
            "Not every line was assembled"
        );
        assert_eq!(term.dropped(), 2);
        for i in 0..10 {
            assert_eq!(read_line(&harness, 3), format!("L{i:02}\n").as_bytes());
        }

        // Room again.
        harness.machine.type_input(3, b"again\n");
        assert_eq!(read_line(&harness, 3), b"again\n");
    }

    #[test]
    fn configured_line_buffers() {
        let harness = Harness::boot_with(Machine::new(), Config::new().line_buffers(1));
        harness.machine.type_input(0, b"one\ntwo\n");
        let term = harness.io.terminal(0).unwrap();
        assert!(wait_until(|| term.published() + term.dropped() == 2));
        assert_eq!(term.dropped(), 1);
        assert_eq!(read_line(&harness, 0), b"one\n");
    }

    #[test]
    fn read_blocks_until_line() {
        let harness = Harness::boot();
        let reader = {
            let io = harness.io.clone();
            thread::spawn(move || {
                let mut buf = [0; MAXLINE];
                let len = io.term_read(1, &mut buf).unwrap();
                buf[..len].to_vec()
            })
        };
        harness.machine.type_input(1, b"par");
        thread::sleep(std::time::Duration::from_millis(20));
        assert!(!reader.is_finished(), "Read returned a partial line");
        harness.machine.type_input(1, b"tial\n");
        assert_eq!(reader.join().unwrap(), b"partial\n");
    }
}

pub mod output {
    use super::*;

    #[test]
    fn write_transmits() {
        let harness = Harness::boot();
        assert_eq!(harness.io.term_write(0, b"hello\n"), Ok(6));
        wait_for_output(&harness, 0, b"hello\n");
    }

    #[test]
    fn write_stops_after_newline() {
        let harness = Harness::boot();
        assert_eq!(harness.io.term_write(1, b"ab\ncd"), Ok(5));
        wait_for_output(&harness, 1, b"ab\n");
        assert_eq!(harness.io.term_write(1, b"x\0yz"), Ok(4));
        wait_for_output(&harness, 1, b"ab\nx\0");
        assert_eq!(harness.io.term_write(1, b"end"), Ok(3));
        wait_for_output(&harness, 1, b"ab\nx\0end");
    }

    #[test]
    fn writers_do_not_interleave() {
        const WRITERS: usize = 4;
        const LINES: usize = 5;
        let harness = Harness::boot();
        let writers: Vec<_> = (0..WRITERS)
            .map(|w| {
                let io = harness.io.clone();
                thread::spawn(move || {
                    for l in 0..LINES {
                        let line = format!("writer {w} line {l}\n");
                        assert_eq!(io.term_write(2, line.as_bytes()), Ok(line.len()));
                    }
                })
            })
            .collect();
        for writer in writers {
            writer.join().unwrap();
        }
        assert!(
            wait_until(|| harness
                .machine
                .transmitted(2)
                .iter()
                .filter(|&&ch| ch == b'\n')
                .count()
                == WRITERS * LINES),
            "Not every line was transmitted"
        );

        let output = String::from_utf8(harness.machine.transmitted(2)).unwrap();
        let mut next = [0; WRITERS];
        for line in output.lines() {
            let words: Vec<_> = line.split(' ').collect();
            assert!(
                matches!(words.as_slice(), ["writer", _, "line", _]),
                "Garbled line {line:?}"
            );
            let w: usize = words[1].parse().unwrap();
            let l: usize = words[3].parse().unwrap();
            assert_eq!(l, next[w], "Lines of writer {w} out of order");
            next[w] += 1;
        }
        assert_eq!(next, [LINES; WRITERS]);
    }

    #[test]
    fn input_during_output() {
        let harness = Harness::boot();
        let line = [b'z'; MAXLINE];
        assert_eq!(harness.io.term_write(3, &line), Ok(MAXLINE));
        harness.machine.type_input(3, b"typed\n");
        assert_eq!(read_line(&harness, 3), b"typed\n");
        wait_for_output(&harness, 3, &line);
    }

    #[test]
    fn units_are_independent() {
        let harness = Harness::boot();
        for unit in 0..TERM_UNITS {
            let text = format!("unit {unit}\n");
            assert_eq!(harness.io.term_write(unit, text.as_bytes()), Ok(text.len()));
        }
        for unit in 0..TERM_UNITS {
            wait_for_output(&harness, unit, format!("unit {unit}\n").as_bytes());
        }
    }
}

pub mod arguments {
    use super::*;

    #[test]
    fn invalid_sizes() {
        let harness = Harness::boot();
        let mut empty = [0; 0];
        let mut long = [0; MAXLINE + 1];
        assert_eq!(harness.io.term_read(0, &mut empty), Err(KernelError::InvalidArgument));
        assert_eq!(harness.io.term_read(0, &mut long), Err(KernelError::InvalidArgument));
        assert_eq!(
            harness.io.term_write(0, &[b'a'; MAXLINE + 1]),
            Err(KernelError::InvalidArgument)
        );
        assert_eq!(harness.io.term_write(0, b""), Ok(0));
        thread::sleep(std::time::Duration::from_millis(10));
        assert!(harness.machine.transmitted(0).is_empty());
    }

    #[test]
    fn invalid_unit() {
        let harness = Harness::boot();
        let mut buf = [0; 8];
        assert_eq!(
            harness.io.term_read(TERM_UNITS, &mut buf),
            Err(KernelError::InvalidArgument)
        );
        assert_eq!(
            harness.io.term_write(TERM_UNITS, b"x\n"),
            Err(KernelError::InvalidArgument)
        );
    }
}
