use std::{
    fmt, fs,
    io::{self, BufRead, BufReader},
    mem,
    path::PathBuf,
    thread::{self, JoinHandle},
};

use crossbeam::channel::{Receiver, Sender};
use thiserror::Error;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Op {
    Instr,
    Load,
    Store,
    Modify,
}

impl Op {
    /// `access` calls a record of this op maps to. Instruction fetches are
    /// filtered out entirely; a modify is a load followed by a store.
    pub fn accesses(self) -> usize {
        match self {
            Op::Instr => 0,
            Op::Load | Op::Store => 1,
            Op::Modify => 2,
        }
    }
}

impl fmt::Display for Op {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let c = match self {
            Op::Instr => 'I',
            Op::Load => 'L',
            Op::Store => 'S',
            Op::Modify => 'M',
        };
        write!(f, "{}", c)
    }
}

/// One valgrind trace record: ` <op> <hex-address>,<size>`. The size is
/// carried for verbose echoing but never consulted by the cache.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Record {
    pub op: Op,
    pub addr: u64,
    pub size: u32,
}

#[derive(Debug, Error)]
pub enum TraceError {
    #[error("could not read trace: {0}")]
    Io(#[from] io::Error),
    #[error("malformed trace record at line {line}: {text:?}")]
    Parse { line: usize, text: String },
}

pub fn parse_record(line: &str) -> Option<Record> {
    let mut parts = line.trim_start().splitn(2, ' ');
    let op = match parts.next()? {
        "I" => Op::Instr,
        "L" => Op::Load,
        "S" => Op::Store,
        "M" => Op::Modify,
        _ => return None,
    };
    let (addr_str, size_str) = parts.next()?.trim().split_once(',')?;
    let addr = u64::from_str_radix(addr_str, 16).ok()?;
    let size = size_str.trim().parse().ok()?;
    Some(Record { op, addr, size })
}

/// Streams a trace file off a reader thread in blocks of records, in file
/// order, over a bounded queue.
pub struct Trace {
    pub rec: Receiver<Result<Vec<Record>, TraceError>>,
    _thread: JoinHandle<()>,
}

impl Trace {
    pub fn read(
        path: PathBuf,
        records_per_block: usize,
        blocks_per_queue: usize,
    ) -> io::Result<Trace> {
        let stream = fs::File::open(path)?;
        let (sender, receiver) = crossbeam::channel::bounded(blocks_per_queue);

        let t = thread::spawn(move || Trace::run_thread(stream, records_per_block, sender));

        Ok(Trace {
            rec: receiver,
            _thread: t,
        })
    }

    fn run_thread(
        stream: fs::File,
        records_per_block: usize,
        queue: Sender<Result<Vec<Record>, TraceError>>,
    ) {
        let reader = BufReader::new(stream);
        let mut block = Vec::with_capacity(records_per_block);
        for (idx, line) in reader.lines().enumerate() {
            let line = match line {
                Ok(line) => line,
                Err(err) => {
                    let _ = queue.send(Err(err.into()));
                    return;
                }
            };
            if line.trim().is_empty() {
                continue;
            }
            let Some(record) = parse_record(&line) else {
                let _ = queue.send(Err(TraceError::Parse {
                    line: idx + 1,
                    text: line,
                }));
                return;
            };
            block.push(record);
            if block.len() == records_per_block {
                let full = mem::replace(&mut block, Vec::with_capacity(records_per_block));
                if queue.send(Ok(full)).is_err() {
                    return;
                }
            }
        }
        if !block.is_empty() {
            let _ = queue.send(Ok(block));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn parses_all_ops() {
        assert_eq!(
            parse_record("I  400d7d,8"),
            Some(Record {
                op: Op::Instr,
                addr: 0x400d7d,
                size: 8,
            })
        );
        assert_eq!(
            parse_record(" L 10,1"),
            Some(Record {
                op: Op::Load,
                addr: 0x10,
                size: 1,
            })
        );
        assert_eq!(
            parse_record(" S 7ff0005c8,4"),
            Some(Record {
                op: Op::Store,
                addr: 0x7ff0005c8,
                size: 4,
            })
        );
        assert_eq!(
            parse_record(" M 20,1"),
            Some(Record {
                op: Op::Modify,
                addr: 0x20,
                size: 1,
            })
        );
    }

    #[test]
    fn rejects_garbage() {
        assert_eq!(parse_record("X 10,1"), None);
        assert_eq!(parse_record(" L 10"), None);
        assert_eq!(parse_record(" L zz,1"), None);
        assert_eq!(parse_record(" L 10,one"), None);
        assert_eq!(parse_record("L"), None);
    }

    #[test]
    fn op_access_counts() {
        assert_eq!(Op::Instr.accesses(), 0);
        assert_eq!(Op::Load.accesses(), 1);
        assert_eq!(Op::Store.accesses(), 1);
        assert_eq!(Op::Modify.accesses(), 2);
    }

    #[test]
    fn streams_records_in_file_order() {
        let file = tempfile_with(" L 10,1\n M 20,1\n\n S 22,1\n");
        let trace = Trace::read(file.path.clone(), 2, 4).unwrap();
        let mut records = Vec::new();
        for block in trace.rec.iter() {
            records.extend(block.unwrap());
        }
        assert_eq!(
            records.iter().map(|r| r.op).collect::<Vec<_>>(),
            vec![Op::Load, Op::Modify, Op::Store]
        );
        assert_eq!(records[1].addr, 0x20);
    }

    #[test]
    fn surfaces_parse_errors_with_line_numbers() {
        let file = tempfile_with(" L 10,1\nbogus line\n");
        let trace = Trace::read(file.path.clone(), 1, 4).unwrap();
        let mut results: Vec<_> = trace.rec.iter().collect();
        let last = results.pop().unwrap();
        match last {
            Err(TraceError::Parse { line, .. }) => assert_eq!(line, 2),
            other => panic!("expected parse error, got {:?}", other.map(|b| b.len())),
        }
    }

    struct TempTrace {
        path: PathBuf,
    }

    impl Drop for TempTrace {
        fn drop(&mut self) {
            let _ = fs::remove_file(&self.path);
        }
    }

    fn tempfile_with(contents: &str) -> TempTrace {
        use std::sync::atomic::{AtomicUsize, Ordering};
        static NEXT: AtomicUsize = AtomicUsize::new(0);
        let n = NEXT.fetch_add(1, Ordering::Relaxed);
        let path = std::env::temp_dir().join(format!("csim-trace-{}-{}", std::process::id(), n));
        let mut f = fs::File::create(&path).unwrap();
        f.write_all(contents.as_bytes()).unwrap();
        TempTrace { path }
    }
}
