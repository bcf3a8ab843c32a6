use parking_lot::Mutex;

#[derive(Debug, Default)]
struct Counters {
    per_worker: Vec<u64>,
    overall: u64,
    resumed: u64,
}

/// Byte counters shared by the segment workers and the speed reporter.
///
/// Each worker only writes its own slot; every access goes through the one
/// lock, so a reader always sees slots and tally from the same instant.
#[derive(Debug)]
pub struct Progress {
    total: u64,
    counters: Mutex<Counters>,
}

impl Progress {
    pub fn new(workers: usize, total: u64) -> Self {
        Self {
            total,
            counters: Mutex::new(Counters {
                per_worker: vec![0; workers],
                overall: 0,
                resumed: 0,
            }),
        }
    }

    /// Records bytes recovered from an existing part file. They count
    /// towards completion but not towards [`Progress::fetched`].
    pub fn seed(&self, worker: usize, bytes: u64) {
        let mut counters = self.counters.lock();
        if let Some(slot) = counters.per_worker.get_mut(worker) {
            *slot += bytes;
            counters.overall += bytes;
            counters.resumed += bytes;
        }
    }

    pub fn add(&self, worker: usize, bytes: u64) {
        let mut counters = self.counters.lock();
        if let Some(slot) = counters.per_worker.get_mut(worker) {
            *slot += bytes;
            counters.overall += bytes;
        }
    }

    pub fn downloaded(&self) -> u64 {
        self.counters.lock().overall
    }

    pub fn slot(&self, worker: usize) -> u64 {
        self.counters.lock().per_worker.get(worker).copied().unwrap_or(0)
    }

    /// Bytes received over the network, excluding seeded ones.
    pub fn fetched(&self) -> u64 {
        let counters = self.counters.lock();
        counters.overall - counters.resumed
    }

    pub fn is_complete(&self) -> bool {
        self.downloaded() >= self.total
    }
}
