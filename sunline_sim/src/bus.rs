// sunline_sim/src/bus.rs

//! In-memory message topics standing in for the flight software bus.

use sunline_core::fsw::{Publisher, Stamped, Subscriber};

/// A single-writer topic that keeps its latest payload and every write time.
#[derive(Debug, Clone)]
pub struct Topic<T> {
    latest: Option<(u64, T)>,
    write_times: Vec<u64>,
}

impl<T> Default for Topic<T> {
    fn default() -> Self {
        Self {
            latest: None,
            write_times: Vec::new(),
        }
    }
}

impl<T> Topic<T> {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn latest(&self) -> Option<&T> {
        self.latest.as_ref().map(|(_, payload)| payload)
    }

    pub fn write_count(&self) -> usize {
        self.write_times.len()
    }

    pub fn write_times(&self) -> &[u64] {
        &self.write_times
    }
}

impl<T: Clone + Default> Subscriber<T> for Topic<T> {
    fn read(&self) -> Stamped<T> {
        match &self.latest {
            Some((time_written_ns, payload)) => Stamped {
                time_written_ns: *time_written_ns,
                size: core::mem::size_of::<T>(),
                payload: payload.clone(),
            },
            None => Stamped {
                time_written_ns: 0,
                size: 0,
                payload: T::default(),
            },
        }
    }
}

impl<T: Clone> Publisher<T> for Topic<T> {
    fn write(&mut self, call_time_ns: u64, payload: &T) {
        self.latest = Some((call_time_ns, payload.clone()));
        self.write_times.push(call_time_ns);
    }
}
