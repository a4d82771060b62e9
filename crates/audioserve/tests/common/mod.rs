//! Shared fixtures for end-to-end server tests

#![allow(dead_code)]

use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};

use audioserve::timing::Clock;
use audioserve::{AudioBuffers, AudioClient, AudioConfiguration, ClientError, Nanos};

pub fn init_logging() {
    let _ = env_logger::builder().is_test(true).try_init();
}

/// Simulated clock that only advances while the server waits
#[derive(Debug, Clone, Default)]
pub struct SimClock {
    now: Arc<AtomicI64>,
}

/// Simulated cost of one `yield_now`
pub const YIELD_NANOS: Nanos = 10_000;

impl SimClock {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn advance(&self, nanos: Nanos) {
        self.now.fetch_add(nanos, Ordering::SeqCst);
    }
}

impl Clock for SimClock {
    fn now(&self) -> Nanos {
        self.now.load(Ordering::SeqCst)
    }

    fn park(&self, nanos: Nanos) {
        self.advance(nanos);
    }

    fn yield_now(&self) {
        self.advance(YIELD_NANOS);
    }
}

/// One `process` call as seen by the client
#[derive(Debug, Clone)]
pub struct Cycle {
    pub time: Nanos,
    pub nframes: usize,
    pub input_lengths: Vec<usize>,
    pub output_lengths: Vec<usize>,
    /// First sample of every input channel
    pub first_inputs: Vec<f32>,
    /// Whether every input sample was zero
    pub inputs_silent: bool,
    /// Clock reading during the call, when a clock was attached
    pub clock_now: Option<Nanos>,
}

#[derive(Debug, Default)]
pub struct Record {
    pub configured: Vec<AudioConfiguration>,
    pub cycles: Vec<Cycle>,
    pub shutdowns: usize,
    /// Calls in order: "configure", "process", "shutdown"
    pub calls: Vec<&'static str>,
}

/// What the recording client does on each call
#[derive(Clone, Copy, Debug)]
pub enum Behaviour {
    /// Keep going until this many process calls were made, then disconnect
    StopAfter(usize),
    /// Reject the configuration
    Reject,
    /// Panic on the given (1-based) process call
    PanicOn(usize),
    /// Never disconnect
    Forever,
}

/// Client recording every call into a shared [`Record`]
pub struct RecordingClient {
    record: Arc<Mutex<Record>>,
    behaviour: Behaviour,
    clock: Option<SimClock>,
    /// Value written to every output sample
    pub output_value: f32,
    calls: usize,
}

impl RecordingClient {
    pub fn new(behaviour: Behaviour) -> (Self, Arc<Mutex<Record>>) {
        let record = Arc::new(Mutex::new(Record::default()));
        let client = Self {
            record: Arc::clone(&record),
            behaviour,
            clock: None,
            output_value: 0.25,
            calls: 0,
        };
        (client, record)
    }

    pub fn with_clock(mut self, clock: SimClock) -> Self {
        self.clock = Some(clock);
        self
    }

    fn record(&self) -> MutexGuard<'_, Record> {
        self.record.lock().unwrap_or_else(|e| e.into_inner())
    }
}

impl AudioClient for RecordingClient {
    fn configure(&mut self, config: &AudioConfiguration) -> Result<(), ClientError> {
        let mut record = self.record();
        record.calls.push("configure");
        record.configured.push(config.clone());
        match self.behaviour {
            Behaviour::Reject => Err(ClientError::new("unsupported sample rate")),
            _ => Ok(()),
        }
    }

    fn process(
        &mut self,
        time: Nanos,
        inputs: &AudioBuffers,
        outputs: &mut AudioBuffers,
        nframes: usize,
    ) -> bool {
        self.calls += 1;
        if let Behaviour::PanicOn(n) = self.behaviour {
            if self.calls == n {
                panic!("client failure on call {}", n);
            }
        }

        for channel in outputs.iter_mut() {
            channel.fill(self.output_value);
        }

        let cycle = Cycle {
            time,
            nframes,
            input_lengths: inputs.iter().map(|c| c.len()).collect(),
            output_lengths: outputs.iter().map(|c| c.len()).collect(),
            first_inputs: inputs.iter().map(|c| c.first().copied().unwrap_or(0.0)).collect(),
            inputs_silent: inputs.iter().all(|c| c.iter().all(|&s| s == 0.0)),
            clock_now: self.clock.as_ref().map(|c| c.now()),
        };
        let mut record = self.record();
        record.calls.push("process");
        record.cycles.push(cycle);

        match self.behaviour {
            Behaviour::StopAfter(n) => self.calls < n,
            _ => true,
        }
    }

    fn shutdown(&mut self) {
        let mut record = self.record();
        record.calls.push("shutdown");
        record.shutdowns += 1;
    }
}

pub fn lock(record: &Arc<Mutex<Record>>) -> MutexGuard<'_, Record> {
    record.lock().unwrap_or_else(|e| e.into_inner())
}
