use std::collections::VecDeque;

use crate::driver::Delay;
use crate::transport::{RawWords, Transport, TransportError};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Call {
    Read { address: u16, count: u16 },
    WriteOne { address: u16, value: u16 },
    WriteMany { address: u16, values: Vec<u16> },
}

#[derive(Debug)]
enum Step {
    Reply(Vec<u16>),
    Ack,
    Fail,
}

/// Answers each exchange from a script and records every call. An exhausted
/// script behaves like a silent slave.
#[derive(Debug, Default)]
pub struct ScriptedTransport {
    steps: VecDeque<Step>,
    pub calls: Vec<Call>,
}

impl ScriptedTransport {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn reply(mut self, words: &[u16]) -> Self {
        self.steps.push_back(Step::Reply(words.to_vec()));
        self
    }

    pub fn ack(mut self) -> Self {
        self.steps.push_back(Step::Ack);
        self
    }

    pub fn fail_next(mut self) -> Self {
        self.steps.push_back(Step::Fail);
        self
    }

    pub fn writes(&self) -> usize {
        self.calls
            .iter()
            .filter(|call| !matches!(call, Call::Read { .. }))
            .count()
    }

    fn next_step(&mut self) -> Result<Step, TransportError> {
        match self.steps.pop_front() {
            Some(Step::Fail) | None => Err(TransportError::Timeout),
            Some(step) => Ok(step),
        }
    }

    fn acknowledge(&mut self) -> Result<(), TransportError> {
        match self.next_step()? {
            Step::Ack => Ok(()),
            other => Err(TransportError::Malformed(format!(
                "script expected ack, found {other:?}"
            ))),
        }
    }
}

impl Transport for ScriptedTransport {
    fn read(&mut self, address: u16, count: u16) -> Result<RawWords, TransportError> {
        self.calls.push(Call::Read { address, count });
        match self.next_step()? {
            Step::Reply(words) => {
                RawWords::from_slice(&words).map_err(|()| TransportError::Capacity)
            }
            other => Err(TransportError::Malformed(format!(
                "script expected reply, found {other:?}"
            ))),
        }
    }

    fn write_one(&mut self, address: u16, value: u16) -> Result<(), TransportError> {
        self.calls.push(Call::WriteOne { address, value });
        self.acknowledge()
    }

    fn write_many(&mut self, address: u16, values: &[u16]) -> Result<(), TransportError> {
        self.calls.push(Call::WriteMany {
            address,
            values: values.to_vec(),
        });
        self.acknowledge()
    }
}

/// Records requested pauses instead of sleeping.
#[derive(Debug, Default)]
pub struct RecordingDelay {
    pub delays: Vec<u32>,
}

impl Delay for RecordingDelay {
    fn delay_ms(&mut self, ms: u32) {
        self.delays.push(ms);
    }
}
