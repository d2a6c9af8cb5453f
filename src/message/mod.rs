//! This module exports the minimal message-passing API the boundary
//! exchange and the time-step reduction ride on, encapsulated by a
//! [`comm::Communicator`] trait. Implementors only need `send` and `recv`
//! over a given transport (a pure-Rust TCP transport and an in-process
//! channel transport are included). Frames are tagged envelopes so that a
//! receiver can defer messages belonging to a later protocol phase.

use serde::{Deserialize, Serialize};

use self::comm::Communicator;

pub mod comm;
pub mod mem;
pub mod tcp;

/// Well-known tag for the boundary-cell exchange.
pub const BOUNDARY_CELLS_TAG: u32 = 1;

/// Well-known tag for the global time-step reduction.
pub const DT_REDUCE_TAG: u32 = 2;

/// One framed message. `sequence` counts the protocol round (exchange or
/// reduction number) so that frames from a rank running ahead are kept
/// until the receiver catches up.
#[derive(Serialize, Deserialize)]
pub struct Envelope {
    pub tag: u32,
    pub sequence: u64,
    pub data: Vec<u8>,
}

impl Envelope {
    pub fn new(tag: u32, sequence: u64, data: Vec<u8>) -> Self {
        Self {
            tag,
            sequence,
            data,
        }
    }

    pub fn to_bytes(&self) -> Vec<u8> {
        rmp_serde::encode::to_vec(self).unwrap()
    }

    pub fn from_bytes(bytes: &[u8]) -> Self {
        rmp_serde::decode::from_slice(bytes).unwrap()
    }
}

/// Receive the next envelope matching `tag` and `sequence`. Frames that
/// belong to another phase are requeued; they will be picked up when their
/// phase runs. A transport failure is fatal inside the communicator.
pub fn recv_matching<C: Communicator + ?Sized>(comm: &C, tag: u32, sequence: u64) -> Envelope {
    let mut deferred = 0_usize;
    loop {
        let bytes = comm.recv();
        let envelope = Envelope::from_bytes(&bytes);
        if envelope.tag == tag && envelope.sequence == sequence {
            return envelope;
        }
        log::debug!(
            "rank {}: deferring frame (tag {} sequence {}) while waiting on (tag {} sequence {})",
            comm.rank(),
            envelope.tag,
            envelope.sequence,
            tag,
            sequence
        );
        comm.requeue_recv(bytes);
        deferred += 1;
        if deferred % 16 == 0 {
            std::thread::sleep(std::time::Duration::from_micros(100));
        }
    }
}
