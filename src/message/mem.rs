use crossbeam_channel::{Receiver, Sender};

use super::comm::Communicator;

/// An in-process communicator: every rank owns a receiving channel, and
/// all ranks hold senders to all receiving channels. Used by the tests to
/// run multi-rank exchange scenarios inside one process, and by serial
/// runs as a group of one.
pub struct MemCommunicator {
    rank: usize,
    peers: Vec<Sender<Vec<u8>>>,
    recv_sink: Sender<Vec<u8>>,
    recv_src: Receiver<Vec<u8>>,
}

impl MemCommunicator {
    /// Create a fully-connected group of `size` ranks.
    pub fn group(size: usize) -> Vec<Self> {
        let channels: Vec<_> = (0..size).map(|_| crossbeam_channel::unbounded()).collect();
        let peers: Vec<_> = channels.iter().map(|(s, _)| s.clone()).collect();

        channels
            .into_iter()
            .enumerate()
            .map(|(rank, (recv_sink, recv_src))| Self {
                rank,
                peers: peers.clone(),
                recv_sink,
                recv_src,
            })
            .collect()
    }

    /// A group of one, for serial runs. Its `recv` would block forever,
    /// but a tile with no remote neighbors never calls it.
    pub fn solo() -> Self {
        Self::group(1).pop().unwrap()
    }
}

impl Communicator for MemCommunicator {
    fn rank(&self) -> usize {
        self.rank
    }

    fn size(&self) -> usize {
        self.peers.len()
    }

    fn send(&self, rank: usize, message: Vec<u8>) {
        if let Err(e) = self.peers[rank].send(message) {
            panic!("rank {}: send to rank {} failed: {}", self.rank, rank, e);
        }
    }

    fn recv(&self) -> Vec<u8> {
        match self.recv_src.recv() {
            Ok(bytes) => bytes,
            Err(e) => panic!("rank {}: receive failed: {}", self.rank, e),
        }
    }

    fn requeue_recv(&self, bytes: Vec<u8>) {
        if let Err(e) = self.recv_sink.send(bytes) {
            panic!("rank {}: requeue failed: {}", self.rank, e);
        }
    }
}
