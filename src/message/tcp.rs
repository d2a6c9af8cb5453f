use log::{error, info};

use super::comm::Communicator;
use std::io::prelude::*;
use std::net::{SocketAddr, TcpListener, TcpStream};
use std::thread;

/// The per-host side of the TCP transport: a listener thread accepting
/// frames from peers into a channel, and a sender thread draining outbound
/// frames to peer sockets. Each rank of a decomposed run owns one host.
pub struct TcpHost {
    listen_thread: Option<thread::JoinHandle<()>>,
    send_thread: Option<thread::JoinHandle<()>>,
}

impl TcpHost {
    /// Start the transport threads for `rank` and return the host along
    /// with the channel endpoints a [`TcpCommunicator`] is built from.
    pub fn new(rank: usize, peers: Vec<SocketAddr>) -> (Self, TcpCommunicator) {
        let (send_sink, send_src) = crossbeam_channel::unbounded();
        let send_thread = Self::start_sender(rank, peers.clone(), send_src);

        let (recv_sink, recv_src) = crossbeam_channel::unbounded();
        let listen_thread = Self::start_listener(peers[rank], recv_sink.clone());

        let host = TcpHost {
            send_thread: Some(send_thread),
            listen_thread: Some(listen_thread),
        };
        let comm = TcpCommunicator {
            rank,
            num_peers: peers.len(),
            send_sink: Some(send_sink),
            recv_sink: Some(recv_sink),
            recv_src: Some(recv_src),
        };
        (host, comm)
    }

    pub fn join(&mut self) {
        if let Some(send_thread) = self.send_thread.take() {
            send_thread.join().unwrap()
        }
        self.listen_thread.take();
    }

    fn start_sender(
        rank: usize,
        peers: Vec<SocketAddr>,
        send_src: crossbeam_channel::Receiver<(usize, Vec<u8>)>,
    ) -> thread::JoinHandle<()> {
        thread::spawn(move || {
            for (peer, message) in send_src {
                let mut sleep_ms = 250;
                loop {
                    match TcpStream::connect(peers[peer]) {
                        Ok(mut stream) => {
                            stream.write_all(&message.len().to_le_bytes()).unwrap();
                            stream.write_all(&message).unwrap();
                            break;
                        }
                        Err(e) => {
                            error!("rank {}: send to rank {} failed: {}", rank, peer, e);
                            info!("rank {}: retrying in {}ms", rank, sleep_ms);
                            thread::sleep(std::time::Duration::from_millis(sleep_ms));
                            sleep_ms = (2 * sleep_ms).min(5000);
                        }
                    }
                }
            }
        })
    }

    fn start_listener(
        addr: SocketAddr,
        recv_sink: crossbeam_channel::Sender<Vec<u8>>,
    ) -> thread::JoinHandle<()> {
        thread::spawn(move || {
            info!("listening on {}", addr);
            let listener = TcpListener::bind(addr).unwrap();
            loop {
                let (mut stream, _) = listener.accept().unwrap();
                if !Self::handle_connection(&mut stream, &recv_sink) {
                    break;
                }
            }
        })
    }

    /// Drain length-prefixed frames from one connection. Returns false
    /// when the local receive channel has closed and the listener should
    /// shut down.
    fn handle_connection(
        stream: &mut TcpStream,
        recv_sink: &crossbeam_channel::Sender<Vec<u8>>,
    ) -> bool {
        loop {
            let size = match read_frame_size(stream) {
                Some(size) => size,
                None => return true,
            };
            let mut bytes = vec![0; size];
            read_exact_bytes(stream, &mut bytes);
            if recv_sink.send(bytes).is_err() {
                return false;
            }
        }
    }
}

/// Read a frame-length prefix; `None` when the peer closed the connection
/// cleanly at a frame boundary.
fn read_frame_size<R: Read>(stream: &mut R) -> Option<usize> {
    let mut buffer = [0; std::mem::size_of::<usize>()];
    let first = stream.read(&mut buffer).unwrap();
    if first == 0 {
        return None;
    }
    let mut cursor = first;
    while cursor < buffer.len() {
        cursor += stream.read(&mut buffer[cursor..]).unwrap();
    }
    Some(usize::from_le_bytes(buffer))
}

fn read_exact_bytes<R: Read>(stream: &mut R, buffer: &mut [u8]) {
    let mut cursor = 0;
    while cursor < buffer.len() {
        cursor += stream.read(&mut buffer[cursor..]).unwrap();
    }
}

/// The [`Communicator`] over the TCP transport. Sends enqueue onto the
/// host's sender thread and return immediately; receives block on the
/// listener channel.
pub struct TcpCommunicator {
    rank: usize,
    num_peers: usize,
    send_sink: Option<crossbeam_channel::Sender<(usize, Vec<u8>)>>,
    recv_sink: Option<crossbeam_channel::Sender<Vec<u8>>>,
    recv_src: Option<crossbeam_channel::Receiver<Vec<u8>>>,
}

impl Communicator for TcpCommunicator {
    fn rank(&self) -> usize {
        self.rank
    }

    fn size(&self) -> usize {
        self.num_peers
    }

    fn send(&self, rank: usize, message: Vec<u8>) {
        if let Err(e) = self.send_sink.as_ref().unwrap().send((rank, message)) {
            panic!("rank {}: send to rank {} failed: {}", self.rank, rank, e);
        }
    }

    fn recv(&self) -> Vec<u8> {
        match self.recv_src.as_ref().unwrap().recv() {
            Ok(bytes) => bytes,
            Err(e) => panic!("rank {}: receive failed: {}", self.rank, e),
        }
    }

    fn requeue_recv(&self, bytes: Vec<u8>) {
        if let Err(e) = self.recv_sink.as_ref().unwrap().send(bytes) {
            panic!("rank {}: requeue failed: {}", self.rank, e);
        }
    }
}

impl Drop for TcpCommunicator {
    fn drop(&mut self) {
        // closing the channels lets the host threads wind down
        self.send_sink.take();
        self.recv_src.take();
    }
}
