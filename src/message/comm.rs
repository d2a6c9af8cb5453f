/// Interface for a group of ranks that can exchange messages. The
/// underlying transport can be TCP between hosts, in-process channels, or
/// in principle a higher level abstraction like MPI.
///
/// Any transport failure is fatal: implementations panic with the rank in
/// the message rather than surface an error, since a tile that has lost
/// its peers cannot make progress.
pub trait Communicator {
    /// Must be implemented to return the rank of this process within the
    /// communicator.
    fn rank(&self) -> usize;

    /// Must be implemented to return the number of peer ranks in this
    /// communicator.
    fn size(&self) -> usize;

    /// Must be implemented to send a message to a peer. This method must
    /// return immediately; it is not allowed to block until a matching
    /// receive is posted. The transport buffers in-flight frames, which is
    /// what lets the exchange protocol treat every receive as preposted.
    fn send(&self, rank: usize, message: Vec<u8>);

    /// Must be implemented to receive a message from any peer, blocking
    /// until one is available.
    fn recv(&self) -> Vec<u8>;

    /// Requeue a received message which is not yet needed; it must be
    /// yielded again by a later `recv`.
    fn requeue_recv(&self, bytes: Vec<u8>);
}

/// Compute the log-base-two of the next power of two: 8 -> 3, 9 -> 4.
/// Gives the number of rounds in the binomial reduction trees.
pub fn ceil_log2(x: usize) -> usize {
    let mut n = 0;
    while 1 << n < x {
        n += 1
    }
    n
}

#[cfg(test)]
mod test {
    use super::ceil_log2;

    #[test]
    fn ceil_log2_rounds_up() {
        assert_eq!(ceil_log2(1), 0);
        assert_eq!(ceil_log2(2), 1);
        assert_eq!(ceil_log2(3), 2);
        assert_eq!(ceil_log2(4), 2);
        assert_eq!(ceil_log2(9), 4);
    }
}
