use super::util;

/// Message tag for the collective operations provided by `Communicator`.
pub const TAG_COLLECTIVE: u8 = 0;

/// Message tag for ghost-cell exchange traffic.
pub const TAG_EXCHANGE: u8 = 1;

/// Message tag for the extra volumes of multi-valued ghost cells.
pub const TAG_EXCHANGE_MULTI: u8 = 2;

/// Interface for a group of processes that can exchange messages. The
/// underlying transport can be in-process channels, TCP, or a higher level
/// abstraction like MPI. Implementors write `send`, `recv` and
/// `requeue_recv`; the tagged receive and the collectives are provided.
///
pub trait Communicator: Send + Sync {
    /// Must be implemented to return the rank of this process within the
    /// communicator.
    fn rank(&self) -> usize;

    /// Must be implemented to return the number of peer processes in this
    /// communicator.
    fn size(&self) -> usize;

    /// Must be implemented to send a message to a peer. This method must
    /// return immediately, in other words it is not allowed to block until a
    /// matching receive is posted.
    fn send(&self, rank: usize, message: Vec<u8>);

    /// Must be implemented to receive a message from any of the peers. This
    /// method is allowed to block until a message is ready to be received.
    fn recv(&self) -> Vec<u8>;

    /// Must be implemented to put received messages which are not yet needed
    /// back at the front of the queue, preserving their order.
    fn requeue_recv(&self, messages: Vec<Vec<u8>>);

    /// Send a message prefixed with a one-byte tag.
    ///
    fn send_tagged(&self, rank: usize, tag: u8, mut message: Vec<u8>) {
        message.insert(0, tag);
        self.send(rank, message)
    }

    /// Receive the next message carrying the given tag, with the tag
    /// stripped. Messages with other tags are requeued in arrival order.
    ///
    fn recv_tagged(&self, tag: u8) -> Vec<u8> {
        let mut skipped = Vec::new();

        loop {
            let mut message = self.recv();

            if message.first() == Some(&tag) {
                if !skipped.is_empty() {
                    self.requeue_recv(skipped);
                }
                message.remove(0);
                return message;
            }
            skipped.push(message);
        }
    }

    /// Implements a binomial tree broadcast from rank 0. The message buffer
    /// must be `Some` on the root, and `None` otherwise.
    ///
    fn broadcast(&self, value: Option<Vec<u8>>) -> Vec<u8> {
        let r = self.rank();
        let p = self.size();

        let value = match value {
            Some(value) => value,
            None => self.recv_tagged(TAG_COLLECTIVE),
        };
        for level in (0..util::ceil_log2(p)).rev() {
            let one = 1 << level;
            let two = 1 << (level + 1);

            if r % two == 0 && r + one < p {
                self.send_tagged(r + one, TAG_COLLECTIVE, value.clone())
            }
        }
        value
    }

    /// Implements a binomial tree reduce to rank 0. All ranks return `None`
    /// except for the root. The binary operator must be commutative and
    /// associative, because the order of arrival is not fixed.
    ///
    fn reduce(&self, f: &dyn Fn(Vec<u8>, Vec<u8>) -> Vec<u8>, mut value: Vec<u8>) -> Option<Vec<u8>> {
        let r = self.rank();
        let p = self.size();

        for level in 0..util::ceil_log2(p) {
            let one = 1 << level;
            let two = 1 << (level + 1);

            if r % two == 0 {
                if r + one < p {
                    value = f(value, self.recv_tagged(TAG_COLLECTIVE))
                }
            } else {
                self.send_tagged(r - one, TAG_COLLECTIVE, value);
                return None;
            }
        }
        Some(value)
    }

    /// Implements an all-reduce (symmetric fold) operation over a commutative
    /// binary operator.
    ///
    fn all_reduce(&self, f: &dyn Fn(Vec<u8>, Vec<u8>) -> Vec<u8>, value: Vec<u8>) -> Vec<u8> {
        self.broadcast(self.reduce(f, value))
    }
}




/// The communicator for a single process. Collectives return their argument.
///
#[derive(Clone, Copy, Debug, Default)]
pub struct SerialCommunicator;

impl Communicator for SerialCommunicator {
    fn rank(&self) -> usize {
        0
    }

    fn size(&self) -> usize {
        1
    }

    fn send(&self, rank: usize, _message: Vec<u8>) {
        panic!("SerialCommunicator::send - no peer with rank {}", rank)
    }

    fn recv(&self) -> Vec<u8> {
        panic!("SerialCommunicator::recv - no peers to receive from")
    }

    fn requeue_recv(&self, _messages: Vec<Vec<u8>>) {
        panic!("SerialCommunicator::requeue_recv - no peers to receive from")
    }
}
