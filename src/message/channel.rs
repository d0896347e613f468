use std::collections::VecDeque;
use std::sync::Mutex;
use crossbeam_channel::{Receiver, Sender};
use super::comm::Communicator;




/// A group of in-process ranks connected by unbounded channels. Each member
/// is moved onto its own thread; this is how collective operations and halo
/// exchanges are exercised without an external transport.
///
pub struct ChannelCommunicator {
    rank: usize,
    peers: Vec<Sender<Vec<u8>>>,
    inbox: Receiver<Vec<u8>>,
    pending: Mutex<VecDeque<Vec<u8>>>,
}




// ============================================================================
impl ChannelCommunicator {

    /// Create a fully connected group of `size` communicators. Element `r`
    /// of the returned vector has rank `r`.
    ///
    pub fn group(size: usize) -> Vec<Self> {
        assert!(size > 0, "ChannelCommunicator::group - group must not be empty");

        let (sinks, sources): (Vec<_>, Vec<_>) = (0..size)
            .map(|_| crossbeam_channel::unbounded())
            .unzip();

        sources
            .into_iter()
            .enumerate()
            .map(|(rank, inbox)| Self {
                rank,
                peers: sinks.clone(),
                inbox,
                pending: Mutex::new(VecDeque::new()),
            })
            .collect()
    }
}




// ============================================================================
impl Communicator for ChannelCommunicator {

    fn rank(&self) -> usize {
        self.rank
    }

    fn size(&self) -> usize {
        self.peers.len()
    }

    fn send(&self, rank: usize, message: Vec<u8>) {
        if self.peers[rank].send(message).is_err() {
            panic!("ChannelCommunicator::send - rank {} has hung up", rank)
        }
    }

    fn recv(&self) -> Vec<u8> {
        let queued = self.pending.lock().unwrap_or_else(|e| e.into_inner()).pop_front();

        match queued {
            Some(message) => message,
            None => match self.inbox.recv() {
                Ok(message) => message,
                Err(_) => panic!("ChannelCommunicator::recv - all peers of rank {} have hung up", self.rank),
            },
        }
    }

    fn requeue_recv(&self, messages: Vec<Vec<u8>>) {
        let mut pending = self.pending.lock().unwrap_or_else(|e| e.into_inner());

        for message in messages.into_iter().rev() {
            pending.push_front(message)
        }
    }
}
