//! Thin façade over intra-process (Rayon-style threads) or inter-process (MPI)
//! message passing, plus the collectives the refinement protocol is built on.
//!
//! Messages are *contiguous byte slices* (no zero-copy guarantees).
//! All point-to-point handles are **waitable** but non-blocking: the
//! collectives below post every receive and send first, then drain all
//! handles before they trust any buffer.
//!
//! # Collective discipline
//! [`Communicator::exchange`], [`Communicator::allgather`] and
//! [`Communicator::allreduce`] must be entered by every rank in the same
//! order. Messages are matched FIFO per `(source, destination, tag)`, so the
//! lockstep order is the only thing that pairs a send with its receive. A rank
//! that skips a collective leaves its peers waiting; [`RayonComm`] turns that
//! into a [`MeshError::CommTimeout`] instead of a hang.

use crate::algs::wire::{WireCount, cast_slice, cast_slice_mut};
use crate::mesh_error::MeshError;
use bytemuck::Pod;
use bytes::Bytes;
use dashmap::DashMap;
use num_traits::Num;
use parking_lot::{Condvar, Mutex};
use std::collections::VecDeque;
use std::sync::Arc;
use std::time::{Duration, Instant};

/// Typed message tag.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub struct CommTag(pub u16);

impl CommTag {
    pub const fn new(raw: u16) -> Self {
        Self(raw)
    }

    pub const fn as_u16(self) -> u16 {
        self.0
    }

    /// Derive a neighboring tag (`base + k`).
    pub const fn offset(self, k: u16) -> Self {
        Self(self.0.wrapping_add(k))
    }
}

/// Tag pair used by [`Communicator::exchange`] (sizes, then payload).
const EXCHANGE_TAG: CommTag = CommTag::new(0xC011);

/// Reduction applied by [`Communicator::allreduce`].
#[derive(Copy, Clone, Debug, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub enum ReduceOp {
    Max,
    Min,
    Sum,
}

impl ReduceOp {
    /// Combine two values.
    pub fn apply<T: Reducible>(self, a: T, b: T) -> T {
        match self {
            ReduceOp::Max => {
                if b > a {
                    b
                } else {
                    a
                }
            }
            ReduceOp::Min => {
                if b < a {
                    b
                } else {
                    a
                }
            }
            ReduceOp::Sum => a + b,
        }
    }
}

/// Scalars that can travel through [`Communicator::allreduce`].
pub trait Reducible: Pod + PartialOrd + Num {}

impl<T: Pod + PartialOrd + Num> Reducible for T {}

/// Anything that can be waited on.
pub trait Wait {
    /// Wait for completion and return the received data (if any).
    fn wait(self) -> Result<Option<Bytes>, MeshError>;
}

impl Wait for () {
    fn wait(self) -> Result<Option<Bytes>, MeshError> {
        Ok(None)
    }
}

/// Non-blocking communication interface with collectives layered on top.
pub trait Communicator: Clone + 'static {
    /// Handle returned by `isend`.
    type SendHandle: Wait;
    /// Handle returned by `irecv`.
    type RecvHandle: Wait;

    /// This process's rank in `0..size()`.
    fn rank(&self) -> usize;
    /// Number of cooperating ranks.
    fn size(&self) -> usize;

    fn isend(&self, peer: usize, tag: u16, buf: &[u8]) -> Self::SendHandle;
    /// Post a receive of `buf.len()` bytes; the data is handed back by `wait`.
    fn irecv(&self, peer: usize, tag: u16, buf: &mut [u8]) -> Self::RecvHandle;

    /// Personalized all-to-all: `sends[r]` is delivered to rank `r`; the result
    /// holds one buffer per source rank.
    fn exchange(&self, sends: Vec<Bytes>) -> Result<Vec<Bytes>, MeshError> {
        exchange_point_to_point(self, sends)
    }

    /// Every rank receives every rank's buffer, indexed by source rank.
    fn allgather(&self, local: Bytes) -> Result<Vec<Bytes>, MeshError> {
        let n = self.size();
        self.exchange(vec![local; n])
    }

    /// Reduce one scalar across all ranks.
    ///
    /// Values are folded in rank order, so every rank obtains a bit-identical
    /// result even for floating-point sums.
    fn allreduce<T: Reducible>(&self, value: T, op: ReduceOp) -> Result<T, MeshError> {
        let parts = self.allgather(Bytes::copy_from_slice(bytemuck::bytes_of(&value)))?;
        let mut acc: Option<T> = None;
        for (peer, part) in parts.iter().enumerate() {
            let v: T = bytemuck::try_pod_read_unaligned(part).map_err(|_| MeshError::CommError {
                neighbor: peer,
                reason: format!(
                    "allreduce payload has {} bytes, expected {}",
                    part.len(),
                    std::mem::size_of::<T>()
                ),
            })?;
            acc = Some(match acc {
                None => v,
                Some(a) => op.apply(a, v),
            });
        }
        acc.ok_or(MeshError::CommBufferCount {
            expected: 1,
            found: 0,
        })
    }

    /// Synchronize all ranks.
    fn barrier(&self) -> Result<(), MeshError> {
        self.allgather(Bytes::new()).map(|_| ())
    }
}

/// Two-stage exchange: sizes first, then payloads of known length.
///
/// Every posted handle is drained before returning, even on error.
fn exchange_point_to_point<C>(comm: &C, mut sends: Vec<Bytes>) -> Result<Vec<Bytes>, MeshError>
where
    C: Communicator + ?Sized,
{
    let (me, n) = (comm.rank(), comm.size());
    if sends.len() != n {
        return Err(MeshError::CommBufferCount {
            expected: n,
            found: sends.len(),
        });
    }
    let mut recvs = vec![Bytes::new(); n];
    recvs[me] = std::mem::take(&mut sends[me]);
    if n == 1 {
        return Ok(recvs);
    }
    let size_tag = EXCHANGE_TAG.as_u16();
    let data_tag = EXCHANGE_TAG.offset(1).as_u16();

    // 1) sizes
    let mut size_recvs = Vec::with_capacity(n - 1);
    for peer in (0..n).filter(|&p| p != me) {
        let mut cnt = WireCount::new(0);
        let h = comm.irecv(peer, size_tag, cast_slice_mut(std::slice::from_mut(&mut cnt)));
        size_recvs.push((peer, h));
    }
    let mut pending_sends = Vec::with_capacity(2 * (n - 1));
    for peer in (0..n).filter(|&p| p != me) {
        let cnt = WireCount::new(sends[peer].len());
        pending_sends.push(comm.isend(peer, size_tag, cast_slice(std::slice::from_ref(&cnt))));
    }
    let mut lens = vec![0usize; n];
    let mut maybe_err = None;
    for (peer, h) in size_recvs {
        match h.wait() {
            Ok(Some(data)) if data.len() == std::mem::size_of::<WireCount>() => {
                let mut cnt = WireCount::new(0);
                cast_slice_mut(std::slice::from_mut(&mut cnt)).copy_from_slice(&data);
                lens[peer] = cnt.get();
            }
            Ok(Some(data)) => {
                maybe_err.get_or_insert(MeshError::CommError {
                    neighbor: peer,
                    reason: format!(
                        "expected {} bytes for size header, got {}",
                        std::mem::size_of::<WireCount>(),
                        data.len()
                    ),
                });
            }
            Ok(None) => {
                maybe_err.get_or_insert(MeshError::CommError {
                    neighbor: peer,
                    reason: "no size header received".into(),
                });
            }
            Err(e) => {
                maybe_err.get_or_insert(e);
            }
        }
    }
    if let Some(err) = maybe_err {
        drain(pending_sends);
        return Err(err);
    }

    // 2) payloads
    let mut data_recvs = Vec::with_capacity(n - 1);
    for peer in (0..n).filter(|&p| p != me) {
        let mut buf = vec![0u8; lens[peer]];
        data_recvs.push((peer, comm.irecv(peer, data_tag, &mut buf)));
    }
    for peer in (0..n).filter(|&p| p != me) {
        pending_sends.push(comm.isend(peer, data_tag, &sends[peer]));
    }
    for (peer, h) in data_recvs {
        match h.wait() {
            Ok(Some(data)) if data.len() == lens[peer] => recvs[peer] = data,
            Ok(Some(data)) => {
                maybe_err.get_or_insert(MeshError::CommError {
                    neighbor: peer,
                    reason: format!("expected {} payload bytes, got {}", lens[peer], data.len()),
                });
            }
            Ok(None) if lens[peer] == 0 => {}
            Ok(None) => {
                maybe_err.get_or_insert(MeshError::CommError {
                    neighbor: peer,
                    reason: "no payload received".into(),
                });
            }
            Err(e) => {
                maybe_err.get_or_insert(e);
            }
        }
    }
    drain(pending_sends);
    log::trace!(
        "rank {me}: exchanged {} bytes out, {} bytes in",
        sends.iter().map(Bytes::len).sum::<usize>(),
        recvs.iter().map(Bytes::len).sum::<usize>()
    );
    match maybe_err {
        Some(err) => Err(err),
        None => Ok(recvs),
    }
}

fn drain<H: Wait>(handles: Vec<H>) {
    for h in handles {
        let _ = h.wait();
    }
}

/// Compile-time no-op comm for pure serial use: one rank, no peers.
#[derive(Clone, Debug, Default)]
pub struct NoComm;

impl Communicator for NoComm {
    type SendHandle = ();
    type RecvHandle = ();

    fn rank(&self) -> usize {
        0
    }
    fn size(&self) -> usize {
        1
    }
    fn isend(&self, _peer: usize, _tag: u16, _buf: &[u8]) {}
    fn irecv(&self, _peer: usize, _tag: u16, _buf: &mut [u8]) {}
}

// --- RayonComm: several ranks as threads of one process ---
type Key = (usize, usize, u16); // (src, dst, tag)

#[derive(Debug, Default)]
struct Mailbox {
    slots: DashMap<Key, VecDeque<Bytes>>,
    lock: Mutex<()>,
    arrived: Condvar,
}

impl Mailbox {
    fn post(&self, key: Key, data: Bytes) {
        self.slots.entry(key).or_default().push_back(data);
        let _guard = self.lock.lock();
        self.arrived.notify_all();
    }

    fn take(&self, key: &Key) -> Option<Bytes> {
        self.slots.get_mut(key).and_then(|mut q| q.pop_front())
    }
}

/// Handle for a pending [`RayonComm`] receive.
pub struct LocalHandle {
    mailbox: Arc<Mailbox>,
    key: Key,
    len: usize,
    timeout: Duration,
}

impl Wait for LocalHandle {
    fn wait(self) -> Result<Option<Bytes>, MeshError> {
        let deadline = Instant::now() + self.timeout;
        let mut guard = self.mailbox.lock.lock();
        loop {
            if let Some(bytes) = self.mailbox.take(&self.key) {
                let n = self.len.min(bytes.len());
                return Ok(Some(bytes.slice(..n)));
            }
            if self.mailbox.arrived.wait_until(&mut guard, deadline).timed_out() {
                return match self.mailbox.take(&self.key) {
                    Some(bytes) => {
                        let n = self.len.min(bytes.len());
                        Ok(Some(bytes.slice(..n)))
                    }
                    None => Err(MeshError::CommTimeout {
                        peer: self.key.0,
                        tag: self.key.2,
                    }),
                };
            }
        }
    }
}

/// In-process communicator: every rank is a thread, all ranks of one world
/// share a mailbox.
#[derive(Clone, Debug)]
pub struct RayonComm {
    rank: usize,
    size: usize,
    mailbox: Arc<Mailbox>,
    timeout: Duration,
}

impl RayonComm {
    /// Default receive timeout.
    pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(60);

    /// Create the communicators of a `size`-rank world, one per rank.
    pub fn world(size: usize) -> Vec<RayonComm> {
        let mailbox = Arc::new(Mailbox::default());
        (0..size)
            .map(|rank| RayonComm {
                rank,
                size,
                mailbox: Arc::clone(&mailbox),
                timeout: Self::DEFAULT_TIMEOUT,
            })
            .collect()
    }

    /// Override how long a receive may wait before reporting a missing peer.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }
}

impl Communicator for RayonComm {
    type SendHandle = ();
    type RecvHandle = LocalHandle;

    fn rank(&self) -> usize {
        self.rank
    }

    fn size(&self) -> usize {
        self.size
    }

    fn isend(&self, peer: usize, tag: u16, buf: &[u8]) -> Self::SendHandle {
        self.mailbox
            .post((self.rank, peer, tag), Bytes::copy_from_slice(buf));
    }

    fn irecv(&self, peer: usize, tag: u16, buf: &mut [u8]) -> Self::RecvHandle {
        LocalHandle {
            mailbox: Arc::clone(&self.mailbox),
            key: (peer, self.rank, tag),
            len: buf.len(),
            timeout: self.timeout,
        }
    }
}

// --- MPI backend (feature = "mpi-support") ---
#[cfg(feature = "mpi-support")]
mod mpi_backend {
    use super::{Bytes, Communicator, MeshError, Wait};
    use mpi::Count;
    use mpi::datatype::{Partition, PartitionMut};
    use mpi::environment::Universe;
    use mpi::topology::SimpleCommunicator;
    use mpi::traits::Communicator as _;
    use mpi::traits::{CommunicatorCollectives, Destination, Source};
    use std::rc::Rc;

    /// MPI world communicator. Field order matters: the world handle is
    /// released before the universe finalizes MPI.
    #[derive(Clone)]
    pub struct MpiComm {
        pub world: Rc<SimpleCommunicator>,
        _universe: Rc<Universe>,
        pub rank: usize,
        size: usize,
    }

    impl MpiComm {
        pub fn new() -> Result<Self, MeshError> {
            let universe = mpi::initialize()
                .ok_or_else(|| MeshError::CommInit("MPI was already initialized".into()))?;
            let world = universe.world();
            let rank = world.rank() as usize;
            let size = world.size() as usize;
            Ok(Self {
                world: Rc::new(world),
                _universe: Rc::new(universe),
                rank,
                size,
            })
        }
    }

    /// Completed MPI transfer (blocking underneath).
    pub struct MpiHandle(Option<Bytes>);

    impl Wait for MpiHandle {
        fn wait(self) -> Result<Option<Bytes>, MeshError> {
            Ok(self.0)
        }
    }

    fn displacements(counts: &[Count]) -> Vec<Count> {
        counts
            .iter()
            .scan(0, |acc, &c| {
                let d = *acc;
                *acc += c;
                Some(d)
            })
            .collect()
    }

    impl Communicator for MpiComm {
        type SendHandle = MpiHandle;
        type RecvHandle = MpiHandle;

        fn rank(&self) -> usize {
            self.rank
        }

        fn size(&self) -> usize {
            self.size
        }

        fn isend(&self, peer: usize, tag: u16, buf: &[u8]) -> MpiHandle {
            self.world
                .process_at_rank(peer as i32)
                .send_with_tag(buf, i32::from(tag));
            MpiHandle(None)
        }

        fn irecv(&self, peer: usize, tag: u16, _buf: &mut [u8]) -> MpiHandle {
            let (data, _status) = self
                .world
                .process_at_rank(peer as i32)
                .receive_vec_with_tag::<u8>(i32::from(tag));
            MpiHandle(Some(Bytes::from(data)))
        }

        fn exchange(&self, sends: Vec<Bytes>) -> Result<Vec<Bytes>, MeshError> {
            if sends.len() != self.size {
                return Err(MeshError::CommBufferCount {
                    expected: self.size,
                    found: sends.len(),
                });
            }
            let send_counts: Vec<Count> = sends.iter().map(|b| b.len() as Count).collect();
            let mut recv_counts = vec![0 as Count; self.size];
            self.world
                .all_to_all_into(&send_counts[..], &mut recv_counts[..]);
            let send_displs = displacements(&send_counts);
            let recv_displs = displacements(&recv_counts);
            let send_buf: Vec<u8> = sends.iter().flat_map(|b| b.iter().copied()).collect();
            let total: usize = recv_counts.iter().map(|&c| c as usize).sum();
            let mut recv_buf = vec![0u8; total];
            {
                let partition = Partition::new(&send_buf[..], &send_counts[..], &send_displs[..]);
                let mut recv_partition =
                    PartitionMut::new(&mut recv_buf[..], &recv_counts[..], &recv_displs[..]);
                self.world
                    .all_to_all_varcount_into(&partition, &mut recv_partition);
            }
            let recv = Bytes::from(recv_buf);
            Ok(recv_displs
                .iter()
                .zip(&recv_counts)
                .map(|(&d, &c)| recv.slice(d as usize..(d + c) as usize))
                .collect())
        }
    }
}

#[cfg(feature = "mpi-support")]
pub use mpi_backend::MpiComm;
