//! In-process SPMD runtime.
//!
//! A fixed set of peer ranks runs the same program in lockstep phases. Each
//! rank is a thread with a task queue; `send` enqueues a boxed closure for
//! the destination rank, which executes it single-threaded on its own
//! thread some time before the next `barrier` completes. Point-to-point
//! sends are fire-and-forget; two sends from the same source to the same
//! destination are delivered in order.
//!
//! `barrier` is a quiescence barrier: it drains and executes incoming
//! tasks until no rank has an undelivered message in flight, so everything
//! sent before the barrier is visible after it.
//!
//! Rank-local state that task closures must reach (distributed-container
//! shards, scratch tables) lives in a per-rank object registry. SPMD
//! discipline makes registration order identical on every rank, so an
//! object id minted collectively addresses the matching shard everywhere.

pub mod counting_set;
pub mod map;
pub mod partitioner;
pub mod set;

use std::any::Any;
use std::cell::RefCell;
use std::rc::Rc;
use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::{Arc, Barrier, Mutex};

use crossbeam_channel::{unbounded, Receiver, Sender};

pub use counting_set::DistCountingSet;
pub use map::{DistMap, RankLocal};
pub use partitioner::{stable_hash64, KeyPartitioner};
pub use set::DistSet;

/// A message: a closure executed on the destination rank.
pub type Task = Box<dyn FnOnce(&Comm) + Send>;

/// Identifier of a registered rank-local object. Minted in SPMD order, so
/// the same id names the corresponding shard on every rank.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ObjId(usize);

struct WorldShared {
    world_size: usize,
    senders: Vec<Sender<Task>>,
    /// Messages sent but not yet executed, across the whole world.
    pending: AtomicI64,
    sync: Barrier,
    /// One slot per rank for type-erased reduction contributions.
    reduce: Mutex<Vec<Option<Box<dyn Any + Send>>>>,
}

/// Per-rank communicator handle.
pub struct Comm {
    rank: usize,
    shared: Arc<WorldShared>,
    rx: Receiver<Task>,
    objects: RefCell<Vec<Rc<RefCell<dyn Any>>>>,
}

impl Comm {
    /// A world of one rank, no peer threads. Sends to self still queue and
    /// execute at the next barrier.
    pub fn solo() -> Self {
        let (tx, rx) = unbounded();
        let shared = Arc::new(WorldShared {
            world_size: 1,
            senders: vec![tx],
            pending: AtomicI64::new(0),
            sync: Barrier::new(1),
            reduce: Mutex::new(vec![None]),
        });
        Self {
            rank: 0,
            shared,
            rx,
            objects: RefCell::new(Vec::new()),
        }
    }

    pub fn rank(&self) -> usize {
        self.rank
    }

    pub fn world_size(&self) -> usize {
        self.shared.world_size
    }

    /// Enqueue a closure for delivery to rank `dest`. Never blocks.
    pub fn send(&self, dest: usize, task: impl FnOnce(&Comm) + Send + 'static) {
        debug_assert!(dest < self.world_size());
        self.shared.pending.fetch_add(1, Ordering::SeqCst);
        self.shared.senders[dest]
            .send(Box::new(task))
            .expect("world is alive while ranks run");
    }

    /// Execute every task currently queued for this rank. Tasks may send
    /// further tasks; those are picked up in the same sweep when local.
    fn drain(&self) {
        while let Ok(task) = self.rx.try_recv() {
            task(self);
            self.shared.pending.fetch_sub(1, Ordering::SeqCst);
        }
    }

    /// Block until every rank has reached the barrier and no message is in
    /// flight anywhere. Tasks sent before the barrier have executed once it
    /// returns.
    pub fn barrier(&self) {
        loop {
            self.drain();
            self.shared.sync.wait();
            // All ranks sit between the two waits; nobody executes or
            // sends, so the global count is stable and every rank reads
            // the same value.
            let quiescent = self.shared.pending.load(Ordering::SeqCst) == 0;
            self.shared.sync.wait();
            if quiescent {
                return;
            }
        }
    }

    /// Combine one value per rank with `combine`, in rank order; every rank
    /// receives the result. Implies a barrier.
    pub fn all_reduce<T, F>(&self, value: T, combine: F) -> T
    where
        T: Clone + Send + 'static,
        F: Fn(T, T) -> T,
    {
        self.barrier();
        {
            let mut slots = self.shared.reduce.lock().expect("reduce slots");
            slots[self.rank] = Some(Box::new(value));
        }
        self.shared.sync.wait();
        let result = {
            let slots = self.shared.reduce.lock().expect("reduce slots");
            let mut acc: Option<T> = None;
            for slot in slots.iter() {
                let v = slot
                    .as_ref()
                    .expect("every rank contributes")
                    .downcast_ref::<T>()
                    .expect("uniform reduction type")
                    .clone();
                acc = Some(match acc {
                    None => v,
                    Some(a) => combine(a, v),
                });
            }
            acc.expect("world has at least one rank")
        };
        self.shared.sync.wait();
        if self.rank == 0 {
            let mut slots = self.shared.reduce.lock().expect("reduce slots");
            for slot in slots.iter_mut() {
                *slot = None;
            }
        }
        self.shared.sync.wait();
        result
    }

    pub fn all_reduce_sum(&self, value: u64) -> u64 {
        self.all_reduce(value, |a, b| a + b)
    }

    pub fn all_reduce_max(&self, value: u64) -> u64 {
        self.all_reduce(value, std::cmp::max)
    }

    // ── Object registry ───────────────────────────────────────────────

    /// Register a rank-local object and mint its id. Must be called in the
    /// same order on every rank (SPMD discipline).
    pub fn register<T: 'static>(&self, obj: T) -> ObjId {
        let mut objects = self.objects.borrow_mut();
        objects.push(Rc::new(RefCell::new(obj)));
        ObjId(objects.len() - 1)
    }

    /// Access a registered object. Panics on unknown id or wrong type —
    /// both are programming errors under SPMD symmetry. Re-entrant access
    /// to the *same* object is a borrow error; access to other objects
    /// from within the closure is fine.
    pub fn with_object<T: 'static, R>(&self, id: ObjId, f: impl FnOnce(&mut T) -> R) -> R {
        let cell = self.objects.borrow()[id.0].clone();
        let mut borrow = cell.borrow_mut();
        let obj = borrow.downcast_mut::<T>().expect("registered object type");
        f(obj)
    }
}

/// Spawns one thread per rank and runs `f` on each, returning the per-rank
/// results in rank order. A final barrier runs after `f` so no rank tears
/// down its queue while peers might still send.
pub struct World;

impl World {
    pub fn run<R, F>(world_size: usize, f: F) -> Vec<R>
    where
        R: Send,
        F: Fn(&Comm) -> R + Send + Sync,
    {
        assert!(world_size >= 1, "world needs at least one rank");

        let mut senders = Vec::with_capacity(world_size);
        let mut receivers = Vec::with_capacity(world_size);
        for _ in 0..world_size {
            let (tx, rx) = unbounded();
            senders.push(tx);
            receivers.push(rx);
        }
        let shared = Arc::new(WorldShared {
            world_size,
            senders,
            pending: AtomicI64::new(0),
            sync: Barrier::new(world_size),
            reduce: Mutex::new((0..world_size).map(|_| None).collect()),
        });

        std::thread::scope(|scope| {
            let mut handles = Vec::with_capacity(world_size);
            for (rank, rx) in receivers.into_iter().enumerate() {
                let shared = Arc::clone(&shared);
                let f = &f;
                handles.push(scope.spawn(move || {
                    let comm = Comm {
                        rank,
                        shared,
                        rx,
                        objects: RefCell::new(Vec::new()),
                    };
                    let result = f(&comm);
                    comm.barrier();
                    result
                }));
            }
            handles
                .into_iter()
                .map(|h| h.join().expect("rank thread panicked"))
                .collect()
        })
    }
}
