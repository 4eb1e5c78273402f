//! Time-to-live expiry for paths.
//!
//! A single scheduler thread per tree sleeps until the earliest deadline.
//! On expiry the path is resolved again (it may have moved or vanished in
//! the meantime): a leaf has its data cleared, a branch is removed with its
//! subtree, then the callback runs outside every lock.
//!
//! Arming is idempotent per path: re-arming replaces the previous timer,
//! whose heap entry is skipped when it surfaces.

use std::cmp::Reverse;
use std::collections::{BinaryHeap, HashMap};
use std::sync::{Arc, Weak};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use parking_lot::{Condvar, Mutex, MutexGuard};
use tracing::{debug, warn};

use crate::error::{Error, Result};
use crate::node::NodeArena;
use crate::trie::{Shared, Trie};

/// What happened to an expired path.
#[derive(Debug, PartialEq)]
pub enum Expired<T> {
    /// A leaf's data was cleared; carries the old value.
    Cleared(Option<T>),
    /// A branch was removed together with its subtree.
    Removed,
}

/// Expiry callback, invoked with the full path and the outcome.
pub type TtlCallback<T> = Box<dyn FnOnce(&str, Expired<T>) + Send + 'static>;

struct Armed<T> {
    seq: u64,
    delimiter: char,
    callback: TtlCallback<T>,
}

struct Queue<T> {
    armed: HashMap<String, Armed<T>>,
    deadlines: BinaryHeap<Reverse<(Instant, u64, String)>>,
    next_seq: u64,
    closed: bool,
}

struct State<T> {
    queue: Mutex<Queue<T>>,
    wake: Condvar,
}

pub(crate) struct TtlScheduler<T> {
    state: Arc<State<T>>,
    worker: Option<JoinHandle<()>>,
}

/// Lifecycle of a tree's scheduler; started on first use.
pub(crate) enum TtlSlot<T> {
    Idle,
    Running(TtlScheduler<T>),
    Closed,
}

impl<T: Send + Sync + 'static> TtlScheduler<T> {
    fn start(shared: Weak<Shared<T>>) -> Self {
        let state = Arc::new(State {
            queue: Mutex::new(Queue {
                armed: HashMap::new(),
                deadlines: BinaryHeap::new(),
                next_seq: 0,
                closed: false,
            }),
            wake: Condvar::new(),
        });
        let worker_state = Arc::clone(&state);
        let worker = thread::Builder::new()
            .name("radix-store-ttl".into())
            .spawn(move || run(worker_state, shared))
            .map_err(|err| warn!(%err, "failed to spawn ttl worker"))
            .ok();
        Self { state, worker }
    }
}

impl<T> TtlScheduler<T> {
    fn arm(&self, key: String, deadline: Instant, delimiter: char, callback: TtlCallback<T>) {
        let mut queue = self.state.queue.lock();
        let seq = queue.next_seq;
        queue.next_seq += 1;
        let replaced = queue
            .armed
            .insert(
                key.clone(),
                Armed {
                    seq,
                    delimiter,
                    callback,
                },
            )
            .is_some();
        queue.deadlines.push(Reverse((deadline, seq, key)));
        debug!(replaced, "ttl armed");
        self.state.wake.notify_one();
    }

    fn disarm(&self, key: &str) -> bool {
        // The stale heap entry is dropped when it reaches the top.
        self.state.queue.lock().armed.remove(key).is_some()
    }

    fn pending(&self) -> usize {
        self.state.queue.lock().armed.len()
    }
}

impl<T> Drop for TtlScheduler<T> {
    fn drop(&mut self) {
        {
            let mut queue = self.state.queue.lock();
            queue.closed = true;
            queue.armed.clear();
        }
        self.state.wake.notify_all();
        if let Some(worker) = self.worker.take() {
            // The worker may drop the last tree handle itself.
            if worker.thread().id() != thread::current().id() {
                let _ = worker.join();
            }
        }
    }
}

fn run<T>(state: Arc<State<T>>, shared: Weak<Shared<T>>) {
    let mut queue = state.queue.lock();
    loop {
        if queue.closed {
            return;
        }
        let next = queue.deadlines.peek().map(|Reverse((deadline, _, _))| *deadline);
        let Some(deadline) = next else {
            state.wake.wait(&mut queue);
            continue;
        };
        if deadline > Instant::now() {
            state.wake.wait_until(&mut queue, deadline);
            continue;
        }
        let Some(Reverse((_, seq, key))) = queue.deadlines.pop() else {
            continue;
        };
        if queue.armed.get(&key).map(|a| a.seq) != Some(seq) {
            continue;
        }
        let Some(armed) = queue.armed.remove(&key) else {
            continue;
        };
        MutexGuard::unlocked(&mut queue, || fire(&shared, &key, armed));
    }
}

fn fire<T>(shared: &Weak<Shared<T>>, key: &str, armed: Armed<T>) {
    let Some(shared) = shared.upgrade() else {
        return;
    };
    let outcome = expire(&mut shared.arena.write(), key, armed.delimiter);
    drop(shared);
    match outcome {
        Some(expired) => {
            debug!(key, removed = matches!(expired, Expired::Removed), "ttl expired");
            (armed.callback)(key, expired);
        }
        None => debug!(key, "ttl expired for a path that no longer resolves"),
    }
}

fn expire<T>(arena: &mut NodeArena<T>, key: &str, delimiter: char) -> Option<Expired<T>> {
    let loc = arena.resolve(key, delimiter);
    let id = loc.node.filter(|_| loc.is_hit())?;
    if loc.branch {
        arena.remove_at(id, key, delimiter, false)?;
        return Some(Expired::Removed);
    }
    let node = arena.get_mut(id)?;
    node.modified = true;
    Some(Expired::Cleared(node.data.take()))
}

impl<T: Send + Sync + 'static> Trie<T> {
    /// Expire `path` after `ttl`, then call `callback`.
    ///
    /// Re-arming a path replaces its previous timer. Fails with
    /// [`Error::Closed`] after [`close`](Self::close).
    pub fn set_ttl(
        &self,
        path: &str,
        ttl: Duration,
        callback: impl FnOnce(&str, Expired<T>) + Send + 'static,
    ) -> Result<()> {
        let key = self.full_key(path).as_str().to_owned();
        let mut slot = self.shared.ttl.lock();
        if let TtlSlot::Idle = *slot {
            *slot = TtlSlot::Running(TtlScheduler::start(Arc::downgrade(&self.shared)));
        }
        match &*slot {
            TtlSlot::Running(scheduler) => {
                scheduler.arm(key, Instant::now() + ttl, self.delimiter, Box::new(callback));
                Ok(())
            }
            _ => Err(Error::Closed),
        }
    }
}

impl<T> Trie<T> {
    /// Disarm the timer on `path`. Returns `true` if one was armed.
    pub fn cancel_ttl(&self, path: &str) -> bool {
        let key = self.full_key(path);
        match &*self.shared.ttl.lock() {
            TtlSlot::Running(scheduler) => scheduler.disarm(&key),
            _ => false,
        }
    }

    /// Number of armed timers on this tree.
    pub fn pending_ttls(&self) -> usize {
        match &*self.shared.ttl.lock() {
            TtlSlot::Running(scheduler) => scheduler.pending(),
            _ => 0,
        }
    }

    /// Disarm every timer and stop the scheduler thread. Affects all
    /// handles sharing this tree.
    pub fn close(&self) {
        let previous = std::mem::replace(&mut *self.shared.ttl.lock(), TtlSlot::Closed);
        // Joins the worker; the slot lock is already released.
        drop(previous);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::mpsc;

    const WAIT: Duration = Duration::from_secs(5);

    #[test]
    fn test_leaf_data_cleared() {
        let t: Trie<i32> = Trie::new();
        t.insert("app.tmp", 1);
        t.insert("app.keep", 2);
        let (tx, rx) = mpsc::channel();
        t.set_ttl("app.tmp", Duration::from_millis(20), move |path, expired| {
            tx.send((path.to_owned(), expired)).unwrap();
        })
        .unwrap();

        let (path, expired) = rx.recv_timeout(WAIT).unwrap();
        assert_eq!(path, "app.tmp");
        assert_eq!(expired, Expired::Cleared(Some(1)));
        let q = t.query("app.tmp").unwrap();
        assert_eq!(q.data, None);
        assert_eq!(t.get("app.keep"), Some(2));
        assert_eq!(t.pending_ttls(), 0);
    }

    #[test]
    fn test_branch_removed() {
        let t: Trie<i32> = Trie::new();
        t.insert("app.cache.a", 1);
        t.insert("app.cache.b", 2);
        t.insert("app.other", 3);
        let (tx, rx) = mpsc::channel();
        let scoped = t.with_prefix("app");
        scoped
            .set_ttl("cache", Duration::from_millis(10), move |path, expired| {
                tx.send((path.to_owned(), expired)).unwrap();
            })
            .unwrap();

        let (path, expired) = rx.recv_timeout(WAIT).unwrap();
        assert_eq!(path, "app.cache");
        assert_eq!(expired, Expired::Removed);
        assert!(!t.search("app.cache.a"));
        assert!(!t.search("app.cache"));
        assert_eq!(t.get("app.other"), Some(3));
    }

    #[test]
    fn test_rearm_replaces_previous_timer() {
        let t: Trie<i32> = Trie::new();
        t.insert("k", 1);
        let (tx, rx) = mpsc::channel();
        let first = tx.clone();
        t.set_ttl("k", Duration::from_secs(3600), move |_, _| {
            first.send("first").unwrap();
        })
        .unwrap();
        t.set_ttl("k", Duration::from_millis(10), move |_, _| {
            tx.send("second").unwrap();
        })
        .unwrap();
        assert_eq!(t.pending_ttls(), 1);

        assert_eq!(rx.recv_timeout(WAIT).unwrap(), "second");
        assert_eq!(t.pending_ttls(), 0);
        assert!(rx.recv_timeout(Duration::from_millis(50)).is_err());
    }

    #[test]
    fn test_vanished_path_skips_callback() {
        let t: Trie<i32> = Trie::new();
        t.insert("gone", 1);
        let (tx, rx) = mpsc::channel::<()>();
        t.set_ttl("gone", Duration::from_millis(10), move |_, _| {
            tx.send(()).unwrap();
        })
        .unwrap();
        assert!(t.remove("gone"));
        assert!(rx.recv_timeout(Duration::from_millis(200)).is_err());
    }

    #[test]
    fn test_cancel_and_close() {
        let t: Trie<i32> = Trie::new();
        t.insert("a", 1);
        t.insert("b", 2);
        t.set_ttl("a", Duration::from_millis(30), |_, _| {}).unwrap();
        assert!(t.cancel_ttl("a"));
        assert!(!t.cancel_ttl("a"));

        t.set_ttl("b", Duration::from_millis(30), |_, _| {}).unwrap();
        t.close();
        thread::sleep(Duration::from_millis(100));
        assert_eq!(t.get("a"), Some(1));
        assert_eq!(t.get("b"), Some(2));
        assert!(matches!(
            t.set_ttl("a", Duration::from_millis(1), |_, _| {}),
            Err(Error::Closed)
        ));
        assert_eq!(t.pending_ttls(), 0);
    }

    #[test]
    fn test_dropping_tree_stops_worker() {
        let t: Trie<i32> = Trie::new();
        t.insert("a", 1);
        t.set_ttl("a", Duration::from_secs(3600), |_, _| {}).unwrap();
        drop(t);
    }
}
