use crate::env::Environment;
use loom_ir::{Value, VarId};
use std::cell::RefCell;
use std::rc::{Rc, Weak};
use tracing::trace;

/// An opaque, journaled mutation that the trail can undo and finalize.
///
/// The trail itself only knows about variable bindings (`Bind`); every
/// other kind of reversible effect — linear-resource consumption,
/// forward-chaining production — is a `TrailAction` implemented one
/// layer up, in `loom-solve`, against its own `KnowledgeBase`. Journal
/// every mutation, restore by replaying in reverse, without the trail
/// needing to know what a `LinearResource` is to journal consuming one.
pub trait TrailAction {
    /// Reverse the effect. Called during `rollback`, most-recent first.
    fn undo(&mut self);
    /// The effect is permanent now. Called during `commit`.
    fn finalize(&mut self);
}

enum TrailEntryKind {
    Bind {
        env: Weak<RefCell<Environment>>,
        var: VarId,
        previous: Option<Value>,
    },
    External(Box<dyn TrailAction>),
}

struct TrailEntry {
    kind: TrailEntryKind,
    timestamp: u64,
    active: bool,
}

/// Opaque position marker; `checkpoint`/`rollback`/`commit` operate on
/// these (§4.D).
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct Checkpoint(usize);

/// Append-only journal of reversible effects with a nested checkpoint
/// stack, in the style of an inference table's
/// `snapshot`/`commit`/`rollback_to` triad.
#[derive(Default)]
pub struct LinearTrail {
    entries: Vec<TrailEntry>,
    checkpoint_stack: Vec<usize>,
    next_timestamp: u64,
}

impl LinearTrail {
    pub fn new() -> Self {
        LinearTrail::default()
    }

    fn push(&mut self, kind: TrailEntryKind) {
        let timestamp = self.next_timestamp;
        self.next_timestamp += 1;
        self.entries.push(TrailEntry {
            kind,
            timestamp,
            active: true,
        });
    }

    /// Journals a variable binding. `env` must be the environment that
    /// owns `var`. The caller has already performed the mutation (via
    /// `Environment::raw_bind`); this only remembers how to undo it.
    pub fn record_bind(&mut self, env: &Rc<RefCell<Environment>>, var: VarId, previous: Option<Value>) {
        self.push(TrailEntryKind::Bind {
            env: Rc::downgrade(env),
            var,
            previous,
        });
    }

    /// Journals an externally-defined reversible effect (consumption,
    /// production: see `loom-solve::kb`).
    pub fn record_external(&mut self, action: Box<dyn TrailAction>) {
        self.push(TrailEntryKind::External(action));
    }

    /// Returns the current trail length as a checkpoint and pushes it on
    /// the checkpoint stack (§4.D).
    pub fn checkpoint(&mut self) -> Checkpoint {
        let cp = self.entries.len();
        self.checkpoint_stack.push(cp);
        Checkpoint(cp)
    }

    /// Undoes every active entry from `cp` to the end, in reverse order,
    /// then truncates the trail to `cp` (§4.D). Rollback is idempotent
    /// for entries already marked inactive.
    pub fn rollback(&mut self, cp: Checkpoint) {
        self.pop_checkpoint_stack_to(cp);
        for entry in self.entries[cp.0..].iter_mut().rev() {
            if !entry.active {
                continue;
            }
            entry.active = false;
            match &mut entry.kind {
                TrailEntryKind::Bind { env, var, previous } => {
                    if let Some(env) = env.upgrade() {
                        env.borrow_mut().raw_restore(*var, previous.take());
                    }
                }
                TrailEntryKind::External(action) => action.undo(),
            }
        }
        trace!(from = cp.0, "rollback");
        self.entries.truncate(cp.0);
    }

    /// Pops the checkpoint and finalizes (frees) every active entry below
    /// it (§4.D).
    pub fn commit(&mut self, cp: Checkpoint) {
        self.pop_checkpoint_stack_to(cp);
        for entry in self.entries[..cp.0].iter_mut() {
            if entry.active {
                if let TrailEntryKind::External(action) = &mut entry.kind {
                    action.finalize();
                }
            }
        }
    }

    fn pop_checkpoint_stack_to(&mut self, cp: Checkpoint) {
        while let Some(&top) = self.checkpoint_stack.last() {
            if top < cp.0 {
                break;
            }
            self.checkpoint_stack.pop();
            if top == cp.0 {
                break;
            }
        }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::env::Environment;

    #[test]
    fn rollback_restores_prior_binding() {
        let env = Environment::new();
        let var = env.borrow_mut().fresh_var();
        let mut trail = LinearTrail::new();

        let cp = trail.checkpoint();
        let (previous, _waiters) = env.borrow_mut().raw_bind(var, Value::integer(1));
        trail.record_bind(&env, var, previous);

        assert!(Environment::lookup_binding(&env, var).is_some());
        trail.rollback(cp);
        assert!(Environment::lookup_binding(&env, var).is_none());
    }

    #[test]
    fn nested_checkpoints_obey_stack_discipline() {
        let env = Environment::new();
        let v1 = env.borrow_mut().fresh_var();
        let v2 = env.borrow_mut().fresh_var();
        let mut trail = LinearTrail::new();

        let outer = trail.checkpoint();
        let (p1, _) = env.borrow_mut().raw_bind(v1, Value::integer(1));
        trail.record_bind(&env, v1, p1);

        let _inner = trail.checkpoint();
        let (p2, _) = env.borrow_mut().raw_bind(v2, Value::integer(2));
        trail.record_bind(&env, v2, p2);

        trail.rollback(outer);
        assert!(Environment::lookup_binding(&env, v1).is_none());
        assert!(Environment::lookup_binding(&env, v2).is_none());
    }

    #[test]
    fn checkpoint_then_commit_keeps_work() {
        let env = Environment::new();
        let var = env.borrow_mut().fresh_var();
        let mut trail = LinearTrail::new();

        let cp = trail.checkpoint();
        let (previous, _) = env.borrow_mut().raw_bind(var, Value::integer(42));
        trail.record_bind(&env, var, previous);
        trail.commit(cp);

        assert!(Environment::lookup_binding(&env, var).is_some());
    }
}
