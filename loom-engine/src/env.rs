use crate::narrow::BuiltinRegistry;
use crate::suspend::Suspension;
use crate::trail::LinearTrail;
use loom_ir::{SuspensionId, Value, VarId};
use std::cell::RefCell;
use std::rc::Rc;

/// Notified whenever the environment binds a variable, so that the
/// constraint store (owned one layer up, in `loom-solve`, which depends
/// on this crate rather than the other way around) can propagate.
///
/// This is the seam §4.C's "Each environment owns... optionally a
/// ConstraintStore handle" becomes in a crate graph where the constraint
/// store cannot be named here without a cycle: `Environment` holds an
/// `Rc<RefCell<dyn ConstraintSink>>` instead of the concrete store.
/// `unify::bind` invokes it after releasing its borrow of the
/// environment, so an implementation is free to bind *other* variables
/// (§4.G's "unifies that variable with the solved value through bind()")
/// without re-entering a borrowed `RefCell`.
pub trait ConstraintSink {
    fn on_bind(&mut self, var: VarId, value: &Value, env: &Rc<RefCell<Environment>>, trail: &mut LinearTrail);
}

/// A bound or unbound logical variable, per §3.
pub struct LogicalVar {
    pub id: VarId,
    pub binding: Option<Value>,
    pub waiters: Vec<SuspensionId>,
    pub use_count: u32,
    pub is_consumed: bool,
    pub allow_reuse: bool,
}

impl LogicalVar {
    fn fresh(id: VarId) -> Self {
        LogicalVar {
            id,
            binding: None,
            waiters: Vec::new(),
            use_count: 0,
            is_consumed: false,
            allow_reuse: false,
        }
    }
}

/// Ordered collection of `LogicalVar` records plus an optional parent
/// link (§3). `vars[i].id.index() == i`: the arena index doubles as the
/// variable's id within this environment, per §9's arena-plus-index
/// guidance.
pub struct Environment {
    vars: Vec<LogicalVar>,
    pub(crate) suspensions: Vec<Suspension>,
    parent: Option<Rc<RefCell<Environment>>>,
    sink: Option<Rc<RefCell<dyn ConstraintSink>>>,
    pub(crate) builtins: Option<BuiltinRegistry>,
}

impl Environment {
    pub fn new() -> Rc<RefCell<Environment>> {
        Rc::new(RefCell::new(Environment {
            vars: Vec::new(),
            suspensions: Vec::new(),
            parent: None,
            sink: None,
            builtins: None,
        }))
    }

    /// A fresh environment whose `lookup` falls back to `parent` for
    /// variables it does not itself own: a nesting primitive a caller can
    /// use to scope a batch of variables without polluting an outer
    /// namespace, without needing per-variable remapping. The resolver
    /// currently scopes rule-body variables by freshening within the
    /// single top-level environment instead (see
    /// `loom-solve::kb::instantiate`); `child` stays available for
    /// callers that want environment-level nesting. Inherits the parent's
    /// built-in registry, since built-ins are a property of the runtime,
    /// not of any one environment.
    pub fn child(parent: &Rc<RefCell<Environment>>) -> Rc<RefCell<Environment>> {
        let (builtins, sink) = {
            let p = parent.borrow();
            (p.builtins, p.sink.clone())
        };
        Rc::new(RefCell::new(Environment {
            vars: Vec::new(),
            suspensions: Vec::new(),
            parent: Some(Rc::clone(parent)),
            sink,
            builtins,
        }))
    }

    pub fn set_constraint_sink(&mut self, sink: Rc<RefCell<dyn ConstraintSink>>) {
        self.sink = Some(sink);
    }

    pub fn constraint_sink(&self) -> Option<Rc<RefCell<dyn ConstraintSink>>> {
        self.sink.clone()
    }

    pub fn set_builtins(&mut self, builtins: BuiltinRegistry) {
        self.builtins = Some(builtins);
    }

    pub fn builtins(&self) -> BuiltinRegistry {
        self.builtins.expect("builtins registered at runtime init")
    }

    /// Allocates a fresh, unbound logical variable local to this
    /// environment.
    pub fn fresh_var(&mut self) -> VarId {
        let id = VarId::from_raw(self.vars.len() as u32);
        self.vars.push(LogicalVar::fresh(id));
        id
    }

    /// Does this environment (not its parents) own `id`?
    fn owns(&self, id: VarId) -> bool {
        id.index() < self.vars.len()
    }

    pub fn get(&self, id: VarId) -> Option<&LogicalVar> {
        if self.owns(id) {
            return self.vars.get(id.index());
        }
        None
    }

    pub fn get_mut(&mut self, id: VarId) -> Option<&mut LogicalVar> {
        if self.owns(id) {
            return self.vars.get_mut(id.index());
        }
        None
    }

    /// `lookup(env, var_id)`: walks parents (§4.C). Returns the current
    /// binding, if any, by cloning it (bindings are immutable once read;
    /// mutation only ever happens through `bind`).
    pub fn lookup_binding(env: &Rc<RefCell<Environment>>, id: VarId) -> Option<Value> {
        let this = env.borrow();
        if this.owns(id) {
            return this.vars[id.index()].binding.clone();
        }
        match &this.parent {
            Some(parent) => Environment::lookup_binding(parent, id),
            None => None,
        }
    }

    /// `bind(env, var_id, value)`: updates the binding if `var_id` exists
    /// in `env` (not parents), otherwise inserts a fresh record (§4.C).
    /// Returns the previous binding so the caller (the trail) can restore
    /// it on rollback, and the list of waiters to resume.
    pub fn raw_bind(&mut self, id: VarId, value: Value) -> (Option<Value>, Vec<SuspensionId>) {
        if !self.owns(id) {
            while self.vars.len() <= id.index() {
                let fresh_id = VarId::from_raw(self.vars.len() as u32);
                self.vars.push(LogicalVar::fresh(fresh_id));
            }
        }
        let previous = self.vars[id.index()].binding.take();
        self.vars[id.index()].binding = Some(value);
        let waiters = std::mem::take(&mut self.vars[id.index()].waiters);
        (previous, waiters)
    }

    /// Restores a binding that was in place before a trailed `Bind`
    /// (used by rollback). Does not touch waiters: waiters are re-derived
    /// from suspensions, which the trail restores separately.
    pub fn raw_restore(&mut self, id: VarId, previous: Option<Value>) {
        if self.owns(id) {
            self.vars[id.index()].binding = previous;
        }
    }

    pub fn add_waiter(&mut self, id: VarId, susp: SuspensionId) {
        if self.owns(id) {
            self.vars[id.index()].waiters.insert(0, susp);
        }
    }
}
