use crate::env::Environment;
use crate::narrow::{self, NarrowOutcome};
use crate::trail::LinearTrail;
use crate::unify::unify;
use loom_ir::{SuspensionId, SymbolId, Value, VarId};
use std::cell::RefCell;
use std::rc::Rc;
use tracing::trace;

/// §3's suspension types.
#[derive(Copy, Clone, PartialEq, Eq, Debug)]
pub enum SuspensionKind {
    Unification,
    FunctionCall,
    Narrowing,
    Constraint,
    Arithmetic,
}

/// A `Constraint`/`Arithmetic` suspension is owned in meaning by
/// `loom-solve`'s constraint store, which this crate cannot name without
/// a dependency cycle. It plugs in through this trait instead — the same
/// escape hatch `TrailAction` uses for consumption/production.
pub trait Resumable {
    /// Attempt to make progress now that (at least one of) its
    /// dependencies changed. Returns `true` if the suspension resolved
    /// and should be dropped, `false` if it must remain suspended.
    fn fire(&mut self, env: &Rc<RefCell<Environment>>, trail: &mut LinearTrail) -> bool;
}

enum Computation {
    /// Re-run a stashed unification once its variables are bound.
    Unification { left: Value, right: Value },
    /// Re-run a delayed narrowing/function call; `result` is the slot the
    /// reduced value must be unified with.
    Call {
        name: SymbolId,
        args: Vec<Value>,
        result: Value,
    },
    External(Box<dyn Resumable>),
}

/// A paused computation gated on one or more variables becoming bound
/// (§3, §4.F). Per §9's design note, the computation is encoded as data
/// (`Computation`) that `fire` interprets, never as a raw callback.
pub struct Suspension {
    pub kind: SuspensionKind,
    pub dependent_vars: Vec<VarId>,
    computation: Computation,
    pub active: bool,
}

impl Suspension {
    fn all_bound(&self, env: &Rc<RefCell<Environment>>) -> bool {
        self.dependent_vars
            .iter()
            .all(|v| Environment::lookup_binding(env, *v).is_some())
    }
}

/// `add_suspension(var, susp)`: prepends the suspension to the variable's
/// waiter list (§3), so that suspensions fire in LIFO order of attachment
/// (§5 ordering guarantee (b)). This variant stashes a delayed
/// unification; see `add_call_suspension`/`add_external_suspension` for
/// the other two `Computation` shapes.
pub fn add_suspension(
    env: &Rc<RefCell<Environment>>,
    dependent_vars: Vec<VarId>,
    left: Value,
    right: Value,
) -> SuspensionId {
    push_suspension(
        env,
        SuspensionKind::Unification,
        dependent_vars,
        Computation::Unification { left, right },
    )
}

pub fn add_call_suspension(
    env: &Rc<RefCell<Environment>>,
    kind: SuspensionKind,
    dependent_vars: Vec<VarId>,
    name: SymbolId,
    args: Vec<Value>,
    result: Value,
) -> SuspensionId {
    push_suspension(env, kind, dependent_vars, Computation::Call { name, args, result })
}

pub fn add_external_suspension(
    env: &Rc<RefCell<Environment>>,
    kind: SuspensionKind,
    dependent_vars: Vec<VarId>,
    resumable: Box<dyn Resumable>,
) -> SuspensionId {
    push_suspension(env, kind, dependent_vars, Computation::External(resumable))
}

fn push_suspension(
    env: &Rc<RefCell<Environment>>,
    kind: SuspensionKind,
    dependent_vars: Vec<VarId>,
    computation: Computation,
) -> SuspensionId {
    let mut env_mut = env.borrow_mut();
    let id = SuspensionId::from_raw(env_mut.suspensions.len() as u32);
    env_mut.suspensions.push(Suspension {
        kind,
        dependent_vars: dependent_vars.clone(),
        computation,
        active: true,
    });
    drop(env_mut);
    for v in dependent_vars {
        env.borrow_mut().add_waiter(v, id);
    }
    id
}

/// `resume(var_id, env)`: called after a binding, for every suspension
/// that was waiting on the newly-bound variable (§4.F). Filters out
/// inactive/completed suspensions; the survivors become the variable's
/// new waiter set implicitly, since `raw_bind` already drained the old
/// waiter list before calling this.
pub fn wake_all(env: &Rc<RefCell<Environment>>, trail: &mut LinearTrail, waiters: Vec<SuspensionId>) {
    for id in waiters {
        fire_one(env, trail, id);
    }
}

fn fire_one(env: &Rc<RefCell<Environment>>, trail: &mut LinearTrail, id: SuspensionId) {
    let idx = id.index();
    let ready = {
        let env_ref = env.borrow();
        match env_ref.suspensions.get(idx) {
            Some(s) if s.active => s.all_bound(env),
            _ => return,
        }
    };
    if !ready {
        // Still not all bound; leave it inactive-on-this-var but let it
        // be re-attached by whichever dependency fires last. Re-register
        // on every still-unbound dependency so it is found again.
        let still_waiting: Vec<VarId> = {
            let env_ref = env.borrow();
            env_ref.suspensions[idx]
                .dependent_vars
                .iter()
                .copied()
                .filter(|v| Environment::lookup_binding(env, *v).is_none())
                .collect()
        };
        for v in still_waiting {
            env.borrow_mut().add_waiter(v, id);
        }
        return;
    }

    trace!(?id, "firing suspension");
    // Take the suspension out so we can call back into `env`/`trail`
    // without holding a borrow across the call.
    let kind = env.borrow().suspensions[idx].kind;
    let resolved = {
        let mut env_mut = env.borrow_mut();
        let susp = &mut env_mut.suspensions[idx];
        match &mut susp.computation {
            Computation::Unification { left, right } => {
                let (l, r) = (left.clone(), right.clone());
                drop(env_mut);
                unify(&l, &r, env, trail)
            }
            Computation::External(resumable) => {
                let mut resumable = std::mem::replace(resumable, Box::new(NoopResumable));
                drop(env_mut);
                let done = resumable.fire(env, trail);
                if !done {
                    env.borrow_mut().suspensions[idx].computation = Computation::External(resumable);
                }
                done
            }
            Computation::Call { name, args, result } => {
                let (name, args, result) = (*name, args.clone(), result.clone());
                let builtins = env_mut.builtins();
                drop(env_mut);
                match narrow::narrow_call(name, &args, env, trail, &builtins) {
                    NarrowOutcome::Reduced(value) => unify(&result, &value, env, trail),
                    NarrowOutcome::Suspended(frontier) => {
                        env.borrow_mut().suspensions[idx].active = false;
                        add_call_suspension(env, kind, frontier, name, args, result);
                        true
                    }
                    NarrowOutcome::Failed => false,
                    NarrowOutcome::Unknown => false,
                }
            }
        }
    };
    if resolved {
        if let Some(s) = env.borrow_mut().suspensions.get_mut(idx) {
            s.active = false;
        }
    }
}

struct NoopResumable;
impl Resumable for NoopResumable {
    fn fire(&mut self, _env: &Rc<RefCell<Environment>>, _trail: &mut LinearTrail) -> bool {
        true
    }
}
