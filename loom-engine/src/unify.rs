use crate::env::Environment;
use crate::trail::LinearTrail;
use loom_ir::{Value, ValueKind, VarId};
use std::cell::RefCell;
use std::rc::Rc;
use tracing::trace;

/// Chases variable bindings to the first non-`LogicalVar` cell or an
/// unbound variable, without mutating the trail (§3, §4.E).
pub fn deref(value: &Value, env: &Rc<RefCell<Environment>>) -> Value {
    match value.as_logical_var() {
        Some(id) => match Environment::lookup_binding(env, id) {
            Some(bound) => deref(&bound, env),
            None => value.clone(),
        },
        None => value.clone(),
    }
}

/// Verifies that `var` is not being bound to a term that contains it
/// (§3's acyclicity invariant, §4.E step 2).
fn occurs(var: VarId, value: &Value, env: &Rc<RefCell<Environment>>) -> bool {
    let value = deref(value, env);
    match &value.kind {
        ValueKind::LogicalVar(id) => *id == var,
        ValueKind::List(list) => list.elements.iter().any(|e| occurs(var, e, env)),
        ValueKind::Record(fields) => fields.iter().any(|(_, v)| occurs(var, v, env)),
        ValueKind::Compound { args, .. } => args.iter().any(|a| occurs(var, a, env)),
        ValueKind::Function(f) | ValueKind::PartialApp(f) => {
            f.partial_args.iter().any(|a| occurs(var, a, env))
        }
        ValueKind::Integer(_)
        | ValueKind::Float(_)
        | ValueKind::String(_)
        | ValueKind::Atom(_)
        | ValueKind::Suspension(_) => false,
    }
}

fn bind(var: VarId, value: Value, env: &Rc<RefCell<Environment>>, trail: &mut LinearTrail) -> bool {
    if occurs(var, &value, env) {
        trace!(?var, "occurs check failed");
        return false;
    }
    let (previous, waiters) = env.borrow_mut().raw_bind(var, value.clone());
    trail.record_bind(env, var, previous);
    let sink = env.borrow().constraint_sink();
    if let Some(sink) = sink {
        sink.borrow_mut().on_bind(var, &value, env, trail);
    }
    crate::suspend::wake_all(env, trail, waiters);
    true
}

fn unify_pairwise(
    xs: &[Value],
    ys: &[Value],
    env: &Rc<RefCell<Environment>>,
    trail: &mut LinearTrail,
) -> bool {
    xs.len() == ys.len() && xs.iter().zip(ys.iter()).all(|(a, b)| unify(a, b, env, trail))
}

fn unify_records(
    xs: &[(loom_ir::SymbolId, Value)],
    ys: &[(loom_ir::SymbolId, Value)],
    env: &Rc<RefCell<Environment>>,
    trail: &mut LinearTrail,
) -> bool {
    // §4.E case 5: every field present in one must be present in the
    // other with a unifiable value, and neither side may have extras.
    if xs.len() != ys.len() {
        return false;
    }
    xs.iter().all(|(name, xv)| match ys.iter().find(|(n, _)| n == name) {
        Some((_, yv)) => unify(xv, yv, env, trail),
        None => false,
    })
}

/// `unify(v1, v2, env) -> bool` per §4.E's seven cases. Failures do not
/// roll back entries written during the attempt; callers wrap calls in a
/// checkpoint (see `loom-solve::resolve`) and roll back on failure.
pub fn unify(v1: &Value, v2: &Value, env: &Rc<RefCell<Environment>>, trail: &mut LinearTrail) -> bool {
    let a = deref(v1, env);
    let b = deref(v2, env);
    match (&a.kind, &b.kind) {
        (ValueKind::LogicalVar(x), ValueKind::LogicalVar(y)) if x == y => true,
        (ValueKind::LogicalVar(x), _) => bind(*x, b.clone(), env, trail),
        (_, ValueKind::LogicalVar(y)) => bind(*y, a.clone(), env, trail),
        (ValueKind::Integer(x), ValueKind::Integer(y)) => x == y,
        (ValueKind::Float(x), ValueKind::Float(y)) => x == y,
        (ValueKind::String(x), ValueKind::String(y)) => x == y,
        (ValueKind::Atom(x), ValueKind::Atom(y)) => x == y,
        (ValueKind::List(x), ValueKind::List(y)) => {
            x.length == y.length && unify_pairwise(&x.elements, &y.elements, env, trail)
        }
        (ValueKind::Record(x), ValueKind::Record(y)) => unify_records(x, y, env, trail),
        (
            ValueKind::Compound {
                functor: f1,
                args: a1,
                type_id: t1,
            },
            ValueKind::Compound {
                functor: f2,
                args: a2,
                type_id: t2,
            },
        ) => {
            let types_ok = match (t1, t2) {
                (Some(t1), Some(t2)) => t1.compatible(t2),
                (None, None) => true,
                _ => false,
            };
            f1 == f2 && types_ok && unify_pairwise(a1, a2, env, trail)
        }
        _ => false,
    }
}

/// `can_unify(v1, v2, env)`: the same walk without binding, used by the
/// resolver for look-ahead (§4.E). Implemented by running `unify` against
/// a scratch trail/checkpoint and rolling back unconditionally, so the
/// two never drift out of sync.
pub fn can_unify(v1: &Value, v2: &Value, env: &Rc<RefCell<Environment>>, trail: &mut LinearTrail) -> bool {
    let cp = trail.checkpoint();
    let ok = unify(v1, v2, env, trail);
    trail.rollback(cp);
    ok
}

/// `is_ground(value, env)` (§4.B): true if no unbound `LogicalVar` occurs
/// anywhere in `value`'s structure, after dereferencing.
pub fn is_ground(value: &Value, env: &Rc<RefCell<Environment>>) -> bool {
    let value = deref(value, env);
    match &value.kind {
        ValueKind::LogicalVar(_) => false,
        ValueKind::List(list) => list.elements.iter().all(|e| is_ground(e, env)),
        ValueKind::Record(fields) => fields.iter().all(|(_, v)| is_ground(v, env)),
        ValueKind::Compound { args, .. } => args.iter().all(|a| is_ground(a, env)),
        ValueKind::Function(f) | ValueKind::PartialApp(f) => f.partial_args.iter().all(|a| is_ground(a, env)),
        ValueKind::Integer(_) | ValueKind::Float(_) | ValueKind::String(_) | ValueKind::Atom(_) | ValueKind::Suspension(_) => true,
    }
}

/// `deep_copy(value, env)` (§4.B): an unconsumed structural copy of
/// `value` with every logical variable replaced by a fresh one in `env`.
/// Ground atomic values are returned unchanged (copying an `i64` gains
/// nothing); compounds, lists, and records recurse so that sharing is
/// broken all the way down.
pub fn deep_copy(value: &Value, env: &Rc<RefCell<Environment>>, fresh: &mut std::collections::HashMap<VarId, VarId>) -> Value {
    let value = deref(value, env);
    match &value.kind {
        ValueKind::LogicalVar(id) => {
            let copy = *fresh.entry(*id).or_insert_with(|| env.borrow_mut().fresh_var());
            Value::logical_var(copy)
        }
        ValueKind::List(list) => Value::list(list.elements.iter().map(|e| deep_copy(e, env, fresh)).collect()),
        ValueKind::Record(fields) => {
            Value::record(fields.iter().map(|(name, v)| (*name, deep_copy(v, env, fresh))).collect())
        }
        ValueKind::Compound { functor, args, type_id } => {
            Value::compound(*functor, args.iter().map(|a| deep_copy(a, env, fresh)).collect(), *type_id)
        }
        ValueKind::Integer(_) | ValueKind::Float(_) | ValueKind::String(_) | ValueKind::Atom(_) | ValueKind::Suspension(_) => {
            value.clone()
        }
        ValueKind::Function(f) | ValueKind::PartialApp(f) => {
            let mut copy = f.clone();
            copy.partial_args = copy.partial_args.iter().map(|a| deep_copy(a, env, fresh)).collect();
            match &value.kind {
                ValueKind::Function(_) => Value::function(copy),
                _ => Value::partial_app(copy),
            }
        }
    }
}

/// Alias used at the boundary between a linear context and a
/// `bundle_spawn`'d task's own copy of a shared value (§5's
/// shared-resource policy): spawning a task must not let it observe
/// future bindings made against the spawner's variables.
#[inline]
pub fn copy_for_sharing(value: &Value, env: &Rc<RefCell<Environment>>, fresh: &mut std::collections::HashMap<VarId, VarId>) -> Value {
    deep_copy(value, env, fresh)
}
