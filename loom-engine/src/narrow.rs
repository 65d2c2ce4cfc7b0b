use crate::env::Environment;
use crate::suspend::{self, SuspensionKind};
use crate::trail::LinearTrail;
use crate::unify::{deref, unify};
use failure::Fallible;
use loom_ir::{ListValue, SymbolId, SymbolTable, Value, ValueKind, VarId};
use std::cell::RefCell;
use std::rc::Rc;

/// Result of attempting to narrow a call (§4.F).
pub enum NarrowOutcome {
    /// Enough arguments were ground to reduce; here is the result.
    Reduced(Value),
    /// Not enough information yet; these are the variables a retry should
    /// wait on.
    Suspended(Vec<VarId>),
    /// `name` is not one of this engine's built-ins. The caller (in
    /// `loom-solve`, which also owns the foreign registry) should try the
    /// foreign registry next, per §4.F step 1.
    Unknown,
    /// Arity mismatch or other hard failure.
    Failed,
}

/// The symbol ids of this engine's hard-coded built-ins (§4.F), interned
/// once at runtime startup so dispatch is an integer comparison rather
/// than a repeated string lookup. Copy because every environment in a
/// query shares the same table and the same three symbols.
#[derive(Copy, Clone)]
pub struct BuiltinRegistry {
    pub length: SymbolId,
    pub reverse: SymbolId,
    pub append: SymbolId,
}

impl BuiltinRegistry {
    pub fn new(table: &mut SymbolTable) -> Self {
        BuiltinRegistry {
            length: table.intern("length"),
            reverse: table.intern("reverse"),
            append: table.intern("append"),
        }
    }

    fn arity(&self, name: SymbolId) -> Option<usize> {
        if name == self.length {
            Some(2)
        } else if name == self.reverse {
            Some(2)
        } else if name == self.append {
            Some(3)
        } else {
            None
        }
    }
}

/// `narrow_call(name, args, env)` restricted to this engine's built-ins
/// (§4.F). Dispatch to the foreign registry is layered on top by
/// `loom-solve`, which is the crate that owns foreign functions.
pub fn narrow_call(
    name: SymbolId,
    args: &[Value],
    env: &Rc<RefCell<Environment>>,
    trail: &mut LinearTrail,
    builtins: &BuiltinRegistry,
) -> NarrowOutcome {
    let arity = match builtins.arity(name) {
        Some(a) => a,
        None => return NarrowOutcome::Unknown,
    };
    if args.len() != arity {
        return NarrowOutcome::Failed;
    }
    let derefed: Vec<Value> = args.iter().map(|a| deref(a, env)).collect();
    if name == builtins.length {
        narrow_length(&derefed, env)
    } else if name == builtins.reverse {
        narrow_reverse(&derefed, env)
    } else if name == builtins.append {
        narrow_append(&derefed, env, trail)
    } else {
        NarrowOutcome::Unknown
    }
}

fn as_ground_list(v: &Value) -> Option<&ListValue> {
    match &v.kind {
        ValueKind::List(l) => Some(l),
        _ => None,
    }
}

fn frontier_of(values: &[&Value]) -> Vec<VarId> {
    values.iter().filter_map(|v| v.as_logical_var()).collect()
}

/// `length(list, n)`: unifies `n` with the ground length of `list` once
/// `list` is ground (§4.F).
fn narrow_length(args: &[Value], _env: &Rc<RefCell<Environment>>) -> NarrowOutcome {
    match as_ground_list(&args[0]) {
        Some(list) => NarrowOutcome::Reduced(Value::integer(list.length as i64)),
        None => NarrowOutcome::Suspended(frontier_of(&[&args[0]])),
    }
}

/// `reverse(list, r)`: unifies `r` with element-reversed `list`.
fn narrow_reverse(args: &[Value], _env: &Rc<RefCell<Environment>>) -> NarrowOutcome {
    match as_ground_list(&args[0]) {
        Some(list) => {
            let mut elements = list.elements.clone();
            elements.reverse();
            NarrowOutcome::Reduced(Value::list(elements))
        }
        None => NarrowOutcome::Suspended(frontier_of(&[&args[0]])),
    }
}

/// Classic relational `append(xs, ys, zs)`: when `xs` is ground, reduces
/// directly. `loom-solve`'s resolver is responsible for the enumeration
/// case (non-ground `xs`) by trying successive splits of `zs` as
/// choice-point alternatives; this function only ever computes the
/// single deterministic direction, leaving enumeration (backtracking
/// search) to the resolver.
fn narrow_append(args: &[Value], env: &Rc<RefCell<Environment>>, trail: &mut LinearTrail) -> NarrowOutcome {
    let (xs, ys, zs) = (&args[0], &args[1], &args[2]);
    match as_ground_list(xs) {
        Some(xs_list) => {
            let ys_list = match as_ground_list(ys) {
                Some(l) => l.elements.clone(),
                None => return NarrowOutcome::Suspended(frontier_of(&[ys])),
            };
            let mut result = xs_list.elements.clone();
            result.extend(ys_list);
            let produced = Value::list(result);
            if unify(zs, &produced, env, trail) {
                NarrowOutcome::Reduced(produced)
            } else {
                NarrowOutcome::Failed
            }
        }
        None => NarrowOutcome::Suspended(frontier_of(&[xs])),
    }
}

/// Every way to split a ground list `zs` into `(xs, ys)` with
/// `xs ++ ys == zs`, in the order `append/3`'s relational semantics
/// enumerates them (shortest `xs` first): `([], zs)`, `([z0], zs[1..])`,
/// …, `(zs, [])`. Used by `loom-solve`'s resolver to drive choice points
/// when `append`'s first two arguments are unbound (§8 scenario 6).
pub fn append_splits(zs: &ListValue) -> Vec<(Vec<Value>, Vec<Value>)> {
    (0..=zs.elements.len())
        .map(|i| (zs.elements[..i].to_vec(), zs.elements[i..].to_vec()))
        .collect()
}

/// `apply_function(func, args, env)` (§4.B): partial application if not
/// enough arguments have arrived yet, otherwise invoke via narrowing.
/// Lives here rather than in `loom-ir` because invoking a reducible
/// function requires the narrowing engine.
pub fn apply_function(
    func_name: SymbolId,
    func_arity: usize,
    already_applied: &[Value],
    new_args: &[Value],
    env: &Rc<RefCell<Environment>>,
    trail: &mut LinearTrail,
    builtins: &BuiltinRegistry,
) -> Fallible<NarrowOutcome> {
    let total = already_applied.len() + new_args.len();
    if total > func_arity {
        return Err(failure::format_err!(
            "arity mismatch calling function: expected {}, got {}",
            func_arity,
            total
        ));
    }
    let mut all_args = already_applied.to_vec();
    all_args.extend_from_slice(new_args);
    if total < func_arity {
        return Ok(NarrowOutcome::Suspended(frontier_of(
            &all_args.iter().collect::<Vec<_>>(),
        )));
    }
    Ok(narrow_call(func_name, &all_args, env, trail, builtins))
}

/// Convenience used by the resolver when a narrowing reduction needs a
/// suspension registered instead of failing outright.
pub fn suspend_call(
    env: &Rc<RefCell<Environment>>,
    frontier: Vec<VarId>,
    name: SymbolId,
    args: Vec<Value>,
    result: Value,
) {
    suspend::add_call_suspension(env, SuspensionKind::Narrowing, frontier, name, args, result);
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn length_of_ground_list() {
        let env = Environment::new();
        let mut trail = LinearTrail::new();
        let mut table = SymbolTable::new();
        let builtins = BuiltinRegistry::new(&mut table);
        let list = Value::list(vec![Value::integer(10), Value::integer(20)]);
        let n = env.borrow_mut().fresh_var();
        let result = Value::logical_var(n);
        match narrow_call(builtins.length, &[list, result], &env, &mut trail, &builtins) {
            NarrowOutcome::Reduced(v) => match v.kind {
                ValueKind::Integer(2) => {}
                _ => panic!("expected 2"),
            },
            _ => panic!("expected a reduction"),
        }
    }

    #[test]
    fn reverse_of_ground_list() {
        let env = Environment::new();
        let mut trail = LinearTrail::new();
        let mut table = SymbolTable::new();
        let builtins = BuiltinRegistry::new(&mut table);
        let list = Value::list(vec![Value::integer(1), Value::integer(2)]);
        let r = env.borrow_mut().fresh_var();
        match narrow_call(builtins.reverse, &[list, Value::logical_var(r)], &env, &mut trail, &builtins) {
            NarrowOutcome::Reduced(v) => {
                let l = as_ground_list(&v).unwrap();
                assert_eq!(l.length, 2);
                match (&l.elements[0].kind, &l.elements[1].kind) {
                    (ValueKind::Integer(2), ValueKind::Integer(1)) => {}
                    _ => panic!("expected [2, 1]"),
                }
            }
            _ => panic!("expected a reduction"),
        }
    }

    #[test]
    fn append_reduces_when_first_arg_is_ground() {
        let env = Environment::new();
        let mut trail = LinearTrail::new();
        let mut table = SymbolTable::new();
        let builtins = BuiltinRegistry::new(&mut table);
        let xs = Value::list(vec![Value::integer(1), Value::integer(2)]);
        let ys = Value::list(vec![Value::integer(3)]);
        let z = env.borrow_mut().fresh_var();
        match narrow_call(builtins.append, &[xs, ys, Value::logical_var(z)], &env, &mut trail, &builtins) {
            NarrowOutcome::Reduced(v) => {
                let l = as_ground_list(&v).unwrap();
                assert_eq!(l.length, 3);
            }
            _ => panic!("expected a reduction"),
        }
    }

    #[test]
    fn append_splits_enumerates_every_partition() {
        let zs = ListValue::from_elements(vec![Value::integer(1), Value::integer(2)]);
        let splits = append_splits(&zs);
        assert_eq!(splits.len(), 3);
        assert_eq!(splits[0].0.len(), 0);
        assert_eq!(splits[2].0.len(), 2);
    }
}
