use itertools::izip;
use loom_ir::{SymbolId, Value, ValueKind};
use rustc_hash::FxHashMap;

/// The fixed set of marshallable argument/return shapes (§4.J); there is
/// no general FFI type system here, only the handful of signatures a
/// native function is allowed to have.
#[derive(Copy, Clone, PartialEq, Eq, Debug)]
pub enum ParamKind {
    Void,
    Int,
    Long,
    Double,
    String,
    Pointer,
}

/// A Rust closure standing in for a call into a pre-existing native
/// library (marshalling itself is out of scope, per §1; this registry
/// only fixes the calling convention a closure must honor).
pub type ForeignImpl = Box<dyn Fn(&[Value]) -> Result<Value, failure::Error>>;

pub struct ForeignEntry {
    pub name: SymbolId,
    pub return_kind: ParamKind,
    pub param_kinds: Vec<ParamKind>,
    pub consumes_args: bool,
    implementation: ForeignImpl,
}

/// §4.J: populated once at `init_runtime` time via `register_foreign`,
/// never through dynamic loading (`libloading`/`dlopen`), per the design
/// note in §9 about avoiding a dynamic FFI dependency.
#[derive(Default)]
pub struct ForeignRegistry {
    entries: FxHashMap<SymbolId, ForeignEntry>,
}

impl ForeignRegistry {
    pub fn new() -> Self {
        ForeignRegistry::default()
    }

    pub fn register(
        &mut self,
        name: SymbolId,
        return_kind: ParamKind,
        param_kinds: Vec<ParamKind>,
        consumes_args: bool,
        implementation: ForeignImpl,
    ) {
        self.entries.insert(
            name,
            ForeignEntry {
                name,
                return_kind,
                param_kinds,
                consumes_args,
                implementation,
            },
        );
    }

    pub fn is_registered(&self, name: SymbolId) -> bool {
        self.entries.contains_key(&name)
    }

    pub fn consumes_args(&self, name: SymbolId) -> bool {
        self.entries.get(&name).map_or(false, |e| e.consumes_args)
    }

    /// §4.J `call` steps 1-6: look up the entry, check arity and that
    /// every argument's runtime kind matches its declared `ParamKind`,
    /// invoke, then check the result against `return_kind`.
    pub fn call(&self, name: SymbolId, args: &[Value]) -> Result<Value, failure::Error> {
        let entry = self
            .entries
            .get(&name)
            .ok_or_else(|| failure::format_err!("unknown foreign function"))?;
        if args.len() != entry.param_kinds.len() {
            return Err(failure::format_err!(
                "foreign call arity mismatch: expected {}, got {}",
                entry.param_kinds.len(),
                args.len()
            ));
        }
        for (position, arg, kind) in izip!(0.., args.iter(), &entry.param_kinds) {
            if !kind_matches(arg, *kind) {
                return Err(failure::format_err!("foreign call argument {} kind mismatch", position));
            }
        }
        let result = (entry.implementation)(args)?;
        if !kind_matches(&result, entry.return_kind) {
            return Err(failure::format_err!("foreign call returned an unexpected kind"));
        }
        Ok(result)
    }
}

fn kind_matches(value: &Value, kind: ParamKind) -> bool {
    match (kind, &value.kind) {
        (ParamKind::Void, _) => true,
        (ParamKind::Int, ValueKind::Integer(_)) => true,
        (ParamKind::Long, ValueKind::Integer(_)) => true,
        (ParamKind::Double, ValueKind::Float(_)) => true,
        (ParamKind::String, ValueKind::String(_)) => true,
        (ParamKind::Pointer, ValueKind::Atom(_)) => true,
        _ => false,
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use loom_ir::SymbolTable;

    #[test]
    fn registered_int_to_int_round_trips() {
        let mut table = SymbolTable::new();
        let negate = table.intern("negate");
        let mut registry = ForeignRegistry::new();
        registry.register(
            negate,
            ParamKind::Int,
            vec![ParamKind::Int],
            false,
            Box::new(|args| match args[0].kind {
                ValueKind::Integer(n) => Ok(Value::integer(-n)),
                _ => Err(failure::format_err!("expected an integer")),
            }),
        );
        let result = registry.call(negate, &[Value::integer(4)]).unwrap();
        match result.kind {
            ValueKind::Integer(-4) => {}
            _ => panic!("expected -4"),
        }
    }

    #[test]
    fn unknown_name_is_an_error() {
        let registry = ForeignRegistry::new();
        let mut table = SymbolTable::new();
        let ghost = table.intern("ghost");
        assert!(registry.call(ghost, &[]).is_err());
    }

    #[test]
    fn wrong_arity_is_rejected() {
        let mut table = SymbolTable::new();
        let identity = table.intern("identity");
        let mut registry = ForeignRegistry::new();
        registry.register(
            identity,
            ParamKind::Int,
            vec![ParamKind::Int],
            false,
            Box::new(|args| Ok(args[0].clone())),
        );
        assert!(registry.call(identity, &[]).is_err());
    }
}
