//! Method catalog: scalar methods, properties and aggregates
//!
//! Every schema exposes a [`MethodCatalog`]. Methods are registered with
//! explicit parameter and return types; resolution picks an exact match
//! first and falls back to an assignable match (Integer widens to Real).

pub mod aggregate;
pub mod scalar;

use std::collections::HashMap;

use lazy_static::lazy_static;

use crate::error::{Error, ErrorCode, Result};
use crate::types::ColumnType;

pub use aggregate::{Accumulator, AccumulatorFactory};
pub use scalar::ScalarFunc;

// ============================================================================
// Signatures
// ============================================================================

/// What calling a resolved method does
#[derive(Debug, Clone)]
pub enum MethodKind {
    /// Plain function of its arguments
    Scalar(ScalarFunc),
    /// Zero-argument value usable as a bare identifier
    Property(ScalarFunc),
    /// Reads the group's accumulator; `accumulator` names the companion
    /// method called once per row
    AggregateRead { accumulator: String },
}

/// A method callable from a query and producing a value
#[derive(Debug, Clone)]
pub struct MethodSignature {
    pub name: String,
    pub params: Vec<ColumnType>,
    pub ret: ColumnType,
    pub kind: MethodKind,
}

impl MethodSignature {
    pub fn is_aggregate(&self) -> bool {
        matches!(self.kind, MethodKind::AggregateRead { .. })
    }

    /// Companion accumulate method name, for aggregates
    pub fn accumulator(&self) -> Option<&str> {
        match &self.kind {
            MethodKind::AggregateRead { accumulator } => Some(accumulator),
            _ => None,
        }
    }
}

/// The per-row half of an aggregate
#[derive(Debug, Clone)]
pub struct AccumulatorSignature {
    pub name: String,
    pub params: Vec<ColumnType>,
    pub factory: AccumulatorFactory,
}

// ============================================================================
// Catalog
// ============================================================================

/// Registered methods, keyed by case-insensitive name
#[derive(Debug, Clone, Default)]
pub struct MethodCatalog {
    methods: HashMap<String, Vec<MethodSignature>>,
    accumulators: HashMap<String, Vec<AccumulatorSignature>>,
}

impl MethodCatalog {
    pub fn new() -> Self {
        MethodCatalog::default()
    }

    fn insert_method(&mut self, sig: MethodSignature) -> &mut Self {
        let overloads = self.methods.entry(sig.name.to_lowercase()).or_default();
        overloads.retain(|existing| {
            existing.params != sig.params || existing.is_aggregate() != sig.is_aggregate()
        });
        overloads.push(sig);
        self
    }

    pub fn register_scalar(
        &mut self,
        name: &str,
        params: &[ColumnType],
        ret: ColumnType,
        func: ScalarFunc,
    ) -> &mut Self {
        self.insert_method(MethodSignature {
            name: name.to_string(),
            params: params.to_vec(),
            ret,
            kind: MethodKind::Scalar(func),
        })
    }

    pub fn register_property(&mut self, name: &str, ret: ColumnType, func: ScalarFunc) -> &mut Self {
        self.insert_method(MethodSignature {
            name: name.to_string(),
            params: Vec::new(),
            ret,
            kind: MethodKind::Property(func),
        })
    }

    /// Register the read half of an aggregate.
    ///
    /// `params` are the argument types without the value being aggregated;
    /// `accumulator` names the companion registered with
    /// [`register_accumulator`](Self::register_accumulator).
    pub fn register_aggregate(
        &mut self,
        name: &str,
        params: &[ColumnType],
        ret: ColumnType,
        accumulator: &str,
    ) -> &mut Self {
        self.insert_method(MethodSignature {
            name: name.to_string(),
            params: params.to_vec(),
            ret,
            kind: MethodKind::AggregateRead {
                accumulator: accumulator.to_string(),
            },
        })
    }

    /// Register the per-row half of an aggregate; `params` are all arguments
    pub fn register_accumulator(
        &mut self,
        name: &str,
        params: &[ColumnType],
        factory: AccumulatorFactory,
    ) -> &mut Self {
        let overloads = self.accumulators.entry(name.to_lowercase()).or_default();
        overloads.retain(|existing| existing.params != params);
        overloads.push(AccumulatorSignature {
            name: name.to_string(),
            params: params.to_vec(),
            factory,
        });
        self
    }

    /// Copy every registration of `other` into this catalog
    pub fn extend(&mut self, other: &MethodCatalog) -> &mut Self {
        for sig in other.methods.values().flatten() {
            self.insert_method(sig.clone());
        }
        for acc in other.accumulators.values().flatten() {
            self.register_accumulator(&acc.name, &acc.params, acc.factory);
        }
        self
    }

    /// Resolve a scalar method for the given argument types
    pub fn resolve_method(&self, name: &str, args: &[ColumnType]) -> Result<&MethodSignature> {
        let candidates = self
            .overloads(name)
            .filter(|sig| matches!(sig.kind, MethodKind::Scalar(_)));
        select_overload(name, candidates, |sig| sig.params.as_slice(), args)?.ok_or_else(|| {
            Error::with_message(
                ErrorCode::NotFound,
                format!("method {}({}) was not found", name, type_list(args)),
            )
        })
    }

    /// Resolve the read half of an aggregate, if `name` is one.
    ///
    /// `args` excludes the aggregated (last) argument.
    pub fn try_resolve_aggregate(
        &self,
        name: &str,
        args: &[ColumnType],
    ) -> Result<Option<&MethodSignature>> {
        let candidates = self.overloads(name).filter(|sig| sig.is_aggregate());
        select_overload(name, candidates, |sig| sig.params.as_slice(), args)
    }

    /// Resolve an accumulate method for all of the aggregate's arguments
    pub fn resolve_accumulator(
        &self,
        name: &str,
        args: &[ColumnType],
    ) -> Result<&AccumulatorSignature> {
        let candidates = self
            .accumulators
            .get(&name.to_lowercase())
            .into_iter()
            .flatten();
        select_overload(name, candidates, |acc| acc.params.as_slice(), args)?.ok_or_else(|| {
            Error::with_message(
                ErrorCode::NotFound,
                format!("accumulate method {}({}) was not found", name, type_list(args)),
            )
        })
    }

    /// Zero-argument property named `name`
    pub fn resolve_property(&self, name: &str) -> Option<&MethodSignature> {
        self.overloads(name)
            .find(|sig| matches!(sig.kind, MethodKind::Property(_)))
    }

    /// Is any overload of `name` an aggregate?
    pub fn is_aggregate(&self, name: &str) -> bool {
        self.overloads(name).any(MethodSignature::is_aggregate)
    }

    fn overloads(&self, name: &str) -> impl Iterator<Item = &MethodSignature> {
        self.methods.get(&name.to_lowercase()).into_iter().flatten()
    }
}

/// Exact match first, then a unique assignable match.
fn select_overload<'a, T, I, F>(
    name: &str,
    candidates: I,
    params: F,
    args: &[ColumnType],
) -> Result<Option<&'a T>>
where
    I: Iterator<Item = &'a T>,
    F: Fn(&T) -> &[ColumnType],
{
    let arity: Vec<&T> = candidates
        .filter(|c| params(*c).len() == args.len())
        .collect();

    if let Some(exact) = arity.iter().find(|c| params(**c) == args) {
        return Ok(Some(*exact));
    }

    let assignable: Vec<&T> = arity
        .into_iter()
        .filter(|c| params(*c).iter().zip(args).all(|(p, a)| p.accepts(*a)))
        .collect();

    match assignable.len() {
        0 => Ok(None),
        1 => Ok(Some(assignable[0])),
        _ => Err(Error::with_message(
            ErrorCode::Ambiguous,
            format!("call {}({}) matches more than one overload", name, type_list(args)),
        )),
    }
}

fn type_list(args: &[ColumnType]) -> String {
    args.iter().map(|t| t.name()).collect::<Vec<_>>().join(", ")
}

// ============================================================================
// Standard Library
// ============================================================================

lazy_static! {
    /// Methods every bundled schema exposes
    pub static ref STANDARD_LIBRARY: MethodCatalog = standard_library();
}

fn standard_library() -> MethodCatalog {
    use aggregate::*;
    use scalar::*;
    use crate::types::ColumnType::{Boolean, Integer, Real, Text};

    let mut catalog = MethodCatalog::new();
    catalog
        .register_scalar("ToUpper", &[Text], Text, func_to_upper)
        .register_scalar("ToLower", &[Text], Text, func_to_lower)
        .register_scalar("Length", &[Text], Integer, func_length)
        .register_scalar("Trim", &[Text], Text, func_trim)
        .register_scalar("Substring", &[Text, Integer, Integer], Text, func_substring)
        .register_scalar("Concat", &[Text, Text], Text, func_concat)
        .register_scalar("Contains", &[Text, Text], Boolean, func_contains)
        .register_scalar("Abs", &[Integer], Integer, func_abs)
        .register_scalar("Abs", &[Real], Real, func_abs)
        .register_scalar("Round", &[Real, Integer], Real, func_round)
        .register_scalar("ToString", &[Integer], Text, func_to_string)
        .register_scalar("ToString", &[Real], Text, func_to_string)
        .register_scalar("ToString", &[Boolean], Text, func_to_string)
        .register_scalar("ToInt", &[Text], Integer, func_to_int)
        .register_scalar("ToReal", &[Integer], Real, func_to_real)
        .register_property("Pi", Real, func_pi);

    catalog
        .register_aggregate("Count", &[], Integer, "SetCount")
        .register_aggregate("Sum", &[], Real, "SetSum")
        .register_aggregate("Avg", &[], Real, "SetAvg")
        .register_aggregate("Min", &[], Real, "SetMin")
        .register_aggregate("Max", &[], Real, "SetMax")
        .register_aggregate("AggregateValues", &[], Text, "SetAggregateValues");

    for ty in [Integer, Real, Text, Boolean] {
        catalog.register_accumulator("SetCount", &[ty], new_count);
        catalog.register_accumulator("SetAggregateValues", &[ty], new_aggregate_values);
    }
    catalog
        .register_accumulator("SetSum", &[Real], new_sum)
        .register_accumulator("SetAvg", &[Real], new_avg)
        .register_accumulator("SetMin", &[Real], new_min)
        .register_accumulator("SetMax", &[Real], new_max);

    catalog
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::ColumnType::{Integer, Real, Text};
    use crate::types::Value;

    #[test]
    fn test_exact_match_preferred() {
        let sig = STANDARD_LIBRARY.resolve_method("Abs", &[Integer]).unwrap();
        assert_eq!(sig.ret, Integer);
        let sig = STANDARD_LIBRARY.resolve_method("abs", &[Real]).unwrap();
        assert_eq!(sig.ret, Real);
    }

    #[test]
    fn test_assignable_match() {
        let sig = STANDARD_LIBRARY.resolve_method("Round", &[Integer, Integer]).unwrap();
        assert_eq!(sig.params, vec![Real, Integer]);
    }

    #[test]
    fn test_unknown_method() {
        let err = STANDARD_LIBRARY.resolve_method("NoSuchMethod", &[Text]).unwrap_err();
        assert_eq!(err.code, ErrorCode::NotFound);
        let err = STANDARD_LIBRARY.resolve_method("ToUpper", &[Integer]).unwrap_err();
        assert_eq!(err.code, ErrorCode::NotFound);
    }

    #[test]
    fn test_ambiguous_assignable_match() {
        fn noop(_: &[Value]) -> Result<Value> {
            Ok(Value::Integer(0))
        }
        let mut catalog = MethodCatalog::new();
        catalog
            .register_scalar("Pick", &[Real, Integer], Integer, noop)
            .register_scalar("Pick", &[Integer, Real], Integer, noop);
        let err = catalog.resolve_method("Pick", &[Integer, Integer]).unwrap_err();
        assert_eq!(err.code, ErrorCode::Ambiguous);
    }

    #[test]
    fn test_aggregate_pair() {
        let read = STANDARD_LIBRARY.try_resolve_aggregate("Sum", &[]).unwrap().unwrap();
        assert_eq!(read.accumulator(), Some("SetSum"));
        let acc = STANDARD_LIBRARY.resolve_accumulator("SetSum", &[Integer]).unwrap();
        assert_eq!(acc.params, vec![Real]);
        assert!(STANDARD_LIBRARY.try_resolve_aggregate("ToUpper", &[]).unwrap().is_none());
        assert!(STANDARD_LIBRARY.is_aggregate("count"));
    }

    #[test]
    fn test_property() {
        let pi = STANDARD_LIBRARY.resolve_property("Pi").unwrap();
        assert_eq!(pi.ret, Real);
        assert!(STANDARD_LIBRARY.resolve_property("ToUpper").is_none());
    }

    #[test]
    fn test_extend_overrides() {
        fn shout(_: &[Value]) -> Result<Value> {
            Ok(Value::from("!"))
        }
        let mut custom = MethodCatalog::new();
        custom.register_scalar("ToUpper", &[Text], Text, shout);
        let mut catalog = STANDARD_LIBRARY.clone();
        catalog.extend(&custom);
        let sig = catalog.resolve_method("ToUpper", &[Text]).unwrap();
        match sig.kind {
            MethodKind::Scalar(f) => assert_eq!(f(&[Value::from("a")]).unwrap(), Value::from("!")),
            _ => panic!("expected scalar"),
        }
    }
}
