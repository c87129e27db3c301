use core::{
    any::{Any, TypeId},
    fmt,
    hash::{Hash, Hasher},
};

use cranelift_entity::{entity_impl, PrimaryMap};
use rustc_hash::{FxHashMap, FxHasher};
use smallvec::SmallVec;

use crate::{
    ir::{Function, SourceSpan, Value},
    point::ProgramPoint,
};

/// Object-safe equality, for comparing type-erased anchors.
///
/// Implemented automatically for any `PartialEq` type; comparison against a value of a different
/// concrete type is always false.
pub trait DynEq {
    fn dyn_eq(&self, other: &dyn Any) -> bool;
}

impl<T: PartialEq + Any> DynEq for T {
    fn dyn_eq(&self, other: &dyn Any) -> bool {
        other.downcast_ref::<T>().is_some_and(|other| self == other)
    }
}

/// Object-safe hashing, for hashing type-erased anchors.
///
/// Implemented automatically for any `Hash` type.
pub trait DynHash {
    fn dyn_hash(&self, state: &mut dyn Hasher);
}

impl<T: Hash> DynHash for T {
    fn dyn_hash(&self, mut state: &mut dyn Hasher) {
        self.hash(&mut state);
    }
}

/// An abstraction over user-defined lattice anchors.
///
/// In classical data-flow analysis, lattice anchors represent positions in a program to which
/// lattice elements are attached. Program points and SSA values are supported as first-class
/// anchors via [LatticeAnchor]; analyses that need to key a fact by something else, such as a
/// control flow edge or a symbol, define a type implementing this trait and intern it
/// with [AnchorStore::get_anchor] (typically via
/// [DataFlowSolver::create_lattice_anchor](crate::DataFlowSolver::create_lattice_anchor)).
///
/// The `PartialEq`/`Hash` obligations are discharged by the blanket [DynEq]/[DynHash] impls, so a
/// typical implementation only needs to provide [GenericLatticeAnchor::span]:
///
/// ```rust
/// use ir_dataflow::{GenericLatticeAnchor, ir::{Block, SourceSpan}};
///
/// #[derive(Debug, PartialEq, Eq, Hash)]
/// struct CfgEdge {
///     from: Block,
///     to: Block,
/// }
///
/// impl std::fmt::Display for CfgEdge {
///     fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
///         write!(f, "{} -> {}", self.from, self.to)
///     }
/// }
///
/// impl GenericLatticeAnchor for CfgEdge {
///     fn span(&self) -> SourceSpan {
///         SourceSpan::UNKNOWN
///     }
/// }
/// ```
pub trait GenericLatticeAnchor: Any + DynEq + DynHash + fmt::Debug + fmt::Display {
    /// Get a source location for this anchor, for use in diagnostics
    fn span(&self) -> SourceSpan;
}

impl dyn GenericLatticeAnchor {
    /// Attempt to downcast this anchor to a concrete type
    pub fn downcast_ref<A: GenericLatticeAnchor>(&self) -> Option<&A> {
        (self as &dyn Any).downcast_ref::<A>()
    }

    /// Returns true if this anchor is an instance of `A`
    pub fn is<A: GenericLatticeAnchor>(&self) -> bool {
        (self as &dyn Any).is::<A>()
    }
}

/// A stable handle to an interned [GenericLatticeAnchor] in an [AnchorStore]
#[derive(Copy, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct GenericAnchorId(u32);
entity_impl!(GenericAnchorId, "anchor");

/// A uniquing store for user-defined lattice anchors.
///
/// Interning the same content twice (same concrete type, equal value) yields the identical
/// [GenericAnchorId], so handle equality implies value equality and handles can be used directly
/// as map keys. Anchors are immutable once interned, and live as long as the store, which the
/// [DataFlowSolver](crate::DataFlowSolver) owns for its own lifetime, so handles never dangle
/// and anchors are never individually freed.
///
/// Anchors are stored in an arena and addressed by index rather than by pointer, so no uniquer
/// registration step is needed for new anchor types: the intern table discriminates concrete
/// types by their `TypeId` as part of the content hash.
#[derive(Default)]
pub struct AnchorStore {
    anchors: PrimaryMap<GenericAnchorId, Box<dyn GenericLatticeAnchor>>,
    /// Hash-consing table; buckets resolve collisions via type-aware deep equality
    interned: FxHashMap<u64, SmallVec<[GenericAnchorId; 1]>>,
}

impl AnchorStore {
    /// Get the canonical handle for `anchor`, interning it if it has not been seen before
    pub fn get_anchor<A: GenericLatticeAnchor>(&mut self, anchor: A) -> GenericAnchorId {
        let hash = {
            let mut hasher = FxHasher::default();
            TypeId::of::<A>().hash(&mut hasher);
            anchor.dyn_hash(&mut hasher);
            hasher.finish()
        };
        if let Some(bucket) = self.interned.get(&hash) {
            for &id in bucket.iter() {
                if self.anchors[id].dyn_eq(&anchor as &dyn Any) {
                    return id;
                }
            }
        }
        let id = self.anchors.push(Box::new(anchor));
        log::trace!(target: "dataflow-solver", "interned lattice anchor {id}: {}", &self.anchors[id]);
        self.interned.entry(hash).or_default().push(id);
        id
    }

    /// Get the type-erased anchor for `id`
    #[inline]
    pub fn anchor(&self, id: GenericAnchorId) -> &dyn GenericLatticeAnchor {
        self.anchors[id].as_ref()
    }

    /// Get the anchor for `id` as a concrete type, or `None` if it is of a different type
    pub fn downcast<A: GenericLatticeAnchor>(&self, id: GenericAnchorId) -> Option<&A> {
        self.anchors[id].as_ref().downcast_ref::<A>()
    }

    /// The number of distinct anchors interned so far
    #[inline]
    pub fn len(&self) -> usize {
        self.anchors.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.anchors.is_empty()
    }
}

/// The universal key under which analysis state is stored.
///
/// This is a closed sum over the three kinds of location a data-flow fact can attach to: a
/// program point (dense analyses), an SSA value (sparse analyses), or an interned user-defined
/// anchor. The default is the distinguished [LatticeAnchor::Invalid] variant, which no properly
/// constructed state is ever attached to.
#[derive(Default, Copy, Clone, PartialEq, Eq, Hash)]
pub enum LatticeAnchor {
    /// The null anchor; the default, and never a valid key
    #[default]
    Invalid,
    /// A program point
    Point(ProgramPoint),
    /// An SSA value
    Value(Value),
    /// An interned user-defined anchor
    Generic(GenericAnchorId),
}

impl LatticeAnchor {
    #[inline]
    pub fn is_valid(&self) -> bool {
        !matches!(self, Self::Invalid)
    }

    #[inline]
    pub fn is_value(&self) -> bool {
        matches!(self, Self::Value(_))
    }

    pub fn as_value(&self) -> Option<Value> {
        match self {
            Self::Value(value) => Some(*value),
            _ => None,
        }
    }

    #[inline]
    pub fn is_program_point(&self) -> bool {
        matches!(self, Self::Point(_))
    }

    pub fn as_program_point(&self) -> Option<ProgramPoint> {
        match self {
            Self::Point(point) => Some(*point),
            _ => None,
        }
    }

    pub fn as_generic(&self) -> Option<GenericAnchorId> {
        match self {
            Self::Generic(id) => Some(*id),
            _ => None,
        }
    }

    /// Get a source location for this anchor, for use in diagnostics.
    ///
    /// Dispatches to the active variant's own location accessor.
    pub fn span(&self, function: &Function, store: &AnchorStore) -> SourceSpan {
        match self {
            Self::Invalid => SourceSpan::UNKNOWN,
            Self::Point(point) => point.span(function),
            Self::Value(value) => function.value_span(*value),
            Self::Generic(id) => store.anchor(*id).span(),
        }
    }
}

impl From<ProgramPoint> for LatticeAnchor {
    fn from(point: ProgramPoint) -> Self {
        Self::Point(point)
    }
}

impl From<Value> for LatticeAnchor {
    fn from(value: Value) -> Self {
        Self::Value(value)
    }
}

impl From<GenericAnchorId> for LatticeAnchor {
    fn from(id: GenericAnchorId) -> Self {
        Self::Generic(id)
    }
}

impl fmt::Display for LatticeAnchor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Invalid => f.write_str("<invalid>"),
            Self::Point(point) => fmt::Display::fmt(point, f),
            Self::Value(value) => fmt::Display::fmt(value, f),
            Self::Generic(id) => fmt::Display::fmt(id, f),
        }
    }
}

impl fmt::Debug for LatticeAnchor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(self, f)
    }
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::*;
    use crate::ir::Block;

    #[derive(Debug, PartialEq, Eq, Hash)]
    struct CfgEdge {
        from: Block,
        to: Block,
    }

    impl fmt::Display for CfgEdge {
        fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
            write!(f, "{} -> {}", self.from, self.to)
        }
    }

    impl GenericLatticeAnchor for CfgEdge {
        fn span(&self) -> SourceSpan {
            SourceSpan::UNKNOWN
        }
    }

    #[derive(Debug, PartialEq, Eq, Hash)]
    struct Symbol(&'static str);

    impl fmt::Display for Symbol {
        fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
            f.write_str(self.0)
        }
    }

    impl GenericLatticeAnchor for Symbol {
        fn span(&self) -> SourceSpan {
            SourceSpan::UNKNOWN
        }
    }

    fn edge(from: u32, to: u32) -> CfgEdge {
        CfgEdge {
            from: Block::from_u32(from),
            to: Block::from_u32(to),
        }
    }

    #[test]
    fn interning_identical_content_yields_identical_handles() {
        let mut store = AnchorStore::default();
        let a = store.get_anchor(edge(0, 1));
        let b = store.get_anchor(edge(0, 1));
        assert_eq!(a, b);
        assert_eq!(store.len(), 1);
    }

    #[test]
    fn interning_distinct_content_yields_distinct_handles() {
        let mut store = AnchorStore::default();
        let a = store.get_anchor(edge(0, 1));
        let b = store.get_anchor(edge(1, 0));
        assert_ne!(a, b);
        assert_eq!(store.len(), 2);
    }

    #[test]
    fn interning_discriminates_between_anchor_types() {
        let mut store = AnchorStore::default();
        let a = store.get_anchor(edge(0, 1));
        let b = store.get_anchor(Symbol("main"));
        assert_ne!(a, b);
        assert!(store.downcast::<CfgEdge>(a).is_some());
        assert!(store.downcast::<Symbol>(a).is_none());
        assert_eq!(store.downcast::<Symbol>(b), Some(&Symbol("main")));
    }

    #[test]
    fn anchors_convert_into_lattice_anchors() {
        let mut store = AnchorStore::default();
        let id = store.get_anchor(Symbol("main"));
        let anchor = LatticeAnchor::from(id);
        assert_eq!(anchor.as_generic(), Some(id));
        assert!(!anchor.is_value());
        assert!(!anchor.is_program_point());
        assert!(anchor.is_valid());
        assert!(!LatticeAnchor::default().is_valid());
    }
}
