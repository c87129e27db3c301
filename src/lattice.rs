use core::fmt;

use crate::{
    anchor::LatticeAnchor,
    change_result::ChangeResult,
    state::{AnalysisState, BuildableAnalysisState},
};

/// This trait must be implemented for any value that exhibits the properties of a
/// [lattice](https://en.wikipedia.org/wiki/Lattice_(order)#Definition).
///
/// In data-flow analysis, virtually all lattices of interest are bounded: they have a most-minimal
/// value (under-specified, nothing known yet) and a most-maximal value (over-specified, conflict).
/// All valid values of the lattice are partially ordered with respect to these bounds, and the
/// `join`/`meet` operations compute least upper and greatest lower bounds respectively. Both must
/// be commutative, associative, and idempotent; these properties are what guarantee that a
/// worklist-driven solve reaches a fixpoint in a bounded number of steps, since every change to a
/// state moves it strictly in one direction along a finite-height order.
///
/// It is permitted to implement this trait for semi-lattices, i.e. values for which only one of
/// `join` or `meet` is well-defined; the implementation of the ill-defined operation should panic
/// rather than return a best guess, so that misuse is caught instead of silently corrupting an
/// analysis that relies on the semi-lattice properties.
pub trait LatticeLike: Clone + Eq + fmt::Debug + 'static {
    /// Joins `self` with `other`, producing the least upper bound of the two values
    fn join(&self, other: &Self) -> Self;

    /// Meets `self` with `other`, producing the greatest lower bound of the two values
    fn meet(&self, other: &Self) -> Self;
}

/// This type adapts a [LatticeLike] value for use as an [AnalysisState].
///
/// A fresh `Lattice<T>` is *uninitialized*: it holds no `T` at all, which is the caller-visible
/// marker required of every analysis state and is distinct from any lattice value, including the
/// lattice's bottom. The first join, meet, or [set](Lattice::set) initializes it.
pub struct Lattice<T> {
    anchor: LatticeAnchor,
    value: Option<T>,
}

impl<T: LatticeLike> Lattice<T> {
    pub fn new(anchor: LatticeAnchor, value: T) -> Self {
        Self {
            anchor,
            value: Some(value),
        }
    }

    /// Get the underlying lattice value, or `None` if this state is uninitialized
    #[inline]
    pub fn value(&self) -> Option<&T> {
        self.value.as_ref()
    }

    #[inline]
    pub fn is_uninitialized(&self) -> bool {
        self.value.is_none()
    }

    /// Overwrite the state with `value`, regardless of the current contents.
    ///
    /// This is intended for seeding entry states during analysis initialization; inside a
    /// transfer function, prefer [join_value](Self::join_value) or [meet_value](Self::meet_value)
    /// so that the monotonicity obligations are upheld.
    pub fn set(&mut self, value: T) -> ChangeResult {
        if self.value.as_ref() == Some(&value) {
            ChangeResult::Unchanged
        } else {
            self.value = Some(value);
            ChangeResult::Changed
        }
    }

    /// Joins `rhs` into the current value, initializing an uninitialized state to `rhs`
    pub fn join_value(&mut self, rhs: &T) -> ChangeResult {
        let Some(value) = self.value.as_ref() else {
            self.value = Some(rhs.clone());
            return ChangeResult::Changed;
        };
        let new_value = <T as LatticeLike>::join(value, rhs);
        debug_assert_eq!(
            <T as LatticeLike>::join(&new_value, value),
            new_value,
            "expected `join` to be monotonic"
        );
        debug_assert_eq!(
            <T as LatticeLike>::join(&new_value, rhs),
            new_value,
            "expected `join` to be monotonic"
        );
        if value == &new_value {
            ChangeResult::Unchanged
        } else {
            self.value = Some(new_value);
            ChangeResult::Changed
        }
    }

    /// Meets `rhs` into the current value, initializing an uninitialized state to `rhs`
    pub fn meet_value(&mut self, rhs: &T) -> ChangeResult {
        let Some(value) = self.value.as_ref() else {
            self.value = Some(rhs.clone());
            return ChangeResult::Changed;
        };
        let new_value = <T as LatticeLike>::meet(value, rhs);
        debug_assert_eq!(
            <T as LatticeLike>::meet(&new_value, value),
            new_value,
            "expected `meet` to be monotonic"
        );
        debug_assert_eq!(
            <T as LatticeLike>::meet(&new_value, rhs),
            new_value,
            "expected `meet` to be monotonic"
        );
        if value == &new_value {
            ChangeResult::Unchanged
        } else {
            self.value = Some(new_value);
            ChangeResult::Changed
        }
    }

    /// Joins another lattice state into this one.
    ///
    /// Joining with an uninitialized state is a no-op: an uninitialized input carries no
    /// information, and must not be confused with the lattice's bottom value.
    pub fn join(&mut self, rhs: &Self) -> ChangeResult {
        match rhs.value.as_ref() {
            Some(rhs) => self.join_value(rhs),
            None => ChangeResult::Unchanged,
        }
    }

    /// Meets another lattice state into this one; uninitialized inputs are a no-op
    pub fn meet(&mut self, rhs: &Self) -> ChangeResult {
        match rhs.value.as_ref() {
            Some(rhs) => self.meet_value(rhs),
            None => ChangeResult::Unchanged,
        }
    }
}

impl<T: fmt::Debug> fmt::Debug for Lattice<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.value.as_ref() {
            None => f.write_str("uninitialized"),
            Some(value) => fmt::Debug::fmt(value, f),
        }
    }
}

impl<T: fmt::Display> fmt::Display for Lattice<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.value.as_ref() {
            None => f.write_str("uninitialized"),
            Some(value) => fmt::Display::fmt(value, f),
        }
    }
}

impl<T: LatticeLike> AnalysisState for Lattice<T> {
    #[inline]
    fn anchor(&self) -> LatticeAnchor {
        self.anchor
    }
}

impl<T: LatticeLike> BuildableAnalysisState for Lattice<T> {
    fn uninitialized(anchor: LatticeAnchor) -> Self {
        Self {
            anchor,
            value: None,
        }
    }
}
