use core::ops::{BitAnd, BitAndAssign, BitOr, BitOrAssign};

/// A result type used to indicate whether a change happened to some analysis state.
///
/// Boolean operations on [ChangeResult] behave as though [ChangeResult::Changed] is truth: the
/// union (`|`) of any sequence of results is [ChangeResult::Changed] if at least one of them is,
/// while the intersection (`&`) is only [ChangeResult::Changed] if all of them are. Both operators
/// are associative and commutative, so it is safe to fold them over a set of updates in any order.
///
/// The type is marked `#[must_use]` because dropping a [ChangeResult] on the floor almost always
/// indicates a bug: an analysis that mutates state and discards the result will never notify the
/// solver via [propagate_if_changed](crate::DataFlowSolver::propagate_if_changed), and dependents
/// of that state will never be re-run.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
#[must_use]
pub enum ChangeResult {
    /// The state was updated with a new value
    Changed,
    /// The update had no effect on the state
    Unchanged,
}

impl ChangeResult {
    /// Returns true if this result represents a change
    #[inline(always)]
    pub const fn is_changed(&self) -> bool {
        matches!(self, Self::Changed)
    }
}

impl BitOr for ChangeResult {
    type Output = ChangeResult;

    #[inline]
    fn bitor(self, rhs: Self) -> Self::Output {
        match self {
            Self::Changed => Self::Changed,
            Self::Unchanged => rhs,
        }
    }
}

impl BitOrAssign for ChangeResult {
    #[inline]
    fn bitor_assign(&mut self, rhs: Self) {
        *self = *self | rhs;
    }
}

impl BitAnd for ChangeResult {
    type Output = ChangeResult;

    #[inline]
    fn bitand(self, rhs: Self) -> Self::Output {
        match self {
            Self::Unchanged => Self::Unchanged,
            Self::Changed => rhs,
        }
    }
}

impl BitAndAssign for ChangeResult {
    #[inline]
    fn bitand_assign(&mut self, rhs: Self) {
        *self = *self & rhs;
    }
}
