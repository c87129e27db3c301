use core::{any::Any, fmt};

use smallvec::SmallVec;

use crate::{
    anchor::LatticeAnchor,
    solver::{WorkItem, Worklist},
};

/// Base abstraction for analysis states: data-flow facts that are attached to lattice anchors and
/// which evolve as the analysis iterates.
///
/// This trait places no restrictions on the semantics of analysis states beyond the following:
///
/// 1. Querying the state of a lattice anchor prior to any analysis writing to that anchor yields
///    the state's distinguished "uninitialized" representation (see
///    [BuildableAnalysisState::uninitialized]), which must be distinct from any payload value.
///    Analyses must be prepared to observe uninitialized states and bail out.
/// 2. Analysis states can reach fixpoints, where subsequent updates will never trigger a change
///    in the state.
/// 3. Every mutation of a state's payload must be followed by a call to
///    [propagate_if_changed](crate::DataFlowSolver::propagate_if_changed) before the current
///    analysis invocation returns. Mutating a state without propagating is a precondition
///    violation: the state's dependents will never be re-run, and the solve will silently
///    converge on stale results.
///
/// For lattice-shaped states, prefer the ready-made [Lattice](crate::Lattice) adapter over
/// implementing this trait directly.
pub trait AnalysisState: Any + fmt::Debug {
    /// Returns the lattice anchor this state is attached to.
    ///
    /// Never [LatticeAnchor::Invalid] for a state created through the solver.
    fn anchor(&self) -> LatticeAnchor;

    /// Called by the solver when this state has changed, to enqueue more work items.
    ///
    /// The default behavior enqueues every recorded dependent of this state. Implementations that
    /// track additional dependents through the IR (e.g. use-def chains) can override this to push
    /// those as well, but must retain the base behavior for the explicitly recorded dependents.
    fn on_update(&self, dependents: &[WorkItem], worklist: &mut Worklist) {
        for &item in dependents {
            worklist.push_back(item);
        }
    }
}

impl dyn AnalysisState {
    /// Attempt to downcast this state to a concrete type
    pub fn downcast_ref<T: AnalysisState>(&self) -> Option<&T> {
        (self as &dyn Any).downcast_ref::<T>()
    }

    /// Attempt to downcast this state to a concrete type, mutably
    pub fn downcast_mut<T: AnalysisState>(&mut self) -> Option<&mut T> {
        (self as &mut dyn Any).downcast_mut::<T>()
    }
}

/// An [AnalysisState] which the solver can default-construct on first use.
///
/// The value produced by [uninitialized](Self::uninitialized) is the state observed by any
/// analysis that queries an anchor before anything has been written to it.
pub trait BuildableAnalysisState: AnalysisState + Sized {
    fn uninitialized(anchor: LatticeAnchor) -> Self;
}

/// The record the solver keeps per (anchor, state type) pair: the state itself, plus the
/// dependency edges originating from it.
///
/// An entry `state -> (point, analysis)` is created when `analysis` requires `state` while
/// updating `point`; when the state later changes, all recorded dependents are re-enqueued.
/// The list is ordered-unique: edges are appended in first-insertion order and never reordered,
/// which keeps re-visit order deterministic, and they are never removed except by erasing the
/// whole state.
pub(crate) struct StateEntry {
    pub state: Box<dyn AnalysisState>,
    dependents: SmallVec<[WorkItem; 4]>,
}

impl StateEntry {
    pub fn new(state: Box<dyn AnalysisState>) -> Self {
        Self {
            state,
            dependents: SmallVec::new(),
        }
    }

    /// Record that `item` must be re-run when this state changes.
    ///
    /// Idempotent: inserting an already-recorded dependent is a no-op, preserving the position of
    /// the first insertion.
    pub fn add_dependency(&mut self, item: WorkItem) {
        if !self.dependents.contains(&item) {
            self.dependents.push(item);
        }
    }

    pub fn dependents(&self) -> &[WorkItem] {
        &self.dependents
    }
}
