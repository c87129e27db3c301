use core::any::{Any, TypeId};

use cranelift_entity::entity_impl;
use miette::Report;

use crate::{ir::Function, point::ProgramPoint, solver::DataFlowSolver};

/// A stable handle to an analysis loaded into a [DataFlowSolver].
///
/// Handles are assigned in load order, which is also the order in which analyses are initialized;
/// work items reference analyses through these handles rather than through pointers.
#[derive(Copy, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct AnalysisId(u32);
entity_impl!(AnalysisId, "analysis");

/// Base trait for all data-flow analyses.
///
/// A child analysis is expected to build an initial dependency graph (and optionally provide
/// initial states) when initialized, and to define a transfer function invoked when visiting
/// program points.
///
/// In classical data-flow analysis, the dependency graph is fixed and analyses define explicit
/// transfer functions between input and output states. In this framework the dependency graph can
/// grow during the analysis, and transfer functions are opaque: the solver does not know which
/// states a call to [visit](Self::visit) will update, which is what allows multiple analyses to
/// cooperate on the same states.
///
/// When an analysis queries an uninitialized state inside `visit`, it is expected to "bail out":
/// make no state updates and return `Ok(())`. The dependency recorded by the query guarantees the
/// analysis is re-invoked once some other analysis initializes that state.
///
/// Analyses do not hold a reference to their parent solver; the solver passes itself into every
/// entry point instead, which is the same relationship expressed in a form the borrow checker can
/// see through.
pub trait DataFlowAnalysis: Any {
    /// A short, stable name for this analysis, used as the log target when it runs
    fn debug_name(&self) -> &'static str;

    /// A unique identifier for this analysis implementation, used to deduplicate loads
    fn analysis_id(&self) -> TypeId {
        Any::type_id(self)
    }

    /// Initialize the analysis from the provided top-level function by building an initial
    /// dependency graph between all lattice anchors of interest.
    ///
    /// This is typically implemented by calling [visit](Self::visit) on every program point of
    /// interest once, as a static structural pass; every dependency edge the analysis will ever
    /// need must be establishable from here. An analysis can also seed initial values into
    /// certain states to influence the evolution of the solve.
    ///
    /// Returning an error aborts the entire solve.
    fn initialize(&self, function: &Function, solver: &mut DataFlowSolver) -> Result<(), Report>;

    /// Visit the given program point: the transfer function of this analysis.
    ///
    /// Invoked by the solver when a state this analysis depends on at `point` has been updated.
    /// The implementation queries input states (recording dependencies via
    /// [require_state](DataFlowSolver::require_state)), computes, writes output states, and
    /// propagates updates via [propagate_if_changed](DataFlowSolver::propagate_if_changed).
    ///
    /// `visit` must be idempotent and monotonic with respect to repeated invocation at the same
    /// point: given the same input states it must produce the same outputs, and given inputs that
    /// have only grown more defined, its outputs must not become less defined. These properties,
    /// together with finite-height lattices, are what guarantee the solve terminates; the solver
    /// imposes no iteration bound of its own.
    ///
    /// Returning an error aborts the entire solve.
    fn visit(
        &self,
        point: ProgramPoint,
        function: &Function,
        solver: &mut DataFlowSolver,
    ) -> Result<(), Report>;

    /// Declare lattice anchor equivalence classes before the main loop begins.
    ///
    /// Analyses that can prove certain anchors always hold identical facts under one of their
    /// state types may union them here, via
    /// [union_lattice_anchors](DataFlowSolver::union_lattice_anchors), collapsing storage and
    /// dependency tracking. This is strictly an optimization: it must never change the final
    /// fixpoint, and no analysis may rely on it for correctness.
    fn initialize_equivalent_lattice_anchors(
        &self,
        _function: &Function,
        _solver: &mut DataFlowSolver,
    ) {
    }
}

/// A [DataFlowAnalysis] which can be constructed directly by the solver, enabling the
/// [DataFlowSolver::load] convenience over [DataFlowSolver::load_analysis]
pub trait BuildableDataFlowAnalysis: DataFlowAnalysis + Sized {
    fn new(solver: &mut DataFlowSolver) -> Self;
}
