//! A generic, fixpoint-based data-flow analysis framework for IR-based compilers.
//!
//! The centerpiece is the [DataFlowSolver], which hosts any number of cooperating
//! [DataFlowAnalysis] implementations and iterates them over a function until every
//! [AnalysisState] reaches fixpoint. States attach to [LatticeAnchor]s: program points, SSA
//! values, or arbitrary user-defined keys interned with the solver. Dependencies between states
//! and analyses are discovered dynamically as analyses query each other's states, so analyses
//! written independently compose without knowing about one another.
//!
//! See [DataFlowSolver] for the lifecycle, and [DataFlowAnalysis] for the contract transfer
//! functions must uphold.

mod analysis;
mod anchor;
mod change_result;
mod config;
mod equivalence;
pub mod ir;
mod lattice;
mod point;
mod solver;
mod state;

pub use self::{
    analysis::{AnalysisId, BuildableDataFlowAnalysis, DataFlowAnalysis},
    anchor::{
        AnchorStore, DynEq, DynHash, GenericAnchorId, GenericLatticeAnchor, LatticeAnchor,
    },
    change_result::ChangeResult,
    config::DataFlowConfig,
    equivalence::EquivalenceClasses,
    lattice::{Lattice, LatticeLike},
    point::ProgramPoint,
    solver::{DataFlowSolver, WorkItem, Worklist},
    state::{AnalysisState, BuildableAnalysisState},
};
