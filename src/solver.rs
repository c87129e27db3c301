use core::any::TypeId;
use std::{collections::VecDeque, rc::Rc};

use cranelift_entity::PrimaryMap;
use miette::Report;
use rustc_hash::FxHashMap;

use crate::{
    analysis::{AnalysisId, BuildableDataFlowAnalysis, DataFlowAnalysis},
    anchor::{AnchorStore, GenericLatticeAnchor, LatticeAnchor},
    change_result::ChangeResult,
    config::DataFlowConfig,
    equivalence::EquivalenceClasses,
    ir::{Block, Function, Inst},
    point::ProgramPoint,
    state::{AnalysisState, BuildableAnalysisState, StateEntry},
};

/// A work item on the solver queue is a program point, child analysis pair.
///
/// Each item is processed by invoking the child analysis at the program point. Duplicates are
/// permitted in the queue; transfer functions are idempotent, so a duplicate visit is wasted work
/// but never a correctness problem.
#[derive(Copy, Clone, PartialEq, Eq, Debug)]
pub struct WorkItem {
    /// The dependent program point
    pub point: ProgramPoint,
    /// The dependent analysis
    pub analysis: AnalysisId,
}

/// The solver's work queue.
///
/// Items are consumed from the front. Ordinary dependency propagation inserts at the back, which
/// gives breadth-first fairness between unrelated updates; [push_front](Worklist::push_front) is
/// available to custom [on_update](crate::AnalysisState::on_update) implementations that want
/// certain items processed greedily, which can avoid quadratic blow-up for some propagation
/// patterns. Front insertion never affects the final fixpoint, only the order in which it is
/// reached, and items enqueued by a single update always retain their relative order.
#[derive(Default)]
pub struct Worklist {
    queue: VecDeque<WorkItem>,
}

impl Worklist {
    #[inline]
    pub fn push_back(&mut self, item: WorkItem) {
        self.queue.push_back(item);
    }

    #[inline]
    pub fn push_front(&mut self, item: WorkItem) {
        self.queue.push_front(item);
    }

    #[inline]
    pub fn pop_front(&mut self) -> Option<WorkItem> {
        self.queue.pop_front()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.queue.is_empty()
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.queue.len()
    }
}

/// Where the solver is in its lifecycle.
///
/// State mutation and propagation are only legal in the `Initializing` and `Iterating` phases.
#[derive(Copy, Clone, PartialEq, Eq, Debug)]
enum Phase {
    Idle,
    Initializing,
    Iterating,
    Drained,
}

/// The [DataFlowSolver] is responsible for running a collection of [DataFlowAnalysis]
/// implementations against a function, such that the analyses reach a fixpoint state.
///
/// To do so, it owns the storage for all analysis states, the store of uniqued lattice anchors,
/// the per-state-type anchor equivalence classes, and a dependency graph which is used to re-run
/// analyses affected by changes to states they depend on. Every analysis interacts with the
/// solver to create its own states and to request those of its dependencies, which is what lets
/// the solver reason about when changes require further re-analysis.
///
/// Steps to run a data-flow analysis:
///
/// 1. Load the analyses to run, via [load](Self::load) or [load_analysis](Self::load_analysis).
/// 2. Call [initialize_and_run](Self::initialize_and_run) with the top-level function.
/// 3. Query results via [lookup_state](Self::lookup_state).
///
/// To re-run after the IR changes, erase the states of every invalidated anchor with
/// [erase_state](Self::erase_state) (or wipe everything with
/// [erase_all_states](Self::erase_all_states)) and call `initialize_and_run` again; patching
/// stale states in place is not supported.
pub struct DataFlowSolver {
    /// Global configuration for the data-flow analysis being performed
    config: DataFlowConfig,
    phase: Phase,
    /// The queue of (point, analysis) pairs that must be (re-)visited due to state changes
    worklist: Worklist,
    /// The loaded analyses, in load order.
    ///
    /// Load order is initialization order, and the tie-break for re-visit priority when multiple
    /// analyses depend on the same state.
    child_analyses: PrimaryMap<AnalysisId, Rc<dyn DataFlowAnalysis>>,
    /// The analysis currently being initialized or visited, used to attribute dependency edges
    current_analysis: Option<AnalysisId>,
    /// Uniqued user-defined lattice anchors; owned by the solver for its whole lifetime
    anchors: AnchorStore,
    /// All analysis states, keyed by anchor and then by concrete state type.
    ///
    /// Each record also carries the dependency edges originating from that state; when a state
    /// changes, the recorded dependents are re-enqueued on the worklist.
    analysis_states: FxHashMap<LatticeAnchor, FxHashMap<TypeId, StateEntry>>,
    /// Anchor equivalence classes, one registry per state type.
    ///
    /// Anchors in the same class under a state type share a single storage slot (the class
    /// leader's), so all reads and writes of that type resolve through the leader.
    equivalent_anchors: FxHashMap<TypeId, EquivalenceClasses>,
}

impl Default for DataFlowSolver {
    fn default() -> Self {
        Self::new(Default::default())
    }
}

impl DataFlowSolver {
    /// Create a new solver instance with the provided configuration
    pub fn new(config: DataFlowConfig) -> Self {
        Self {
            config,
            phase: Phase::Idle,
            worklist: Worklist::default(),
            child_analyses: PrimaryMap::new(),
            current_analysis: None,
            anchors: AnchorStore::default(),
            analysis_states: FxHashMap::default(),
            equivalent_anchors: FxHashMap::default(),
        }
    }

    /// Access the current solver configuration
    #[inline]
    pub fn config(&self) -> &DataFlowConfig {
        &self.config
    }

    /// Returns true if the solver is initializing analyses or iterating to fixpoint
    #[inline]
    pub fn is_running(&self) -> bool {
        matches!(self.phase, Phase::Initializing | Phase::Iterating)
    }

    /// Load an analysis of type `A` into the solver, constructing it via
    /// [BuildableDataFlowAnalysis::new].
    ///
    /// # Panics
    ///
    /// This function will panic if you attempt to load new analyses while the solver is running.
    /// It is only permitted to load analyses before calling
    /// [initialize_and_run](Self::initialize_and_run), or after a call to that function has
    /// returned.
    pub fn load<A>(&mut self)
    where
        A: BuildableDataFlowAnalysis + 'static,
    {
        let analysis = <A as BuildableDataFlowAnalysis>::new(self);
        self.load_analysis(analysis);
    }

    /// Load `analysis` into the solver.
    ///
    /// Loaded analyses are initialized, and then re-visited as needed, in load order. Loading a
    /// second instance of an already-loaded analysis type is a no-op.
    ///
    /// # Panics
    ///
    /// This function will panic if you attempt to load new analyses while the solver is running.
    pub fn load_analysis<A>(&mut self, analysis: A)
    where
        A: DataFlowAnalysis + 'static,
    {
        assert!(
            !self.is_running(),
            "it is not permitted to load analyses while the solver is running!"
        );
        let type_id = analysis.analysis_id();
        let already_loaded =
            self.child_analyses.values().any(|loaded| loaded.analysis_id() == type_id);
        if !already_loaded {
            let id = self.child_analyses.push(Rc::new(analysis));
            log::debug!(
                target: "dataflow-solver",
                "loaded {} as {id}",
                self.child_analyses[id].debug_name(),
            );
        }
    }

    /// Run the solver on `function`.
    ///
    /// It is expected that the caller has loaded each analysis they wish to have applied. If no
    /// analyses have been loaded, this function logs a warning and returns `Ok` immediately.
    ///
    /// This first gives every analysis the opportunity to declare anchor equivalences, then
    /// initializes each loaded analysis in load order, and finally drains the worklist by
    /// invoking [DataFlowAnalysis::visit] on dequeued items until no work remains.
    ///
    /// When an analysis requires an analysis state at some anchor, it implicitly subscribes to
    /// changes made to that state by any analysis. When such changes occur, the dependents are
    /// re-enqueued and the process continues. For well-formed analyses, meaning transfer
    /// functions that are idempotent and monotonic over finite-height lattices, every state change moves
    /// strictly in one direction along the lattice order, so a re-enqueued analysis is guaranteed
    /// to observe a new, more-defined state, and the iteration must reach fixpoint in a bounded
    /// number of steps. The solver imposes no iteration limit and applies no widening of its own:
    /// termination is a correctness obligation of each analysis, and an analysis that never
    /// converges will loop forever.
    ///
    /// An error returned from any `initialize` or `visit` aborts the solve immediately and is
    /// propagated to the caller; states mutated before the failure remain mutated.
    #[track_caller]
    pub fn initialize_and_run(&mut self, function: &Function) -> Result<(), Report> {
        // If we have no analyses, there is nothing to do
        if self.child_analyses.is_empty() {
            // Log a warning when this happens, since the calling code might benefit from not
            // even instantiating the solver in the first place.
            let location = core::panic::Location::caller();
            log::warn!(target: "dataflow-solver", "dataflow solver was run without any loaded analyses at {location}");
            return Ok(());
        }

        if let Err(report) = self.analyze(function) {
            self.phase = Phase::Idle;
            return Err(report);
        }
        match self.run_to_fixpoint(function) {
            Ok(()) => {
                self.phase = Phase::Drained;
                Ok(())
            }
            Err(report) => {
                self.phase = Phase::Idle;
                Err(report)
            }
        }
    }

    /// Run the initial analysis of all loaded analyses.
    ///
    /// This is the point at which analyses are first applied to `function`, and is also when the
    /// initial dependency edges between analyses and analysis states are recorded. Once
    /// initialization is complete, every analysis has run exactly once, but some work items may
    /// already be queued due to dependencies on states which changed during initialization.
    fn analyze(&mut self, function: &Function) -> Result<(), Report> {
        log::debug!(target: "dataflow-solver", "initializing loaded analyses");
        self.phase = Phase::Initializing;

        let analyses = self
            .child_analyses
            .iter()
            .map(|(id, analysis)| (id, Rc::clone(analysis)))
            .collect::<Vec<_>>();

        // Equivalences must be declared before any state storage exists, so that every lookup
        // resolves through the final class leaders.
        for (id, analysis) in analyses.iter() {
            self.current_analysis = Some(*id);
            analysis.initialize_equivalent_lattice_anchors(function, self);
            self.current_analysis = None;
        }

        for (id, analysis) in analyses.iter() {
            self.current_analysis = Some(*id);
            log::debug!(target: analysis.debug_name(), "initializing analysis for {function}");
            let result = analysis.initialize(function, self);
            self.current_analysis = None;
            result?;
            log::debug!(target: analysis.debug_name(), "initialized successfully");
        }

        log::debug!(target: "dataflow-solver", "initialization complete");

        Ok(())
    }

    /// Consume work items until the queue is empty, re-applying the designated analysis at the
    /// designated program point for each.
    fn run_to_fixpoint(&mut self, function: &Function) -> Result<(), Report> {
        log::debug!(target: "dataflow-solver", "running queued dataflow analyses to fixpoint..");
        self.phase = Phase::Iterating;

        while let Some(WorkItem { point, analysis }) = self.worklist.pop_front() {
            let id = analysis;
            let analysis = Rc::clone(&self.child_analyses[id]);
            self.current_analysis = Some(id);
            log::debug!(target: analysis.debug_name(), "running analysis at {point}");
            let result = analysis.visit(point, function, self);
            self.current_analysis = None;
            result?;
        }

        Ok(())
    }

    /// Intern a user-defined lattice anchor with this solver.
    ///
    /// The resulting anchor is canonical: interning equal content again yields an equal
    /// [LatticeAnchor]. Anchors live as long as the solver.
    pub fn create_lattice_anchor<A>(&mut self, anchor: A) -> LatticeAnchor
    where
        A: GenericLatticeAnchor,
    {
        LatticeAnchor::Generic(self.anchors.get_anchor(anchor))
    }

    /// Access the store of uniqued user-defined anchors, e.g. to downcast one back to its
    /// concrete type
    #[inline]
    pub fn anchor_store(&self) -> &AnchorStore {
        &self.anchors
    }

    /// Get a program point just before `inst`
    pub fn get_program_point_before(&self, function: &Function, inst: Inst) -> ProgramPoint {
        ProgramPoint::before(function, inst)
    }

    /// Get a program point just after `inst`
    pub fn get_program_point_after(&self, function: &Function, inst: Inst) -> ProgramPoint {
        ProgramPoint::after(function, inst)
    }

    /// Get the program point at the start of `block`
    pub fn get_program_point_at_start_of(&self, block: Block) -> ProgramPoint {
        ProgramPoint::at_start_of(block)
    }

    /// Get the program point at the end of `block`
    pub fn get_program_point_at_end_of(&self, function: &Function, block: Block) -> ProgramPoint {
        ProgramPoint::at_end_of(function, block)
    }

    /// Look up the analysis state of type `T` attached to `anchor`, or `None` if no such state
    /// has been created.
    ///
    /// `None` means "no information": consumers must never treat it as an error. This does not
    /// create the state, and records no dependency edge.
    pub fn lookup_state<T>(&self, anchor: impl Into<LatticeAnchor>) -> Option<&T>
    where
        T: AnalysisState,
    {
        let anchor = self.get_leader_anchor_or_self::<T>(anchor.into());
        self.analysis_states
            .get(&anchor)?
            .get(&TypeId::of::<T>())?
            .state
            .downcast_ref::<T>()
    }

    /// Get the analysis state of type `T` attached to `anchor`, creating an uninitialized
    /// instance if none exists yet.
    ///
    /// No dependency edge is recorded: the current analysis is treated as an owner of the state,
    /// not a dependent of it, since subscribing a writer to its own changes would create a cyclic
    /// dependency on itself. Use [require_state](Self::require_state) for inputs.
    pub fn get_or_create_state<T>(&mut self, anchor: impl Into<LatticeAnchor>) -> &T
    where
        T: BuildableAnalysisState,
    {
        self.get_or_create_entry::<T>(anchor.into())
            .state
            .downcast_ref::<T>()
            .expect("analysis state type mismatch")
    }

    /// Get mutable access to the analysis state of type `T` attached to `anchor`, creating an
    /// uninitialized instance if none exists yet.
    ///
    /// This is the write path for transfer functions. Every mutation made through the returned
    /// reference must be followed by a call to [propagate_if_changed](Self::propagate_if_changed)
    /// before the current analysis invocation returns; failing to do so leaves dependents
    /// unaware of the change and is a precondition violation, not a supported usage.
    pub fn get_or_create_state_mut<T>(&mut self, anchor: impl Into<LatticeAnchor>) -> &mut T
    where
        T: BuildableAnalysisState,
    {
        self.get_or_create_entry::<T>(anchor.into())
            .state
            .downcast_mut::<T>()
            .expect("analysis state type mismatch")
    }

    /// Get the analysis state of type `T` attached to `anchor`, recording that the current
    /// analysis must be re-run at `dependent` whenever the state changes.
    ///
    /// This is the read path for transfer function inputs. If the state does not exist yet, an
    /// uninitialized instance is created; it won't be very useful now, but the recorded edge
    /// guarantees a re-visit once some analysis writes to it. No edge is recorded when `anchor`
    /// and `dependent` are equivalent under `T`, as the dependency would be a self-subscription.
    ///
    /// # Panics
    ///
    /// Panics if called while no analysis is being initialized or visited.
    pub fn require_state<T>(
        &mut self,
        anchor: impl Into<LatticeAnchor>,
        dependent: ProgramPoint,
    ) -> &T
    where
        T: BuildableAnalysisState,
    {
        let analysis = self
            .current_analysis
            .expect("require_state may only be called while an analysis is active");
        let anchor = anchor.into();
        let record_edge = !self.is_equivalent::<T>(anchor, LatticeAnchor::from(dependent));
        let entry = self.get_or_create_entry::<T>(anchor);
        if record_edge {
            entry.add_dependency(WorkItem {
                point: dependent,
                analysis,
            });
        }
        entry.state.downcast_ref::<T>().expect("analysis state type mismatch")
    }

    /// Record that `analysis` must be re-run at `point` whenever the `T` state at `anchor`
    /// changes, creating the state if it does not exist yet.
    ///
    /// Idempotent; re-inserting an existing edge preserves its original position.
    pub fn add_dependency<T>(
        &mut self,
        anchor: impl Into<LatticeAnchor>,
        point: ProgramPoint,
        analysis: AnalysisId,
    ) where
        T: BuildableAnalysisState,
    {
        self.get_or_create_entry::<T>(anchor.into()).add_dependency(WorkItem { point, analysis });
    }

    /// Propagate an update to the `T` state at `anchor`, if it changed.
    ///
    /// A no-op for [ChangeResult::Unchanged]. For [ChangeResult::Changed], the state's
    /// [on_update](AnalysisState::on_update) hook runs, which by default pushes every recorded
    /// dependent onto the back of the worklist.
    ///
    /// # Panics
    ///
    /// Panics if the solver is not initializing or iterating: outside the solve window there is
    /// nothing to consume the queued work, so propagation is a usage error. Also panics if no `T`
    /// state exists at `anchor`, which indicates the caller mutated a state it never created.
    pub fn propagate_if_changed<T>(
        &mut self,
        anchor: impl Into<LatticeAnchor>,
        changed: ChangeResult,
    ) where
        T: AnalysisState,
    {
        assert!(
            self.is_running(),
            "propagate_if_changed may only be called while the solver is initializing or iterating"
        );
        if !changed.is_changed() {
            return;
        }
        let anchor = self.get_leader_anchor_or_self::<T>(anchor.into());
        let Self {
            analysis_states,
            worklist,
            ..
        } = self;
        let entry = analysis_states
            .get(&anchor)
            .and_then(|states| states.get(&TypeId::of::<T>()))
            .unwrap_or_else(|| {
                panic!(
                    "cannot propagate {} at {anchor}: no such state exists",
                    core::any::type_name::<T>()
                )
            });
        log::trace!(
            target: "dataflow-solver",
            "state {:?} at {anchor} changed; enqueueing {} dependents",
            &entry.state,
            entry.dependents().len(),
        );
        entry.state.on_update(entry.dependents(), worklist);
    }

    /// Push a work item onto the back of the worklist
    #[inline]
    pub fn enqueue(&mut self, item: WorkItem) {
        self.worklist.push_back(item);
    }

    /// Push a work item onto the front of the worklist, to be processed greedily.
    ///
    /// See [Worklist] for when this is appropriate.
    #[inline]
    pub fn enqueue_front(&mut self, item: WorkItem) {
        self.worklist.push_front(item);
    }

    /// Declare that `a` and `b` necessarily hold identical `T` states, collapsing their storage
    /// onto a single slot.
    ///
    /// Must be called before any `T` state has been created for the involved anchors, typically
    /// from [DataFlowAnalysis::initialize_equivalent_lattice_anchors], as existing storage is
    /// not migrated retroactively.
    pub fn union_lattice_anchors<T>(
        &mut self,
        a: impl Into<LatticeAnchor>,
        b: impl Into<LatticeAnchor>,
    ) where
        T: AnalysisState,
    {
        self.equivalent_anchors
            .entry(TypeId::of::<T>())
            .or_default()
            .union(a.into(), b.into());
    }

    /// Returns true if `a` and `b` have been unioned under state type `T`
    pub fn is_equivalent<T>(
        &self,
        a: impl Into<LatticeAnchor>,
        b: impl Into<LatticeAnchor>,
    ) -> bool
    where
        T: AnalysisState,
    {
        self.equivalent_anchors
            .get(&TypeId::of::<T>())
            .is_some_and(|eq| eq.is_equivalent(a.into(), b.into()))
    }

    /// Resolve `anchor` to the leader of its equivalence class under state type `T`, or to
    /// itself if it belongs to no class
    pub fn get_leader_anchor_or_self<T>(&self, anchor: LatticeAnchor) -> LatticeAnchor
    where
        T: AnalysisState,
    {
        self.equivalent_anchors
            .get(&TypeId::of::<T>())
            .and_then(|eq| eq.find_leader(anchor))
            .unwrap_or(anchor)
    }

    /// Erase any analysis states attached to `anchor`, across all state types.
    ///
    /// For each equivalence class containing `anchor` where it is the class leader, the next
    /// member in insertion order is promoted to leader, inheriting the stored state for that
    /// state type, before `anchor` is removed from the class. This is the supported path for
    /// incremental re-analysis: erase every invalidated anchor, then re-run
    /// [initialize_and_run](Self::initialize_and_run).
    pub fn erase_state(&mut self, anchor: impl Into<LatticeAnchor>) {
        let anchor = anchor.into();
        let Self {
            analysis_states,
            equivalent_anchors,
            ..
        } = self;
        for (type_id, eq_class) in equivalent_anchors.iter_mut() {
            if !eq_class.contains(anchor) {
                continue;
            }
            if let Some(new_leader) = eq_class.erase(anchor) {
                // `anchor` led this class; hand its stored state to the promoted leader
                if let Some(entry) =
                    analysis_states.get_mut(&anchor).and_then(|states| states.remove(type_id))
                {
                    analysis_states.entry(new_leader).or_default().insert(*type_id, entry);
                }
            }
        }
        analysis_states.remove(&anchor);
        log::trace!(target: "dataflow-solver", "erased analysis states for {anchor}");
    }

    /// Erase all analysis states and equivalence classes, returning the solver to idle.
    ///
    /// Loaded analyses and interned anchors are retained.
    pub fn erase_all_states(&mut self) {
        self.analysis_states.clear();
        self.equivalent_anchors.clear();
        self.worklist.queue.clear();
        self.phase = Phase::Idle;
    }

    fn get_or_create_entry<T>(&mut self, anchor: LatticeAnchor) -> &mut StateEntry
    where
        T: BuildableAnalysisState,
    {
        let anchor = self.get_leader_anchor_or_self::<T>(anchor);
        self.analysis_states
            .entry(anchor)
            .or_default()
            .entry(TypeId::of::<T>())
            .or_insert_with(|| {
                log::trace!(
                    target: "dataflow-solver",
                    "creating {} state for {anchor}",
                    core::any::type_name::<T>(),
                );
                StateEntry::new(Box::new(T::uninitialized(anchor)))
            })
    }
}
