/// Configuration for the data-flow solver and its child analyses.
///
/// The configuration is read-only once the solver has been constructed with it.
#[derive(Debug, Default, Clone)]
pub struct DataFlowConfig {
    /// Indicates whether analyses should operate interprocedurally
    interprocedural: bool,
}

impl DataFlowConfig {
    /// Get a new, default configuration
    #[inline]
    pub fn new() -> Self {
        Self::default()
    }

    #[inline(always)]
    pub const fn is_interprocedural(&self) -> bool {
        self.interprocedural
    }

    /// Set whether analyses should operate interprocedurally, i.e. enter callee bodies when
    /// available.
    ///
    /// This flag is advisory: the solver itself does not enforce it, each analysis decides how to
    /// honor it. Interprocedural analyses may be more precise, but also more expensive, as more
    /// states need to be computed and fixpoint convergence takes longer.
    pub fn set_interprocedural(&mut self, yes: bool) -> &mut Self {
        self.interprocedural = yes;
        self
    }
}
