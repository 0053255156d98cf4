use thiserror::Error;

/// Failures of the layout pipeline. Structural variants mean the input graph
/// does not match the structural assumptions of the algorithm; they abort the
/// layout and are never patched over. `PatternNotRecognized` is the one
/// recoverable case, downgraded to a diagnostic unless
/// `exception_if_pattern_not_handled` is set.
#[derive(Debug, Error)]
pub enum LayoutError {
    #[error("empty node list for {0} block")]
    EmptyBlock(&'static str),

    #[error("nodes of {kind} primary block not consistent: {detail}")]
    PrimaryNotConsistent { kind: &'static str, detail: String },

    #[error("unconsistent chaining of sub-blocks")]
    UnconsistentChaining,

    #[error("parallel sub-blocks do not share both extremities")]
    ParallelExtremityMismatch,

    #[error("unable to identify legs of intern cell {cell}")]
    LegsNotIdentified { cell: usize },

    #[error("pattern not recognized for cell {cell}")]
    PatternNotRecognized { cell: usize },

    #[error("list of nodes incoherent with the connected extern cells")]
    IncoherentShuntNodes,

    #[error("undefined block does not support horizontal layout")]
    UnsupportedHorizontalLayout,
}
