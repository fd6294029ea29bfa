mod cycles;
mod graph;
mod invocation;

pub use cycles::{detect_cycles, Cycle, CycleType};
pub use graph::{CallGraph, CallGraphBuilder, GraphMetrics, InvocationCounts, WorkflowNode};
pub use invocation::{
    normalize_posix, InvocationEdge, InvocationKind, InvocationRecord, InvocationResolver,
};
