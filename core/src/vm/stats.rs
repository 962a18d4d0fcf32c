use serde::Serialize;

/// Counters maintained by the interpreter. Cheap plain integers: the VM is
/// driven through `&mut self`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct VmStats {
    pub sends: u64,
    pub quickenings: u64,
    pub eager_misses: u64,
    pub cache_hits: u64,
    pub cache_misses: u64,
    pub megamorphic_sends: u64,
    pub dnu_reports: u64,
    pub closures_created: u64,
    pub frames_created: u64,
    pub non_local_returns: u64,
    pub escaped_blocks: u64,
    pub restarts: u64,
    pub back_edges: u64,
}
