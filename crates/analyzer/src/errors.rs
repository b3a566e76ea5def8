//! Error taxonomy for the analysis layer, surfaced in
//! [`crate::classifier::ProxyClassification::error`] (spec.md §7).

use proxyscope_common::ExplorerError;
use proxyscope_vm::VMError;

#[derive(Debug, thiserror::Error)]
pub enum ClassifyError {
    #[error("no bytecode at the requested address/block")]
    NoBytecode,

    #[error("explorer: {0}")]
    Explorer(#[from] ExplorerError),

    #[error("vm: {0}")]
    Vm(#[from] VMError),
}
