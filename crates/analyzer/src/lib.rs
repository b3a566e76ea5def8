//! Static and dynamic analysis built on top of `proxyscope-vm`: driving a
//! synthetic call to classify a contract as a proxy (component C8),
//! reconstructing its implementation history (C9), and — separately from
//! any one emulation run — extracting storage/selector facts by pure
//! static analysis (C10-C12).

pub mod cfg;
pub mod classifier;
pub mod errors;
pub mod historian;
pub mod structural;
pub mod tracer;

pub use classifier::{classify, ProxyClassification};
pub use errors::ClassifyError;
pub use historian::Historian;
pub use structural::{analyze as analyze_structure, ContractFacts, StructuralAnalysis};
