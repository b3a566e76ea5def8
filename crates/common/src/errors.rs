/// Error class 5 from spec.md §7: transport/protocol failure reaching the
/// chain. This is the only error class that aborts an entire
/// classification rather than just the frame/probe that triggered it.
#[derive(Debug, thiserror::Error)]
pub enum ExplorerError {
    #[error("transport error: {0}")]
    Transport(String),
    #[error("malformed response: {0}")]
    Decode(String),
    #[error("RPC error {code}: {message}")]
    Rpc { code: i64, message: String },
}
