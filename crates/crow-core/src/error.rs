/// A shared, crate-agnostic error for plumbing that doesn't need its own
/// enum (the registrar source, config loading, the id store).
#[derive(Debug, thiserror::Error)]
pub enum CrowError {
    #[error("discovery source unreachable: {0}")]
    SourceUnreachable(String),
}

pub type CrowResult<T> = Result<T, CrowError>;
