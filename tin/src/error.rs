use thiserror::Error;

#[derive(Error, Debug)]
pub enum TinError {
    #[error("triangulation needs at least 3 vertices, got {0}")]
    NotEnoughVertices(usize),

    #[error("all {0} vertices are collinear or coincident")]
    Degenerate(usize),

    #[error("non-finite coordinate ({0}, {1})")]
    NonFinite(f64, f64),
}
