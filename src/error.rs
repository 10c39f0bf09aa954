use thiserror::Error;

#[derive(Debug, Error)]
pub enum SectionError {
    #[error("Input error: {0}")]
    Input(String),

    #[error("Geometry decode error: {0}")]
    GeometryDecode(String),

    #[error("Mesher error: {0}")]
    Mesher(String),

    #[error("Analysis error: {0}")]
    Analysis(String),

    #[error("Render error: {0}")]
    Render(String),

    #[error("Engine error: {0}")]
    Engine(String),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}
