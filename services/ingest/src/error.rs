use thiserror::Error;

#[derive(Debug, Error)]
pub enum IngestError {
    #[error("codec: {0}")]
    Codec(#[from] dashcam_codec::CodecError),
    #[error("io: {0}")]
    Io(#[from] std::io::Error),
    #[error("db: {0}")]
    Db(#[from] sqlx::Error),
    #[error("bus: {0}")]
    Bus(#[from] tokio_tungstenite::tungstenite::Error),
    #[error("json: {0}")]
    Json(#[from] serde_json::Error),
}
