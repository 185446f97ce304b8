use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Error)]
pub enum DomainError {
    #[error("invalid hex string: {0}")]
    InvalidHex(String),

    #[error("invalid address: {0}")]
    InvalidAddress(String),

    #[error("outcard too short ({0} bytes)")]
    OutcardTooShort(usize),

    #[error("outcard payload is not valid utf-8")]
    OutcardEncoding,

    #[error("malformed json outcard: {0}")]
    OutcardJson(String),

    #[error("score function parse error at {position}: {message}")]
    ScoreParse { position: usize, message: String },

    #[error("score function evaluation failed: {0}")]
    ScoreEval(String),
}
