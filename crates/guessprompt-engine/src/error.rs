use thiserror::Error;

/// Fatal outcomes of one image generation attempt. None of these are retried
/// by the engine; the caller re-runs the whole flow.
#[derive(Debug, Error)]
pub enum GenerationError {
    #[error("image generation submit failed: {0}")]
    Submission(String),

    #[error("image generation status check failed: {0}")]
    StatusCheck(String),

    #[error("image generation failed: {0}")]
    GenerationFailed(String),

    #[error("image generation timed out after {attempts} attempts. Last status: {last_status}")]
    Timeout { attempts: u32, last_status: String },

    #[error("image result retrieval failed: {0}")]
    ResultRetrieval(String),

    #[error("could not find image URL in response. Response structure: {body}")]
    Extraction { body: String },
}
