pub mod completion;
pub mod config;
pub mod decoys;
pub mod dryrun;
pub mod error;
pub mod fallback;
pub mod poller;
pub mod round;
pub mod transport;

#[cfg(test)]
mod testing;

pub use completion::CompletionClient;
pub use config::{
    resolve_api_key, CompletionConfig, InferenceConfig, PollSettings, TransportConfig,
};
pub use decoys::{parse_decoy_lines, DecoySynthesizer};
pub use dryrun::{dryrun_image_data_url, DryrunTransport};
pub use error::GenerationError;
pub use fallback::fallback_decoys;
pub use poller::{JobPoller, PollOutcome};
pub use round::RoundHandler;
pub use transport::{HttpReply, HttpTransport, ReqwestTransport};
