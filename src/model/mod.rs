mod generator;
pub mod loader;
mod local;
mod remote;
mod types;

pub use generator::Generator;
pub use local::LocalGenerator;
pub(crate) use local::run_blocking;
pub use remote::{EMBEDDED_SCRIPT, RemoteGenerator};
pub use types::{GenerationRequest, GenerationResult, ModelConfig, SamplingParams};
