mod coordinator;
mod error;
mod retry;

pub use coordinator::{
    Attribution, Coordinator, DeployConfig, DeployOutcome, DeployRequest, DEFAULT_MAX_ATTEMPTS,
};
pub use error::DeployError;
pub use retry::{retry_on_conflict, Attempt, RetryError};

#[cfg(test)]
mod tests;
