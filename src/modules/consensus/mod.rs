pub mod validator;

pub use validator::{consensus_from, ConsensusOutcome, ConsensusValidator, Quote};
