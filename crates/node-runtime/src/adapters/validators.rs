//! Static validator set

use pbft_consensus::{ValidatorSet, ValidatorSetProvider};

/// Validator set fixed at startup
pub struct StaticValidatorProvider {
    set: ValidatorSet,
}

impl StaticValidatorProvider {
    pub fn new(set: ValidatorSet) -> Self {
        Self { set }
    }
}

impl ValidatorSetProvider for StaticValidatorProvider {
    fn validator_set(&self) -> Result<ValidatorSet, String> {
        Ok(self.set.clone())
    }
}
