use meshcheck_services::{Network, ServiceId};
use tracing::{info, instrument};

use super::Harness;
use crate::error::{ScenarioError, Stage, StageError, StageExt as _};

/// Checks the validator set as seen by `reference`.
///
/// The set must be non-empty and name only live members.
#[instrument(skip(h, desired))]
pub(super) async fn run<N: Network>(
    mut h: Harness<N>,
    desired: impl IntoIterator<Item = ServiceId>,
    reference: ServiceId,
) -> Result<(), StageError> {
    h.register_network(desired).await.during(Stage::Initial)?;
    check(&h, reference).await.during(Stage::Initial)
}

async fn check<N: Network>(h: &Harness<N>, reference: ServiceId) -> Result<(), ScenarioError> {
    let client = h.client(reference)?;
    let validators = h.observer().validators(reference, client).await?;
    if validators.is_empty() {
        return Err(ScenarioError::Assertion(format!(
            "service {reference} reports no validators"
        )));
    }

    let members = h.membership();
    let members = members.identities();
    for validator in &validators {
        info!(id = %validator.id, stake = validator.stake_amount, "validator");
        if !members.contains(&validator.id) {
            return Err(ScenarioError::Assertion(format!(
                "service {reference} reports validator {} which is not a member",
                validator.id
            )));
        }
    }
    info!(count = validators.len(), "validator set verified");
    Ok(())
}
