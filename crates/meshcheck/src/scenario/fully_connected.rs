use meshcheck_services::{Network, ServiceId};
use tracing::{info, instrument};

use super::Harness;
use crate::error::{Stage, StageError, StageExt as _};

/// Registers the loaded network and verifies every member once.
#[instrument(skip_all)]
pub(super) async fn run<N: Network>(
    mut h: Harness<N>,
    desired: impl IntoIterator<Item = ServiceId>,
) -> Result<(), StageError> {
    h.register_network(desired).await.during(Stage::Initial)?;
    h.verify_all().await.during(Stage::Initial)?;
    info!(members = h.membership().len(), "network is fully connected");
    Ok(())
}
