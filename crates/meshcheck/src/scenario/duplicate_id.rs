use meshcheck_services::{ConfigId, Network, ServiceId};
use tracing::{info, instrument};

use super::Harness;
use crate::error::{Stage, StageError, StageExt as _};

/// Adds two nodes sharing one staking certificate, then removes the first.
///
/// Peers are verified after every step. Boot members may only report
/// identities of live members. While both duplicates run they report at
/// least every unambiguous member; once one has gone the counts are exact
/// again.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct DuplicateIdScenario {
    /// Configuration that reuses the image's static certificate.
    pub same_cert_config: ConfigId,
    /// Service id of the first duplicate.
    pub first: ServiceId,
    /// Service id of the second duplicate.
    pub second: ServiceId,
}

impl DuplicateIdScenario {
    #[instrument(skip_all, fields(first = %self.first, second = %self.second))]
    pub(super) async fn run<N: Network>(
        &self,
        mut h: Harness<N>,
        desired: impl IntoIterator<Item = ServiceId>,
    ) -> Result<(), StageError> {
        h.register_network(desired).await.during(Stage::Initial)?;
        h.verify_all().await.during(Stage::Initial)?;
        info!(stage = %Stage::Initial, "stage passed");

        let stage = Stage::FirstDuplicateAdded;
        h.add_service(self.same_cert_config, self.first)
            .await
            .during(stage)?;
        h.verify_all().await.during(stage)?;
        info!(%stage, "stage passed");

        let stage = Stage::SecondDuplicateAdded;
        h.add_service(self.same_cert_config, self.second)
            .await
            .during(stage)?;
        h.verify_all().await.during(stage)?;
        info!(%stage, "stage passed");

        let stage = Stage::FirstDuplicateRemoved;
        h.remove_service(self.first).await.during(stage)?;
        h.verify_all().await.during(stage)?;
        info!(%stage, "stage passed");

        h.remove_service(self.second).await.during(Stage::Terminal)?;
        info!(stage = %Stage::Terminal, "scenario complete");
        Ok(())
    }
}
