//! JSON-RPC transport to the band platform: membership, integrity screening,
//! notifications and the audit trail all live behind one endpoint.

use std::time::Duration;

use anyhow::{Context, Result};
use async_trait::async_trait;
use jsonrpsee::core::client::ClientT;
use jsonrpsee::core::params::ObjectParams;
use jsonrpsee::core::traits::ToRpcParams;
use jsonrpsee::http_client::{HttpClient, HttpClientBuilder};
use jsonrpsee::rpc_params;
use serde::de::{DeserializeOwned, IgnoredAny};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::CollaboratorError;
use crate::governance::tally::Tally;
use crate::models::governance::Proposal;
use crate::models::integrity::{IntegrityReport, IntegrityRequest};
use crate::models::membership::{BandSettings, Membership};
use crate::models::nomination::FounderNomination;
use crate::models::UserId;
use crate::ports::{AuditEvent, AuditLog, IntegrityHook, MembershipOracle, Notifier};

const MEMBERSHIP: &str = "membership";
const INTEGRITY: &str = "integrity";
const NOTIFICATIONS: &str = "notifications";
const AUDIT: &str = "audit";

#[derive(Clone)]
pub struct PlatformRpc {
    inner: HttpClient,
    timeout: Duration,
}

impl PlatformRpc {
    pub fn new(endpoint: &str, timeout: Duration) -> Result<Self> {
        assert!(!endpoint.is_empty(), "RPC endpoint must be provided");
        assert!(
            timeout >= Duration::from_millis(100),
            "Timeout below 100ms is unsafe"
        );

        let client = HttpClientBuilder::default()
            .request_timeout(timeout)
            .build(endpoint)
            .with_context(|| format!("Failed to build RPC client for {endpoint}"))?;

        Ok(Self {
            inner: client,
            timeout,
        })
    }

    pub fn timeout(&self) -> Duration {
        assert!(
            self.timeout <= Duration::from_secs(60),
            "Timeout exceeds maximum bound"
        );
        self.timeout
    }

    async fn call<R, P>(
        &self,
        service: &'static str,
        method: &'static str,
        params: P,
    ) -> Result<R, CollaboratorError>
    where
        R: DeserializeOwned,
        P: ToRpcParams + Send,
    {
        debug!(method, "platform rpc");
        self.inner
            .request(method, params)
            .await
            .map_err(|err| CollaboratorError::new(service, format!("RPC call {method} failed: {err}")))
    }
}

fn insert_param<P: Serialize>(
    params: &mut ObjectParams,
    service: &'static str,
    name: &str,
    value: P,
) -> Result<(), CollaboratorError> {
    params
        .insert(name, value)
        .map_err(|err| CollaboratorError::new(service, format!("Failed to encode {name}: {err}")))
}

#[derive(Debug, Deserialize)]
struct FoundersResponse {
    #[serde(default)]
    founders: Vec<UserId>,
}

#[derive(Debug, Deserialize)]
struct VoterCountResponse {
    count: u32,
}

#[async_trait]
impl MembershipOracle for PlatformRpc {
    async fn band_settings(&self, band_id: &str) -> Result<Option<BandSettings>, CollaboratorError> {
        self.call(MEMBERSHIP, "membership_bandSettings", rpc_params![band_id])
            .await
    }

    async fn membership(
        &self,
        band_id: &str,
        user_id: &str,
    ) -> Result<Option<Membership>, CollaboratorError> {
        self.call(MEMBERSHIP, "membership_getRole", rpc_params![band_id, user_id])
            .await
    }

    async fn founders(&self, band_id: &str) -> Result<Vec<UserId>, CollaboratorError> {
        let response: FoundersResponse = self
            .call(MEMBERSHIP, "membership_founders", rpc_params![band_id])
            .await?;
        Ok(response.founders)
    }

    async fn eligible_voter_count(&self, band_id: &str) -> Result<u32, CollaboratorError> {
        let response: VoterCountResponse = self
            .call(
                MEMBERSHIP,
                "membership_eligibleVoterCount",
                rpc_params![band_id],
            )
            .await?;
        Ok(response.count)
    }
}

#[async_trait]
impl IntegrityHook for PlatformRpc {
    async fn check(&self, request: &IntegrityRequest) -> Result<IntegrityReport, CollaboratorError> {
        let mut params = ObjectParams::new();
        insert_param(&mut params, INTEGRITY, "entity_type", request.entity_type)?;
        insert_param(&mut params, INTEGRITY, "action", request.action)?;
        insert_param(&mut params, INTEGRITY, "band_id", &request.band_id)?;
        insert_param(&mut params, INTEGRITY, "data", &request.data)?;
        if let Some(parent_id) = request.parent_id {
            insert_param(&mut params, INTEGRITY, "parent_id", parent_id)?;
        }
        self.call(INTEGRITY, "integrity_check", params).await
    }
}

#[async_trait]
impl Notifier for PlatformRpc {
    async fn notify_voters_of_edit(
        &self,
        proposal: &Proposal,
        voters: &[UserId],
        reason: &str,
    ) -> Result<(), CollaboratorError> {
        let mut params = ObjectParams::new();
        insert_param(&mut params, NOTIFICATIONS, "proposal_id", proposal.id)?;
        insert_param(&mut params, NOTIFICATIONS, "band_id", &proposal.band_id)?;
        insert_param(&mut params, NOTIFICATIONS, "title", &proposal.content.title)?;
        insert_param(&mut params, NOTIFICATIONS, "voters", voters)?;
        insert_param(&mut params, NOTIFICATIONS, "reason", reason)?;
        let _: IgnoredAny = self
            .call(NOTIFICATIONS, "notifications_votersOfEdit", params)
            .await?;
        Ok(())
    }

    async fn proposal_closed(
        &self,
        proposal: &Proposal,
        tally: &Tally,
    ) -> Result<(), CollaboratorError> {
        let mut params = ObjectParams::new();
        insert_param(&mut params, NOTIFICATIONS, "proposal_id", proposal.id)?;
        insert_param(&mut params, NOTIFICATIONS, "band_id", &proposal.band_id)?;
        insert_param(&mut params, NOTIFICATIONS, "proposal_type", proposal.proposal_type)?;
        insert_param(&mut params, NOTIFICATIONS, "status", proposal.status)?;
        insert_param(&mut params, NOTIFICATIONS, "tally", tally)?;
        let _: IgnoredAny = self
            .call(NOTIFICATIONS, "notifications_proposalClosed", params)
            .await?;
        Ok(())
    }

    async fn nomination_decided(
        &self,
        nomination: &FounderNomination,
    ) -> Result<(), CollaboratorError> {
        let mut params = ObjectParams::new();
        insert_param(&mut params, NOTIFICATIONS, "nomination_id", nomination.id)?;
        insert_param(&mut params, NOTIFICATIONS, "band_id", &nomination.band_id)?;
        insert_param(&mut params, NOTIFICATIONS, "nominee_id", &nomination.nominee_id)?;
        insert_param(&mut params, NOTIFICATIONS, "status", nomination.status)?;
        let _: IgnoredAny = self
            .call(NOTIFICATIONS, "notifications_nominationDecided", params)
            .await?;
        Ok(())
    }
}

#[async_trait]
impl AuditLog for PlatformRpc {
    async fn record(&self, event: &AuditEvent) -> Result<(), CollaboratorError> {
        let mut params = ObjectParams::new();
        insert_param(&mut params, AUDIT, "event", event)?;
        let _: IgnoredAny = self.call(AUDIT, "audit_record", params).await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builds_client_with_bounded_timeout() {
        let rpc = PlatformRpc::new("http://127.0.0.1:9", Duration::from_millis(250)).unwrap();
        assert_eq!(rpc.timeout(), Duration::from_millis(250));
    }

    #[test]
    #[should_panic(expected = "Timeout below 100ms")]
    fn refuses_tiny_timeouts() {
        let _ = PlatformRpc::new("http://127.0.0.1:9", Duration::from_millis(5));
    }

    #[test]
    fn object_params_encode_every_field() {
        let mut params = ObjectParams::new();
        insert_param(&mut params, AUDIT, "band_id", "band-1").unwrap();
        insert_param(&mut params, AUDIT, "count", 3u32).unwrap();
        let encoded = params.to_rpc_params().unwrap().unwrap();
        let value: serde_json::Value = serde_json::from_str(encoded.get()).unwrap();
        assert_eq!(value["band_id"], "band-1");
        assert_eq!(value["count"], 3);
    }

    #[tokio::test]
    async fn transport_failures_name_the_service() {
        let rpc = PlatformRpc::new("http://127.0.0.1:9", Duration::from_millis(500)).unwrap();
        let err = rpc.founders("band-1").await.unwrap_err();
        assert_eq!(err.service, MEMBERSHIP);
        assert!(err.message.contains("membership_founders"));
    }
}
