//! Best-effort linking of a knowledge document to an agent.
//!
//! The platform's schema for attaching knowledge is not fully known, so the
//! reconciler probes first, then walks [`association_ladder`] until one
//! request succeeds, and finally reads the agent back to confirm the link.
//! Every failure ends in an [`AssociationOutcome`]; nothing here returns `Err`.

use std::fmt;

use serde_json::Value;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, instrument, warn};

use voicebolt_platform::{Method, PlatformClient};
use voicebolt_shared::{AgentId, BackoffPolicy, KnowledgeDocument, Result, VoiceBoltError};

use crate::probe::find_document;
use crate::strategies::{AssociationContext, AssociationRequest, association_ladder};

/// Result of a reconciliation run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AssociationOutcome {
    /// The document was already present; no write was issued.
    AlreadyLinked { location: &'static str },
    /// A write succeeded and the read-back found the document.
    Linked {
        /// Label of the request that succeeded, if any write was needed.
        strategy: Option<String>,
        location: &'static str,
    },
    /// The document exists but is not linked; the user must link it by hand.
    ManualActionRequired { reason: String, attempts: usize },
}

impl AssociationOutcome {
    pub fn is_linked(&self) -> bool {
        !matches!(self, Self::ManualActionRequired { .. })
    }

    /// Short label stored in the ledger.
    pub fn label(&self) -> &'static str {
        match self {
            Self::AlreadyLinked { .. } => "already-linked",
            Self::Linked { .. } => "linked",
            Self::ManualActionRequired { .. } => "manual",
        }
    }
}

impl fmt::Display for AssociationOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::AlreadyLinked { location } => write!(f, "already linked ({location})"),
            Self::Linked {
                strategy: Some(strategy),
                location,
            } => write!(f, "linked via {strategy} ({location})"),
            Self::Linked {
                strategy: None,
                location,
            } => write!(f, "linked ({location})"),
            Self::ManualActionRequired { reason, attempts } => {
                write!(f, "manual action required after {attempts} attempts: {reason}")
            }
        }
    }
}

/// Drives the probe, write ladder, and verification against one platform.
pub struct Reconciler<'a> {
    client: &'a PlatformClient,
    settle: BackoffPolicy,
}

impl<'a> Reconciler<'a> {
    pub fn new(client: &'a PlatformClient, settle: BackoffPolicy) -> Self {
        Self { client, settle }
    }

    /// Make sure `document` is linked to `agent_id`.
    #[instrument(skip_all, fields(agent_id = %agent_id, document_id = %document.id))]
    pub async fn reconcile(
        &self,
        agent_id: &AgentId,
        document: &KnowledgeDocument,
        cancel: &CancellationToken,
    ) -> AssociationOutcome {
        // 1. Current state, probed before any write.
        let current = match self.client.get_agent(agent_id).await {
            Ok(agent) => Some(agent),
            Err(e) if e.is_fatal_auth() => {
                return manual(format!("could not read the agent: {e}"), 0);
            }
            Err(e) => {
                warn!(error = %e, "could not fetch agent before linking");
                None
            }
        };

        if let Some(location) = current
            .as_ref()
            .and_then(|agent| find_document(agent, &document.id))
        {
            info!(location = location.name, "document already linked");
            return AssociationOutcome::AlreadyLinked {
                location: location.name,
            };
        }

        // 2. Write ladder, stopping at the first success.
        let ctx = AssociationContext {
            agent_id,
            document,
            current: current.as_ref(),
        };
        let ladder = association_ladder(&ctx);
        let mut attempts = 0;
        let mut accepted: Option<String> = None;

        for request in &ladder {
            if cancel.is_cancelled() {
                return manual("linking was cancelled".to_string(), attempts);
            }
            attempts += 1;

            match self.send(agent_id, request).await {
                Ok(_) => {
                    info!(strategy = %request.label, attempt = attempts, "association request accepted");
                    accepted = Some(request.label.clone());
                    break;
                }
                Err(e) if e.is_fatal_auth() => {
                    return manual(format!("the platform rejected the API key: {e}"), attempts);
                }
                Err(e) => {
                    debug!(strategy = %request.label, error = %e, "association request failed");
                }
            }
        }

        let Some(strategy) = accepted else {
            warn!(attempts, "every association request failed");
            return manual(
                "every association request was rejected by the platform".to_string(),
                attempts,
            );
        };

        // 3. Read back after the platform has had time to settle.
        match self.verify(agent_id, document, cancel).await {
            Ok(Some(location)) => {
                info!(%strategy, location, "document linked");
                AssociationOutcome::Linked {
                    strategy: Some(strategy),
                    location,
                }
            }
            Ok(None) => {
                warn!(%strategy, "request accepted but the document is not visible on the agent");
                manual(
                    format!("{strategy} was accepted but the document did not appear on the agent"),
                    attempts,
                )
            }
            Err(e) => {
                warn!(error = %e, "verification failed");
                manual(format!("could not verify the link: {e}"), attempts)
            }
        }
    }

    async fn send(&self, agent_id: &AgentId, request: &AssociationRequest) -> Result<Value> {
        if request.method == Method::PATCH {
            self.client.patch_agent(agent_id, &request.body).await
        } else {
            self.client
                .post_agent_subresource(agent_id, &request.suffix, &request.body)
                .await
        }
    }

    /// Wait, re-fetch and re-probe up to the settle policy's attempt budget.
    async fn verify(
        &self,
        agent_id: &AgentId,
        document: &KnowledgeDocument,
        cancel: &CancellationToken,
    ) -> Result<Option<&'static str>> {
        let rounds = self.settle.max_attempts.max(1);
        let mut last_error: Option<VoiceBoltError> = None;

        for round in 0..rounds {
            self.settle.wait(round, cancel).await?;

            match self.client.get_agent(agent_id).await {
                Ok(agent) => {
                    if let Some(location) = find_document(&agent, &document.id) {
                        return Ok(Some(location.name));
                    }
                    last_error = None;
                }
                Err(e) if e.is_fatal_auth() => return Err(e),
                Err(e) => {
                    debug!(round, error = %e, "read-back failed");
                    last_error = Some(e);
                }
            }
        }

        match last_error {
            Some(e) => Err(e),
            None => Ok(None),
        }
    }
}

fn manual(reason: String, attempts: usize) -> AssociationOutcome {
    AssociationOutcome::ManualActionRequired {
        reason: format!("{reason}; link the document to the agent in the platform dashboard"),
        attempts,
    }
}
