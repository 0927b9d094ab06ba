//! The request gating pipeline.
//!
//! # Stages
//!
//! 1. Build the [`OperationDescriptor`] (422 `proxy_error`)
//! 2. Authenticate the caller (401/403 `auth_error`)
//! 3. Classify against the allowlist (403 `forbidden`)
//! 4. Obtain an operator decision if the mode requires one (403 `forbidden`)
//! 5. Attach a backend credential (502 `backend_error`)
//!
//! Stages run strictly in order and the first failure ends the request.
//! Confirmation takes an [`AllowedOperation`], which only the matcher can
//! produce, so a denied operation can never be put in front of the operator.
//!
//! [`AllowedOperation`]: tollgate_policy::AllowedOperation

use std::sync::Arc;

use tollgate_approval::ConfirmationManager;
use tollgate_core::{
    Backend, BackendError, BackendResponse, CallerIdentity, CredentialProvider, ForwardRequest,
    GateError, GateResult, OperationDescriptor, ProxyError, RawRequest, Rejection,
};
use tollgate_policy::{PolicyMatcher, PolicyVerdict};
use tollgate_telemetry::RequestContext;
use tracing::{Instrument, Span, debug, info, warn};

use crate::auth::AuthGate;

/// Final decision for a request that has not been sent anywhere yet.
#[derive(Debug)]
pub enum Disposition {
    /// Every check passed; send this to the backend.
    Forward(ForwardRequest),
    /// The request ends here with this response.
    Reject(Rejection),
}

/// What the caller receives.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Reply {
    /// The backend's answer, unchanged.
    Backend(BackendResponse),
    /// An error envelope.
    Rejected(Rejection),
}

impl Reply {
    /// HTTP status of the reply.
    #[must_use]
    pub fn status(&self) -> u16 {
        match self {
            Self::Backend(response) => response.status,
            Self::Rejected(rejection) => rejection.status,
        }
    }
}

/// A completed request: the reply plus the caller it was resolved to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Outcome {
    /// Name of the authenticated caller, if authentication succeeded.
    pub caller: Option<String>,
    /// Response for the caller.
    pub reply: Reply,
}

/// Runs every inbound request through authentication, policy, confirmation
/// and credential attachment.
pub struct GatingPipeline {
    auth: AuthGate,
    policy: PolicyMatcher,
    confirmations: Arc<ConfirmationManager>,
    credentials: Arc<dyn CredentialProvider>,
    backend: Arc<dyn Backend>,
}

impl GatingPipeline {
    /// Assemble a pipeline.
    #[must_use]
    pub fn new(
        auth: AuthGate,
        policy: PolicyMatcher,
        confirmations: Arc<ConfirmationManager>,
        credentials: Arc<dyn CredentialProvider>,
        backend: Arc<dyn Backend>,
    ) -> Self {
        Self {
            auth,
            policy,
            confirmations,
            credentials,
            backend,
        }
    }

    /// The confirmation manager, for health reporting and shutdown.
    #[must_use]
    pub fn confirmations(&self) -> &Arc<ConfirmationManager> {
        &self.confirmations
    }

    /// Decide what to do with `raw` without contacting the backend.
    pub async fn handle(&self, raw: &RawRequest) -> Disposition {
        let ctx = RequestContext::new(&raw.method, &raw.path);
        let span = ctx.span();
        async {
            let mut caller = None;
            match self.admit(raw, &mut caller).await {
                Ok(request) => {
                    info!(outcome = "approved", elapsed_ms = ctx.elapsed_ms(), "request approved");
                    Disposition::Forward(request)
                },
                Err(err) => Disposition::Reject(log_rejection(&err, &ctx)),
            }
        }
        .instrument(span)
        .await
    }

    /// Decide what to do with `raw` and, if approved, forward it.
    pub async fn execute(&self, raw: &RawRequest) -> Outcome {
        let ctx = RequestContext::new(&raw.method, &raw.path);
        let span = ctx.span();
        async {
            let mut caller = None;
            let result = match self.admit(raw, &mut caller).await {
                Ok(request) => self.forward(request).await,
                Err(err) => Err(err),
            };
            let reply = match result {
                Ok(response) => {
                    info!(
                        outcome = "forwarded",
                        status = response.status,
                        elapsed_ms = ctx.elapsed_ms(),
                        "request forwarded"
                    );
                    Reply::Backend(response)
                },
                Err(err) => Reply::Rejected(log_rejection(&err, &ctx)),
            };
            Outcome {
                caller: caller.map(|c: CallerIdentity| c.name),
                reply,
            }
        }
        .instrument(span)
        .await
    }

    /// Stages 1-5. `caller` is filled in as soon as authentication succeeds
    /// so that later failures can still be attributed. Descriptor
    /// construction is pure parsing and touches no store.
    async fn admit(
        &self,
        raw: &RawRequest,
        caller: &mut Option<CallerIdentity>,
    ) -> GateResult<ForwardRequest> {
        let op = OperationDescriptor::from_raw(raw)?;

        let identity = self.auth.authenticate(raw.authorization.as_deref()).await?;
        Span::current().record("caller", identity.name.as_str());
        let identity = &*caller.insert(identity);

        let allowed = match self.policy.classify(&op) {
            PolicyVerdict::Allowed(allowed) => allowed,
            PolicyVerdict::Denied { reason } => return Err(GateError::PolicyDenied { reason }),
        };
        debug!(class = %allowed.class(), rule = allowed.template(), "operation allowed");

        let outcome = self
            .confirmations
            .require_confirmation(&op, &allowed, identity)
            .await
            .map_err(ProxyError::from)?;
        if let Some(refusal) = outcome.refusal() {
            return Err(refusal.into());
        }

        let credential = self.credentials.valid_credential().await?;
        Ok(ForwardRequest::new(&op, credential))
    }

    /// Send an approved request. A 401 from the backend triggers one
    /// credential refresh and one retry.
    async fn forward(&self, mut request: ForwardRequest) -> GateResult<BackendResponse> {
        match self.backend.forward(&request).await {
            Err(BackendError::Upstream { status: 401, .. }) => {
                debug!("backend refused credential, refreshing");
                request.credential = self.credentials.refresh(&request.credential).await?;
                Ok(self.backend.forward(&request).await?)
            },
            other => Ok(other?),
        }
    }
}

impl std::fmt::Debug for GatingPipeline {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GatingPipeline")
            .field("rules", &self.policy.rules().len())
            .field("confirmations", &self.confirmations)
            .finish_non_exhaustive()
    }
}

fn log_rejection(err: &GateError, ctx: &RequestContext) -> Rejection {
    let rejection = err.rejection();
    let elapsed_ms = ctx.elapsed_ms();
    match err {
        GateError::Proxy(ProxyError::Internal { .. } | ProxyError::Unavailable { .. }) => warn!(
            outcome = "rejected",
            status = rejection.status,
            error = %rejection.kind,
            reason = %rejection.message,
            elapsed_ms,
            "request failed"
        ),
        _ => warn!(
            outcome = "rejected",
            status = rejection.status,
            error = %rejection.kind,
            reason = %rejection.message,
            elapsed_ms,
            "request rejected"
        ),
    }
    rejection
}
