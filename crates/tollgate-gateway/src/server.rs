//! Gateway assembly, listeners, and shutdown.

use std::net::SocketAddr;
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;

use axum::Router;
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;
use tollgate_approval::{
    ConfirmationManager, ConfirmationMode, ConsoleChannel, DecisionChannel, WebApprovalQueue,
};
use tollgate_config::{ChannelKind, Config};
use tollgate_keys::FileKeyStore;
use tollgate_policy::PolicyMatcher;
use tracing::{info, warn};

use crate::approval;
use crate::auth::AuthGate;
use crate::backend::HttpBackend;
use crate::credentials::TokenFileCredentialProvider;
use crate::error::{GatewayError, GatewayResult};
use crate::http;
use crate::pipeline::GatingPipeline;

/// A fully assembled gateway, not yet listening.
pub struct GatewayServer {
    caller_addr: String,
    operator_addr: Option<String>,
    pipeline: Arc<GatingPipeline>,
    web_queue: Option<Arc<WebApprovalQueue>>,
    shutdown: CancellationToken,
}

impl GatewayServer {
    /// Assemble the gateway described by `config`.
    ///
    /// `shutdown` is shared with the confirmation manager: cancelling it
    /// fails pending confirmations and stops both listeners.
    ///
    /// # Errors
    ///
    /// Returns an error if the confirmation mode is unknown, a backend route
    /// is unusable, the HTTP client cannot be built, or the built-in
    /// allowlist fails its self-check.
    pub fn from_config(config: &Config, shutdown: CancellationToken) -> GatewayResult<Self> {
        let mode =
            ConfirmationMode::from_str(&config.confirmation.mode).map_err(GatewayError::Config)?;
        let policy = PolicyMatcher::builtin()?;

        let keys = Arc::new(FileKeyStore::new(&config.keys.file));
        let backend = Arc::new(HttpBackend::from_config(&config.backend)?);
        let credentials = Arc::new(TokenFileCredentialProvider::from_config(
            &config.credentials,
            Duration::from_secs(config.backend.request_timeout_secs),
        )?);
        if !config.credentials.token_file.exists() {
            warn!(
                path = %config.credentials.token_file.display(),
                "token file not found; forwarded requests will fail until it exists"
            );
        }

        let (channel, web_queue) = match config.confirmation.channel {
            ChannelKind::Console => (
                Arc::new(ConsoleChannel::stdio()) as Arc<dyn DecisionChannel>,
                None,
            ),
            ChannelKind::Web => {
                let queue = Arc::new(WebApprovalQueue::new());
                (Arc::clone(&queue) as Arc<dyn DecisionChannel>, Some(queue))
            },
        };
        let confirmations = ConfirmationManager::new(mode, channel)
            .with_timeout(Duration::from_secs(config.confirmation.timeout_secs))
            .with_shutdown(shutdown.clone());

        info!(
            mode = %mode,
            channel = ?config.confirmation.channel,
            rules = policy.rules().len(),
            keys = %config.keys.file.display(),
            "gateway assembled"
        );

        let pipeline = GatingPipeline::new(
            AuthGate::new(keys),
            policy,
            Arc::new(confirmations),
            credentials,
            backend,
        );

        let operator_addr = web_queue.as_ref().map(|_| {
            format!(
                "{}:{}",
                config.confirmation.web_host, config.confirmation.web_port
            )
        });

        Ok(Self {
            caller_addr: format!("{}:{}", config.server.host, config.server.port),
            operator_addr,
            pipeline: Arc::new(pipeline),
            web_queue,
            shutdown,
        })
    }

    /// Assemble from parts. The operator listener is started only when
    /// both `web_queue` and `operator_addr` are given.
    #[must_use]
    pub fn new(
        caller_addr: impl Into<String>,
        pipeline: Arc<GatingPipeline>,
        web: Option<(Arc<WebApprovalQueue>, String)>,
        shutdown: CancellationToken,
    ) -> Self {
        let (web_queue, operator_addr) = match web {
            Some((queue, addr)) => (Some(queue), Some(addr)),
            None => (None, None),
        };
        Self {
            caller_addr: caller_addr.into(),
            operator_addr,
            pipeline,
            web_queue,
            shutdown,
        }
    }

    /// The request pipeline.
    #[must_use]
    pub fn pipeline(&self) -> &Arc<GatingPipeline> {
        &self.pipeline
    }

    /// Router for the caller-facing listener.
    #[must_use]
    pub fn caller_router(&self) -> Router {
        http::router(Arc::clone(&self.pipeline))
    }

    /// Router for the operator listener, if the web channel is in use.
    #[must_use]
    pub fn operator_router(&self) -> Option<Router> {
        self.web_queue
            .as_ref()
            .map(|queue| approval::router(Arc::clone(queue), self.shutdown.clone()))
    }

    /// Bind every listener.
    ///
    /// # Errors
    ///
    /// Returns [`GatewayError::Bind`] if an address cannot be bound.
    pub async fn bind(self) -> GatewayResult<BoundGateway> {
        let caller = bind(&self.caller_addr).await?;
        let operator = match (&self.operator_addr, self.operator_router()) {
            (Some(addr), Some(router)) => Some((bind(addr).await?, router)),
            _ => None,
        };
        Ok(BoundGateway {
            caller: (caller, self.caller_router()),
            operator,
            shutdown: self.shutdown,
        })
    }

    /// Bind and serve until the shutdown token is cancelled.
    ///
    /// # Errors
    ///
    /// Returns an error if a listener cannot be bound or a server fails.
    pub async fn run(self) -> GatewayResult<()> {
        self.bind().await?.serve().await
    }
}

impl std::fmt::Debug for GatewayServer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GatewayServer")
            .field("caller_addr", &self.caller_addr)
            .field("operator_addr", &self.operator_addr)
            .finish_non_exhaustive()
    }
}

async fn bind(addr: &str) -> GatewayResult<TcpListener> {
    TcpListener::bind(addr)
        .await
        .map_err(|source| GatewayError::Bind {
            addr: addr.to_owned(),
            source,
        })
}

/// Listeners bound and ready to serve.
pub struct BoundGateway {
    caller: (TcpListener, Router),
    operator: Option<(TcpListener, Router)>,
    shutdown: CancellationToken,
}

impl std::fmt::Debug for BoundGateway {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BoundGateway")
            .field("caller_addr", &self.caller_addr().ok())
            .field("operator_addr", &self.operator_addr())
            .finish_non_exhaustive()
    }
}

impl BoundGateway {
    /// Address of the caller-facing listener.
    ///
    /// # Errors
    ///
    /// Returns the OS error if the address cannot be read.
    pub fn caller_addr(&self) -> std::io::Result<SocketAddr> {
        self.caller.0.local_addr()
    }

    /// Address of the operator listener, if any.
    #[must_use]
    pub fn operator_addr(&self) -> Option<SocketAddr> {
        self.operator
            .as_ref()
            .and_then(|(listener, _)| listener.local_addr().ok())
    }

    /// Serve until the shutdown token is cancelled, then drain.
    ///
    /// # Errors
    ///
    /// Returns [`GatewayError::Serve`] if a server fails.
    pub async fn serve(self) -> GatewayResult<()> {
        let Self {
            caller,
            operator,
            shutdown,
        } = self;

        let caller = serve_one("caller", caller.0, caller.1, shutdown.clone());
        let operator = async {
            match operator {
                Some((listener, router)) => {
                    serve_one("operator", listener, router, shutdown.clone()).await
                },
                None => Ok(()),
            }
        };

        let (caller, operator) = tokio::join!(caller, operator);
        caller?;
        operator?;
        info!("gateway stopped");
        Ok(())
    }
}

async fn serve_one(
    name: &'static str,
    listener: TcpListener,
    router: Router,
    shutdown: CancellationToken,
) -> GatewayResult<()> {
    let addr = listener
        .local_addr()
        .map_err(|source| GatewayError::Bind {
            addr: name.to_owned(),
            source,
        })?;
    info!(listener = name, %addr, "listening");

    let result = axum::serve(listener, router)
        .with_graceful_shutdown(shutdown.clone().cancelled_owned())
        .await;
    // A failed server takes the other one down with it.
    shutdown.cancel();
    result.map_err(|source| GatewayError::Serve { addr, source })
}

/// Wait for Ctrl-C or SIGTERM, then cancel `token`. Returns early if the
/// token is cancelled some other way.
pub async fn shutdown_signal(token: CancellationToken) {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            warn!(error = %e, "failed to install Ctrl+C handler");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            },
            Err(e) => {
                warn!(error = %e, "failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            },
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => info!("received Ctrl+C, shutting down"),
        () = terminate => info!("received SIGTERM, shutting down"),
        () = token.cancelled() => return,
    }
    token.cancel();
}
