//! Serve command - run the gateway in the foreground.

use anyhow::Result;
use tokio_util::sync::CancellationToken;
use tollgate_config::Config;
use tollgate_gateway::{GatewayServer, shutdown_signal};
use tollgate_keys::FileKeyStore;
use tracing::info;

use crate::theme::Theme;

/// Bind both listeners and serve until Ctrl+C or SIGTERM.
pub(crate) async fn run_serve(config: &Config) -> Result<()> {
    let shutdown = CancellationToken::new();
    let bound = GatewayServer::from_config(config, shutdown.clone())?
        .bind()
        .await?;

    println!("{}", Theme::banner("Tollgate Gateway"));
    let caller = format!("http://{}", bound.caller_addr()?);
    println!("{}", Theme::field("Listening", Theme::endpoint(&caller)));
    if let Some(addr) = bound.operator_addr() {
        let approvals = format!("http://{addr}/approval/");
        println!("{}", Theme::field("Approvals", Theme::endpoint(&approvals)));
    }
    println!(
        "{}",
        Theme::field(
            "Confirmation",
            format!(
                "{} (timeout {}s)",
                config.confirmation.mode, config.confirmation.timeout_secs
            )
        )
    );
    println!("{}", Theme::field("API keys", config.keys.file.display()));
    println!(
        "{}",
        Theme::field("Token file", config.credentials.token_file.display())
    );

    let key_count = FileKeyStore::new(&config.keys.file).list()?.len();
    if key_count == 0 {
        println!(
            "{}",
            Theme::caution(
                "No API keys configured. Create one with `tollgate keys create --name <name>`."
            )
        );
    }
    println!("\n{}", Theme::hint("Press Ctrl+C to stop."));

    let signal = tokio::spawn(shutdown_signal(shutdown.clone()));
    let result = bound.serve().await;
    signal.abort();
    result?;

    info!("shutdown complete");
    println!("{}", Theme::ok("Gateway stopped."));
    Ok(())
}
