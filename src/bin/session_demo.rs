/**
 * Session Demo Entry Point
 *
 * Runs sign-in, dashboard, write and sign-out against the in-memory
 * provider and store, logging every transition.
 */
use doc_session::memory::{MemoryDocumentStore, MemoryIdentityProvider};
use doc_session::shared::{AppConfig, Patch, ProviderSettings};
use doc_session::{AuthMode, Session};
use std::sync::Arc;

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let env_filter = std::env::var("RUST_LOG").unwrap_or_else(|_| "debug".to_string());
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::new(&env_filter))
        .init();

    let config = match AppConfig::from_env() {
        Ok(config) if config.provider.is_some() => config,
        _ => AppConfig::builder()
            .app_id("session-demo")
            .provider(ProviderSettings {
                api_key: "demo-key".to_string(),
                project_id: "demo-project".to_string(),
                auth_domain: None,
            })
            .build()?,
    };

    let provider = Arc::new(MemoryIdentityProvider::new().with_account(
        "demo-user",
        "demo@example.com",
        "password123",
    ));
    let store = Arc::new(MemoryDocumentStore::new());
    let session = Session::new(config, Arc::clone(&provider), Arc::clone(&store));

    session.start().await?;
    tracing::info!("[DEMO] View after start: {:?}", session.view(AuthMode::SignIn));

    // leave the anonymous session before signing in with an account
    session.sign_out().await?;
    tracing::info!("[DEMO] View after sign-out: {:?}", session.view(AuthMode::SignIn));

    if let Err(error) = session.sign_in("demo@example.com", "wrong").await {
        let message = error
            .auth_kind()
            .map(|kind| kind.user_message())
            .unwrap_or("Login failed. Try again.");
        tracing::warn!("[DEMO] Inline form error: {}", message);
    }

    session.sign_in("demo@example.com", "password123").await?;
    tracing::info!("[DEMO] View after sign-in: {}", session.view(AuthMode::SignIn).title());

    session
        .documents()
        .write(Patch::new().set("theme", "dark"))
        .await?;
    session.documents().touch().await?;

    if let Some(summary) = session.dashboard() {
        tracing::info!(
            "[DEMO] Dashboard for {} ({}):\n{}",
            summary.user_label,
            summary.user_id,
            summary.data.unwrap_or_else(|| "Loading protected data...".to_string())
        );
    }

    session.sign_out().await?;
    tracing::info!("[DEMO] View after sign-out: {:?}", session.view(AuthMode::SignIn));

    session.shutdown();
    Ok(())
}
