//! Google account authentication
//!
//! This module provides:
//! - Token storage (`~/.orbit/tokens.json`)
//! - The OAuth2 web-server flow against Google
//! - A one-shot local callback server
//! - `TokenManager`, which hands out valid access tokens

mod callback_server;
mod oauth;
mod token_store;
mod tokens;

pub use callback_server::{AuthorizationResult, CallbackAddress};
pub use oauth::{generate_state, GoogleOAuthClient, RefreshedToken, GOOGLE_SCOPES};
pub use token_store::{
    connection_status, now_ms, ConnectionStatus, FileTokenStore, MemoryTokenStore,
    StoredTokenData, TokenStore, USER_TOKENS_KEY,
};
pub use tokens::TokenManager;

use crate::Result;

/// Run the browser consent flow and persist the resulting tokens.
pub async fn connect(oauth: &GoogleOAuthClient, store: &dyn TokenStore) -> Result<StoredTokenData> {
    let state = generate_state();
    let auth_url = oauth.authorization_url(&state)?;

    let address = CallbackAddress::from_redirect_uri(oauth.redirect_uri())?;
    let listener = callback_server::bind(&address).await?;

    println!("\n🔐 Opening browser for Google authentication...\n");
    println!("If the browser doesn't open, visit this URL:\n{}\n", auth_url);

    if let Err(e) = open::that(&auth_url) {
        tracing::warn!("Failed to open browser: {}", e);
    }

    println!("⏳ Waiting for authorization...");
    let auth_result = callback_server::wait_for_callback(listener, &address, &state).await?;

    println!("✓ Authorization received, exchanging token...\n");
    let tokens = oauth.exchange_code(&auth_result.code).await?;
    store.save(&tokens)?;

    Ok(tokens)
}

/// Forget the stored Google account.
pub fn disconnect(store: &dyn TokenStore) -> Result<()> {
    store.delete()?;
    tracing::info!("Google account disconnected");
    Ok(())
}
