//! Authorization URL builder
//!
//! Produces the provider redirect URL for the start of the flow. Pure
//! function of its inputs plus the nonce already inside the claims.

use tb_types::{AppError, AppResult};

use crate::state;
use crate::types::{ProviderConfig, StateClaims};

/// Build the URL the end user's browser is redirected to
///
/// Signs `claims` into the `state` parameter and appends the standard
/// authorization-code query parameters. An empty scope list emits no
/// `scope` parameter at all (provider-default scope applies).
pub fn build_authorization_url(
    config: &ProviderConfig,
    claims: &StateClaims,
    secret: &[u8],
) -> AppResult<String> {
    let envelope =
        state::encode(claims, secret).map_err(|e| AppError::State(e.to_string()))?;

    let mut url = format!(
        "{}?client_id={}&redirect_uri={}&response_type=code",
        config.authorization_endpoint,
        urlencoding::encode(&config.client_id),
        urlencoding::encode(&config.redirect_uri),
    );

    if !config.scopes.is_empty() {
        let scopes = config.scopes.join(" ");
        url.push_str(&format!("&scope={}", urlencoding::encode(&scopes)));
    }

    url.push_str(&format!(
        "&state={}",
        urlencoding::encode(&envelope.to_raw())
    ));

    Ok(url)
}
