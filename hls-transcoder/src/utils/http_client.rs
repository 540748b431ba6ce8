//! HTTP client construction for remote store uploads.

use std::{sync::OnceLock, time::Duration};

use tracing::{debug, warn};

/// Install the process-wide rustls crypto provider once.
///
/// reqwest is built without a bundled provider, so this must run before the
/// first client is created.
pub fn install_rustls_provider() {
    static PROVIDER_INSTALLED: OnceLock<()> = OnceLock::new();
    PROVIDER_INSTALLED.get_or_init(|| {
        if let Err(e) = rustls::crypto::aws_lc_rs::default_provider().install_default() {
            // Another crate installed it first.
            debug!(existing_provider = ?e, "rustls CryptoProvider already installed");
        }
    });
}

/// Build the `reqwest::Client` used for remote-store uploads.
pub fn build_upload_client(request_timeout: Duration) -> reqwest::Client {
    install_rustls_provider();

    let mut builder = reqwest::Client::builder().user_agent(concat!(
        env!("CARGO_PKG_NAME"),
        "/",
        env!("CARGO_PKG_VERSION")
    ));

    if request_timeout > Duration::ZERO {
        builder = builder.timeout(request_timeout);
    }

    builder.build().unwrap_or_else(|error| {
        warn!(
            error = %error,
            "Failed to create upload HTTP client; falling back to reqwest defaults"
        );
        reqwest::Client::new()
    })
}
