//! Confirmation HTTP callback.
//!
//! When configured, every freshly-arrived block that reaches the ledger is
//! POSTed as JSON to an external service. Failures are logged and dropped;
//! the callback is advisory and never feeds back into consensus.

use raze_ledger::Block;
use raze_types::{Account, Amount};
use serde_json::json;
use tracing::debug;

/// Where callbacks go; built once from the config at node construction.
#[derive(Clone)]
pub struct CallbackTarget {
    pub address: String,
    pub port: u16,
    pub target: String,
}

impl CallbackTarget {
    fn url(&self) -> String {
        format!("http://{}:{}{}", self.address, self.port, self.target)
    }
}

/// POST `{account, hash, block, amount}` to the configured target.
pub async fn post_confirmation(
    client: reqwest::Client,
    callback: CallbackTarget,
    block: Block,
    account: Account,
    amount: Amount,
) {
    let body = json!({
        "account": account.to_string(),
        "hash": block.hash().to_string(),
        "block": serde_json::to_string(&block).unwrap_or_default(),
        "amount": amount.to_string(),
    });
    let url = callback.url();
    match client.post(&url).json(&body).send().await {
        Ok(response) if response.status().is_success() => {}
        Ok(response) => {
            debug!(%url, status = %response.status(), "callback failed");
        }
        Err(error) => {
            debug!(%url, %error, "unable to complete callback");
        }
    }
}
