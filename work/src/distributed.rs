//! Distributed proof-of-work.
//!
//! A work request fans out as a JSON POST to every configured work peer
//! while the local pool mines the same root in parallel. The first valid
//! nonce wins, wherever it came from; the losers are cancelled — peers via
//! `work_cancel`, the local pool through its own cancel path. With no peers
//! configured only the local pool runs.

use raze_types::BlockHash;
use serde_json::json;
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::{debug, warn};

use crate::pool::WorkPool;
use crate::work_validate;

/// Address + port of a work server.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct WorkPeer {
    pub address: String,
    pub port: u16,
}

impl WorkPeer {
    fn url(&self) -> String {
        format!("http://{}:{}/", self.address, self.port)
    }
}

/// One contestant in the race for a nonce.
enum Contender {
    Local,
    Peer(WorkPeer),
}

/// Race every configured work peer against the local pool for `root`;
/// whichever produces a valid nonce first wins and the rest are cancelled.
pub async fn distributed_work(
    client: &reqwest::Client,
    peers: &[WorkPeer],
    pool: Arc<WorkPool>,
    root: BlockHash,
    threshold: u64,
) -> Option<u64> {
    let (tx, mut rx) = mpsc::channel::<(Contender, Option<u64>)>(peers.len() + 1);
    for peer in peers {
        let client = client.clone();
        let peer = peer.clone();
        let tx = tx.clone();
        tokio::spawn(async move {
            let result = request_one(&client, &peer, root, threshold).await;
            let _ = tx.send((Contender::Peer(peer), result)).await;
        });
    }
    {
        // The pool invokes the callback from a worker thread; the channel
        // has a slot reserved per contender, so try_send cannot fill up.
        let tx = tx.clone();
        pool.generate(root, threshold, move |nonce| {
            let _ = tx.try_send((Contender::Local, nonce));
        });
    }
    drop(tx);

    let mut outstanding: Vec<WorkPeer> = peers.to_vec();
    let mut local_running = true;
    while let Some((contender, result)) = rx.recv().await {
        match &contender {
            Contender::Local => local_running = false,
            Contender::Peer(peer) => outstanding.retain(|p| p != peer),
        }
        let Some(nonce) = result else {
            continue;
        };
        // First valid result wins; stop everyone still searching.
        if local_running {
            pool.cancel(&root);
        }
        for peer in outstanding {
            let client = client.clone();
            tokio::spawn(async move {
                cancel_one(&client, &peer, root).await;
            });
        }
        return Some(nonce);
    }
    None
}

async fn request_one(
    client: &reqwest::Client,
    peer: &WorkPeer,
    root: BlockHash,
    threshold: u64,
) -> Option<u64> {
    let body = json!({
        "action": "work_generate",
        "hash": root.to_string(),
    });
    let response = match client.post(peer.url()).json(&body).send().await {
        Ok(response) => response,
        Err(error) => {
            warn!(peer = %peer.address, %error, "unable to reach work peer");
            return None;
        }
    };
    if !response.status().is_success() {
        warn!(peer = %peer.address, status = %response.status(), "work peer responded with an error");
        return None;
    }
    let value: serde_json::Value = match response.json().await {
        Ok(value) => value,
        Err(error) => {
            warn!(peer = %peer.address, %error, "work response wasn't parsable");
            return None;
        }
    };
    let Some(work_text) = value.get("work").and_then(|v| v.as_str()) else {
        warn!(peer = %peer.address, "work response missing the work field");
        return None;
    };
    let Ok(nonce) = u64::from_str_radix(work_text, 16) else {
        warn!(peer = %peer.address, work = work_text, "work response wasn't a number");
        return None;
    };
    if !work_validate(&root, nonce, threshold) {
        warn!(peer = %peer.address, root = %root, nonce, "incorrect work from peer");
        return None;
    }
    debug!(peer = %peer.address, root = %root, "work received from peer");
    Some(nonce)
}

async fn cancel_one(client: &reqwest::Client, peer: &WorkPeer, root: BlockHash) {
    let body = json!({
        "action": "work_cancel",
        "hash": root.to_string(),
    });
    let _ = client.post(peer.url()).json(&body).send().await;
}

#[cfg(test)]
mod tests {
    use super::*;

    const TEST_THRESHOLD: u64 = 0xff00_0000_0000_0000;

    #[tokio::test]
    async fn no_peers_local_pool_wins() {
        let pool = WorkPool::new(1);
        let client = reqwest::Client::new();
        let root = BlockHash::new([1u8; 32]);
        let nonce = distributed_work(&client, &[], pool.clone(), root, TEST_THRESHOLD)
            .await
            .unwrap();
        assert!(work_validate(&root, nonce, TEST_THRESHOLD));
        pool.stop();
    }

    #[tokio::test]
    async fn local_pool_races_an_unresponsive_peer() {
        let pool = WorkPool::new(1);
        // No client timeout on purpose: the local pool must win the race
        // without waiting out the dead peer.
        let client = reqwest::Client::new();
        let root = BlockHash::new([2u8; 32]);
        let peers = [WorkPeer {
            // TEST-NET-1: guaranteed unreachable.
            address: "192.0.2.1".to_string(),
            port: 9,
        }];
        let nonce = tokio::time::timeout(
            std::time::Duration::from_secs(30),
            distributed_work(&client, &peers, pool.clone(), root, TEST_THRESHOLD),
        )
        .await
        .expect("the race must not block on the dead peer")
        .unwrap();
        assert!(work_validate(&root, nonce, TEST_THRESHOLD));
        pool.stop();
    }

    #[tokio::test]
    async fn all_contenders_failing_yields_none() {
        let pool = WorkPool::new(1);
        pool.stop(); // a stopped pool resolves its jobs with None
        let client = reqwest::Client::builder()
            .timeout(std::time::Duration::from_millis(200))
            .build()
            .unwrap();
        let root = BlockHash::new([3u8; 32]);
        let peers = [WorkPeer {
            address: "192.0.2.1".to_string(),
            port: 9,
        }];
        assert_eq!(
            distributed_work(&client, &peers, pool, root, TEST_THRESHOLD).await,
            None
        );
    }

    #[test]
    fn peer_url_shape() {
        let peer = WorkPeer {
            address: "10.0.0.1".to_string(),
            port: 7076,
        };
        assert_eq!(peer.url(), "http://10.0.0.1:7076/");
    }
}
