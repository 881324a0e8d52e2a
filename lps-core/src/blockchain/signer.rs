//! Per-chain signing lock.
//!
//! Signing mutates nonce and UTXO state, so at most one transaction per chain
//! is built and broadcast at a time. Submitting port methods take a
//! [`SigningPermit`], which only [`WalletSigner::acquire`] hands out.

use lps_sdk::objects::NodeType;
use std::sync::Arc;
use tokio::sync::{Mutex, OwnedMutexGuard};
use tracing::trace;

#[derive(Debug, Clone)]
pub struct WalletSigner {
    chain: NodeType,
    lock: Arc<Mutex<()>>,
}

impl WalletSigner {
    pub fn new(chain: NodeType) -> Self {
        Self {
            chain,
            lock: Arc::new(Mutex::new(())),
        }
    }

    pub fn chain(&self) -> NodeType {
        self.chain
    }

    /// Waits until no other holder signs on this chain.
    pub async fn acquire(&self) -> SigningPermit {
        let guard = self.lock.clone().lock_owned().await;
        trace!(chain = %self.chain, "Signing permit acquired");
        SigningPermit {
            chain: self.chain,
            _guard: guard,
        }
    }

    pub fn try_acquire(&self) -> Option<SigningPermit> {
        let guard = self.lock.clone().try_lock_owned().ok()?;
        Some(SigningPermit {
            chain: self.chain,
            _guard: guard,
        })
    }
}

/// Proof of holding the signing lock. Released on drop.
#[derive(Debug)]
pub struct SigningPermit {
    chain: NodeType,
    _guard: OwnedMutexGuard<()>,
}

impl SigningPermit {
    pub fn chain(&self) -> NodeType {
        self.chain
    }
}
