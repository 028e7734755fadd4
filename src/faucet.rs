//! Faucet wallets: well-known zero-address sources for seed transactions

use crate::error::Result;
use crate::wallet::Wallet;
use std::collections::HashMap;
use uuid::Uuid;

pub const FAKE_BTC: &str = "fBTC";
pub const FAKE_ETH: &str = "fETH";

/// Ephemeral service wallets, one per supported currency. They are never
/// persisted; they exist only to be the source address of seed transactions.
pub struct Faucet {
    wallets: HashMap<String, Wallet>,
}

impl Faucet {
    pub fn new() -> Result<Self> {
        let fbtc = Wallet::new(Uuid::nil(), FAKE_BTC, &"0".repeat(64))?;
        let feth = Wallet::new(Uuid::nil(), FAKE_ETH, &"1".repeat(64))?;

        let mut wallets = HashMap::new();
        wallets.insert(FAKE_BTC.to_string(), fbtc);
        wallets.insert(FAKE_ETH.to_string(), feth);

        Ok(Faucet { wallets })
    }

    pub fn get(&self, currency: &str) -> Option<&Wallet> {
        self.wallets.get(currency)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_faucet_has_a_wallet_per_supported_currency() {
        let faucet = Faucet::new().unwrap();

        let fbtc = faucet.get(FAKE_BTC).unwrap();
        assert_eq!(fbtc.currency(), FAKE_BTC);
        assert_eq!(fbtc.address(), "0".repeat(64));
        assert_eq!(fbtc.user_id(), Uuid::nil());

        let feth = faucet.get(FAKE_ETH).unwrap();
        assert_eq!(feth.currency(), FAKE_ETH);
        assert_eq!(feth.address(), "1".repeat(64));

        assert!(faucet.get("BTC").is_none());
    }
}
