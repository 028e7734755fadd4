//! Wallets: currency-scoped addresses whose balance is derived, not stored
//!
//! A wallet never stores a running total. Its balance is a pure fold over
//! whatever transaction set is currently loaded: entries where the wallet is
//! the destination add the principal, entries where it is the source
//! subtract the principal plus fee. The in-memory transaction list is a
//! snapshot populated by [`Wallet::load_transactions`] and is not kept in
//! sync with storage afterwards.

use crate::error::{LedgerError, Result};
use crate::persistence::db_err;
use crate::transaction::Transaction;
use rand::Rng;
use rusqlite::{params, Connection};
use rust_decimal::Decimal;
use sha2::{Digest, Sha256};
use uuid::Uuid;

#[derive(Debug, Clone)]
pub struct Wallet {
    user_id: Uuid,
    currency: String,
    address: String,
    transactions: Vec<Transaction>,
}

/// Hex SHA-256 of a random number. The random source is injected so tests
/// can supply a deterministic one.
pub fn generate_address<R: Rng + ?Sized>(rng: &mut R) -> String {
    let n: u64 = rng.gen();
    let digest = Sha256::digest(n.to_string().as_bytes());
    hex::encode(digest)
}

impl Wallet {
    pub fn new(owner: Uuid, currency: &str, address: &str) -> Result<Self> {
        if currency.is_empty() {
            return Err(LedgerError::InvalidCurrency);
        }

        if address.is_empty() {
            return Err(LedgerError::InvalidAddress);
        }

        Ok(Wallet {
            user_id: owner,
            currency: currency.to_string(),
            address: address.to_string(),
            transactions: Vec::new(),
        })
    }

    /// Auto-provisioning constructor used when the caller has no address.
    pub fn with_generated_address<R: Rng + ?Sized>(
        owner: Uuid,
        currency: &str,
        rng: &mut R,
    ) -> Result<Self> {
        let address = generate_address(rng);
        Self::new(owner, currency, &address)
    }

    /// Creates a ledger entry with `from` as the source and this wallet as
    /// the destination, and appends it to the in-memory list. Nothing is
    /// persisted until [`Wallet::save`]. Fails without side effects when the
    /// currencies differ.
    pub fn accept_transaction(&mut self, from: &Wallet, amount: Decimal) -> Result<&Transaction> {
        if self.currency != from.currency {
            return Err(LedgerError::WalletCurrencyMismatch);
        }

        let tx = Transaction::new(&self.currency, &from.address, &self.address, amount)?;
        self.transactions.push(tx);

        Ok(self.transactions.last().expect("entry just appended"))
    }

    /// Folds the loaded transaction set. Pure and synchronous; callers that
    /// want the balance to reflect storage state must load transactions
    /// first.
    pub fn balance(&self) -> Decimal {
        let mut sum = Decimal::ZERO;
        for t in &self.transactions {
            if t.to() == self.address {
                sum += t.amount();
            } else if t.from() == self.address {
                sum -= t.full_amount();
            }
        }

        sum
    }

    /// Persists the wallet row (duplicate insert of the same owner/address
    /// is a no-op), then every in-memory transaction in list order. The
    /// first failure aborts the remaining saves.
    pub fn save(&self, conn: &Connection) -> Result<()> {
        conn.execute(
            "INSERT OR IGNORE INTO user_wallets(user_id, wallet, currency) VALUES(?1, ?2, ?3)",
            params![self.user_id.to_string(), self.address, self.currency],
        )
        .map_err(|e| db_err("Failed to save wallet", e))?;

        for tx in &self.transactions {
            tx.save(conn)?;
        }

        Ok(())
    }

    /// Replaces the in-memory list with every ledger entry touching this
    /// wallet's address.
    pub fn load_transactions(&mut self, conn: &Connection) -> Result<&[Transaction]> {
        self.transactions = Transaction::find_all_with_wallet(conn, &self.address)?;
        Ok(&self.transactions)
    }

    /// All wallets owned by `user_id`, each with an empty transaction list.
    pub fn find_by_user_id(conn: &Connection, user_id: Uuid) -> Result<Vec<Wallet>> {
        let mut stmt = conn
            .prepare("SELECT wallet, currency FROM user_wallets WHERE user_id = ?1")
            .map_err(|e| db_err("Failed to prepare wallet query", e))?;

        let rows = stmt
            .query_map(params![user_id.to_string()], |row| {
                let address: String = row.get(0)?;
                let currency: String = row.get(1)?;
                Ok(Wallet {
                    user_id,
                    currency,
                    address,
                    transactions: Vec::new(),
                })
            })
            .map_err(|e| db_err("Failed to query wallets", e))?;

        let mut wallets = Vec::new();
        for row in rows {
            wallets.push(row.map_err(|e| db_err("Failed to read wallet row", e))?);
        }

        Ok(wallets)
    }

    pub fn user_id(&self) -> Uuid {
        self.user_id
    }

    pub fn currency(&self) -> &str {
        &self.currency
    }

    pub fn address(&self) -> &str {
        &self.address
    }

    pub fn transactions(&self) -> &[Transaction] {
        &self.transactions
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::persistence::Database;
    use rand::rngs::StdRng;
    use rand::SeedableRng;
    use rust_decimal_macros::dec;

    fn wallet(currency: &str, address: &str) -> Wallet {
        Wallet::new(Uuid::new_v4(), currency, address).unwrap()
    }

    #[test]
    fn test_new_rejects_empty_inputs() {
        let owner = Uuid::new_v4();
        assert!(matches!(
            Wallet::new(owner, "", "addr").unwrap_err(),
            LedgerError::InvalidCurrency
        ));
        assert!(matches!(
            Wallet::new(owner, "fBTC", "").unwrap_err(),
            LedgerError::InvalidAddress
        ));
    }

    #[test]
    fn test_generated_addresses_are_hex_and_deterministic_per_seed() {
        let mut rng = StdRng::seed_from_u64(7);
        let a = generate_address(&mut rng);
        let b = generate_address(&mut rng);

        assert_eq!(a.len(), 64);
        assert!(a.chars().all(|c| c.is_ascii_hexdigit()));
        assert_ne!(a, b);

        let mut rng_again = StdRng::seed_from_u64(7);
        assert_eq!(generate_address(&mut rng_again), a);
    }

    #[test]
    fn test_accept_transaction_appends_entry() {
        let faucet = wallet("fBTC", "faucet-addr");
        let mut mine = wallet("fBTC", "my-addr");

        let tx = mine.accept_transaction(&faucet, dec!(100)).unwrap();
        assert_eq!(tx.from(), "faucet-addr");
        assert_eq!(tx.to(), "my-addr");
        assert_eq!(tx.amount(), dec!(100));

        assert_eq!(mine.transactions().len(), 1);
        assert!(faucet.transactions().is_empty());
    }

    #[test]
    fn test_accept_transaction_rejects_currency_mismatch() {
        let faucet = wallet("fETH", "faucet-addr");
        let mut mine = wallet("fBTC", "my-addr");

        let err = mine.accept_transaction(&faucet, dec!(100)).unwrap_err();
        assert!(matches!(err, LedgerError::WalletCurrencyMismatch));
        assert!(mine.transactions().is_empty());
        assert!(faucet.transactions().is_empty());
    }

    #[test]
    fn test_balance_folds_incoming_and_outgoing() {
        let mut w = wallet("fBTC", "w");
        w.transactions = vec![
            Transaction::new("fBTC", "faucet", "w", dec!(100)).unwrap(),
            Transaction::new("fBTC", "w", "other", dec!(10)).unwrap(),
            Transaction::new("fBTC", "faucet", "w", dec!(5)).unwrap(),
        ];

        // 100 + 5 incoming, minus 10 + 2 fee outgoing
        assert_eq!(w.balance(), dec!(93.0));
    }

    #[test]
    fn test_balance_is_order_independent() {
        let entries = vec![
            Transaction::new("fBTC", "faucet", "w", dec!(100)).unwrap(),
            Transaction::new("fBTC", "w", "other", dec!(25)).unwrap(),
            Transaction::new("fBTC", "faucet", "w", dec!(1.5)).unwrap(),
        ];

        let mut forward = wallet("fBTC", "w");
        forward.transactions = entries.clone();

        let mut reversed = wallet("fBTC", "w");
        reversed.transactions = entries.into_iter().rev().collect();

        assert_eq!(forward.balance(), reversed.balance());
    }

    #[test]
    fn test_balance_of_empty_wallet_is_zero() {
        let w = wallet("fBTC", "w");
        assert_eq!(w.balance(), Decimal::ZERO);
    }

    #[test]
    fn test_save_is_idempotent_for_the_wallet_row() {
        let db = Database::open_in_memory().unwrap();
        let conn = db.lock().unwrap();

        let w = wallet("fBTC", "addr");
        w.save(&conn).unwrap();
        w.save(&conn).unwrap();

        let count: i64 = conn
            .query_row("SELECT COUNT(*) FROM user_wallets", [], |row| row.get(0))
            .unwrap();
        assert_eq!(count, 1);
    }

    #[test]
    fn test_save_cascades_to_transactions() {
        let db = Database::open_in_memory().unwrap();
        let conn = db.lock().unwrap();

        let faucet = wallet("fBTC", "faucet-addr");
        let mut mine = wallet("fBTC", "my-addr");
        mine.accept_transaction(&faucet, dec!(100)).unwrap();
        mine.accept_transaction(&faucet, dec!(50)).unwrap();
        mine.save(&conn).unwrap();

        let count: i64 = conn
            .query_row("SELECT COUNT(*) FROM transactions", [], |row| row.get(0))
            .unwrap();
        assert_eq!(count, 2);
    }

    #[test]
    fn test_find_by_user_id_returns_unloaded_wallets() {
        let db = Database::open_in_memory().unwrap();
        let conn = db.lock().unwrap();

        let owner = Uuid::new_v4();
        let mut rng = StdRng::seed_from_u64(1);
        let a = Wallet::with_generated_address(owner, "fBTC", &mut rng).unwrap();
        let b = Wallet::with_generated_address(owner, "fETH", &mut rng).unwrap();
        a.save(&conn).unwrap();
        b.save(&conn).unwrap();

        let other = wallet("fBTC", "other-addr");
        other.save(&conn).unwrap();

        let found = Wallet::find_by_user_id(&conn, owner).unwrap();
        assert_eq!(found.len(), 2);
        assert!(found.iter().all(|w| w.user_id() == owner));
        assert!(found.iter().all(|w| w.transactions().is_empty()));
    }

    #[test]
    fn test_balance_reflects_storage_after_load() {
        let db = Database::open_in_memory().unwrap();
        let conn = db.lock().unwrap();

        let faucet = wallet("fBTC", "faucet-addr");
        let mut mine = wallet("fBTC", "my-addr");
        mine.accept_transaction(&faucet, dec!(100)).unwrap();
        mine.save(&conn).unwrap();

        let mut reloaded = Wallet::find_by_user_id(&conn, mine.user_id())
            .unwrap()
            .into_iter()
            .next()
            .unwrap();
        assert_eq!(reloaded.balance(), Decimal::ZERO);

        reloaded.load_transactions(&conn).unwrap();
        assert_eq!(reloaded.balance(), dec!(100));
    }
}
