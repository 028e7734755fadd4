//! Ledger entries: immutable records of value moving between two addresses
//!
//! A transaction is constructed in memory, validated up front, and persisted
//! as a single row that is never updated or deleted. The fee is fixed at
//! creation time as a fraction of the principal and is charged to the source
//! wallet on top of the amount.

use crate::error::{LedgerError, Result};
use crate::persistence::db_err;
use chrono::{DateTime, SecondsFormat, Utc};
use once_cell::sync::Lazy;
use rusqlite::{params, Connection};
use rust_decimal::Decimal;
use uuid::Uuid;

/// Fraction of the principal charged to the sender.
pub static FEE_RATE: Lazy<Decimal> = Lazy::new(|| Decimal::new(2, 1)); // 0.2

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Transaction {
    id: Uuid,
    currency: String,
    from: String,
    to: String,
    amount: Decimal,
    fee: Decimal,
    timestamp: DateTime<Utc>,
}

impl Transaction {
    /// Validates and builds a new ledger entry stamped with the current UTC
    /// time. Rejects empty currency or addresses and non-positive amounts.
    pub fn new(currency: &str, from: &str, to: &str, amount: Decimal) -> Result<Self> {
        Self::new_at(currency, from, to, amount, Utc::now())
    }

    /// Same as [`Transaction::new`] with an explicit timestamp so tests can
    /// pin the clock.
    pub fn new_at(
        currency: &str,
        from: &str,
        to: &str,
        amount: Decimal,
        timestamp: DateTime<Utc>,
    ) -> Result<Self> {
        if currency.is_empty() {
            return Err(LedgerError::InvalidCurrency);
        }

        if from.is_empty() || to.is_empty() {
            return Err(LedgerError::InvalidAddress);
        }

        if amount <= Decimal::ZERO {
            return Err(LedgerError::InvalidAmount);
        }

        let mut t = Transaction {
            id: Uuid::new_v4(),
            currency: currency.to_string(),
            from: from.to_string(),
            to: to.to_string(),
            amount,
            fee: Decimal::ZERO,
            timestamp,
        };
        t.fee = t.calculate_fee();

        Ok(t)
    }

    pub fn calculate_fee(&self) -> Decimal {
        self.amount * *FEE_RATE
    }

    /// Principal plus fee: what the source wallet is actually debited.
    pub fn full_amount(&self) -> Decimal {
        self.amount + self.calculate_fee()
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn currency(&self) -> &str {
        &self.currency
    }

    pub fn from(&self) -> &str {
        &self.from
    }

    pub fn to(&self) -> &str {
        &self.to
    }

    pub fn amount(&self) -> Decimal {
        self.amount
    }

    pub fn fee(&self) -> Decimal {
        self.fee
    }

    pub fn timestamp(&self) -> DateTime<Utc> {
        self.timestamp
    }

    /// Inserts one immutable row; never updates.
    pub fn save(&self, conn: &Connection) -> Result<()> {
        conn.execute(
            "INSERT INTO transactions(id, currency, from_wallet, to_wallet, amount, fee, timestamp)
             VALUES(?1, ?2, ?3, ?4, ?5, ?6, ?7)",
            params![
                self.id.to_string(),
                self.currency,
                self.from,
                self.to,
                self.amount.to_string(),
                self.fee.to_string(),
                // Fixed-width RFC 3339 so lexicographic order is chronological
                self.timestamp.to_rfc3339_opts(SecondsFormat::Micros, true),
            ],
        )
        .map_err(|e| db_err("Failed to save transaction", e))?;

        Ok(())
    }

    /// Every entry where `address` is the source or the destination, ordered
    /// by timestamp then id. Rows are reconstructed field-by-field; loaded
    /// data is assumed already valid.
    pub fn find_all_with_wallet(conn: &Connection, address: &str) -> Result<Vec<Transaction>> {
        let mut stmt = conn
            .prepare(
                "SELECT id, currency, from_wallet, to_wallet, amount, fee, timestamp
                 FROM transactions
                 WHERE from_wallet = ?1 OR to_wallet = ?1
                 ORDER BY timestamp ASC, id ASC",
            )
            .map_err(|e| db_err("Failed to prepare transaction query", e))?;

        let rows = stmt
            .query_map(params![address], |row| {
                let id: String = row.get(0)?;
                let currency: String = row.get(1)?;
                let from: String = row.get(2)?;
                let to: String = row.get(3)?;
                let amount: String = row.get(4)?;
                let fee: String = row.get(5)?;
                let timestamp: String = row.get(6)?;

                let id = Uuid::parse_str(&id).map_err(|_| rusqlite::Error::InvalidQuery)?;
                let amount: Decimal =
                    amount.parse().map_err(|_| rusqlite::Error::InvalidQuery)?;
                let fee: Decimal = fee.parse().map_err(|_| rusqlite::Error::InvalidQuery)?;
                let timestamp = DateTime::parse_from_rfc3339(&timestamp)
                    .map_err(|_| rusqlite::Error::InvalidQuery)?
                    .with_timezone(&Utc);

                Ok(Transaction {
                    id,
                    currency,
                    from,
                    to,
                    amount,
                    fee,
                    timestamp,
                })
            })
            .map_err(|e| db_err("Failed to query transactions", e))?;

        let mut transactions = Vec::new();
        for row in rows {
            transactions.push(row.map_err(|e| db_err("Failed to read transaction row", e))?);
        }

        Ok(transactions)
    }
}
