//! User identities owning wallets
//!
//! Users are validated at construction and never hold a raw password: the
//! credential is hashed with argon2 immediately and only the hash is kept.
//! Email uniqueness is enforced by the storage constraint, not pre-checked
//! in memory; the save path translates that violation into a domain
//! conflict. The domain-resolvability half of email validation talks to the
//! outside world, so it sits behind [`DomainResolver`] and tests supply
//! their own implementation.

use crate::error::{LedgerError, Result};
use crate::persistence::{db_err, is_unique_violation};
use crate::wallet::Wallet;
use argon2::password_hash::{rand_core::OsRng, PasswordHash, PasswordHasher, PasswordVerifier, SaltString};
use argon2::Argon2;
use once_cell::sync::Lazy;
use rand::Rng;
use regex::Regex;
use rusqlite::{params, Connection};
use std::collections::HashSet;
use std::net::ToSocketAddrs;
use uuid::Uuid;

static NAME_REGEX: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)^[\p{L}'][ \p{L}'-]*[\p{L}]$").expect("name pattern is valid")
});

/// Answers whether an email domain has a resolvable address. Injected so
/// validation is testable without live DNS.
pub trait DomainResolver: Send + Sync {
    fn resolves(&self, domain: &str) -> bool;
}

/// System resolver backed by the OS.
#[derive(Debug, Clone, Copy, Default)]
pub struct DnsResolver;

impl DomainResolver for DnsResolver {
    fn resolves(&self, domain: &str) -> bool {
        (domain, 0u16)
            .to_socket_addrs()
            .map(|mut addrs| addrs.next().is_some())
            .unwrap_or(false)
    }
}

#[derive(Debug, Clone)]
pub struct User {
    id: Uuid,
    email: String,
    password: String,
    first_name: String,
    last_name: String,
    wallets: Vec<Wallet>,
}

impl User {
    /// Validates all fields, hashes the password, and discards the raw one.
    pub fn new(
        email: &str,
        password: &str,
        first_name: &str,
        last_name: &str,
        resolver: &dyn DomainResolver,
    ) -> Result<Self> {
        if invalid_password(password) {
            return Err(LedgerError::InvalidPassword);
        }

        if invalid_name(first_name) {
            return Err(LedgerError::InvalidFirstName);
        }

        if invalid_name(last_name) {
            return Err(LedgerError::InvalidLastName);
        }

        if invalid_email(email, resolver) {
            return Err(LedgerError::InvalidEmail);
        }

        let salt = SaltString::generate(&mut OsRng);
        let password = Argon2::default()
            .hash_password(password.as_bytes(), &salt)
            .map_err(|e| LedgerError::Internal(format!("password hashing failed: {}", e)))?
            .to_string();

        Ok(User {
            id: Uuid::new_v4(),
            email: email.to_string(),
            password,
            first_name: first_name.to_string(),
            last_name: last_name.to_string(),
            wallets: Vec::new(),
        })
    }

    /// One auto-addressed wallet per distinct currency; empty strings are
    /// dropped. Wallets live in memory until [`User::save`].
    pub fn create_wallets<R: Rng + ?Sized>(
        &mut self,
        currencies: &[&str],
        rng: &mut R,
    ) -> Result<&[Wallet]> {
        let mut seen = HashSet::new();
        let mut wallets = Vec::new();
        for currency in currencies {
            if currency.is_empty() || !seen.insert(*currency) {
                continue;
            }

            wallets.push(Wallet::with_generated_address(self.id, currency, rng)?);
        }

        self.wallets = wallets;
        Ok(&self.wallets)
    }

    /// Inserts the user row, then every in-memory wallet (each cascading to
    /// its transactions). A storage-level uniqueness violation on the email
    /// column becomes an [`LedgerError::EmailConflict`]. The first failure
    /// aborts the remaining saves.
    pub fn save(&self, conn: &Connection) -> Result<()> {
        conn.execute(
            "INSERT INTO users(id, email, password, first_name, last_name)
             VALUES(?1, ?2, ?3, ?4, ?5)",
            params![
                self.id.to_string(),
                self.email,
                self.password,
                self.first_name,
                self.last_name
            ],
        )
        .map_err(|e| {
            if is_unique_violation(&e, "users.email") {
                LedgerError::EmailConflict
            } else {
                db_err("Failed to save user", e)
            }
        })?;

        for wallet in &self.wallets {
            wallet.save(conn)?;
        }

        Ok(())
    }

    pub fn find_by_email(conn: &Connection, email: &str) -> Result<User> {
        Self::find_one(
            conn,
            "SELECT id, email, password, first_name, last_name FROM users WHERE email = ?1",
            params![email],
        )
    }

    pub fn find_by_id(conn: &Connection, id: Uuid) -> Result<User> {
        Self::find_one(
            conn,
            "SELECT id, email, password, first_name, last_name FROM users WHERE id = ?1",
            params![id.to_string()],
        )
    }

    /// Reconstructs a user field-by-field with an empty wallet list; loaded
    /// data is assumed already valid.
    fn find_one<P: rusqlite::Params>(conn: &Connection, sql: &str, params: P) -> Result<User> {
        let result = conn.query_row(sql, params, |row| {
            let id: String = row.get(0)?;
            let id = Uuid::parse_str(&id).map_err(|_| rusqlite::Error::InvalidQuery)?;
            Ok(User {
                id,
                email: row.get(1)?,
                password: row.get(2)?,
                first_name: row.get(3)?,
                last_name: row.get(4)?,
                wallets: Vec::new(),
            })
        });

        match result {
            Ok(user) => Ok(user),
            Err(rusqlite::Error::QueryReturnedNoRows) => Err(LedgerError::NotFound),
            Err(e) => Err(db_err("Failed to query user", e)),
        }
    }

    /// Replaces the in-memory wallet list with the owned wallets from
    /// storage, each with an empty transaction list.
    pub fn load_wallets(&mut self, conn: &Connection) -> Result<&[Wallet]> {
        self.wallets = Wallet::find_by_user_id(conn, self.id)?;
        Ok(&self.wallets)
    }

    /// Compares a candidate password against the stored argon2 hash. The
    /// sole caller is the authentication layer.
    pub fn verify_password(&self, candidate: &str) -> bool {
        PasswordHash::new(&self.password)
            .map(|parsed| {
                Argon2::default()
                    .verify_password(candidate.as_bytes(), &parsed)
                    .is_ok()
            })
            .unwrap_or(false)
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn email(&self) -> &str {
        &self.email
    }

    pub fn first_name(&self) -> &str {
        &self.first_name
    }

    pub fn last_name(&self) -> &str {
        &self.last_name
    }

    /// The stored hash, never the raw password.
    pub fn password(&self) -> &str {
        &self.password
    }

    pub fn wallets(&self) -> &[Wallet] {
        &self.wallets
    }

    pub fn wallets_mut(&mut self) -> &mut [Wallet] {
        &mut self.wallets
    }
}

fn invalid_password(password: &str) -> bool {
    let l = password.len();
    !(8..=50).contains(&l)
}

fn invalid_name(name: &str) -> bool {
    !NAME_REGEX.is_match(name)
}

fn invalid_email(email: &str, resolver: &dyn DomainResolver) -> bool {
    if email.contains(|c| c == ' ' || c == '<' || c == '>') {
        return true;
    }

    let (local, domain) = match email.split_once('@') {
        Some(parts) => parts,
        None => return true,
    };

    if local.is_empty() || domain.is_empty() || domain.contains('@') {
        return true;
    }

    let labels_ok = domain
        .split('.')
        .all(|label| !label.is_empty() && label.chars().all(|c| c.is_alphanumeric() || c == '-'));
    if !labels_ok {
        return true;
    }

    !resolver.resolves(domain)
}
