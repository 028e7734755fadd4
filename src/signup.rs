//! Signup coordination: all-or-nothing admission of a new user
//!
//! Admission stages everything in memory first (validated user, one wallet
//! per supported currency, one seed transaction per wallet from the faucet),
//! then persists the whole graph inside a single unit of work. Either the
//! user row, the wallet rows, and the transaction rows all become visible
//! together, or none of them do.

use crate::error::{LedgerError, Result};
use crate::faucet::{Faucet, FAKE_BTC, FAKE_ETH};
use crate::persistence::{Database, UnitOfWork};
use crate::user::{DomainResolver, User};
use rand::Rng;
use rust_decimal::Decimal;
use tracing::error;

/// Units granted to every fresh wallet by its faucet.
const SEED_UNITS: i64 = 100;

pub struct NewUser<'a> {
    pub email: &'a str,
    pub password: &'a str,
    pub first_name: &'a str,
    pub last_name: &'a str,
}

/// Validates, provisions, seeds, and atomically persists a new user.
///
/// Failures before the storage transaction begins are ordinary domain
/// errors. Once it has begun, any save failure triggers a rollback before
/// the error is reported; a rollback failure on top of that is reported at
/// maximum severity as well, because the business error path could not undo
/// its effect.
pub fn admit_user<R: Rng + ?Sized>(
    db: &Database,
    faucet: &Faucet,
    resolver: &dyn DomainResolver,
    rng: &mut R,
    details: NewUser<'_>,
) -> Result<User> {
    let mut user = User::new(
        details.email,
        details.password,
        details.first_name,
        details.last_name,
        resolver,
    )?;
    user.create_wallets(&[FAKE_BTC, FAKE_ETH], rng)?;

    let seed = Decimal::from(SEED_UNITS);
    for wallet in user.wallets_mut() {
        let source = faucet.get(wallet.currency()).ok_or_else(|| {
            LedgerError::Internal(format!(
                "no faucet wallet for currency {}",
                wallet.currency()
            ))
        })?;
        wallet.accept_transaction(source, seed)?;
    }

    let conn = db.lock()?;
    let uow = UnitOfWork::begin(&conn)?;
    if let Err(err) = user.save(&conn) {
        if let Err(rollback_err) = uow.rollback() {
            error!(
                error = %err,
                rollback_error = %rollback_err,
                "CRITICAL: could not rollback after failed signup save"
            );
        }
        return Err(err);
    }
    uow.commit()?;

    Ok(user)
}
