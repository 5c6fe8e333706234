use crate::errors::{Result, VaultError};
use crate::store::SecureStore;
use crate::vault::SecureVault;
use crate::wallet;
use secrecy::SecretString;
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::{Duration, Instant};
use tracing::debug;

/// Default inactivity window before an unlocked session re-locks.
pub const DEFAULT_AUTO_LOCK_TIMEOUT: Duration = Duration::from_secs(300);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LockState {
    Locked,
    Unlocked,
}

#[derive(Debug)]
struct SessionInner {
    state: LockState,
    last_activity: Instant,
}

/// The sole gateway to decrypted wallet material.
///
/// Everything that needs a mnemonic or private key goes through
/// [`VaultSession::with_mnemonic`] / [`VaultSession::with_private_key`],
/// which hand the secret to a closure and wipe it on every exit path. No
/// other component, and no caller, ever holds decrypted material beyond
/// that closure's stack frame.
///
/// The lock state plus activity timestamp is the only shared mutable
/// state in the core; one mutex serializes transitions. The mutex is held
/// only for state checks, never across key derivation or decryption, so
/// an auto-lock firing mid-operation cannot abort the operation in
/// flight: only the next call observes Locked.
#[derive(Debug)]
pub struct VaultSession<S: SecureStore> {
    vault: SecureVault<S>,
    auto_lock_timeout: Duration,
    inner: Mutex<SessionInner>,
}

impl<S: SecureStore> VaultSession<S> {
    pub fn new(vault: SecureVault<S>) -> Self {
        Self::with_timeout(vault, DEFAULT_AUTO_LOCK_TIMEOUT)
    }

    pub fn with_timeout(vault: SecureVault<S>, auto_lock_timeout: Duration) -> Self {
        Self {
            vault,
            auto_lock_timeout,
            inner: Mutex::new(SessionInner {
                state: LockState::Locked,
                last_activity: Instant::now(),
            }),
        }
    }

    pub fn vault(&self) -> &SecureVault<S> {
        &self.vault
    }

    fn guard(&self) -> MutexGuard<'_, SessionInner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Current state, with the inactivity timeout applied lazily: an
    /// expired session reads as Locked even if no timer ever fired.
    pub fn state(&self) -> LockState {
        let mut g = self.guard();
        self.expire_if_idle(&mut g);
        g.state
    }

    /// Validate `password` against the vault and open the session.
    ///
    /// The decrypted phrase is used only as proof the password is right;
    /// it is wiped before this returns. Failures leave the session Locked
    /// and carry no more detail than the vault error itself; attempt
    /// counting and lockout policy live outside the core.
    pub fn unlock(&self, password: &SecretString) -> Result<()> {
        let probe = self.vault.retrieve_seed(password)?;
        drop(probe);

        let mut g = self.guard();
        g.state = LockState::Unlocked;
        g.last_activity = Instant::now();
        debug!("session unlocked");
        Ok(())
    }

    /// Unconditional transition to Locked.
    pub fn lock(&self) {
        let mut g = self.guard();
        if g.state == LockState::Unlocked {
            debug!("session locked");
        }
        g.state = LockState::Locked;
    }

    /// Run `op` with the decrypted mnemonic.
    ///
    /// Requires Unlocked; a locked session fails `WalletLocked` before a
    /// single store read happens. The mnemonic is wiped on every exit
    /// path, success or error, and successful operations reset the
    /// activity clock.
    pub fn with_mnemonic<T>(
        &self,
        password: &SecretString,
        op: impl FnOnce(&str) -> Result<T>,
    ) -> Result<T> {
        self.require_unlocked()?;
        let mnemonic = self.vault.retrieve_seed(password)?;
        let out = op(&mnemonic);
        drop(mnemonic);
        if out.is_ok() {
            self.touch();
        }
        out
    }

    /// Run `op` with a transient private key for `account_index`.
    ///
    /// Same contract as [`Self::with_mnemonic`]; both the mnemonic and
    /// the derived key are wiped on every exit path.
    pub fn with_private_key<T>(
        &self,
        password: &SecretString,
        account_index: u32,
        op: impl FnOnce(&[u8; 32]) -> Result<T>,
    ) -> Result<T> {
        self.require_unlocked()?;
        let mnemonic = self.vault.retrieve_seed(password)?;
        let key = wallet::derive_private_key(&mnemonic, account_index);
        drop(mnemonic);
        let key = key?;
        let out = op(&key);
        drop(key);
        if out.is_ok() {
            self.touch();
        }
        out
    }

    /// Periodic tick from the host (every ~10s): re-lock after the
    /// configured inactivity window. Entry checks apply the same timeout
    /// lazily, so this only bounds how long an idle process stays
    /// nominally unlocked.
    pub fn auto_lock_check(&self) {
        let mut g = self.guard();
        self.expire_if_idle(&mut g);
    }

    /// Host lifecycle hook: the app went to background, lock immediately.
    pub fn on_background(&self) {
        debug!("background transition; locking");
        self.lock();
    }

    fn require_unlocked(&self) -> Result<()> {
        let mut g = self.guard();
        self.expire_if_idle(&mut g);
        match g.state {
            LockState::Unlocked => Ok(()),
            LockState::Locked => Err(VaultError::WalletLocked),
        }
    }

    fn touch(&self) {
        self.guard().last_activity = Instant::now();
    }

    fn expire_if_idle(&self, g: &mut MutexGuard<'_, SessionInner>) {
        if g.state == LockState::Unlocked && g.last_activity.elapsed() > self.auto_lock_timeout {
            debug!("auto-lock timeout exceeded");
            g.state = LockState::Locked;
        }
    }
}
