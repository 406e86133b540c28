//! Per-account sessions.
//!
//! A [`Session`] binds one connected signer to the ledger client, the mint
//! the user is working with, and the background pollers. Deactivating a
//! session stops its pollers before anything else can observe the account,
//! so a later session never sees stale updates from an earlier one.

use std::future::Future;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use tokio::sync::watch;
use uuid::Uuid;

use crate::config::{ConsoleConfig, MintConfig, PollingConfig};
use crate::ledger::client::LedgerClient;
use crate::ledger::types::{LedgerError, LedgerResult, Mint, Pubkey};
use crate::ledger::wallet::Signer;
use crate::lifecycle::shutdown::Shutdown;
use crate::polling::{BalancePoller, BalanceSnapshot, HistoryPoller, HistorySnapshot, PollerTask};
use crate::workflows::{InFlight, WorkflowKind};

/// Settings a session hands to its workflows and pollers.
#[derive(Debug, Clone)]
pub struct SessionSettings {
    pub polling: PollingConfig,
    pub mint: MintConfig,
    /// Cluster name for explorer links.
    pub cluster: String,
}

impl From<&ConsoleConfig> for SessionSettings {
    fn from(config: &ConsoleConfig) -> Self {
        Self {
            polling: config.polling.clone(),
            mint: config.mint.clone(),
            cluster: config.rpc.cluster.clone(),
        }
    }
}

impl Default for SessionSettings {
    fn default() -> Self {
        Self::from(&ConsoleConfig::default())
    }
}

/// Live receivers for a session's pollers.
#[derive(Debug, Clone)]
pub struct PollingFeeds {
    pub balance: watch::Receiver<BalanceSnapshot>,
    pub history: watch::Receiver<HistorySnapshot>,
}

/// One connected account.
pub struct Session {
    id: Uuid,
    account: Pubkey,
    signer: Arc<dyn Signer>,
    ledger: LedgerClient,
    settings: SessionSettings,
    mint: watch::Sender<Option<Mint>>,
    in_flight: InFlight,
    shutdown: Shutdown,
    active: AtomicBool,
    pollers: Mutex<Vec<PollerTask>>,
}

impl Session {
    /// Start a session for the signer's account.
    ///
    /// Fails `NotConnected` when the signer exposes no account.
    pub fn activate(
        signer: Arc<dyn Signer>,
        ledger: LedgerClient,
        settings: SessionSettings,
        in_flight: InFlight,
    ) -> LedgerResult<Arc<Self>> {
        let account = signer.public_key().ok_or(LedgerError::NotConnected)?;
        let (mint, _) = watch::channel(None);
        let session = Arc::new(Self {
            id: Uuid::new_v4(),
            account,
            signer,
            ledger,
            settings,
            mint,
            in_flight,
            shutdown: Shutdown::new(),
            active: AtomicBool::new(true),
            pollers: Mutex::new(Vec::new()),
        });
        tracing::info!(session = %session.id, account = %account, "Session activated");
        Ok(session)
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn account(&self) -> Pubkey {
        self.account
    }

    pub fn signer(&self) -> &dyn Signer {
        self.signer.as_ref()
    }

    pub fn ledger(&self) -> &LedgerClient {
        &self.ledger
    }

    pub fn settings(&self) -> &SessionSettings {
        &self.settings
    }

    pub fn shutdown(&self) -> &Shutdown {
        &self.shutdown
    }

    pub fn is_active(&self) -> bool {
        self.active.load(Ordering::SeqCst)
    }

    /// The mint this session is working with, if any.
    pub fn mint(&self) -> Option<Mint> {
        *self.mint.borrow()
    }

    pub fn set_mint(&self, mint: Mint) {
        tracing::info!(session = %self.id, mint = %mint.address, decimals = mint.decimals, "Session mint set");
        self.mint.send_replace(Some(mint));
    }

    /// Look up an existing mint on the ledger and make it the session mint.
    pub async fn attach_mint(&self, address: &Pubkey) -> LedgerResult<Mint> {
        let mint = self.ledger.get_mint(address).await?;
        self.set_mint(mint);
        Ok(mint)
    }

    pub fn subscribe_mint(&self) -> watch::Receiver<Option<Mint>> {
        self.mint.subscribe()
    }

    /// Run `operation` while holding the `(account, kind)` in-flight slot.
    ///
    /// Fails `WorkflowBusy` if the same workflow is already running for this
    /// account, and `NotConnected` if the session is or becomes inactive.
    pub async fn run_exclusive<T, F>(&self, kind: WorkflowKind, operation: F) -> LedgerResult<T>
    where
        F: Future<Output = LedgerResult<T>>,
    {
        if !self.is_active() {
            return Err(LedgerError::NotConnected);
        }
        let _guard = self.in_flight.try_acquire(self.account, kind)?;

        tokio::select! {
            result = operation => result,
            _ = self.shutdown.wait() => {
                tracing::warn!(session = %self.id, workflow = %kind, "Workflow abandoned on deactivation");
                Err(LedgerError::NotConnected)
            }
        }
    }

    /// Spawn the balance and history pollers.
    pub fn start_polling(self: &Arc<Self>) -> LedgerResult<PollingFeeds> {
        if !self.is_active() {
            return Err(LedgerError::NotConnected);
        }
        let (balance, balance_task) = BalancePoller::new(self.clone()).spawn().into_parts();
        let (history, history_task) = HistoryPoller::new(self.clone()).spawn().into_parts();

        let mut pollers = self.pollers.lock().unwrap_or_else(|e| e.into_inner());
        pollers.push(balance_task);
        pollers.push(history_task);
        tracing::info!(session = %self.id, pollers = pollers.len(), "Pollers started");

        Ok(PollingFeeds { balance, history })
    }

    /// Stop pollers, abandon in-flight workflows and refuse further work.
    pub async fn deactivate(&self) {
        if !self.active.swap(false, Ordering::SeqCst) {
            return;
        }
        self.shutdown.trigger();

        let pollers = std::mem::take(&mut *self.pollers.lock().unwrap_or_else(|e| e.into_inner()));
        for poller in pollers {
            poller.stop().await;
        }
        tracing::info!(session = %self.id, account = %self.account, "Session deactivated");
    }
}

impl std::fmt::Debug for Session {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Session")
            .field("id", &self.id)
            .field("account", &self.account)
            .field("mint", &self.mint())
            .field("active", &self.is_active())
            .finish()
    }
}

/// Holds the current session, replacing it when another account connects.
pub struct SessionManager {
    ledger: LedgerClient,
    settings: SessionSettings,
    in_flight: InFlight,
    current: tokio::sync::Mutex<Option<Arc<Session>>>,
}

impl SessionManager {
    pub fn new(ledger: LedgerClient, settings: SessionSettings) -> Self {
        Self {
            ledger,
            settings,
            in_flight: InFlight::new(),
            current: tokio::sync::Mutex::new(None),
        }
    }

    /// Deactivate any current session, then activate one for `signer`.
    pub async fn connect(&self, signer: Arc<dyn Signer>) -> LedgerResult<Arc<Session>> {
        let mut current = self.current.lock().await;
        if let Some(previous) = current.take() {
            previous.deactivate().await;
        }
        let session = Session::activate(
            signer,
            self.ledger.clone(),
            self.settings.clone(),
            self.in_flight.clone(),
        )?;
        *current = Some(session.clone());
        Ok(session)
    }

    pub async fn disconnect(&self) {
        if let Some(session) = self.current.lock().await.take() {
            session.deactivate().await;
        }
    }

    pub async fn current(&self) -> Option<Arc<Session>> {
        self.current.lock().await.clone()
    }
}
