//! Account discovery on a hardware device
//!
//! For every derivation mode of a currency the walker resolves the parent
//! key on the device, then probes account indices one after the other: ask
//! the device for the account key, fetch the provider snapshot, build the
//! account and decide whether to emit it and whether to probe the next
//! index. Accounts are pushed to a [`ScanHandle`] as soon as they are
//! confirmed, in increasing index order within a mode and in mode order.
//!
//! # Continuation
//!
//! An empty account bumps a per-mode counter; the walker keeps probing while
//! the counter does not exceed the mode's mandatory empty account skip. A
//! non-empty account resets the counter and the walker continues only if
//! the mode is iterable.
//!
//! # Cancellation
//!
//! Cooperative: the flag is checked before every device request, provider
//! request and emission. Once it is set nothing else reaches the device or
//! the provider and the stream ends with [`ScanEvent::Cancelled`].

use std::pin::Pin;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::task::{Context, Poll};

use futures::Stream;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use crate::account::{is_account_empty, should_show_new_account, Account};
use crate::build_account::{build_account, AccountSource};
use crate::context::WalkerContext;
use crate::currency::CryptoCurrency;
use crate::derivation::{
    derivation_modes_for_currency, parse_path, resolve_scheme, DerivationMode, DerivationScheme,
    SchemeParams,
};
use crate::device::{assemble_xpub, AddressOptions, DeviceAddress, DeviceChannel};
use crate::error::HwLedgerError;
use crate::families::CurrencyFamily;
use crate::provider::fetch_snapshot;

const EVENT_BUFFER: usize = 16;

/// Shared stop flag, settable from outside the walker
#[derive(Debug, Clone, Default)]
pub struct ScanCanceller(Arc<AtomicBool>);

impl ScanCanceller {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::Release);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::Acquire)
    }
}

/// What to scan
#[derive(Debug, Clone)]
pub struct ScanRequest {
    pub currency: &'static CryptoCurrency,
    /// Restrict the scan to these modes (currency order is kept)
    pub modes: Option<Vec<DerivationMode>>,
    /// Force showing (or hiding) empty accounts for every mode
    pub show_new_accounts: Option<bool>,
    /// Previously stored accounts, reattached by id
    pub existing_accounts: Vec<Account>,
}

impl ScanRequest {
    pub fn new(currency: &'static CryptoCurrency) -> Self {
        Self {
            currency,
            modes: None,
            show_new_accounts: None,
            existing_accounts: Vec::new(),
        }
    }

    pub fn with_modes(mut self, modes: Vec<DerivationMode>) -> Self {
        self.modes = Some(modes);
        self
    }

    pub fn with_show_new_accounts(mut self, show: bool) -> Self {
        self.show_new_accounts = Some(show);
        self
    }

    pub fn with_existing_accounts(mut self, accounts: Vec<Account>) -> Self {
        self.existing_accounts = accounts;
        self
    }

    /// Modes to walk, in scan order
    pub fn derivation_modes(&self) -> Vec<DerivationMode> {
        derivation_modes_for_currency(self.currency)
            .into_iter()
            .filter(|mode| self.modes.as_ref().map_or(true, |m| m.contains(mode)))
            .collect()
    }
}

#[derive(Debug)]
pub enum ScanEvent {
    Account(Box<Account>),
    Completed,
    Cancelled,
    Failed(HwLedgerError),
}

impl ScanEvent {
    pub fn is_terminal(&self) -> bool {
        !matches!(self, Self::Account(_))
    }
}

/// Walker bookkeeping for one derivation mode
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScanState {
    pub mode: DerivationMode,
    pub index: u32,
    /// Consecutive empty accounts seen so far
    pub empty_count: u32,
    pub mandatory_empty_account_skip: u32,
    pub show_new_account: bool,
    /// Public key at the parent path
    pub seed_identifier: String,
}

impl ScanState {
    pub fn new(
        mode: DerivationMode,
        seed_identifier: String,
        mandatory_empty_account_skip: u32,
        show_new_account: bool,
    ) -> Self {
        Self {
            mode,
            index: mode.properties().starts_at,
            empty_count: 0,
            mandatory_empty_account_skip,
            show_new_account,
            seed_identifier,
        }
    }

    /// Whether the account at the current index stays out of the stream
    pub fn is_hidden(&self, is_empty: bool) -> bool {
        (is_empty && !self.show_new_account) || !self.mode.supports_index(self.index)
    }

    /// Record the current account and move to the next index.
    ///
    /// Returns `false` once the mode is exhausted.
    pub fn advance(&mut self, is_empty: bool) -> bool {
        let keep_going = if is_empty {
            self.empty_count += 1;
            self.empty_count <= self.mandatory_empty_account_skip
        } else {
            self.empty_count = 0;
            self.mode.is_iterable()
        };
        if !keep_going {
            return false;
        }
        match self.index.checked_add(1) {
            Some(next) if self.mode.supports_index(next) => {
                self.index = next;
                true
            }
            _ => false,
        }
    }
}

/// Scheme of `mode`, or `None` when the mode does not apply to `currency`.
///
/// An unsupported mode only ends that mode; other errors end the scan.
fn mode_scheme(
    currency: &CryptoCurrency,
    mode: DerivationMode,
) -> Result<Option<DerivationScheme>, HwLedgerError> {
    match resolve_scheme(currency, mode) {
        Ok(scheme) => Ok(Some(scheme)),
        Err(e @ HwLedgerError::UnsupportedDerivationMode { .. }) => {
            log::warn!("⚠️  {}, skipping mode", e);
            Ok(None)
        }
        Err(e) => Err(e),
    }
}

enum WalkOutcome {
    Completed,
    Cancelled,
}

struct AccountWalker<'a, D: DeviceChannel + ?Sized> {
    ctx: &'a WalkerContext,
    device: &'a mut D,
    request: &'a ScanRequest,
    canceller: ScanCanceller,
    events: mpsc::Sender<ScanEvent>,
}

impl<'a, D: DeviceChannel + ?Sized> AccountWalker<'a, D> {
    fn cancelled(&self) -> bool {
        self.canceller.is_cancelled()
    }

    async fn run(&mut self) -> Result<WalkOutcome, HwLedgerError> {
        let currency = self.request.currency;
        let family = self.ctx.families().for_currency(currency)?.clone();
        let modes = self.request.derivation_modes();
        log::info!(
            "🔍 Scanning {} accounts over {} derivation modes",
            currency.name,
            modes.len()
        );

        for mode in modes {
            if self.cancelled() {
                return Ok(WalkOutcome::Cancelled);
            }

            let Some(scheme) = mode_scheme(currency, mode)? else {
                continue;
            };
            let parent_path = scheme
                .truncate_before_account()
                .instantiate(&SchemeParams::new(currency.coin_type));
            log::debug!("Resolving parent key for mode {} at {}", mode, parent_path);

            let parent = match self
                .device
                .get_public_key_and_address(&parent_path, AddressOptions::for_mode(mode))
                .await
            {
                Ok(parent) => parent,
                Err(e) if e.is_unsupported_mode(mode) => {
                    log::warn!(
                        "⚠️  Device app does not support {} paths, skipping mode",
                        mode
                    );
                    continue;
                }
                Err(e) => return Err(e.into()),
            };

            let show_new_account = self
                .request
                .show_new_accounts
                .unwrap_or_else(|| should_show_new_account(currency, mode, self.ctx.config()));
            let mut state = ScanState::new(
                mode,
                parent.public_key.clone(),
                self.ctx.config().mandatory_empty_account_skip(mode),
                show_new_account,
            );

            if let WalkOutcome::Cancelled = self
                .walk_mode(&scheme, &parent_path, &parent, &*family, &mut state)
                .await?
            {
                return Ok(WalkOutcome::Cancelled);
            }
            log::debug!("Mode {} done after index {}", mode, state.index);
        }

        log::info!("✅ Scan of {} accounts complete", currency.name);
        Ok(WalkOutcome::Completed)
    }

    async fn walk_mode(
        &mut self,
        scheme: &DerivationScheme,
        parent_path: &str,
        parent: &DeviceAddress,
        family: &dyn CurrencyFamily,
        state: &mut ScanState,
    ) -> Result<WalkOutcome, HwLedgerError> {
        let ctx = self.ctx;
        let request = self.request;
        let currency = request.currency;
        let options = AddressOptions::for_mode(state.mode);

        loop {
            if self.cancelled() {
                return Ok(WalkOutcome::Cancelled);
            }

            let params = SchemeParams::new(currency.coin_type).with_account(state.index);
            let account_path = scheme.truncate_after_account().instantiate(&params);

            let (xpub_or_address, xpub) = if family.uses_extended_keys() {
                let answer = self
                    .device
                    .get_public_key_and_address(&account_path, options.with_chain_code())
                    .await?;
                let parent_key = match account_path.rsplit_once('/') {
                    Some((immediate_parent, _)) if immediate_parent != parent_path => {
                        if self.cancelled() {
                            return Ok(WalkOutcome::Cancelled);
                        }
                        self.device
                            .get_public_key_and_address(immediate_parent, options)
                            .await?
                            .public_key
                    }
                    _ => parent.public_key.clone(),
                };
                let xpub = assemble_xpub(
                    currency.key_network,
                    &parse_path(&account_path)?,
                    &parent_key,
                    &answer,
                )?
                .to_string();
                (xpub.clone(), Some(xpub))
            } else {
                let full_path = scheme.instantiate(&params);
                let answer = self
                    .device
                    .get_public_key_and_address(&full_path, options)
                    .await?;
                (answer.address, None)
            };

            let source = AccountSource {
                currency,
                derivation_mode: state.mode,
                index: state.index,
                seed_identifier: &state.seed_identifier,
                xpub_or_address: &xpub_or_address,
                xpub: xpub.as_deref(),
            };
            let identity = source.provider_identity()?;
            let account_id = source.account_id();
            let existing = request
                .existing_accounts
                .iter()
                .find(|a| a.id == account_id);

            let canceller = self.canceller.clone();
            let is_cancelled = move || canceller.is_cancelled();
            let Some(snapshot) = fetch_snapshot(ctx.provider(), &identity, &is_cancelled).await?
            else {
                return Ok(WalkOutcome::Cancelled);
            };

            let (is_empty, account) = match build_account(ctx.families(), &source, &snapshot, existing)
            {
                Ok(account) => (is_account_empty(&account), Some(account)),
                Err(HwLedgerError::FreshAddressUnavailable(id)) => {
                    log::warn!("⚠️  No fresh address for {}, account not emitted", id);
                    (snapshot.raw_operations.is_empty(), None)
                }
                Err(e) => return Err(e),
            };

            match account {
                Some(account) if !state.is_hidden(is_empty) => {
                    if self.cancelled() {
                        return Ok(WalkOutcome::Cancelled);
                    }
                    log::info!("📒 Found {} at {}", account.name, account_path);
                    if self
                        .events
                        .send(ScanEvent::Account(Box::new(account)))
                        .await
                        .is_err()
                    {
                        log::debug!("Scan consumer went away");
                        return Ok(WalkOutcome::Cancelled);
                    }
                }
                Some(_) => log::debug!("Hiding empty account at {}", account_path),
                None => {}
            }

            if !state.advance(is_empty) {
                return Ok(WalkOutcome::Completed);
            }
        }
    }
}

/// Consumer side of a running scan
///
/// Yields accounts followed by exactly one terminal event. Dropping the
/// handle cancels the scan.
pub struct ScanHandle {
    events: mpsc::Receiver<ScanEvent>,
    canceller: ScanCanceller,
    task: JoinHandle<()>,
}

/// Everything a scan produced
#[derive(Debug)]
pub struct ScanSummary {
    pub accounts: Vec<Account>,
    /// Terminal event; `None` if the walker task died without one
    pub outcome: Option<ScanEvent>,
}

impl ScanSummary {
    /// Accounts of a completed or cancelled scan, or the failure
    pub fn into_result(self) -> Result<Vec<Account>, HwLedgerError> {
        match self.outcome {
            Some(ScanEvent::Failed(e)) => Err(e),
            Some(_) => Ok(self.accounts),
            None => Err(HwLedgerError::sync("scan ended without a terminal event")),
        }
    }
}

impl ScanHandle {
    pub fn canceller(&self) -> ScanCanceller {
        self.canceller.clone()
    }

    pub fn cancel(&self) {
        self.canceller.cancel();
    }

    pub async fn next_event(&mut self) -> Option<ScanEvent> {
        self.events.recv().await
    }

    /// Drain the stream until its terminal event
    pub async fn collect(mut self) -> ScanSummary {
        let mut accounts = Vec::new();
        while let Some(event) = self.events.recv().await {
            match event {
                ScanEvent::Account(account) => accounts.push(*account),
                terminal => {
                    return ScanSummary {
                        accounts,
                        outcome: Some(terminal),
                    }
                }
            }
        }
        ScanSummary {
            accounts,
            outcome: None,
        }
    }

    pub fn is_finished(&self) -> bool {
        self.task.is_finished()
    }
}

impl Stream for ScanHandle {
    type Item = ScanEvent;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        self.events.poll_recv(cx)
    }
}

impl Drop for ScanHandle {
    fn drop(&mut self) {
        self.canceller.cancel();
    }
}

/// Start scanning `request.currency` on `device`.
///
/// Must be called from within a tokio runtime. The device is owned by the
/// walker task for the whole scan and closed when it ends.
pub fn scan_accounts_on_device<D>(
    ctx: &WalkerContext,
    device: D,
    request: ScanRequest,
) -> ScanHandle
where
    D: DeviceChannel + 'static,
{
    scan_accounts_with_canceller(ctx, device, request, ScanCanceller::new())
}

/// Same as [`scan_accounts_on_device`] with a caller-provided stop flag
pub fn scan_accounts_with_canceller<D>(
    ctx: &WalkerContext,
    mut device: D,
    request: ScanRequest,
    canceller: ScanCanceller,
) -> ScanHandle
where
    D: DeviceChannel + 'static,
{
    let (tx, rx) = mpsc::channel(EVENT_BUFFER);
    let ctx = ctx.clone();
    let walker_canceller = canceller.clone();

    let task = tokio::spawn(async move {
        let outcome = {
            let mut walker = AccountWalker {
                ctx: &ctx,
                device: &mut device,
                request: &request,
                canceller: walker_canceller,
                events: tx.clone(),
            };
            walker.run().await
        };

        if let Err(e) = device.close().await {
            log::warn!("⚠️  Failed to close device: {}", e);
        }

        let terminal = match outcome {
            Ok(WalkOutcome::Completed) => ScanEvent::Completed,
            Ok(WalkOutcome::Cancelled) => {
                log::info!("Scan of {} cancelled", request.currency.name);
                ScanEvent::Cancelled
            }
            Err(e) => {
                log::error!("❌ Scan of {} failed: {}", request.currency.name, e);
                ScanEvent::Failed(e)
            }
        };
        if tx.send(terminal).await.is_err() {
            log::debug!("Scan consumer dropped before the terminal event");
        }
    });

    ScanHandle {
        events: rx,
        canceller,
        task,
    }
}
