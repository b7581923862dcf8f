//! Account discovery tests
//!
//! Drives the walker against a scripted device and an in-memory provider
//! and checks which accounts are emitted, which paths reach the device and
//! how the scan terminates.

mod common;

use std::sync::Arc;

use common::*;
use futures::StreamExt;
use hwledger::currency::{BITCOIN, ETHEREUM, RIPPLE};
use hwledger::device::STATUS_UNSUPPORTED_SEGWIT;
use hwledger::{
    scan_accounts_on_device, scan_accounts_with_canceller, DerivationMode, DeviceError,
    HwLedgerError, ProviderError, ScanCanceller, ScanEvent, ScanRequest, WalkerConfig,
};

fn paths(items: &[&str]) -> Vec<String> {
    items.iter().map(|p| p.to_string()).collect()
}

// ============================================================================
// Test 1: Empty account skip
// ============================================================================

#[tokio::test]
async fn test_skip_one_probes_two_empty_accounts() {
    init_logging();
    log::info!("🔧 Native segwit scan with an empty account skip of 1");

    let provider = Arc::new(MockProvider::new());
    provider.set_operations(
        "84'/0'/0'",
        vec![receive("aa01", 50_000, 100), receive("aa02", 20_000, 200)],
    );
    let ctx = context(provider.clone(), config_with_skip(DerivationMode::NativeSegwit, 1));

    let device = MockDevice::new();
    let log = device.call_log();
    let request = ScanRequest::new(&BITCOIN)
        .with_modes(vec![DerivationMode::NativeSegwit])
        .with_show_new_accounts(false);

    let summary = scan_accounts_on_device(&ctx, device, request).collect().await;
    assert!(matches!(summary.outcome, Some(ScanEvent::Completed)));

    assert_eq!(summary.accounts.len(), 1);
    let account = &summary.accounts[0];
    assert_eq!(account.index, 0);
    assert_eq!(account.operations.len(), 2);
    assert_eq!(account.name, "Bitcoin 1 (native segwit)");
    assert_eq!(account.balance, 70_000);

    assert_eq!(
        device_calls(&log),
        paths(&["84'/0'", "84'/0'/0'", "84'/0'/1'", "84'/0'/2'"])
    );
    assert_eq!(
        provider.operation_requests(),
        paths(&["84'/0'/0'", "84'/0'/1'", "84'/0'/2'"])
    );
    log::info!("✅ Probed indices 0..=2, emitted account 0 only");
}

// ============================================================================
// Test 2: Default new-account policy
// ============================================================================

#[tokio::test]
async fn test_empty_device_offers_new_accounts_for_preferred_modes() {
    init_logging();

    let provider = Arc::new(MockProvider::new());
    let ctx = context(provider.clone(), WalkerConfig::default());
    let device = MockDevice::new();
    let log = device.call_log();

    let accounts = scan_accounts_on_device(&ctx, device, ScanRequest::new(&BITCOIN))
        .collect()
        .await
        .into_result()
        .unwrap();

    // legacy is hidden because bitcoin supports segwit
    let names: Vec<_> = accounts.iter().map(|a| a.name.as_str()).collect();
    assert_eq!(
        names,
        vec![
            "New Bitcoin account 1 (segwit)",
            "New Bitcoin account 1 (native segwit)"
        ]
    );
    assert_eq!(device_calls(&log).len(), 6);
}

// ============================================================================
// Test 3: Device quirks and failures
// ============================================================================

#[tokio::test]
async fn test_segwit_unsupported_status_skips_mode() {
    init_logging();
    log::info!("🔧 Device app answers 0x6f04 on segwit paths");

    let provider = Arc::new(MockProvider::new());
    provider.set_operations("44'/0'/0'", vec![receive("bb01", 1_000, 100)]);
    provider.set_operations("84'/0'/0'", vec![receive("bb02", 2_000, 100)]);
    let ctx = context(provider.clone(), WalkerConfig::default());

    let device = MockDevice::new().fail_at(
        "49'/0'",
        DeviceError::status(STATUS_UNSUPPORTED_SEGWIT, "unknown derivation"),
    );
    let log = device.call_log();

    let summary = scan_accounts_on_device(&ctx, device, ScanRequest::new(&BITCOIN))
        .collect()
        .await;
    assert!(matches!(summary.outcome, Some(ScanEvent::Completed)));

    let emitted: Vec<_> = summary
        .accounts
        .iter()
        .map(|a| (a.derivation_mode, a.index))
        .collect();
    assert_eq!(
        emitted,
        vec![
            (DerivationMode::Legacy, 0),
            (DerivationMode::NativeSegwit, 0),
            (DerivationMode::NativeSegwit, 1),
        ]
    );
    assert_eq!(
        device_calls(&log),
        paths(&[
            "44'/0'",
            "44'/0'/0'",
            "44'/0'/1'",
            "49'/0'",
            "84'/0'",
            "84'/0'/0'",
            "84'/0'/1'"
        ])
    );
    log::info!("✅ Segwit skipped without error");
}

#[tokio::test]
async fn test_other_device_errors_fail_the_scan() {
    init_logging();

    let provider = Arc::new(MockProvider::new());
    provider.set_operations("44'/0'/0'", vec![receive("cc01", 1_000, 100)]);
    let ctx = context(provider, WalkerConfig::default());
    let device = MockDevice::new().fail_at("84'/0'", DeviceError::status(0x6985, "denied"));

    let summary = scan_accounts_on_device(&ctx, device, ScanRequest::new(&BITCOIN))
        .collect()
        .await;

    // accounts found before the failure were already delivered
    assert_eq!(summary.accounts.len(), 2);
    match summary.outcome {
        Some(ScanEvent::Failed(HwLedgerError::Device(err))) => {
            assert_eq!(err.status_code(), Some(0x6985));
        }
        other => panic!("expected a device failure, got {:?}", other),
    }
}

#[tokio::test]
async fn test_segwit_status_on_legacy_is_not_a_quirk() {
    init_logging();

    let ctx = context(Arc::new(MockProvider::new()), WalkerConfig::default());
    let device = MockDevice::new().fail_at(
        "44'/0'",
        DeviceError::status(STATUS_UNSUPPORTED_SEGWIT, "unknown derivation"),
    );

    let result = scan_accounts_on_device(&ctx, device, ScanRequest::new(&BITCOIN))
        .collect()
        .await
        .into_result();
    assert!(matches!(result, Err(HwLedgerError::Device(_))));
}

// ============================================================================
// Test 4: Cancellation
// ============================================================================

#[tokio::test]
async fn test_cancel_before_first_request() {
    init_logging();

    let provider = Arc::new(MockProvider::new());
    let ctx = context(provider.clone(), WalkerConfig::default());
    let device = MockDevice::new();
    let log = device.call_log();

    let handle = scan_accounts_on_device(&ctx, device, ScanRequest::new(&BITCOIN));
    handle.cancel();
    let summary = handle.collect().await;

    assert!(matches!(summary.outcome, Some(ScanEvent::Cancelled)));
    assert!(summary.accounts.is_empty());
    assert!(device_calls(&log).is_empty());
    assert!(provider.operation_requests().is_empty());
}

#[tokio::test]
async fn test_cancel_mid_walk_stops_device_and_provider_traffic() {
    init_logging();
    log::info!("🔧 Cancelling while account 1 is being fetched");

    let provider = Arc::new(MockProvider::new());
    for (i, path) in ["44'/0'/0'", "44'/0'/1'", "44'/0'/2'"].iter().enumerate() {
        provider.set_operations(path, vec![receive(&format!("dd0{}", i), 500, 10)]);
    }
    let canceller = ScanCanceller::new();
    provider.cancel_at("44'/0'/1'", canceller.clone());

    let ctx = context(provider.clone(), WalkerConfig::default());
    let device = MockDevice::new();
    let log = device.call_log();
    let request = ScanRequest::new(&BITCOIN).with_modes(vec![DerivationMode::Legacy]);

    let summary = scan_accounts_with_canceller(&ctx, device, request, canceller)
        .collect()
        .await;

    assert!(matches!(summary.outcome, Some(ScanEvent::Cancelled)));
    assert_eq!(summary.accounts.len(), 1);
    assert_eq!(summary.accounts[0].index, 0);
    assert_eq!(
        device_calls(&log),
        paths(&["44'/0'", "44'/0'/0'", "44'/0'/1'"])
    );
    assert_eq!(
        provider.operation_requests(),
        paths(&["44'/0'/0'", "44'/0'/1'"])
    );
    log::info!("✅ Nothing reached the device after cancellation");
}

// ============================================================================
// Test 5: Address-keyed families
// ============================================================================

#[tokio::test]
async fn test_ethereum_legacy_mode_probes_ten_empty_accounts() {
    init_logging();

    let provider = Arc::new(MockProvider::new());
    provider.set_operations("44'/60'/0'/0", vec![receive("ee01", 10, 100)]);
    let ctx = context(provider.clone(), WalkerConfig::default());
    let device = MockDevice::new();
    let expected_address = device.address("44'/60'/0'/0");
    let log = device.call_log();

    let summary = scan_accounts_on_device(
        &ctx,
        device,
        ScanRequest::new(&ETHEREUM).with_modes(vec![DerivationMode::EthM]),
    )
    .collect()
    .await;
    assert!(matches!(summary.outcome, Some(ScanEvent::Completed)));

    // parent key, then indices 0..=11
    let calls = device_calls(&log);
    assert_eq!(calls.len(), 13);
    assert_eq!(calls[0], "44'/60'/0'");
    assert_eq!(calls[12], "44'/60'/0'/11");

    assert_eq!(summary.accounts.len(), 1);
    let account = &summary.accounts[0];
    assert_eq!(account.xpub, None);
    assert_eq!(account.name, "Ethereum 1 (legacy)");
    assert_eq!(
        account.id,
        format!("walker-v1:ethereum:{}:ethM", expected_address)
    );
    let parts = account.id_parts().unwrap();
    assert_eq!(parts.xpub_or_address, expected_address);
    assert_eq!(parts.derivation_mode, DerivationMode::EthM);
}

#[tokio::test]
async fn test_ripple_legacy_mode_hosts_a_single_account() {
    init_logging();

    let provider = Arc::new(MockProvider::new());
    provider.set_operations("44'/144'/0'/0'", vec![receive("ff01", 20, 100)]);
    let ctx = context(provider.clone(), WalkerConfig::default());
    let device = MockDevice::new();
    let log = device.call_log();

    let accounts = scan_accounts_on_device(
        &ctx,
        device,
        ScanRequest::new(&RIPPLE).with_modes(vec![DerivationMode::Rip]),
    )
    .collect()
    .await
    .into_result()
    .unwrap();

    assert_eq!(accounts.len(), 1);
    assert_eq!(accounts[0].index, 0);
    assert_eq!(device_calls(&log), paths(&["44'/144'/0'/0'", "44'/144'/0'/0'"]));
    assert_eq!(provider.operation_requests().len(), 1);
}

// ============================================================================
// Test 6: Account identity
// ============================================================================

#[tokio::test]
async fn test_account_xpub_matches_local_derivation() {
    init_logging();

    let provider = Arc::new(MockProvider::new());
    provider.set_operations("44'/0'/0'", vec![receive("ab01", 1_000, 100)]);
    let ctx = context(provider, WalkerConfig::default());
    let reference = MockDevice::new();

    let accounts = scan_accounts_on_device(
        &ctx,
        MockDevice::new(),
        ScanRequest::new(&BITCOIN).with_modes(vec![DerivationMode::Legacy]),
    )
    .collect()
    .await
    .into_result()
    .unwrap();

    let account = &accounts[0];
    let xpub = reference.expected_xpub("44'/0'/0'");
    assert_eq!(account.xpub.as_deref(), Some(xpub.as_str()));
    assert_eq!(account.id, format!("walker-v1:bitcoin:{}:", xpub));
    assert_eq!(account.seed_identifier, reference.public_key_hex("44'/0'"));
    assert_eq!(account.fresh_address_path, "44'/0'/0'/0/1");
}

#[tokio::test]
async fn test_missing_fresh_address_hides_account_but_continues() {
    init_logging();

    let provider = Arc::new(MockProvider::new());
    let mut broken = MockAccount::with_operations(vec![receive("ac01", 1_000, 100)]);
    broken.fresh_address.address.clear();
    provider.set_account("44'/0'/0'", broken);
    let ctx = context(provider.clone(), WalkerConfig::default());

    let accounts = scan_accounts_on_device(
        &ctx,
        MockDevice::new(),
        ScanRequest::new(&BITCOIN)
            .with_modes(vec![DerivationMode::Legacy])
            .with_show_new_accounts(true),
    )
    .collect()
    .await
    .into_result()
    .unwrap();

    // index 0 had history, so the walk went on to the empty index 1
    assert_eq!(accounts.len(), 1);
    assert_eq!(accounts[0].index, 1);
    assert_eq!(accounts[0].name, "New Bitcoin account 2");
}

#[tokio::test]
async fn test_provider_failure_is_remapped() {
    init_logging();

    let provider = Arc::new(MockProvider::new());
    provider.fail_at("84'/0'/0'", ProviderError::new("explorer unreachable"));
    let ctx = context(provider, WalkerConfig::default());

    let result = scan_accounts_on_device(
        &ctx,
        MockDevice::new(),
        ScanRequest::new(&BITCOIN).with_modes(vec![DerivationMode::NativeSegwit]),
    )
    .collect()
    .await
    .into_result();

    match result {
        Err(HwLedgerError::Sync(message)) => assert!(message.contains("explorer unreachable")),
        other => panic!("expected a sync error, got {:?}", other),
    }
}

// ============================================================================
// Test 7: Rescans
// ============================================================================

#[tokio::test]
async fn test_rescan_reattaches_existing_operations() {
    init_logging();
    log::info!("🔄 Rescanning with previously stored accounts");

    let provider = Arc::new(MockProvider::new());
    provider.set_operations("84'/0'/0'", vec![receive("ba01", 1_000, 100)]);
    let ctx = context(provider.clone(), WalkerConfig::default());
    let request = ScanRequest::new(&BITCOIN)
        .with_modes(vec![DerivationMode::NativeSegwit])
        .with_show_new_accounts(false);

    let first = scan_accounts_on_device(&ctx, MockDevice::new(), request.clone())
        .collect()
        .await
        .into_result()
        .unwrap();
    assert_eq!(first.len(), 1);

    provider.set_operations(
        "84'/0'/0'",
        vec![receive("ba01", 1_000, 100), receive("ba02", 3_000, 300)],
    );
    let second = scan_accounts_on_device(
        &ctx,
        MockDevice::new(),
        request.with_existing_accounts(first.clone()),
    )
    .collect()
    .await
    .into_result()
    .unwrap();

    let account = &second[0];
    assert_eq!(account.id, first[0].id);
    assert_eq!(account.operations.len(), 2);
    assert_eq!(account.operations[0].hash, "ba02");
    assert!(Arc::ptr_eq(&account.operations[1], &first[0].operations[0]));
}

#[tokio::test]
async fn test_handle_is_a_stream_of_events() {
    init_logging();

    let provider = Arc::new(MockProvider::new());
    provider.set_operations("49'/0'/0'", vec![receive("ca01", 1_000, 100)]);
    let ctx = context(provider, WalkerConfig::default());

    let mut handle = scan_accounts_on_device(
        &ctx,
        MockDevice::new(),
        ScanRequest::new(&BITCOIN).with_modes(vec![DerivationMode::Segwit]),
    );

    let mut names = Vec::new();
    while let Some(event) = handle.next().await {
        match event {
            ScanEvent::Account(account) => names.push(account.name),
            ScanEvent::Completed => break,
            other => panic!("unexpected event {:?}", other),
        }
    }
    assert_eq!(names, vec!["Bitcoin 1 (segwit)", "New Bitcoin account 2 (segwit)"]);
    assert!(handle.next().await.is_none());
}
