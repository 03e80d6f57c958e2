//! Minter loop scenarios.

use crate::harness::{ReadyNetwork, StakingHarness};
use prism_chain::ChainManager;
use prism_miner::{AssemblerOptions, MinterConfig, StakeMinter};
use prism_primitives::COIN;
use std::sync::Arc;
use std::time::Duration;

fn minter_for(harness: &StakingHarness, config: MinterConfig) -> Arc<StakeMinter> {
    Arc::new(StakeMinter::new(
        harness.params.clone(),
        harness.chain.clone(),
        harness.mempool.clone(),
        harness.wallet.clone(),
        Arc::new(ReadyNetwork),
        config,
        AssemblerOptions::default(),
    ))
}

/// An interrupt fired while the minter sleeps must stop the task within
/// 100 milliseconds, leaving no lock held.
#[tokio::test]
async fn s6_interrupt_stops_minter_promptly() {
    let harness = StakingHarness::regtest();
    harness.wallet.set_locked(true); // park the loop in its warm-up sleep

    let minter = minter_for(&harness, MinterConfig::default());
    let task = tokio::spawn(minter.clone().run());
    tokio::time::sleep(Duration::from_millis(20)).await;

    let fired = std::time::Instant::now();
    minter.interrupt().trigger();
    tokio::time::timeout(Duration::from_millis(100), task)
        .await
        .expect("minter must exit within 100 ms")
        .expect("minter task must not panic");
    assert!(fired.elapsed() <= Duration::from_millis(100));

    // No lock held after exit: the chain is immediately writable.
    harness.mine_pow_block(vec![]);
    assert_eq!(harness.chain.active_height(), 1);
}

/// A disabled minter exits immediately.
#[tokio::test]
async fn disabled_minter_returns_at_once() {
    let harness = StakingHarness::regtest();
    let minter = minter_for(
        &harness,
        MinterConfig {
            minting: false,
            ..Default::default()
        },
    );
    tokio::time::timeout(Duration::from_millis(100), minter.run())
        .await
        .expect("disabled minter returns without sleeping");
}

/// End to end: the minter finds a kernel, signs the block and publishes it
/// through the chain manager.
#[tokio::test]
async fn minter_publishes_stake_block() {
    let harness = StakingHarness::regtest();
    harness.fund_stake_coin(10_000 * COIN);
    harness.advance(4_000);
    harness.mine_pow_block(vec![]);
    harness.advance(30);

    let minter = minter_for(
        &harness,
        MinterConfig {
            minting: true,
            stake_timio_ms: 25,
        },
    );
    let task = tokio::spawn(minter.clone().run());

    let mut minted = false;
    for _ in 0..100 {
        if minter.blocks_minted() > 0 {
            minted = true;
            break;
        }
        tokio::time::sleep(Duration::from_millis(25)).await;
    }
    minter.interrupt().trigger();
    let _ = tokio::time::timeout(Duration::from_secs(1), task).await;

    assert!(minted, "the funded coin must mint within the polling window");
    assert_eq!(harness.chain.active_height(), 3);
    let tip = harness.chain.active_tip();
    assert!(tip.is_proof_of_stake());
    assert_eq!(tip.stake_modifier, prism_kernel::FIRST_BLOCK_MODIFIER);
}
