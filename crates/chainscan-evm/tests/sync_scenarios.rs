//! End-to-end sync runs against a scripted node and in-memory stores.

use std::sync::Arc;

use alloy_dyn_abi::DynSolValue;
use alloy_primitives::{Address, Bytes, U256};
use tokio::sync::watch;

use chainscan_core::apply::{ApplyEngine, Target};
use chainscan_core::memory::MemoryKv;
use chainscan_core::types::TokenStandard;
use chainscan_evm::mock::{self, MockNode};
use chainscan_evm::{CallFrame, ContractInfoCache, FetchConfig, FetchJob, SyncBuilder, SyncReport};
use chainscan_storage::{ChainReader, Pager};

const ALICE: Address = Address::repeat_byte(0xa1);
const BOB: Address = Address::repeat_byte(0xb0);
const CAROL: Address = Address::repeat_byte(0xc0);
const TOKEN: Address = Address::repeat_byte(0xee);
const NFT: Address = Address::repeat_byte(0x55);

const TRANSFER_INPUT: [u8; 4] = [0xa9, 0x05, 0x9c, 0xbb];

/// Every block carries one plain transfer and one ERC-20 transfer.
fn token_chain(node: &MockNode, heights: std::ops::RangeInclusive<u64>) {
    for h in heights {
        let txs = vec![
            mock::transfer_tx(h, 0, BOB, CAROL, Bytes::new()),
            mock::transfer_tx(h, 1, ALICE, TOKEN, Bytes::from_static(&TRANSFER_INPUT)),
        ];
        node.push_block(h, txs, vec![vec![], vec![mock::erc20_log(TOKEN, ALICE, BOB, h)]]);
    }
    node.set_balance(ALICE, U256::from(1_000_000u64));
    node.set_balance(BOB, U256::from(5u64));
}

struct Stores {
    full: MemoryKv,
    fork: MemoryKv,
}

impl Stores {
    fn new() -> Self {
        Self {
            full: MemoryKv::new(),
            fork: MemoryKv::new(),
        }
    }

    fn reader(&self) -> ChainReader {
        ChainReader::new(Arc::new(self.full.clone())).with_fork(Arc::new(self.fork.clone()))
    }
}

async fn sync(node: &Arc<MockNode>, stores: &Stores, from: u64, to: u64, depth: u64) -> SyncReport {
    let mut orch = SyncBuilder::new()
        .from_block(from)
        .to_block(to)
        .fork_depth(depth)
        .workers(4)
        .head_poll_interval_ms(5)
        .idle_sleep_ms(5)
        .retry_delay_ms(1)
        .trace_retries(2)
        .build(
            node.clone(),
            Arc::new(stores.full.clone()),
            Arc::new(stores.fork.clone()),
        )
        .await
        .unwrap();
    let (_shutdown, rx) = watch::channel(false);
    orch.run(rx).await.unwrap()
}

#[tokio::test]
async fn promotes_below_window_and_keeps_ledger_for_window() {
    let node = Arc::new(MockNode::new(1));
    token_chain(&node, 100..=105);
    node.set_head(105);
    let stores = Stores::new();

    let report = sync(&node, &stores, 100, 105, 3).await;
    assert_eq!(report.full_synced, Some(102));
    assert_eq!(report.fork_synced, Some(105));
    assert_eq!(report.ledger, vec![103, 104, 105]);

    let reader = stores.reader();
    assert!(reader.block_by_height(105).await.unwrap().is_some());
    let full_only = ChainReader::new(Arc::new(stores.full.clone()));
    assert!(full_only.block_by_height(103).await.unwrap().is_none());
    assert_eq!(full_only.home().await.unwrap().unwrap().block_number, 102);
}

#[tokio::test]
async fn window_extension_matches_direct_full_run() {
    let node = Arc::new(MockNode::new(1));
    token_chain(&node, 100..=108);
    node.set_head(105);
    let stores = Stores::new();
    sync(&node, &stores, 100, 105, 3).await;

    node.set_head(108);
    let report = sync(&node, &stores, 100, 108, 3).await;
    assert_eq!(report.full_synced, Some(105));
    assert_eq!(report.ledger, vec![106, 107, 108]);

    let direct = Stores::new();
    let direct_report = sync(&node, &direct, 100, 105, 3).await;
    assert_eq!(direct_report.full_synced, Some(105));
    assert!(direct_report.ledger.is_empty());

    assert_eq!(stores.full.dump(), direct.full.dump());
}

#[tokio::test]
async fn restart_replays_promotion_lost_after_fork_commit() {
    let node = Arc::new(MockNode::new(1));
    token_chain(&node, 100..=108);
    node.set_head(105);
    let stores = Stores::new();
    sync(&node, &stores, 100, 105, 3).await;

    // fork 106 commits (retiring 103) and the process dies before Full gets 103
    node.set_head(106);
    let mut engine = ApplyEngine::open(
        Arc::new(stores.full.clone()),
        Arc::new(stores.fork.clone()),
        1_000,
    )
    .await
    .unwrap();
    let bundle = FetchJob::new(106, node.clone(), Arc::new(ContractInfoCache::new()), FetchConfig::default())
        .run()
        .await
        .unwrap();
    engine.apply_fork(&bundle, Some(103)).await.unwrap();
    assert_eq!(engine.synced(Target::Full).await.unwrap(), Some(102));
    assert_eq!(engine.ledger().heights(), vec![104, 105, 106]);
    drop(engine);

    node.set_head(108);
    let report = sync(&node, &stores, 100, 108, 3).await;
    assert_eq!(report.full_synced, Some(105));
    assert_eq!(report.fork_synced, Some(108));
    assert_eq!(report.ledger, vec![106, 107, 108]);

    let direct = Stores::new();
    sync(&node, &direct, 100, 105, 3).await;
    assert_eq!(stores.full.dump(), direct.full.dump());
}

#[tokio::test]
async fn batch_transfer_yields_one_record_per_id() {
    let node = Arc::new(MockNode::new(1));
    let tx = mock::transfer_tx(200, 0, ALICE, NFT, Bytes::from_static(&[0x2e, 0xb2, 0xc2, 0xd6]));
    let hash = tx.hash;
    node.push_block(
        200,
        vec![tx],
        vec![vec![mock::erc1155_batch_log(NFT, ALICE, BOB, &[1, 2, 3], &[10, 20, 30])]],
    );
    node.push_empty(201..=201);
    node.set_head(201);
    let stores = Stores::new();

    let report = sync(&node, &stores, 200, 200, 1).await;
    assert_eq!(report.full_synced, Some(200));

    let reader = ChainReader::new(Arc::new(stores.full.clone()));
    let page = reader
        .contract_transfers(TokenStandard::Erc1155, NFT, Pager::default())
        .await
        .unwrap();
    assert_eq!(page.total, 3);
    assert_eq!(page.items.len(), 3);
    assert!(page.items.iter().all(|t| t.tx_hash == hash));

    let inventory = reader
        .inventory(TokenStandard::Erc1155, NFT, Pager::default())
        .await
        .unwrap();
    let quantities: Vec<_> = inventory.items.iter().map(|i| (i.owner, i.quantity)).collect();
    assert_eq!(
        quantities,
        vec![(BOB, U256::from(10)), (BOB, U256::from(20)), (BOB, U256::from(30))]
    );
    assert!(reader.account(NFT).await.unwrap().unwrap().erc1155);
}

#[tokio::test]
async fn transient_failures_are_absorbed_and_traces_dropped() {
    let node = Arc::new(MockNode::new(1));
    token_chain(&node, 0..=5);
    for h in 0..=5 {
        node.set_trace(mock::tx_hash(h, 1), CallFrame::default());
    }
    node.set_head(5);
    node.fail_next("block", 3);
    node.fail_next("receipts", 2);
    node.fail_next("balance", 4);
    node.fail_next("trace", u32::MAX);
    let stores = Stores::new();

    let report = sync(&node, &stores, 0, 5, 2).await;
    assert_eq!(report.full_synced, Some(3));
    assert_eq!(report.fork_synced, Some(5));
    // two attempts per traced tx, one traced tx per fetched block
    assert_eq!(node.calls_made("trace"), 2 * 6);

    let reader = stores.reader();
    assert_eq!(reader.trace(mock::tx_hash(1, 1)).await.unwrap(), None);
    let (tx, receipt) = reader.transaction(mock::tx_hash(1, 1)).await.unwrap().unwrap();
    assert_eq!(tx.block_number, 1);
    assert!(receipt.unwrap().succeeded());
}

#[tokio::test]
async fn token_metadata_traces_and_holders_are_indexed() {
    let node = Arc::new(MockNode::new(1));
    token_chain(&node, 10..=14);
    let abi_string = |s: &str| Bytes::from(DynSolValue::String(s.into()).abi_encode());
    let word = |n: u64| Bytes::from(U256::from(n).to_be_bytes::<32>().to_vec());
    node.set_call(TOKEN, [0x06, 0xfd, 0xde, 0x03], abi_string("Test Token"));
    node.set_call(TOKEN, [0x95, 0xd8, 0x9b, 0x41], abi_string("TST"));
    node.set_call(TOKEN, [0x31, 0x3c, 0xe5, 0x67], word(18));
    node.set_call(TOKEN, [0x18, 0x16, 0x0d, 0xdd], word(21_000_000));
    node.set_trace(
        mock::tx_hash(10, 1),
        CallFrame {
            call_type: "CALL".into(),
            from: ALICE,
            to: Some(TOKEN),
            calls: vec![CallFrame {
                call_type: "STATICCALL".into(),
                from: TOKEN,
                to: Some(CAROL),
                ..Default::default()
            }],
            ..Default::default()
        },
    );
    node.set_head(14);
    let stores = Stores::new();

    let report = sync(&node, &stores, 10, 14, 2).await;
    assert_eq!(report.full_synced, Some(12));

    let reader = ChainReader::new(Arc::new(stores.full.clone()));
    let token = reader.account(TOKEN).await.unwrap().unwrap();
    assert!(token.erc20);
    assert_eq!(token.name.as_deref(), Some("Test Token"));
    assert_eq!(token.symbol.as_deref(), Some("TST"));
    assert_eq!(token.decimals, Some(18));
    assert_eq!(token.token_total_supply, U256::from(21_000_000u64));

    let itxs = reader
        .internal_transactions(mock::tx_hash(10, 1), Pager::default())
        .await
        .unwrap();
    assert_eq!(itxs.total, 1);
    assert_eq!(itxs.items[0].to, CAROL);
    assert!(reader.trace(mock::tx_hash(10, 1)).await.unwrap().is_some());

    // 10 + 11 + 12 moved from ALICE to BOB on the Full side
    let holders = reader
        .holders(TokenStandard::Erc20, TOKEN, Pager::default())
        .await
        .unwrap();
    assert_eq!(holders.items, vec![(BOB, U256::from(33u64))]);
    assert_eq!(reader.account(ALICE).await.unwrap().unwrap().balance, U256::from(1_000_000u64));
}
