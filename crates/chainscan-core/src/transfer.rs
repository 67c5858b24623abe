//! Token transfer decoding from receipt logs.
//!
//! Logs are classified by `topic0`:
//!
//! | Event | Topics | Data | Standard |
//! |---|---|---|---|
//! | `Transfer(address,address,uint256)` | 3 | amount | ERC-20 |
//! | `Transfer(address,address,uint256)` | 4 | empty | ERC-721 |
//! | `TransferSingle(address,address,address,uint256,uint256)` | 4 | id, value | ERC-1155 |
//! | `TransferBatch(address,address,address,uint256[],uint256[])` | 4 | ids, values | ERC-1155 |

use alloy_dyn_abi::{DynSolType, DynSolValue};
use alloy_primitives::{b256, Address, B256, U256};
use tracing::debug;

use crate::types::{Log, TokenStandard, TokenTransfer, Transaction, TransferValue};

pub const TRANSFER_TOPIC: B256 =
    b256!("ddf252ad1be2c89b69c2b068fc378daa952ba7f163c4a11628f55a4df523b3ef");
pub const TRANSFER_SINGLE_TOPIC: B256 =
    b256!("c3d58168c5ae7397731d063d5bbf3d657854427343f4c083240f7aacaa2d0f62");
pub const TRANSFER_BATCH_TOPIC: B256 =
    b256!("4a39dc06d4c0dbc64b70af90fd698a233a518aa5d07e595d983b8c0526c8f7fb");

/// A transfer event before it is attached to its transaction.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawTransfer {
    pub standard: TokenStandard,
    pub contract: Address,
    pub from: Address,
    pub to: Address,
    pub value: TransferValue,
    pub log_index: u64,
}

/// Decode every transfer carried by one log. Unrelated or malformed logs
/// yield nothing; a batch log yields one entry per id.
pub fn decode_log(log: &Log) -> Vec<RawTransfer> {
    let Some(topic0) = log.topics.first() else {
        return Vec::new();
    };
    let entry = |standard, from, to, value| RawTransfer {
        standard,
        contract: log.address,
        from,
        to,
        value,
        log_index: log.log_index,
    };

    let n = log.topics.len();
    if *topic0 == TRANSFER_TOPIC && n == 3 && !log.data.is_empty() {
        let Some(amount) = word(&log.data, 0) else {
            return Vec::new();
        };
        vec![entry(
            TokenStandard::Erc20,
            topic_address(&log.topics[1]),
            topic_address(&log.topics[2]),
            TransferValue::Amount { amount },
        )]
    } else if *topic0 == TRANSFER_TOPIC && n >= 4 && log.data.is_empty() {
        vec![entry(
            TokenStandard::Erc721,
            topic_address(&log.topics[1]),
            topic_address(&log.topics[2]),
            TransferValue::Token {
                token_id: U256::from_be_bytes(log.topics[3].0),
            },
        )]
    } else if *topic0 == TRANSFER_SINGLE_TOPIC && n >= 4 {
        let (Some(token_id), Some(quantity)) = (word(&log.data, 0), word(&log.data, 1)) else {
            return Vec::new();
        };
        vec![entry(
            TokenStandard::Erc1155,
            topic_address(&log.topics[2]),
            topic_address(&log.topics[3]),
            TransferValue::Batch { token_id, quantity },
        )]
    } else if *topic0 == TRANSFER_BATCH_TOPIC && n >= 4 {
        let from = topic_address(&log.topics[2]);
        let to = topic_address(&log.topics[3]);
        let Some(pairs) = decode_batch(&log.data) else {
            debug!(contract = %log.address, log_index = log.log_index, "undecodable TransferBatch");
            return Vec::new();
        };
        pairs
            .into_iter()
            .map(|(token_id, quantity)| {
                entry(TokenStandard::Erc1155, from, to, TransferValue::Batch { token_id, quantity })
            })
            .collect()
    } else {
        Vec::new()
    }
}

/// Decode all transfers of one transaction, stamped with its context.
pub fn decode_transfers(tx: &Transaction, logs: &[Log]) -> Vec<TokenTransfer> {
    logs.iter()
        .flat_map(decode_log)
        .map(|raw| TokenTransfer {
            standard: raw.standard,
            tx_hash: tx.hash,
            block_number: tx.block_number,
            log_index: raw.log_index,
            contract: raw.contract,
            method: tx.method(),
            from: raw.from,
            to: raw.to,
            value: raw.value,
            timestamp: tx.timestamp,
        })
        .collect()
}

fn topic_address(topic: &B256) -> Address {
    Address::from_word(*topic)
}

fn word(data: &[u8], i: usize) -> Option<U256> {
    data.get(i * 32..(i + 1) * 32).map(U256::from_be_slice)
}

fn decode_batch(data: &[u8]) -> Option<Vec<(U256, U256)>> {
    let ty = DynSolType::Tuple(vec![
        DynSolType::Array(Box::new(DynSolType::Uint(256))),
        DynSolType::Array(Box::new(DynSolType::Uint(256))),
    ]);
    let DynSolValue::Tuple(parts) = ty.abi_decode_params(data).ok()? else {
        return None;
    };
    let [DynSolValue::Array(ids), DynSolValue::Array(values)] = parts.as_slice() else {
        return None;
    };
    if ids.len() != values.len() {
        return None;
    }
    ids.iter()
        .zip(values)
        .map(|(id, v)| Some((id.as_uint()?.0, v.as_uint()?.0)))
        .collect()
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use alloy_primitives::Bytes;

    pub(crate) fn addr_topic(a: Address) -> B256 {
        a.into_word()
    }

    pub(crate) fn batch_log(contract: Address, from: Address, to: Address, ids: &[u64]) -> Log {
        let ids: Vec<_> = ids.iter().map(|i| DynSolValue::Uint(U256::from(*i), 256)).collect();
        let values: Vec<_> = (0..ids.len())
            .map(|i| DynSolValue::Uint(U256::from(10 * (i + 1)), 256))
            .collect();
        let data = DynSolValue::Tuple(vec![DynSolValue::Array(ids), DynSolValue::Array(values)])
            .abi_encode_params();
        Log {
            address: contract,
            topics: vec![
                TRANSFER_BATCH_TOPIC,
                addr_topic(from),
                addr_topic(from),
                addr_topic(to),
            ],
            data: Bytes::from(data),
            log_index: 0,
        }
    }

    pub(crate) fn erc20_log(contract: Address, from: Address, to: Address, amount: u64) -> Log {
        Log {
            address: contract,
            topics: vec![TRANSFER_TOPIC, addr_topic(from), addr_topic(to)],
            data: Bytes::from(U256::from(amount).to_be_bytes::<32>().to_vec()),
            log_index: 0,
        }
    }

    const A: Address = Address::repeat_byte(0x0a);
    const B: Address = Address::repeat_byte(0x0b);
    const C: Address = Address::repeat_byte(0xcc);

    #[test]
    fn erc20_transfer() {
        let out = decode_log(&erc20_log(C, A, B, 1_000));
        assert_eq!(out.len(), 1);
        assert_eq!(out[0].standard, TokenStandard::Erc20);
        assert_eq!((out[0].from, out[0].to), (A, B));
        assert_eq!(out[0].value, TransferValue::Amount { amount: U256::from(1_000) });
    }

    #[test]
    fn erc721_transfer_reads_token_id_from_topic() {
        let log = Log {
            address: C,
            topics: vec![
                TRANSFER_TOPIC,
                addr_topic(A),
                addr_topic(B),
                B256::from(U256::from(77)),
            ],
            data: Bytes::new(),
            log_index: 3,
        };
        let out = decode_log(&log);
        assert_eq!(out.len(), 1);
        assert_eq!(out[0].standard, TokenStandard::Erc721);
        assert_eq!(out[0].value, TransferValue::Token { token_id: U256::from(77) });
        assert_eq!(out[0].log_index, 3);
    }

    #[test]
    fn erc1155_single() {
        let mut data = U256::from(5).to_be_bytes::<32>().to_vec();
        data.extend_from_slice(&U256::from(9).to_be_bytes::<32>());
        let log = Log {
            address: C,
            topics: vec![TRANSFER_SINGLE_TOPIC, addr_topic(A), addr_topic(A), addr_topic(B)],
            data: Bytes::from(data),
            log_index: 0,
        };
        let out = decode_log(&log);
        assert_eq!(out.len(), 1);
        assert_eq!(
            out[0].value,
            TransferValue::Batch { token_id: U256::from(5), quantity: U256::from(9) }
        );
    }

    #[test]
    fn erc1155_batch_yields_one_entry_per_id() {
        let out = decode_log(&batch_log(C, A, B, &[1, 2, 3]));
        assert_eq!(out.len(), 3);
        assert!(out.iter().all(|t| t.standard == TokenStandard::Erc1155 && t.to == B));
        assert_eq!(
            out[2].value,
            TransferValue::Batch { token_id: U256::from(3), quantity: U256::from(30) }
        );
    }

    #[test]
    fn unrelated_and_malformed_logs_are_ignored() {
        let mut log = erc20_log(C, A, B, 1);
        log.topics[0] = B256::repeat_byte(0x99);
        assert!(decode_log(&log).is_empty());

        let mut short = erc20_log(C, A, B, 1);
        short.data = Bytes::from_static(&[1, 2, 3]);
        assert!(decode_log(&short).is_empty());

        let mut batch = batch_log(C, A, B, &[1]);
        batch.data = Bytes::from_static(&[0xde, 0xad]);
        assert!(decode_log(&batch).is_empty());
    }
}
