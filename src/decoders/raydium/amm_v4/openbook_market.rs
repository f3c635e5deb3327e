// DANS: src/decoders/raydium/amm_v4/openbook_market.rs

use crate::decoders::DecodeError;
use bytemuck::{cast, from_bytes, Pod, Zeroable};
use solana_sdk::pubkey::Pubkey;
use std::mem::size_of;

// Le compte commence par le préfixe "serum" (5 octets) et finit par "padding" (7 octets).
pub const MARKET_HEAD_PADDING: usize = 5;

#[repr(C, packed)]
#[derive(Clone, Copy, Pod, Zeroable, Debug)]
pub(crate) struct MarketStateLayout {
    pub account_flags: u64,
    pub own_address: [u64; 4],
    pub vault_signer_nonce: u64,
    pub coin_mint: [u64; 4],
    pub pc_mint: [u64; 4],
    pub coin_vault: [u64; 4],
    pub coin_deposits_total: u64,
    pub coin_fees_accrued: u64,
    pub pc_vault: [u64; 4],
    pub pc_deposits_total: u64,
    pub pc_fees_accrued: u64,
    pub pc_dust_threshold: u64,
    pub req_q: [u64; 4],
    pub event_q: [u64; 4],
    pub bids: [u64; 4],
    pub asks: [u64; 4],
    pub coin_lot_size: u64,
    pub pc_lot_size: u64,
    pub fee_rate_bps: u64,
    pub referrer_rebates_accrued: u64,
}

pub const MARKET_STATE_SIZE: usize = size_of::<MarketStateLayout>();

/// Comptes du marché OpenBook requis par l'instruction SwapBaseIn (18 comptes).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MarketAccounts {
    pub market: Pubkey,
    pub program_id: Pubkey,
    pub bids: Pubkey,
    pub asks: Pubkey,
    pub event_queue: Pubkey,
    pub coin_vault: Pubkey,
    pub pc_vault: Pubkey,
    pub vault_signer: Pubkey,
    pub coin_lot_size: u64,
    pub pc_lot_size: u64,
}

fn key(words: [u64; 4]) -> Pubkey {
    Pubkey::new_from_array(cast::<[u64; 4], [u8; 32]>(words))
}

pub fn decode_market(market: &Pubkey, program_id: &Pubkey, data: &[u8]) -> Result<MarketAccounts, DecodeError> {
    let body = data
        .get(MARKET_HEAD_PADDING..MARKET_HEAD_PADDING + MARKET_STATE_SIZE)
        .ok_or(DecodeError::TooShort {
            expected: MARKET_HEAD_PADDING + MARKET_STATE_SIZE,
            actual: data.len(),
        })?;
    let state: &MarketStateLayout = from_bytes(body);

    let nonce = state.vault_signer_nonce;
    let vault_signer = Pubkey::create_program_address(&[market.as_ref(), &nonce.to_le_bytes()], program_id)
        .map_err(|e| DecodeError::invalid("vault_signer_nonce", e.to_string()))?;

    Ok(MarketAccounts {
        market: *market,
        program_id: *program_id,
        bids: key(state.bids),
        asks: key(state.asks),
        event_queue: key(state.event_q),
        coin_vault: key(state.coin_vault),
        pc_vault: key(state.pc_vault),
        vault_signer,
        coin_lot_size: state.coin_lot_size,
        pc_lot_size: state.pc_lot_size,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::decoders::PoolStatus;
    use crate::testing::{encode_market, fixture_market, fixture_pool};

    #[test]
    fn test_decode_reads_queues_and_vault_signer() {
        let pool = fixture_pool(9, 6, 1, 1, 25, PoolStatus::Active);
        let expected = fixture_market(&pool);
        let (data, _) = encode_market(&expected);
        let decoded = decode_market(&expected.market, &expected.program_id, &data).unwrap();
        assert_eq!(decoded, expected);
    }

    #[test]
    fn test_truncated_market_is_rejected() {
        let pool = fixture_pool(9, 6, 1, 1, 25, PoolStatus::Active);
        let market = fixture_market(&pool);
        let (data, _) = encode_market(&market);
        assert!(matches!(
            decode_market(&market.market, &market.program_id, &data[..100]),
            Err(DecodeError::TooShort { .. })
        ));
    }
}
