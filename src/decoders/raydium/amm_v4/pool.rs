// DANS: src/decoders/raydium/amm_v4/pool.rs

use super::{amm_authority, RAYDIUM_AMM_V3_PROGRAM_ID, RAYDIUM_AMM_V4_PROGRAM_ID};
use crate::decoders::pool_state::now_millis;
use crate::decoders::{DecodeError, Pool, PoolState, PoolStatus, PoolVersion};
use bytemuck::{bytes_of, from_bytes, Pod, Zeroable};
use solana_sdk::pubkey::Pubkey;
use std::mem::size_of;

pub const POOL_ACCOUNT_SIZE: usize = 752;
pub const BASE_MINT_OFFSET: usize = 400;
pub const QUOTE_MINT_OFFSET: usize = 432;

// Layout on-chain de l'AmmInfo (752 octets, tout en little-endian).
#[repr(C, packed)] #[derive(Clone, Copy, Pod, Zeroable, Debug)] struct Fees { min_separate_numerator: u64, min_separate_denominator: u64, trade_fee_numerator: u64, trade_fee_denominator: u64, pnl_numerator: u64, pnl_denominator: u64, swap_fee_numerator: u64, swap_fee_denominator: u64, }
#[repr(C, packed)] #[derive(Clone, Copy, Pod, Zeroable, Debug)] struct OutPutData { need_take_pnl_coin: u64, need_take_pnl_pc: u64, total_pnl_pc: u64, total_pnl_coin: u64, pool_open_time: u64, punish_pc_amount: u64, punish_coin_amount: u64, orderbook_to_init_time: u64, swap_coin_in_amount: u128, swap_pc_out_amount: u128, swap_take_pc_fee: u64, swap_pc_in_amount: u128, swap_coin_out_amount: u128, swap_take_coin_fee: u64, }
#[repr(C, packed)] #[derive(Clone, Copy, Pod, Zeroable, Debug)] struct AmmInfoData { status: u64, nonce: u64, order_num: u64, depth: u64, coin_decimals: u64, pc_decimals: u64, state: u64, reset_flag: u64, min_size: u64, vol_max_cut_ratio: u64, amount_wave: u64, coin_lot_size: u64, pc_lot_size: u64, min_price_multiplier: u64, max_price_multiplier: u64, sys_decimal_value: u64, fees: Fees, out_put: OutPutData, token_coin: Pubkey, token_pc: Pubkey, coin_mint: Pubkey, pc_mint: Pubkey, lp_mint: Pubkey, open_orders: Pubkey, market: Pubkey, serum_dex: Pubkey, target_orders: Pubkey, withdraw_queue: Pubkey, token_temp_lp: Pubkey, amm_owner: Pubkey, lp_amount: u64, client_order_id: u64, padding: [u64; 2], }

const _: () = assert!(size_of::<AmmInfoData>() == POOL_ACCOUNT_SIZE);

/// Déduit la version du pool depuis le programme propriétaire du compte.
pub fn detect_version(owner: &Pubkey) -> Result<PoolVersion, DecodeError> {
    if *owner == RAYDIUM_AMM_V4_PROGRAM_ID {
        Ok(PoolVersion::V4)
    } else if *owner == RAYDIUM_AMM_V3_PROGRAM_ID {
        Err(DecodeError::UnsupportedVersion("V3".to_string()))
    } else {
        Err(DecodeError::UnsupportedVersion(format!("programme {owner}")))
    }
}

/// Décode un compte AmmInfo. Les réserves restent à zéro tant que les
/// vaults ne sont pas lus (voir `Pool::apply_vault_balances`).
pub fn decode_pool_account(address: &Pubkey, data: &[u8]) -> Result<Pool, DecodeError> {
    if data.len() < POOL_ACCOUNT_SIZE {
        return Err(DecodeError::TooShort { expected: POOL_ACCOUNT_SIZE, actual: data.len() });
    }
    let info: &AmmInfoData = from_bytes(&data[..POOL_ACCOUNT_SIZE]);

    let base_decimals = decimals(info.coin_decimals, "coin_decimals")?;
    let quote_decimals = decimals(info.pc_decimals, "pc_decimals")?;

    let fee_numerator = info.fees.swap_fee_numerator;
    let fee_denominator = info.fees.swap_fee_denominator;
    if fee_denominator == 0 {
        return Err(DecodeError::invalid("swap_fee_denominator", "zéro"));
    }
    let fee_bps = (fee_numerator as u128 * 10_000 / fee_denominator as u128) as u64;
    if fee_bps == 0 || fee_bps > 10_000 {
        return Err(DecodeError::invalid("swap_fee", format!("{fee_bps} bps hors de [1, 10000]")));
    }

    let pool = Pool {
        id: *address,
        authority: amm_authority(),
        base_mint: info.coin_mint,
        quote_mint: info.pc_mint,
        base_vault: info.token_coin,
        quote_vault: info.token_pc,
        lp_mint: info.lp_mint,
        open_orders: info.open_orders,
        target_orders: info.target_orders,
        market_id: info.market,
        market_program: info.serum_dex,
        base_decimals,
        quote_decimals,
        default_fee_bps: fee_bps as u16,
        version: PoolVersion::V4,
        state: PoolState {
            base_reserve: 0,
            quote_reserve: 0,
            status: PoolStatus::from_raw(info.status),
        },
        base_need_take_pnl: info.out_put.need_take_pnl_coin,
        quote_need_take_pnl: info.out_put.need_take_pnl_pc,
        open_time_ms: info.out_put.pool_open_time.saturating_mul(1_000),
        from_index: false,
        observed_at_ms: now_millis(),
    };
    pool.validate()?;
    Ok(pool)
}

fn decimals(raw: u64, field: &'static str) -> Result<u8, DecodeError> {
    match u8::try_from(raw) {
        Ok(d) if d <= 32 => Ok(d),
        _ => Err(DecodeError::invalid(field, format!("{raw} > 32"))),
    }
}

/// Produit un compte AmmInfo de 752 octets à partir d'un `Pool`.
/// Les champs que le décodeur ignore restent à zéro.
pub fn encode_pool_account(pool: &Pool) -> Vec<u8> {
    let mut info = AmmInfoData::zeroed();
    info.status = pool.state.status.to_raw();
    info.coin_decimals = pool.base_decimals as u64;
    info.pc_decimals = pool.quote_decimals as u64;
    info.fees.trade_fee_numerator = pool.default_fee_bps as u64;
    info.fees.trade_fee_denominator = 10_000;
    info.fees.swap_fee_numerator = pool.default_fee_bps as u64;
    info.fees.swap_fee_denominator = 10_000;
    info.out_put.need_take_pnl_coin = pool.base_need_take_pnl;
    info.out_put.need_take_pnl_pc = pool.quote_need_take_pnl;
    info.out_put.pool_open_time = pool.open_time_ms / 1_000;
    info.token_coin = pool.base_vault;
    info.token_pc = pool.quote_vault;
    info.coin_mint = pool.base_mint;
    info.pc_mint = pool.quote_mint;
    info.lp_mint = pool.lp_mint;
    info.open_orders = pool.open_orders;
    info.market = pool.market_id;
    info.serum_dex = pool.market_program;
    info.target_orders = pool.target_orders;
    bytes_of(&info).to_vec()
}
