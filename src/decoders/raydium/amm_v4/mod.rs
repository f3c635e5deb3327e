// src/decoders/raydium/amm_v4/mod.rs

pub mod events;
pub mod instruction;
pub mod openbook_market;
pub mod pool;

pub use instruction::{build_swap_instruction, decode_swap, encode_swap, SwapInstructionKind, SwapPayload, UserSwapAccounts};
pub use openbook_market::{decode_market, MarketAccounts};
pub use pool::{decode_pool_account, detect_version, encode_pool_account, POOL_ACCOUNT_SIZE};

use solana_sdk::{pubkey, pubkey::Pubkey};
use std::sync::OnceLock;

pub const RAYDIUM_AMM_V4_PROGRAM_ID: Pubkey = pubkey!("675kPX9MHTjS2zt1qfr1NYHuzeLXfQM9H24wFSUt1Mp8");
// Ancien programme AMM (V3). On sait le reconnaître, pas l'utiliser.
pub const RAYDIUM_AMM_V3_PROGRAM_ID: Pubkey = pubkey!("27haf8L6oxUeXrHrgEgsexjSY5hbVUWEmvv9Nyxg8vQv");
pub const OPENBOOK_PROGRAM_ID: Pubkey = pubkey!("srmqPvymJeFKQ4zGQed1GFppgkRHL9kaELCbyksJtPX");

const AMM_AUTHORITY_SEED: &[u8] = b"amm authority";

/// PDA d'autorité du programme AMM V4. Calculée une seule fois.
pub fn amm_authority() -> Pubkey {
    static AUTHORITY: OnceLock<Pubkey> = OnceLock::new();
    *AUTHORITY.get_or_init(|| {
        Pubkey::find_program_address(&[AMM_AUTHORITY_SEED], &RAYDIUM_AMM_V4_PROGRAM_ID).0
    })
}
