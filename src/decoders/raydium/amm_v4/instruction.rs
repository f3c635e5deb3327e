// DANS: src/decoders/raydium/amm_v4/instruction.rs

use super::openbook_market::MarketAccounts;
use super::RAYDIUM_AMM_V4_PROGRAM_ID;
use crate::decoders::{DecodeError, Pool};
use serde::{Deserialize, Serialize};
use solana_sdk::{
    instruction::{AccountMeta, Instruction},
    pubkey::Pubkey,
};

pub const SWAP_BASE_IN_DISCRIMINATOR: u8 = 9;
pub const SWAP_BASE_IN_V2_DISCRIMINATOR: u8 = 16;
pub const SWAP_PAYLOAD_LEN: usize = 17;

/// Variante d'instruction de swap. `BaseIn` exige les comptes du marché OpenBook,
/// `BaseInV2` s'en passe.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SwapInstructionKind {
    #[default]
    BaseIn,
    BaseInV2,
}

impl SwapInstructionKind {
    pub fn discriminator(self) -> u8 {
        match self {
            SwapInstructionKind::BaseIn => SWAP_BASE_IN_DISCRIMINATOR,
            SwapInstructionKind::BaseInV2 => SWAP_BASE_IN_V2_DISCRIMINATOR,
        }
    }

    pub fn needs_market(self) -> bool {
        self == SwapInstructionKind::BaseIn
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SwapPayload {
    pub discriminator: u8,
    pub amount_in: u64,
    pub min_amount_out: u64,
}

/// Comptes de l'utilisateur pour un swap. La direction est portée par l'ordre
/// source/destination : le programme déduit le sens depuis le mint des ATA.
#[derive(Debug, Clone, Copy)]
pub struct UserSwapAccounts {
    pub owner: Pubkey,
    pub source: Pubkey,
    pub destination: Pubkey,
}

/// Payload de 17 octets : [discriminateur, amount_in LE, min_amount_out LE].
pub fn encode_swap(discriminator: u8, amount_in: u64, min_amount_out: u64) -> [u8; SWAP_PAYLOAD_LEN] {
    let mut data = [0u8; SWAP_PAYLOAD_LEN];
    data[0] = discriminator;
    data[1..9].copy_from_slice(&amount_in.to_le_bytes());
    data[9..17].copy_from_slice(&min_amount_out.to_le_bytes());
    data
}

pub fn decode_swap(data: &[u8]) -> Result<SwapPayload, DecodeError> {
    if data.len() != SWAP_PAYLOAD_LEN {
        return Err(DecodeError::MalformedInstruction(format!(
            "payload de swap de {} octets, {SWAP_PAYLOAD_LEN} attendus",
            data.len()
        )));
    }
    let discriminator = data[0];
    if discriminator != SWAP_BASE_IN_DISCRIMINATOR && discriminator != SWAP_BASE_IN_V2_DISCRIMINATOR {
        return Err(DecodeError::MalformedInstruction(format!(
            "discriminateur inconnu : {discriminator}"
        )));
    }
    let amount_in = u64::from_le_bytes(data[1..9].try_into().unwrap_or_default());
    let min_amount_out = u64::from_le_bytes(data[9..17].try_into().unwrap_or_default());
    Ok(SwapPayload { discriminator, amount_in, min_amount_out })
}

pub fn build_swap_instruction(
    pool: &Pool,
    market: Option<&MarketAccounts>,
    kind: SwapInstructionKind,
    user: &UserSwapAccounts,
    amount_in: u64,
    min_amount_out: u64,
) -> Result<Instruction, DecodeError> {
    if amount_in == 0 {
        return Err(DecodeError::MalformedInstruction("amount_in nul".to_string()));
    }
    let data = encode_swap(kind.discriminator(), amount_in, min_amount_out).to_vec();

    let accounts = match kind {
        SwapInstructionKind::BaseIn => {
            let market = market.ok_or_else(|| {
                DecodeError::MalformedInstruction("comptes du marché manquants pour SwapBaseIn".to_string())
            })?;
            if market.market != pool.market_id {
                return Err(DecodeError::MalformedInstruction(format!(
                    "marché {} différent de celui du pool ({})",
                    market.market, pool.market_id
                )));
            }
            vec![
                AccountMeta::new_readonly(spl_token::id(), false),
                AccountMeta::new(pool.id, false),
                AccountMeta::new_readonly(pool.authority, false),
                AccountMeta::new(pool.open_orders, false),
                AccountMeta::new(pool.target_orders, false),
                AccountMeta::new(pool.base_vault, false),
                AccountMeta::new(pool.quote_vault, false),
                AccountMeta::new_readonly(market.program_id, false),
                AccountMeta::new(market.market, false),
                AccountMeta::new(market.bids, false),
                AccountMeta::new(market.asks, false),
                AccountMeta::new(market.event_queue, false),
                AccountMeta::new(market.coin_vault, false),
                AccountMeta::new(market.pc_vault, false),
                AccountMeta::new_readonly(market.vault_signer, false),
                AccountMeta::new(user.source, false),
                AccountMeta::new(user.destination, false),
                AccountMeta::new_readonly(user.owner, true),
            ]
        }
        SwapInstructionKind::BaseInV2 => vec![
            AccountMeta::new_readonly(spl_token::id(), false),
            AccountMeta::new(pool.id, false),
            AccountMeta::new_readonly(pool.authority, false),
            AccountMeta::new(pool.base_vault, false),
            AccountMeta::new(pool.quote_vault, false),
            AccountMeta::new(user.source, false),
            AccountMeta::new(user.destination, false),
            AccountMeta::new_readonly(user.owner, true),
        ],
    };

    Ok(Instruction { program_id: RAYDIUM_AMM_V4_PROGRAM_ID, accounts, data })
}
