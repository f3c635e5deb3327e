// src/data_pipeline/onchain_scanner.rs

use crate::decoders::raydium::amm_v4::pool::{BASE_MINT_OFFSET, POOL_ACCOUNT_SIZE, QUOTE_MINT_OFFSET};
use crate::rpc::{ProgramAccountFilter, RpcEndpointPool, RpcError};
use solana_sdk::pubkey::Pubkey;
use tracing::info;

#[derive(Debug, Clone)]
pub struct RawPoolData {
    pub address: Pubkey,
    pub data: Vec<u8>,
}

fn mint_filter(offset: usize, mint: &Pubkey) -> ProgramAccountFilter {
    ProgramAccountFilter::Memcmp { offset, bytes: mint.to_bytes().to_vec() }
}

/// Scan getProgramAccounts des comptes de pool (taille 752) contenant la paire,
/// dans les deux ordres base/quote. C'est lent : dernier recours quand l'index est indisponible.
pub async fn find_pools_for_pair(
    rpc: &RpcEndpointPool,
    program_id: &Pubkey,
    token_a: &Pubkey,
    token_b: &Pubkey,
) -> Result<Vec<RawPoolData>, RpcError> {
    info!(program = %program_id, token_a = %token_a, token_b = %token_b, "[Scan] Lancement du scan on-chain");
    let mut found = Vec::new();
    for (base, quote) in [(token_a, token_b), (token_b, token_a)] {
        let filters = vec![
            ProgramAccountFilter::DataSize(POOL_ACCOUNT_SIZE as u64),
            mint_filter(BASE_MINT_OFFSET, base),
            mint_filter(QUOTE_MINT_OFFSET, quote),
        ];
        let accounts = rpc.get_program_accounts(program_id, filters).await?;
        found.extend(accounts.into_iter().map(|(address, account)| RawPoolData { address, data: account.data }));
    }
    info!(count = found.len(), "[Scan] Scan terminé");
    Ok(found)
}

/// Même scan, pour tous les pools contenant `mint` d'un côté ou de l'autre.
pub async fn find_pools_for_mint(
    rpc: &RpcEndpointPool,
    program_id: &Pubkey,
    mint: &Pubkey,
) -> Result<Vec<RawPoolData>, RpcError> {
    let mut found = Vec::new();
    for offset in [BASE_MINT_OFFSET, QUOTE_MINT_OFFSET] {
        let filters = vec![ProgramAccountFilter::DataSize(POOL_ACCOUNT_SIZE as u64), mint_filter(offset, mint)];
        let accounts = rpc.get_program_accounts(program_id, filters).await?;
        found.extend(accounts.into_iter().map(|(address, account)| RawPoolData { address, data: account.data }));
    }
    Ok(found)
}
