// src/decoders/spl_token_decoders/account.rs

use crate::decoders::DecodeError;
use solana_sdk::pubkey::Pubkey;

pub const TOKEN_ACCOUNT_LEN: usize = 165;
const STATE_OFFSET: usize = 108;

#[derive(Debug, Clone, PartialEq)]
pub struct DecodedSplAccount {
    pub mint: Pubkey,
    pub owner: Pubkey,
    pub amount: u64,
}

/// Décode un compte de jeton SPL. Seuls mint, owner et amount nous intéressent.
pub fn decode_account(data: &[u8]) -> Result<DecodedSplAccount, DecodeError> {
    if data.len() < TOKEN_ACCOUNT_LEN {
        return Err(DecodeError::TooShort { expected: TOKEN_ACCOUNT_LEN, actual: data.len() });
    }
    if data[STATE_OFFSET] == 0 {
        return Err(DecodeError::invalid("state", "compte de jeton non initialisé"));
    }
    let pubkey_at = |offset: usize| {
        <[u8; 32]>::try_from(&data[offset..offset + 32]).map(Pubkey::new_from_array)
    };
    let mint = pubkey_at(0).map_err(|e| DecodeError::invalid("mint", e.to_string()))?;
    let owner = pubkey_at(32).map_err(|e| DecodeError::invalid("owner", e.to_string()))?;
    let amount = <[u8; 8]>::try_from(&data[64..72])
        .map(u64::from_le_bytes)
        .map_err(|e| DecodeError::invalid("amount", e.to_string()))?;
    Ok(DecodedSplAccount { mint, owner, amount })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::encode_token_account;

    #[test]
    fn test_decode_reads_mint_owner_amount() {
        let mint = Pubkey::new_unique();
        let owner = Pubkey::new_unique();
        let data = encode_token_account(&mint, &owner, 123_456);
        assert_eq!(decode_account(&data).unwrap(), DecodedSplAccount { mint, owner, amount: 123_456 });
    }

    #[test]
    fn test_uninitialized_account_is_rejected() {
        let data = vec![0u8; TOKEN_ACCOUNT_LEN];
        assert!(decode_account(&data).is_err());
        assert!(matches!(decode_account(&data[..10]), Err(DecodeError::TooShort { .. })));
    }
}
