// DANS: src/decoders/raydium/amm_v4/events.rs

use base64::{engine::general_purpose::STANDARD, Engine as _};

const RAY_LOG_PREFIX: &str = "Program log: ray_log: ";
const SWAP_BASE_IN_LOG_TYPE: u8 = 3;
const SWAP_BASE_IN_LOG_LEN: usize = 57;

/// Événement `SwapBaseInLog` émis par le programme après un swap.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SwapBaseInLog {
    pub amount_in: u64,
    pub minimum_out: u64,
    pub direction: u64,
    pub user_source: u64,
    pub pool_coin: u64,
    pub pool_pc: u64,
    pub out_amount: u64,
}

/// Cherche le premier `ray_log` de type SwapBaseIn dans les logs d'une
/// transaction (ou d'une simulation).
pub fn parse_swap_base_in_log(logs: &[String]) -> Option<SwapBaseInLog> {
    logs.iter()
        .filter_map(|log| log.strip_prefix(RAY_LOG_PREFIX))
        .filter_map(|encoded| STANDARD.decode(encoded.trim()).ok())
        .find_map(|bytes| {
            if bytes.len() < SWAP_BASE_IN_LOG_LEN || bytes[0] != SWAP_BASE_IN_LOG_TYPE {
                return None;
            }
            let word = |i: usize| {
                let start = 1 + i * 8;
                bytes[start..start + 8].try_into().ok().map(u64::from_le_bytes)
            };
            Some(SwapBaseInLog {
                amount_in: word(0)?,
                minimum_out: word(1)?,
                direction: word(2)?,
                user_source: word(3)?,
                pool_coin: word(4)?,
                pool_pc: word(5)?,
                out_amount: word(6)?,
            })
        })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ray_log(values: [u64; 7]) -> String {
        let mut bytes = vec![SWAP_BASE_IN_LOG_TYPE];
        for v in values {
            bytes.extend_from_slice(&v.to_le_bytes());
        }
        format!("{RAY_LOG_PREFIX}{}", STANDARD.encode(bytes))
    }

    #[test]
    fn test_reads_out_amount_from_logs() {
        let logs = vec![
            "Program 675kPX9MHTjS2zt1qfr1NYHuzeLXfQM9H24wFSUt1Mp8 invoke [1]".to_string(),
            ray_log([1_000, 900, 1, 1_000, 50_000, 60_000, 950]),
        ];
        let log = parse_swap_base_in_log(&logs).unwrap();
        assert_eq!(log.amount_in, 1_000);
        assert_eq!(log.out_amount, 950);
        assert_eq!(log.pool_pc, 60_000);
    }

    #[test]
    fn test_ignores_other_log_types() {
        let mut other = vec![4u8];
        other.extend_from_slice(&[0u8; 56]);
        let logs = vec![format!("{RAY_LOG_PREFIX}{}", STANDARD.encode(other)), "Program log: hello".to_string()];
        assert!(parse_swap_base_in_log(&logs).is_none());
    }
}
