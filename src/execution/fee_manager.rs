// DANS : src/execution/fee_manager.rs

use super::ExecutionError;

/// Frais de base d'une transaction à une signature.
pub const BASE_TX_COST_LAMPORTS: u64 = 5_000;
/// Rente d'un compte de jeton (165 octets), payée à la création d'un ATA.
pub const TOKEN_ACCOUNT_RENT_LAMPORTS: u64 = 2_039_280;

/// Au-delà, des frais de priorité relèvent de la faute de frappe.
pub const MAX_PRIORITY_FEE_SOL: f64 = 1.0;

const LAMPORTS_PER_SOL: f64 = 1_000_000_000.0;
const MICRO_LAMPORTS_PER_LAMPORT: u128 = 1_000_000;

/// Frais de priorité d'une tâche (SOL pour toute la transaction) -> prix de la CU
/// en micro-lamports. Le montant en SOL est d'abord arrondi au lamport.
pub fn priority_fee_micro_lamports(fee_sol: f64, compute_unit_limit: u32) -> Result<u64, ExecutionError> {
    if !fee_sol.is_finite() || fee_sol < 0.0 {
        return Err(ExecutionError::Input(format!("frais de priorité invalides : {fee_sol}")));
    }
    let too_large = || ExecutionError::Input(format!("frais de priorité démesurés : {fee_sol} SOL"));
    let lamports = (fee_sol * LAMPORTS_PER_SOL).round();
    if lamports >= u64::MAX as f64 {
        return Err(too_large());
    }
    let lamports = lamports as u128;
    if lamports == 0 {
        return Ok(0);
    }
    if compute_unit_limit == 0 {
        return Err(ExecutionError::Input(
            "frais de priorité sans limite de compute units".to_string(),
        ));
    }
    let micro = lamports.checked_mul(MICRO_LAMPORTS_PER_LAMPORT).ok_or_else(too_large)? / compute_unit_limit as u128;
    u64::try_from(micro).map_err(|_| too_large())
}

/// Coût réel en lamports d'un prix de CU, arrondi au supérieur comme le runtime.
pub fn priority_fee_lamports(micro_lamports: u64, compute_unit_limit: u32) -> u64 {
    let total = micro_lamports as u128 * compute_unit_limit as u128;
    u64::try_from(total.div_ceil(MICRO_LAMPORTS_PER_LAMPORT)).unwrap_or(u64::MAX)
}

/// SOL natif nécessaire : frais de base + priorité + rente des ATA créés,
/// plus le montant échangé quand l'entrée est du SOL enveloppé.
pub fn required_native_balance(native_amount_in: u64, priority_lamports: u64, created_accounts: usize) -> u64 {
    native_amount_in
        .saturating_add(priority_lamports)
        .saturating_add(BASE_TX_COST_LAMPORTS)
        .saturating_add(TOKEN_ACCOUNT_RENT_LAMPORTS.saturating_mul(created_accounts as u64))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_priority_fee_vectors() {
        // 0.0001 SOL = 100_000 lamports répartis sur 200k CU.
        assert_eq!(priority_fee_micro_lamports(0.0001, 200_000).unwrap(), 500_000);
        assert_eq!(priority_fee_micro_lamports(0.001, 1_400_000).unwrap(), 714_285);
        assert_eq!(priority_fee_micro_lamports(0.0, 0).unwrap(), 0);
        assert!(priority_fee_micro_lamports(-1.0, 200_000).is_err());
        assert!(priority_fee_micro_lamports(0.0001, 0).is_err());
    }

    #[test]
    fn test_huge_fees_are_rejected_not_wrapped() {
        assert!(matches!(priority_fee_micro_lamports(1e30, 200_000), Err(ExecutionError::Input(_))));
        assert!(matches!(priority_fee_micro_lamports(f64::MAX, 1), Err(ExecutionError::Input(_))));
        // 1e9 SOL tient en u128 mais plus en u64 une fois converti en micro-lamports.
        assert!(priority_fee_micro_lamports(1e9, 1).is_err());
        assert_eq!(priority_fee_lamports(u64::MAX, u32::MAX), u64::MAX);
    }

    #[test]
    fn test_lamports_round_trip_never_undercounts() {
        assert_eq!(priority_fee_lamports(500_000, 200_000), 100_000);
        assert_eq!(priority_fee_lamports(714_285, 1_400_000), 999_999);
        assert_eq!(priority_fee_lamports(1, 1), 1);
        assert_eq!(priority_fee_lamports(0, 200_000), 0);
    }

    #[test]
    fn test_required_native_balance() {
        assert_eq!(required_native_balance(0, 100_000, 0), 105_000);
        assert_eq!(required_native_balance(1_000_000_000, 0, 1), 1_000_000_000 + 5_000 + 2_039_280);
    }
}
