// DANS : src/execution/transaction_builder.rs

use super::{ExecutionError, TransactionSigner};
use crate::decoders::compute_budget;
use solana_sdk::{
    hash::Hash,
    instruction::Instruction,
    message::{v0, VersionedMessage},
    pubkey::Pubkey,
    transaction::VersionedTransaction,
};

/// Préambule compute budget : limite de CU puis prix de la CU. Chaque
/// instruction est omise quand sa valeur est nulle.
pub fn compute_budget_preamble(compute_unit_limit: u32, priority_fee_micro_lamports: u64) -> Vec<Instruction> {
    let mut preamble = Vec::with_capacity(2);
    if compute_unit_limit > 0 {
        preamble.push(compute_budget::set_compute_unit_limit(compute_unit_limit));
    }
    if priority_fee_micro_lamports > 0 {
        preamble.push(compute_budget::set_compute_unit_price(priority_fee_micro_lamports));
    }
    preamble
}

/// Compile un message V0 (sans LUT) avec `payer` comme payeur. La compilation
/// déduplique les comptes et les ordonne : signataires en tête, payeur premier.
pub fn compile_message(payer: &Pubkey, instructions: &[Instruction], blockhash: Hash) -> Result<VersionedMessage, ExecutionError> {
    if instructions.is_empty() {
        return Err(ExecutionError::EmptyInstructions);
    }
    if blockhash == Hash::default() {
        return Err(ExecutionError::ZeroBlockhash);
    }
    let message = v0::Message::try_compile(payer, instructions, &[], blockhash)
        .map_err(|e| ExecutionError::Compile(e.to_string()))?;
    Ok(VersionedMessage::V0(message))
}

/// Demande une signature pour chaque signataire requis du message.
pub fn sign_message(message: VersionedMessage, signer: &dyn TransactionSigner) -> Result<VersionedTransaction, ExecutionError> {
    let required = message.header().num_required_signatures as usize;
    if required == 0 {
        return Err(ExecutionError::Input("le message n'exige aucune signature".to_string()));
    }
    let payload = message.serialize();
    let signatures = message
        .static_account_keys()
        .iter()
        .take(required)
        .map(|key| signer.sign_for(key, &payload).ok_or(ExecutionError::MissingSignature(*key)))
        .collect::<Result<Vec<_>, _>>()?;
    Ok(VersionedTransaction { signatures, message })
}

pub fn build_transaction(
    instructions: &[Instruction],
    signer: &dyn TransactionSigner,
    blockhash: Hash,
) -> Result<VersionedTransaction, ExecutionError> {
    let message = compile_message(&signer.pubkey(), instructions, blockhash)?;
    sign_message(message, signer)
}
