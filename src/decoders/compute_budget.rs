// src/decoders/compute_budget.rs

use super::DecodeError;
use solana_sdk::{instruction::Instruction, pubkey, pubkey::Pubkey};

pub const COMPUTE_BUDGET_PROGRAM_ID: Pubkey = pubkey!("ComputeBudget111111111111111111111111111111");

const REQUEST_HEAP_FRAME_TAG: u8 = 1;
const SET_COMPUTE_UNIT_LIMIT_TAG: u8 = 2;
const SET_COMPUTE_UNIT_PRICE_TAG: u8 = 3;

/// Directive du programme ComputeBudget, telle que lue dans une instruction.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ComputeBudgetDirective {
    RequestHeapFrame(u32),
    SetComputeUnitLimit(u32),
    SetComputeUnitPrice(u64),
}

pub fn encode_request_heap_frame(bytes: u32) -> Vec<u8> {
    let mut data = vec![REQUEST_HEAP_FRAME_TAG];
    data.extend_from_slice(&bytes.to_le_bytes());
    data
}

pub fn encode_set_compute_unit_limit(units: u32) -> Vec<u8> {
    let mut data = vec![SET_COMPUTE_UNIT_LIMIT_TAG];
    data.extend_from_slice(&units.to_le_bytes());
    data
}

pub fn encode_set_compute_unit_price(micro_lamports: u64) -> Vec<u8> {
    let mut data = vec![SET_COMPUTE_UNIT_PRICE_TAG];
    data.extend_from_slice(&micro_lamports.to_le_bytes());
    data
}

pub fn decode(data: &[u8]) -> Result<ComputeBudgetDirective, DecodeError> {
    let (tag, rest) = data
        .split_first()
        .ok_or(DecodeError::TooShort { expected: 1, actual: 0 })?;
    match *tag {
        REQUEST_HEAP_FRAME_TAG => Ok(ComputeBudgetDirective::RequestHeapFrame(read_u32(rest)?)),
        SET_COMPUTE_UNIT_LIMIT_TAG => Ok(ComputeBudgetDirective::SetComputeUnitLimit(read_u32(rest)?)),
        SET_COMPUTE_UNIT_PRICE_TAG => {
            let bytes: [u8; 8] = rest
                .try_into()
                .map_err(|_| DecodeError::TooShort { expected: 9, actual: data.len() })?;
            Ok(ComputeBudgetDirective::SetComputeUnitPrice(u64::from_le_bytes(bytes)))
        }
        other => Err(DecodeError::MalformedInstruction(format!(
            "tag ComputeBudget inconnu : {other}"
        ))),
    }
}

fn read_u32(rest: &[u8]) -> Result<u32, DecodeError> {
    let bytes: [u8; 4] = rest
        .try_into()
        .map_err(|_| DecodeError::TooShort { expected: 5, actual: rest.len() + 1 })?;
    Ok(u32::from_le_bytes(bytes))
}

pub fn set_compute_unit_limit(units: u32) -> Instruction {
    Instruction {
        program_id: COMPUTE_BUDGET_PROGRAM_ID,
        accounts: vec![],
        data: encode_set_compute_unit_limit(units),
    }
}

pub fn set_compute_unit_price(micro_lamports: u64) -> Instruction {
    Instruction {
        program_id: COMPUTE_BUDGET_PROGRAM_ID,
        accounts: vec![],
        data: encode_set_compute_unit_price(micro_lamports),
    }
}

pub fn request_heap_frame(bytes: u32) -> Instruction {
    Instruction {
        program_id: COMPUTE_BUDGET_PROGRAM_ID,
        accounts: vec![],
        data: encode_request_heap_frame(bytes),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_layouts_match_program_wire_format() {
        assert_eq!(encode_set_compute_unit_limit(200_000), vec![2, 0x40, 0x0d, 0x03, 0x00]);
        assert_eq!(
            encode_set_compute_unit_price(500_000),
            vec![3, 0x20, 0xa1, 0x07, 0x00, 0x00, 0x00, 0x00, 0x00]
        );
        assert_eq!(encode_request_heap_frame(262_144), vec![1, 0x00, 0x00, 0x04, 0x00]);
    }

    #[test]
    fn test_decode_reads_back_directives() {
        assert_eq!(
            decode(&encode_set_compute_unit_limit(1_400_000)).unwrap(),
            ComputeBudgetDirective::SetComputeUnitLimit(1_400_000)
        );
        assert_eq!(
            decode(&set_compute_unit_price(7).data).unwrap(),
            ComputeBudgetDirective::SetComputeUnitPrice(7)
        );
    }

    #[test]
    fn test_decode_rejects_truncated_and_unknown() {
        assert!(matches!(decode(&[]), Err(DecodeError::TooShort { .. })));
        assert!(matches!(decode(&[2, 1, 2]), Err(DecodeError::TooShort { .. })));
        assert!(matches!(decode(&[9, 0, 0, 0, 0]), Err(DecodeError::MalformedInstruction(_))));
    }
}
