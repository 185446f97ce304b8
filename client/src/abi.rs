//! ABI codec for rollup inputs and notices.
//!
//! Mutations are `selector ++ abi_encode_params(fields)` where the selector is
//! the first four bytes of `keccak256("core.<name>(<types>)")`.

use alloy_primitives::{keccak256, Address, Bytes, FixedBytes, I256, U256};
use alloy_sol_types::SolValue;

use common::{
    util, InsertCartridgePayload, RuleData, VerificationOutput, VerifyPayload,
};

use crate::backend::BackendError;

pub const VERIFY_SIGNATURE: &str = "core.verify(bytes32,bytes32,bytes,int256)";
pub const INSERT_CARTRIDGE_SIGNATURE: &str = "core.insert_cartridge(bytes)";
pub const CREATE_RULE_SIGNATURE: &str = "core.create_rule(bytes32,string,string,string,bytes,string)";

type VerifyTuple = (FixedBytes<32>, FixedBytes<32>, Bytes, I256);
type VerificationTuple = (
    FixedBytes<32>,
    FixedBytes<32>,
    I256,
    Address,
    U256,
    I256,
    String,
    I256,
    FixedBytes<32>,
    I256,
    U256,
);

pub fn selector(signature: &str) -> [u8; 4] {
    let hash = keccak256(signature.as_bytes());
    [hash[0], hash[1], hash[2], hash[3]]
}

fn bytes32(value: &str) -> Result<FixedBytes<32>, BackendError> {
    let raw = util::decode_hex(value)?;
    if raw.len() != 32 {
        return Err(BackendError::Decode(format!(
            "expected 32 bytes, got {} in {}",
            raw.len(),
            value
        )));
    }
    Ok(FixedBytes::from_slice(&raw))
}

fn with_selector(signature: &str, params: Vec<u8>) -> Vec<u8> {
    let mut out = selector(signature).to_vec();
    out.extend(params);
    out
}

fn to_i64(value: I256, field: &str) -> Result<i64, BackendError> {
    i64::try_from(value).map_err(|_| BackendError::Decode(format!("{} out of range", field)))
}

fn to_u64(value: U256, field: &str) -> Result<u64, BackendError> {
    u64::try_from(value).map_err(|_| BackendError::Decode(format!("{} out of range", field)))
}

pub fn encode_verify(payload: &VerifyPayload) -> Result<Vec<u8>, BackendError> {
    let params: VerifyTuple = (
        bytes32(&payload.rule_id)?,
        bytes32(&payload.outcard_hash)?,
        Bytes::from(payload.tape.clone()),
        I256::try_from(payload.claimed_score)
            .map_err(|_| BackendError::Decode("claimed_score out of range".into()))?,
    );
    Ok(with_selector(VERIFY_SIGNATURE, params.abi_encode_params()))
}

pub fn encode_insert_cartridge(payload: &InsertCartridgePayload) -> Vec<u8> {
    let params = (Bytes::from(payload.data.clone()),);
    with_selector(INSERT_CARTRIDGE_SIGNATURE, params.abi_encode_params())
}

pub fn encode_create_rule(payload: &RuleData) -> Result<Vec<u8>, BackendError> {
    let params = (
        bytes32(&payload.cartridge_id)?,
        payload.name.clone(),
        payload.description.clone(),
        payload.args.clone(),
        Bytes::from(payload.in_card.clone()),
        payload.score_function.clone(),
    );
    Ok(with_selector(CREATE_RULE_SIGNATURE, params.abi_encode_params()))
}

/// Decodes a verify input as stored in the rollup input log, selector included.
pub fn decode_verify_input(data: &[u8]) -> Result<VerifyPayload, BackendError> {
    if data.len() < 4 {
        return Err(BackendError::Decode("input shorter than selector".into()));
    }
    let (rule_id, outcard_hash, tape, claimed_score) =
        VerifyTuple::abi_decode_params(&data[4..], true)
            .map_err(|e| BackendError::Decode(e.to_string()))?;
    Ok(VerifyPayload {
        rule_id: hex::encode(rule_id),
        outcard_hash: hex::encode(outcard_hash),
        tape: tape.to_vec(),
        claimed_score: to_i64(claimed_score, "claimed_score")?,
    })
}

pub fn decode_verification_output(data: &[u8]) -> Result<VerificationOutput, BackendError> {
    let decoded = VerificationTuple::abi_decode_params(data, true)
        .map_err(|e| BackendError::Decode(e.to_string()))?;
    let (
        version,
        cartridge_id,
        cartridge_input_index,
        user_address,
        timestamp,
        score,
        rule_id,
        rule_input_index,
        tape_hash,
        tape_input_index,
        error_code,
    ) = decoded;
    Ok(VerificationOutput {
        version: hex::encode(version),
        cartridge_id: hex::encode(cartridge_id),
        cartridge_input_index: to_i64(cartridge_input_index, "cartridge_input_index")?,
        user_address: user_address.to_string().to_lowercase(),
        timestamp: to_u64(timestamp, "timestamp")?,
        score: to_i64(score, "score")?,
        rule_id: util::normalize_id(&rule_id),
        rule_input_index: to_i64(rule_input_index, "rule_input_index")?,
        tape_hash: hex::encode(tape_hash),
        tape_input_index: to_i64(tape_input_index, "tape_input_index")?,
        error_code: to_u64(error_code, "error_code")?,
    })
}

/// Encodes a verification notice. Only fakes and tests produce these client-side.
pub fn encode_verification_output(output: &VerificationOutput) -> Result<Vec<u8>, BackendError> {
    let user_address: Address = output
        .user_address
        .parse()
        .map_err(|_| BackendError::Decode(format!("invalid address {}", output.user_address)))?;
    let params: VerificationTuple = (
        bytes32(&output.version)?,
        bytes32(&output.cartridge_id)?,
        I256::try_from(output.cartridge_input_index)
            .map_err(|_| BackendError::Decode("cartridge_input_index".into()))?,
        user_address,
        U256::from(output.timestamp),
        I256::try_from(output.score).map_err(|_| BackendError::Decode("score".into()))?,
        output.rule_id.clone(),
        I256::try_from(output.rule_input_index)
            .map_err(|_| BackendError::Decode("rule_input_index".into()))?,
        bytes32(&output.tape_hash)?,
        I256::try_from(output.tape_input_index)
            .map_err(|_| BackendError::Decode("tape_input_index".into()))?,
        U256::from(output.error_code),
    );
    Ok(params.abi_encode_params())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn hash(byte: u8) -> String {
        hex::encode([byte; 32])
    }

    #[test]
    fn verify_selector_matches_keccak_prefix() {
        let sel = selector(VERIFY_SIGNATURE);
        assert_eq!(&sel[..], &keccak256(VERIFY_SIGNATURE.as_bytes())[..4]);
        let encoded = encode_verify(&VerifyPayload {
            rule_id: hash(1),
            outcard_hash: hash(2),
            tape: vec![9, 9, 9],
            claimed_score: 42,
        })
        .unwrap();
        assert_eq!(&encoded[..4], &sel[..]);
    }

    #[test]
    fn verify_input_decodes_after_selector() {
        let payload = VerifyPayload {
            rule_id: hash(0xab),
            outcard_hash: hash(0xcd),
            tape: b"tape-log".to_vec(),
            claimed_score: -7,
        };
        let encoded = encode_verify(&payload).unwrap();
        assert_eq!(decode_verify_input(&encoded).unwrap(), payload);
    }

    #[test]
    fn rejects_short_ids() {
        let err = encode_verify(&VerifyPayload {
            rule_id: "abcd".into(),
            outcard_hash: hash(0),
            tape: vec![],
            claimed_score: 0,
        })
        .unwrap_err();
        assert!(matches!(err, BackendError::Decode(_)));
    }

    #[test]
    fn verification_notice_decodes() {
        let output = VerificationOutput {
            version: hash(1),
            cartridge_id: hash(2),
            cartridge_input_index: 3,
            user_address: "0xf39fd6e51aad88f6f4ce6ab8827279cfffb92266".into(),
            timestamp: 1_700_000_000,
            score: 1500,
            rule_id: hash(4),
            rule_input_index: -1,
            tape_hash: hash(5),
            tape_input_index: 9,
            error_code: 0,
        };
        let encoded = encode_verification_output(&output).unwrap();
        assert_eq!(decode_verification_output(&encoded).unwrap(), output);
    }
}
