use secp256k1::{Message, PublicKey, Secp256k1, ecdsa::Signature};
use sha2::{Digest, Sha256};

fn digest(payload: &str) -> [u8; 32] {
    let mut hasher = Sha256::new();
    hasher.update(payload.as_bytes());
    let out = hasher.finalize();
    let mut bytes = [0u8; 32];
    bytes.copy_from_slice(&out[..]);
    bytes
}

/// Digest the payment provider signs for one purchase step. Binding the
/// target level makes every proof single-use: replaying it cannot buy the
/// next level.
pub fn purchase_digest(user_id: &str, item_id: &str, level: u32) -> [u8; 32] {
    digest(&format!("purchase:{user_id}:{item_id}:{level}"))
}

/// Digest for a premium extension. Binding the current expiry means each
/// proof extends the subscription exactly once.
pub fn premium_digest(user_id: &str, current_expiry_ms: i64) -> [u8; 32] {
    digest(&format!("premium:{user_id}:{current_expiry_ms}"))
}

/// Digest for an external-currency top-up. The per-user sequence number
/// makes a captured proof worthless after it is consumed.
pub fn topup_digest(user_id: &str, amount_nano: u64, sequence: u64) -> [u8; 32] {
    digest(&format!("topup:{user_id}:{amount_nano}:{sequence}"))
}

/// Verify a provider signature (hex DER ECDSA) over a digest, against the
/// configured provider pubkey (hex compressed).
pub fn verify_proof(
    provider_pubkey_hex: &str,
    proof_hex: &str,
    digest: &[u8; 32],
) -> Result<bool, &'static str> {
    let secp = Secp256k1::verification_only();

    let sig_bytes = hex::decode(proof_hex).map_err(|_| "invalid proof hex")?;
    let sig = Signature::from_der(&sig_bytes).map_err(|_| "invalid DER signature")?;

    let pk_bytes = hex::decode(provider_pubkey_hex).map_err(|_| "invalid provider pubkey hex")?;
    let pk = PublicKey::from_slice(&pk_bytes).map_err(|_| "invalid provider pubkey bytes")?;

    let msg = Message::from_slice(digest).map_err(|_| "invalid message length")?;
    Ok(secp.verify_ecdsa(&msg, &sig, &pk).is_ok())
}

/// Verify a provider-signed purchase proof for one item level.
pub fn verify_purchase_proof(
    provider_pubkey_hex: &str,
    proof_hex: &str,
    user_id: &str,
    item_id: &str,
    level: u32,
) -> Result<bool, &'static str> {
    verify_proof(
        provider_pubkey_hex,
        proof_hex,
        &purchase_digest(user_id, item_id, level),
    )
}
