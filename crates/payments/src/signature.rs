//! Gateway callback signatures: hex HMAC-SHA256 over `"{order_id}|{payment_id}"`.

use hmac::digest::InvalidLength;
use hmac::{Hmac, Mac};
use sha2::Sha256;

type HmacSha256 = Hmac<Sha256>;

fn mac(secret: &str, gateway_order_id: &str, gateway_payment_id: &str) -> Result<HmacSha256, InvalidLength> {
    let mut mac = HmacSha256::new_from_slice(secret.as_bytes())?;
    mac.update(gateway_order_id.as_bytes());
    mac.update(b"|");
    mac.update(gateway_payment_id.as_bytes());
    Ok(mac)
}

/// Lower-case hex signature the gateway would send.
pub fn sign(secret: &str, gateway_order_id: &str, gateway_payment_id: &str) -> Result<String, InvalidLength> {
    let mac = mac(secret, gateway_order_id, gateway_payment_id)?;
    Ok(hex::encode(mac.finalize().into_bytes()))
}

/// True only when `signature` is the exact signature for this pair.
pub fn verify_signature(
    secret: &str,
    gateway_order_id: &str,
    gateway_payment_id: &str,
    signature: &str,
) -> bool {
    let Ok(expected) = hex::decode(signature.trim()) else {
        return false;
    };
    mac(secret, gateway_order_id, gateway_payment_id)
        .is_ok_and(|mac| mac.verify_slice(&expected).is_ok())
}
