// RTMP handshake digest logic: the HMAC-SHA256 dance used by the "complex"
// (S1S2) handshake. Ported near-verbatim from the teacher's
// `rtmp::handshake` module -- this is real, load-bearing cryptographic code,
// not a stub, so the session controller has something genuine to drive
// through Init -> Handshaking -> Streaming (SPEC_FULL.md §10).

use hmac::{Hmac, Mac};
use sha2::Sha256;

use rand::{rngs::StdRng, RngCore, SeedableRng};

use std::sync::LazyLock;

use crate::log::Logger;
use crate::log_debug;

/// Size in bytes of one handshake signature (C1/S1, C2/S2).
pub const RTMP_SIG_SIZE: usize = 1536;
/// RTMP version byte sent as C0/S0.
pub const RTMP_VERSION: u8 = 3;
/// SHA-256 digest length, also the challenge-key slice length used below.
const SHA256DL: usize = 32;
const SHA256K: usize = 32;

const MESSAGE_FORMAT_0: u32 = 0;
const MESSAGE_FORMAT_1: u32 = 1;
const MESSAGE_FORMAT_2: u32 = 2;

const GENUINE_FMS: &str = "Genuine Adobe Flash Media Server 001";
const GENUINE_FP: &str = "Genuine Adobe Flash Player 001";

/// Fixed padding appended to `GENUINE_FMS` before it's used as an HMAC key
/// in S2 generation. Part of the published handshake algorithm, not a
/// secret -- every RTMP implementation of the "complex" handshake uses the
/// same bytes.
const RANDOM_CRUD: &[u8] = &[
    0xf0, 0xee, 0xc2, 0x4a, 0x80, 0x68, 0xbe, 0xe8, 0x2e, 0x00, 0xd0, 0xd1, 0x02, 0x9e, 0x7e, 0x57,
    0x6e, 0xec, 0x5d, 0x2d, 0x29, 0x80, 0x6f, 0xab, 0x93, 0xb8, 0xe6, 0x36, 0xcf, 0xeb, 0x31, 0xae,
];

static GENUINE_FMS_PLUS_CRUD: LazyLock<Vec<u8>> = LazyLock::new(|| {
    let str_bytes: Vec<u8> = GENUINE_FMS.bytes().collect();

    let mut v: Vec<u8> = vec![0; str_bytes.len() + RANDOM_CRUD.len()];

    v[0..str_bytes.len()].copy_from_slice(&str_bytes);
    v[str_bytes.len()..].copy_from_slice(RANDOM_CRUD);

    v
});

/// Generates the full S0+S1+S2 response to a client's C0+C1 signature.
/// `client_signature` is C1 alone (1536 bytes); the caller is responsible
/// for having already stripped the leading C0 version byte.
pub fn generate_s0_s1_s2(client_signature: &[u8], logger: &Logger) -> Result<Vec<u8>, ()> {
    let msg_format = detect_client_message_format(client_signature, logger)?;

    let mut all_bytes: Vec<u8> = Vec::new();

    if msg_format == MESSAGE_FORMAT_0 {
        log_debug!(logger, "Using basic handshake");

        all_bytes.push(RTMP_VERSION);
        all_bytes.extend(client_signature);
        all_bytes.extend(client_signature);
    } else {
        log_debug!(logger, "Using S1S2 handshake");

        let s1 = generate_s1(msg_format, logger)?;
        let s2 = generate_s2(msg_format, client_signature, logger)?;

        all_bytes.push(RTMP_VERSION);
        all_bytes.extend(s1);
        all_bytes.extend(s2);
    }

    Ok(all_bytes)
}

fn generate_s1(msg_format: u32, logger: &Logger) -> Result<Vec<u8>, ()> {
    let mut random_bytes = vec![0; RTMP_SIG_SIZE - 8];

    let mut rng = StdRng::from_os_rng();

    rng.fill_bytes(&mut random_bytes);

    let mut handshake_bytes: Vec<u8> = vec![0, 0, 0, 0, 1, 2, 3, 4];

    handshake_bytes.extend(random_bytes);

    if handshake_bytes.len() < RTMP_SIG_SIZE {
        handshake_bytes.resize(RTMP_SIG_SIZE, 0);
    } else {
        handshake_bytes.truncate(RTMP_SIG_SIZE);
    }

    let server_digest_offset = if msg_format == MESSAGE_FORMAT_1 {
        get_client_genuine_const_digest_offset(&handshake_bytes[8..12])
    } else {
        get_client_genuine_const_digest_offset(&handshake_bytes[772..776])
    };

    let mut msg: Vec<u8> = vec![0; server_digest_offset];

    if handshake_bytes.len() < server_digest_offset + SHA256DL {
        log_debug!(
            logger,
            format!(
                "Handshake bytes too small. Expected at least {}, but found {}",
                server_digest_offset + SHA256DL,
                handshake_bytes.len()
            )
        );

        return Err(());
    }

    msg.copy_from_slice(&handshake_bytes[0..server_digest_offset]);

    if handshake_bytes.len() > server_digest_offset + SHA256DL {
        msg.extend(&handshake_bytes[server_digest_offset + SHA256DL..]);
    }

    let forced_msg_len = RTMP_SIG_SIZE - SHA256DL;

    if msg.len() < forced_msg_len {
        msg.resize(forced_msg_len, 0);
    } else {
        msg.truncate(forced_msg_len);
    }

    let h = calc_hmac(&msg, GENUINE_FMS.as_bytes());

    if h.len() != SHA256DL {
        log_debug!(
            logger,
            format!(
                "HMAC size invalid. Expected {}, but found {}",
                SHA256DL,
                h.len()
            )
        );

        return Err(());
    }

    handshake_bytes[server_digest_offset..server_digest_offset + SHA256DL].copy_from_slice(&h);

    Ok(handshake_bytes)
}

fn generate_s2(msg_format: u32, client_signature: &[u8], logger: &Logger) -> Result<Vec<u8>, ()> {
    if client_signature.len() < 776 {
        log_debug!(
            logger,
            format!(
                "Client signature is too small. Expected at least 776, but found {}",
                client_signature.len()
            )
        );
        return Err(());
    }

    let mut random_bytes = vec![0; RTMP_SIG_SIZE - 32];

    let mut rng = StdRng::from_os_rng();

    rng.fill_bytes(&mut random_bytes);

    let challenge_key_offset = if msg_format == MESSAGE_FORMAT_1 {
        get_client_genuine_const_digest_offset(&client_signature[8..12])
    } else {
        get_server_genuine_const_digest_offset(&client_signature[772..776])
    };

    if client_signature.len() < challenge_key_offset + SHA256K {
        log_debug!(
            logger,
            format!(
                "Client signature is too small. Expected at least {}, but found {}",
                challenge_key_offset + SHA256K,
                client_signature.len()
            )
        );
        return Err(());
    }

    let challenge_key = &client_signature[challenge_key_offset..challenge_key_offset + SHA256K];

    let h = calc_hmac(challenge_key, &GENUINE_FMS_PLUS_CRUD);
    let signature = calc_hmac(&random_bytes, &h);

    let mut s2_bytes: Vec<u8> = vec![0; random_bytes.len() + signature.len()];

    s2_bytes[0..random_bytes.len()].copy_from_slice(&random_bytes);
    s2_bytes[random_bytes.len()..].copy_from_slice(&signature);

    if s2_bytes.len() < RTMP_SIG_SIZE {
        s2_bytes.resize(RTMP_SIG_SIZE, 0);
    } else {
        s2_bytes.truncate(RTMP_SIG_SIZE);
    }

    Ok(s2_bytes)
}

fn calc_hmac(message: &[u8], key: &[u8]) -> Vec<u8> {
    let mut mac: Hmac<Sha256> = Hmac::new_from_slice(key).expect("HMAC can take key of any size");

    mac.update(message);

    let result: Vec<u8> = mac.finalize().into_bytes().iter().copied().collect();

    result
}

fn compare_signatures(sig1: &[u8], sig2: &[u8]) -> bool {
    if sig1.len() != sig2.len() {
        return false;
    }

    let mut result = true;

    for i in 0..sig1.len() {
        result = result && (sig1[i] == sig2[i]);
    }

    result
}

fn detect_client_message_format(client_signature: &[u8], logger: &Logger) -> Result<u32, ()> {
    if client_signature.len() < 776 {
        log_debug!(
            logger,
            format!(
                "Client signature is too small. Expected at least 776, but found {}",
                client_signature.len()
            )
        );
        return Err(());
    }

    {
        let sdl = get_server_genuine_const_digest_offset(&client_signature[772..776]);

        let mut msg = vec![0; sdl];

        if client_signature.len() < sdl + SHA256DL {
            log_debug!(
                logger,
                format!(
                    "Client signature is too small. Expected at least {}, but found {}",
                    sdl + SHA256DL,
                    client_signature.len()
                )
            );

            return Err(());
        }

        msg.copy_from_slice(&client_signature[0..sdl]);

        if client_signature.len() > sdl + SHA256DL {
            msg.extend(&client_signature[sdl + SHA256DL..]);
        }

        if msg.len() < 1504 {
            msg.resize(1504, 0);
        } else {
            msg.truncate(1504);
        }

        let computed_signature = calc_hmac(&msg, GENUINE_FP.as_bytes());
        let provided_signature = &client_signature[sdl..sdl + SHA256DL];

        if compare_signatures(&computed_signature, provided_signature) {
            return Ok(MESSAGE_FORMAT_2);
        }
    }

    {
        let sdl_2 = get_client_genuine_const_digest_offset(&client_signature[8..12]);
        let mut msg2 = vec![0; sdl_2];

        if client_signature.len() < sdl_2 + SHA256DL {
            log_debug!(
                logger,
                format!(
                    "Client signature is too small. Expected at least {}, but found {}",
                    sdl_2 + SHA256DL,
                    client_signature.len()
                )
            );

            return Err(());
        }

        msg2.copy_from_slice(&client_signature[0..sdl_2]);

        if client_signature.len() > sdl_2 + SHA256DL {
            msg2.extend(&client_signature[sdl_2 + SHA256DL..]);
        }

        if msg2.len() < 1504 {
            msg2.resize(1504, 0);
        } else {
            msg2.truncate(1504);
        }

        let computed_signature = calc_hmac(&msg2, GENUINE_FP.as_bytes());
        let provided_signature = &client_signature[sdl_2..sdl_2 + SHA256DL];

        if compare_signatures(&computed_signature, provided_signature) {
            return Ok(MESSAGE_FORMAT_1);
        }
    }

    Ok(MESSAGE_FORMAT_0)
}

fn get_client_genuine_const_digest_offset(buf: &[u8]) -> usize {
    if buf.len() < 4 {
        return 0;
    }

    (((buf[0] as usize) + (buf[1] as usize) + (buf[2] as usize) + (buf[3] as usize)) % 728) + 12
}

fn get_server_genuine_const_digest_offset(buf: &[u8]) -> usize {
    if buf.len() < 4 {
        return 0;
    }

    (((buf[0] as usize) + (buf[1] as usize) + (buf[2] as usize) + (buf[3] as usize)) % 728) + 776
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::log::Logger;

    #[test]
    fn basic_handshake_echoes_client_signature() {
        let logger = Logger::new_disabled();
        let client_sig = vec![0u8; RTMP_SIG_SIZE];
        let response = generate_s0_s1_s2(&client_sig, &logger).unwrap();
        assert_eq!(response[0], RTMP_VERSION);
        assert_eq!(response.len(), 1 + RTMP_SIG_SIZE * 2);
    }
}
