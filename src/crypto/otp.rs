use crate::error::{AppError, Result};
use rand::{rngs::OsRng, RngCore};

/// Number of digits in a one-time passcode.
pub const OTP_DIGITS: usize = 6;

/// Generates a zero-padded numeric OTP from the OS RNG.
pub fn generate_otp() -> Result<String> {
    let mut bytes = [0u8; 4];
    OsRng
        .try_fill_bytes(&mut bytes)
        .map_err(|e| AppError::Internal(format!("Failed to generate OTP: {}", e)))?;

    // 2^32 % 10^6 leaves a bias below one part in four thousand.
    let value = u32::from_le_bytes(bytes) % 1_000_000;
    Ok(format!("{:0width$}", value, width = OTP_DIGITS))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn otp_is_six_ascii_digits() {
        for _ in 0..200 {
            let otp = generate_otp().unwrap();
            assert_eq!(otp.len(), OTP_DIGITS);
            assert!(otp.bytes().all(|b| b.is_ascii_digit()));
        }
    }
}
