//! SRTP crypto suite (RFC4568 §6.2)

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::Error;

/// SRTP 암호 방식
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum SrtpCipher {
    /// AES Counter Mode
    AesCm,
    /// AES f8 mode
    AesF8,
}

/// crypto suite 식별자
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum CryptoSuite {
    AesCm128HmacSha1_80,
    AesCm128HmacSha1_32,
    AesF8_128HmacSha1_80,
}

impl CryptoSuite {
    pub const ALL: [CryptoSuite; 3] = [
        CryptoSuite::AesCm128HmacSha1_80,
        CryptoSuite::AesCm128HmacSha1_32,
        CryptoSuite::AesF8_128HmacSha1_80,
    ];

    /// SDP에 쓰이는 이름
    pub fn name(&self) -> &'static str {
        match self {
            CryptoSuite::AesCm128HmacSha1_80 => "AES_CM_128_HMAC_SHA1_80",
            CryptoSuite::AesCm128HmacSha1_32 => "AES_CM_128_HMAC_SHA1_32",
            CryptoSuite::AesF8_128HmacSha1_80 => "F8_128_HMAC_SHA1_80",
        }
    }

    pub fn cipher(&self) -> SrtpCipher {
        match self {
            CryptoSuite::AesF8_128HmacSha1_80 => SrtpCipher::AesF8,
            _ => SrtpCipher::AesCm,
        }
    }

    /// 마스터 키 길이 (바이트)
    pub fn master_key_length(&self) -> usize {
        16
    }

    /// 마스터 salt 길이 (바이트)
    pub fn master_salt_length(&self) -> usize {
        14
    }

    /// 세션 암호화 키 길이 (바이트)
    pub fn encryption_key_length(&self) -> usize {
        16
    }

    /// HMAC-SHA1 인증 키 길이 (바이트)
    pub fn auth_key_length(&self) -> usize {
        20
    }

    /// 인증 태그 길이 (바이트)
    pub fn auth_tag_length(&self) -> usize {
        match self {
            CryptoSuite::AesCm128HmacSha1_32 => 4,
            _ => 10,
        }
    }

    /// inline 키 파라미터의 key||salt 길이
    pub fn key_salt_length(&self) -> usize {
        self.master_key_length() + self.master_salt_length()
    }
}

impl fmt::Display for CryptoSuite {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for CryptoSuite {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        CryptoSuite::ALL
            .iter()
            .copied()
            .find(|suite| suite.name() == s)
            .ok_or_else(|| Error::InvalidAttribute(format!("지원하지 않는 crypto suite: {}", s)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_names_round_trip() {
        for suite in CryptoSuite::ALL {
            assert_eq!(suite.name().parse::<CryptoSuite>().unwrap(), suite);
        }
        assert!("AES_256_CM_HMAC_SHA1_80".parse::<CryptoSuite>().is_err());
    }

    #[test]
    fn test_suite_parameters() {
        assert_eq!(CryptoSuite::AesCm128HmacSha1_80.auth_tag_length(), 10);
        assert_eq!(CryptoSuite::AesCm128HmacSha1_32.auth_tag_length(), 4);
        assert_eq!(CryptoSuite::AesF8_128HmacSha1_80.cipher(), SrtpCipher::AesF8);
        assert_eq!(CryptoSuite::AesCm128HmacSha1_80.key_salt_length(), 30);
    }
}
