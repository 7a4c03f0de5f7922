//! SDES crypto 속성 텍스트 인코딩 (RFC4568)
//!
//! ```text
//! a=crypto:<tag> <crypto-suite> <key-params> [<session-params>]
//! key-params = inline:<base64(key||salt)>[|<lifetime>][|<mki>:<length>]
//! ```

use std::fmt;
use std::str::FromStr;

use base64::engine::general_purpose::STANDARD;
use base64::Engine as _;
use rand::RngCore;

use super::suite::CryptoSuite;
use crate::{Error, Result};

const INLINE_PREFIX: &str = "inline:";

/// Master Key Identifier
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Mki {
    pub value: u32,
    /// SRTP 패킷에 실리는 MKI 바이트 수
    pub length: u8,
}

/// inline 키 파라미터
#[derive(Clone, PartialEq, Eq)]
pub struct KeyParam {
    pub master_key: Vec<u8>,
    pub master_salt: Vec<u8>,
    /// 예: "2^20"
    pub lifetime: Option<String>,
    pub mki: Option<Mki>,
}

impl fmt::Debug for KeyParam {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("KeyParam")
            .field("master_key", &format_args!("[{} bytes]", self.master_key.len()))
            .field("master_salt", &format_args!("[{} bytes]", self.master_salt.len()))
            .field("lifetime", &self.lifetime)
            .field("mki", &self.mki)
            .finish()
    }
}

impl KeyParam {
    /// 새 마스터 키/salt 생성
    pub fn generate(suite: CryptoSuite) -> Self {
        let mut rng = rand::thread_rng();
        let mut master_key = vec![0u8; suite.master_key_length()];
        let mut master_salt = vec![0u8; suite.master_salt_length()];
        rng.fill_bytes(&mut master_key);
        rng.fill_bytes(&mut master_salt);

        Self {
            master_key,
            master_salt,
            lifetime: None,
            mki: None,
        }
    }

    pub fn encode(&self) -> String {
        let mut key_salt = Vec::with_capacity(self.master_key.len() + self.master_salt.len());
        key_salt.extend_from_slice(&self.master_key);
        key_salt.extend_from_slice(&self.master_salt);

        let mut out = format!("{}{}", INLINE_PREFIX, STANDARD.encode(key_salt));
        if let Some(lifetime) = &self.lifetime {
            out.push('|');
            out.push_str(lifetime);
        }
        if let Some(mki) = &self.mki {
            out.push_str(&format!("|{}:{}", mki.value, mki.length));
        }
        out
    }

    pub fn decode(text: &str, suite: CryptoSuite) -> Result<Self> {
        let body = text
            .strip_prefix(INLINE_PREFIX)
            .ok_or_else(|| Error::InvalidAttribute(format!("inline 키 아님: {}", text)))?;

        let mut parts = body.split('|');
        let encoded = parts.next().unwrap_or_default();
        let key_salt = STANDARD
            .decode(encoded)
            .map_err(|e| Error::InvalidAttribute(format!("base64 디코딩 실패: {}", e)))?;

        if key_salt.len() != suite.key_salt_length() {
            return Err(Error::InvalidAttribute(format!(
                "{} 키 길이 불일치: expected {}, got {}",
                suite,
                suite.key_salt_length(),
                key_salt.len()
            )));
        }

        let mut lifetime = None;
        let mut mki = None;
        for part in parts {
            match part.split_once(':') {
                Some((value, length)) => {
                    let value = value
                        .parse()
                        .map_err(|_| Error::InvalidAttribute(format!("MKI 값: {}", part)))?;
                    let length = length
                        .parse()
                        .map_err(|_| Error::InvalidAttribute(format!("MKI 길이: {}", part)))?;
                    mki = Some(Mki { value, length });
                }
                None => lifetime = Some(part.to_string()),
            }
        }

        let (master_key, master_salt) = key_salt.split_at(suite.master_key_length());
        Ok(Self {
            master_key: master_key.to_vec(),
            master_salt: master_salt.to_vec(),
            lifetime,
            mki,
        })
    }
}

/// crypto 속성 하나
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CryptoAttribute {
    /// 우선순위 태그 (1부터)
    pub tag: u32,
    pub crypto_suite: CryptoSuite,
    pub key_params: Vec<KeyParam>,
    pub session_params: Vec<String>,
}

impl CryptoAttribute {
    /// 새 키로 속성 생성
    pub fn generate(tag: u32, crypto_suite: CryptoSuite) -> Self {
        Self {
            tag,
            crypto_suite,
            key_params: vec![KeyParam::generate(crypto_suite)],
            session_params: Vec::new(),
        }
    }

    /// 와이어 텍스트로 인코딩
    pub fn encode(&self) -> String {
        let key_params: Vec<String> = self.key_params.iter().map(KeyParam::encode).collect();

        let mut out = format!("{} {} {}", self.tag, self.crypto_suite, key_params.join(";"));
        for param in &self.session_params {
            out.push(' ');
            out.push_str(param);
        }
        out
    }

    /// 와이어 텍스트 디코딩 (`a=crypto:` 접두어 허용)
    pub fn decode(text: &str) -> Result<Self> {
        let text = text.trim();
        let text = text
            .strip_prefix("a=crypto:")
            .or_else(|| text.strip_prefix("crypto:"))
            .unwrap_or(text);

        let mut fields = text.split_whitespace();
        let (tag, suite, key_params) = match (fields.next(), fields.next(), fields.next()) {
            (Some(tag), Some(suite), Some(key_params)) => (tag, suite, key_params),
            _ => {
                return Err(Error::InvalidAttribute(format!(
                    "필드 부족: {}",
                    text
                )))
            }
        };

        let tag: u32 = tag
            .parse()
            .map_err(|_| Error::InvalidAttribute(format!("태그: {}", tag)))?;
        let crypto_suite: CryptoSuite = suite.parse()?;
        let key_params = key_params
            .split(';')
            .map(|param| KeyParam::decode(param, crypto_suite))
            .collect::<Result<Vec<_>>>()?;

        Ok(Self {
            tag,
            crypto_suite,
            key_params,
            session_params: fields.map(str::to_string).collect(),
        })
    }

    /// 첫 번째 키 파라미터
    pub fn primary_key(&self) -> Option<&KeyParam> {
        self.key_params.first()
    }
}

impl fmt::Display for CryptoAttribute {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.encode())
    }
}

impl FromStr for CryptoAttribute {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        Self::decode(s)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    // RFC4568 §4 예시
    const RFC_EXAMPLE: &str =
        "1 AES_CM_128_HMAC_SHA1_80 inline:PS1uQCVeeCFCanVmcjkpPywjNWhcYD0mXXtxaVBR|2^20|1:4";

    #[test]
    fn test_decode_rfc_example() {
        let attr = CryptoAttribute::decode(RFC_EXAMPLE).unwrap();
        assert_eq!(attr.tag, 1);
        assert_eq!(attr.crypto_suite, CryptoSuite::AesCm128HmacSha1_80);

        let key = attr.primary_key().unwrap();
        assert_eq!(key.master_key.len(), 16);
        assert_eq!(key.master_salt.len(), 14);
        assert_eq!(key.lifetime.as_deref(), Some("2^20"));
        assert_eq!(key.mki, Some(Mki { value: 1, length: 4 }));

        assert_eq!(attr.encode(), RFC_EXAMPLE);
    }

    #[test]
    fn test_decode_with_sdp_prefix_and_session_params() {
        let text = "a=crypto:2 AES_CM_128_HMAC_SHA1_32 inline:PS1uQCVeeCFCanVmcjkpPywjNWhcYD0mXXtxaVBR KDR=1 UNENCRYPTED_SRTCP";
        let attr: CryptoAttribute = text.parse().unwrap();
        assert_eq!(attr.tag, 2);
        assert_eq!(attr.crypto_suite, CryptoSuite::AesCm128HmacSha1_32);
        assert_eq!(attr.session_params, vec!["KDR=1", "UNENCRYPTED_SRTCP"]);
    }

    #[test]
    fn test_generated_attribute_decodes() {
        let attr = CryptoAttribute::generate(3, CryptoSuite::AesF8_128HmacSha1_80);
        let decoded = CryptoAttribute::decode(&attr.encode()).unwrap();
        assert_eq!(decoded, attr);
    }

    #[test]
    fn test_generated_keys_differ() {
        let a = KeyParam::generate(CryptoSuite::AesCm128HmacSha1_80);
        let b = KeyParam::generate(CryptoSuite::AesCm128HmacSha1_80);
        assert_ne!(a.master_key, b.master_key);
    }

    #[test]
    fn test_decode_errors() {
        for bad in [
            "",
            "1 AES_CM_128_HMAC_SHA1_80",
            "x AES_CM_128_HMAC_SHA1_80 inline:PS1uQCVeeCFCanVmcjkpPywjNWhcYD0mXXtxaVBR",
            "1 NULL_CIPHER inline:PS1uQCVeeCFCanVmcjkpPywjNWhcYD0mXXtxaVBR",
            "1 AES_CM_128_HMAC_SHA1_80 uri:example",
            "1 AES_CM_128_HMAC_SHA1_80 inline:c2hvcnQ=",
            "1 AES_CM_128_HMAC_SHA1_80 inline:PS1uQCVeeCFCanVmcjkpPywjNWhcYD0mXXtxaVBR|x:4",
        ] {
            assert!(
                matches!(CryptoAttribute::decode(bad), Err(Error::InvalidAttribute(_))),
                "accepted: {:?}",
                bad
            );
        }
    }

    #[test]
    fn test_debug_hides_key_material() {
        let key = KeyParam::generate(CryptoSuite::AesCm128HmacSha1_80);
        let debug = format!("{:?}", key);
        assert!(debug.contains("[16 bytes]"));
        assert!(!debug.contains(&format!("{:?}", key.master_key)));
    }
}
