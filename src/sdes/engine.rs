//! 협상 결과를 SRTP 변환 계층으로 넘기는 엔진

use std::fmt;
use std::sync::Arc;

use parking_lot::RwLock;

use super::attribute::{CryptoAttribute, Mki};
use super::suite::{CryptoSuite, SrtpCipher};
use super::NegotiationState;

/// SRTP 컨텍스트 생성에 필요한 파라미터
#[derive(Clone, PartialEq, Eq)]
pub struct SrtpPolicy {
    pub crypto_suite: CryptoSuite,
    pub cipher: SrtpCipher,
    pub encryption_key_length: usize,
    pub auth_key_length: usize,
    pub auth_tag_length: usize,
    pub salt_length: usize,
    pub master_key: Vec<u8>,
    pub master_salt: Vec<u8>,
    pub mki: Option<Mki>,
}

impl SrtpPolicy {
    /// 속성의 첫 번째 키로 정책 생성
    pub fn from_attribute(attribute: &CryptoAttribute) -> Option<Self> {
        let suite = attribute.crypto_suite;
        let key = attribute.primary_key()?;

        Some(Self {
            crypto_suite: suite,
            cipher: suite.cipher(),
            encryption_key_length: suite.encryption_key_length(),
            auth_key_length: suite.auth_key_length(),
            auth_tag_length: suite.auth_tag_length(),
            salt_length: suite.master_salt_length(),
            master_key: key.master_key.clone(),
            master_salt: key.master_salt.clone(),
            mki: key.mki,
        })
    }
}

impl fmt::Debug for SrtpPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SrtpPolicy")
            .field("crypto_suite", &self.crypto_suite)
            .field("cipher", &self.cipher)
            .field("auth_tag_length", &self.auth_tag_length)
            .field("mki", &self.mki)
            .finish_non_exhaustive()
    }
}

/// SRTP 변환 엔진
///
/// 협상 상태를 공유하므로 생성 이후에 선택이 끝나도 반영됨
pub struct SrtpTransformEngine {
    state: Arc<RwLock<NegotiationState>>,
}

impl SrtpTransformEngine {
    pub(crate) fn new(state: Arc<RwLock<NegotiationState>>) -> Self {
        Self { state }
    }

    /// 양방향 속성이 모두 선택되었는지
    pub fn is_ready(&self) -> bool {
        let state = self.state.read();
        state.selected_in.is_some() && state.selected_out.is_some()
    }

    /// 수신(복호화) 정책
    pub fn inbound_policy(&self) -> Option<SrtpPolicy> {
        self.state
            .read()
            .selected_in
            .as_ref()
            .and_then(SrtpPolicy::from_attribute)
    }

    /// 송신(암호화) 정책
    pub fn outbound_policy(&self) -> Option<SrtpPolicy> {
        self.state
            .read()
            .selected_out
            .as_ref()
            .and_then(SrtpPolicy::from_attribute)
    }
}
