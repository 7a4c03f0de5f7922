//! SDES 보안 제어
//!
//! 시그널링으로 crypto 속성을 교환해 양측이 쓸 suite와 키를 정함
//! - Initiator: 속성 제안 → 응답에서 선택
//! - Responder: 제안에서 로컬 선호 순서로 선택 → 응답 속성 반환
//!
//! 일치하는 suite가 없으면 선택 없음 (에러 아님, 호출자가 확인)

pub mod attribute;
pub mod engine;
pub mod suite;

use std::sync::Arc;

use parking_lot::{Mutex, RwLock};
use tracing::{debug, info, warn};

pub use attribute::{CryptoAttribute, KeyParam, Mki};
pub use engine::{SrtpPolicy, SrtpTransformEngine};
pub use suite::{CryptoSuite, SrtpCipher};

/// 기본 지원 suite (선호 순서)
pub const DEFAULT_SUITES: &[CryptoSuite] = &[
    CryptoSuite::AesCm128HmacSha1_80,
    // CryptoSuite::AesCm128HmacSha1_32,
    // CryptoSuite::AesF8_128HmacSha1_80,
];

/// 협상 단계
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NegotiationPhase {
    Idle,
    /// Initiator가 속성을 제안함
    Offered,
    /// Responder가 선택 중 (실패 시 여기 머무름)
    Selecting,
    Selected,
}

/// 협상 상태 (엔진과 공유)
#[derive(Debug)]
pub(crate) struct NegotiationState {
    phase: NegotiationPhase,
    own_attributes: Vec<CryptoAttribute>,
    pub(crate) selected_in: Option<CryptoAttribute>,
    pub(crate) selected_out: Option<CryptoAttribute>,
}

impl NegotiationState {
    fn new() -> Self {
        Self {
            phase: NegotiationPhase::Idle,
            own_attributes: Vec::new(),
            selected_in: None,
            selected_out: None,
        }
    }

    fn select(&mut self, inbound: CryptoAttribute, outbound: CryptoAttribute) {
        self.selected_in = Some(inbound);
        self.selected_out = Some(outbound);
        self.phase = NegotiationPhase::Selected;
    }
}

/// 상대 속성 디코딩 (실패한 항목은 건너뜀)
fn decode_peer_attributes<S: AsRef<str>>(peer_attributes: &[S]) -> Vec<CryptoAttribute> {
    peer_attributes
        .iter()
        .filter_map(|text| match CryptoAttribute::decode(text.as_ref()) {
            Ok(attribute) => Some(attribute),
            Err(e) => {
                debug!("상대 crypto 속성 무시: {}", e);
                None
            }
        })
        .collect()
}

/// SDES 보안 제어
pub struct SdesControl {
    suites: Vec<CryptoSuite>,
    state: Arc<RwLock<NegotiationState>>,
    engine: Mutex<Option<Arc<SrtpTransformEngine>>>,
}

impl Default for SdesControl {
    fn default() -> Self {
        Self::new()
    }
}

impl SdesControl {
    /// 기본 suite 목록으로 생성
    pub fn new() -> Self {
        Self::with_suites(DEFAULT_SUITES.to_vec())
    }

    /// 지원 suite 지정 (앞쪽이 우선)
    pub fn with_suites(suites: Vec<CryptoSuite>) -> Self {
        Self {
            suites,
            state: Arc::new(RwLock::new(NegotiationState::new())),
            engine: Mutex::new(None),
        }
    }

    pub fn supported_suites(&self) -> &[CryptoSuite] {
        &self.suites
    }

    pub fn phase(&self) -> NegotiationPhase {
        self.state.read().phase
    }

    /// 제안할 속성 목록 (suite당 하나, 태그 = 1부터 순서)
    ///
    /// 이미 선택이 끝난 경우 기존 제안을 그대로 반환
    pub fn get_initiator_attributes(&self) -> Vec<String> {
        let mut state = self.state.write();

        if state.phase != NegotiationPhase::Selected {
            state.own_attributes = self
                .suites
                .iter()
                .enumerate()
                .map(|(i, suite)| CryptoAttribute::generate(i as u32 + 1, *suite))
                .collect();
            state.phase = NegotiationPhase::Offered;
            debug!("SDES 제안: {} 개 suite", state.own_attributes.len());
        }

        state.own_attributes.iter().map(CryptoAttribute::encode).collect()
    }

    /// Responder: 로컬 선호 순서로 상대 제안에서 선택
    ///
    /// 일치하면 응답으로 보낼 로컬 속성(태그 1), 없으면 None
    pub fn responder_select_attribute<S: AsRef<str>>(&self, peer_attributes: &[S]) -> Option<String> {
        let mut state = self.state.write();

        if state.phase == NegotiationPhase::Selected {
            return state.selected_out.as_ref().map(CryptoAttribute::encode);
        }
        state.phase = NegotiationPhase::Selecting;

        let offered = decode_peer_attributes(peer_attributes);
        for suite in &self.suites {
            if let Some(peer) = offered.iter().find(|a| a.crypto_suite == *suite) {
                let local = CryptoAttribute::generate(1, *suite);
                let answer = local.encode();

                info!("SDES 선택 (responder): {}", suite);
                state.select(peer.clone(), local);
                return Some(answer);
            }
        }

        warn!(
            "SDES 협상 실패: 상대 제안 {} 개 중 지원 suite 없음",
            peer_attributes.len()
        );
        None
    }

    /// Initiator: 자신이 제안한 순서로 상대 응답에서 선택
    ///
    /// 선택되면 true
    pub fn initiator_select_attribute<S: AsRef<str>>(&self, peer_attributes: &[S]) -> bool {
        let mut state = self.state.write();

        if state.phase == NegotiationPhase::Selected {
            return true;
        }

        let answers = decode_peer_attributes(peer_attributes);
        let selected = state.own_attributes.iter().find_map(|own| {
            answers
                .iter()
                .find(|peer| peer.crypto_suite == own.crypto_suite)
                .map(|peer| (peer.clone(), own.clone()))
        });

        match selected {
            Some((inbound, outbound)) => {
                info!("SDES 선택 (initiator): {}", outbound.crypto_suite);
                state.select(inbound, outbound);
                true
            }
            None => {
                warn!("SDES 협상 실패: 응답에 제안한 suite 없음");
                false
            }
        }
    }

    /// 상대가 쓰는 속성 (수신 복호화용), 선택 전에는 None
    pub fn get_in_attribute(&self) -> Option<CryptoAttribute> {
        self.state.read().selected_in.clone()
    }

    /// 자신이 쓰는 속성 (송신 암호화용), 선택 전에는 None
    pub fn get_out_attribute(&self) -> Option<CryptoAttribute> {
        self.state.read().selected_out.clone()
    }

    /// SRTP 변환 엔진 (첫 호출에서 생성 후 캐시)
    pub fn get_transform_engine(&self) -> Arc<SrtpTransformEngine> {
        self.engine
            .lock()
            .get_or_insert_with(|| Arc::new(SrtpTransformEngine::new(self.state.clone())))
            .clone()
    }

    /// 변환 엔진이 생성되었는지 (미디어 보호 활성화 여부)
    pub fn get_secure_communication_status(&self) -> bool {
        self.engine.lock().is_some()
    }

    /// 변환 엔진 해제 (선택 결과는 유지)
    pub fn cleanup(&self) {
        if self.engine.lock().take().is_some() {
            debug!("SRTP 변환 엔진 해제");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const A: CryptoSuite = CryptoSuite::AesCm128HmacSha1_80;
    const B: CryptoSuite = CryptoSuite::AesCm128HmacSha1_32;
    const C: CryptoSuite = CryptoSuite::AesF8_128HmacSha1_80;

    #[test]
    fn test_default_offer() {
        let control = SdesControl::new();
        assert_eq!(control.phase(), NegotiationPhase::Idle);

        let offer = control.get_initiator_attributes();
        assert_eq!(offer.len(), 1);
        assert!(offer[0].starts_with("1 AES_CM_128_HMAC_SHA1_80 inline:"));
        assert_eq!(control.phase(), NegotiationPhase::Offered);
    }

    #[test]
    fn test_offer_tags_follow_preference() {
        let control = SdesControl::with_suites(vec![C, A, B]);
        let offer: Vec<CryptoAttribute> = control
            .get_initiator_attributes()
            .iter()
            .map(|s| s.parse().unwrap())
            .collect();

        let tags: Vec<_> = offer.iter().map(|a| (a.tag, a.crypto_suite)).collect();
        assert_eq!(tags, vec![(1, C), (2, A), (3, B)]);
    }

    #[test]
    fn test_responder_prefers_local_order() {
        let peer = SdesControl::with_suites(vec![B, A]);
        let responder = SdesControl::with_suites(vec![A, B]);

        let offer = peer.get_initiator_attributes();
        let answer = responder.responder_select_attribute(&offer).unwrap();

        let answer: CryptoAttribute = answer.parse().unwrap();
        assert_eq!(answer.crypto_suite, A);
        assert_eq!(answer.tag, 1);
        assert_eq!(responder.phase(), NegotiationPhase::Selected);

        let selected_in = responder.get_in_attribute().unwrap();
        assert_eq!(selected_in.crypto_suite, A);
        assert_eq!(selected_in.tag, 2);
        assert_eq!(responder.get_out_attribute().unwrap(), answer);
    }

    #[test]
    fn test_responder_no_match_stays_selecting() {
        let peer = SdesControl::with_suites(vec![B]);
        let responder = SdesControl::with_suites(vec![A]);

        let offer = peer.get_initiator_attributes();
        assert!(responder.responder_select_attribute(&offer).is_none());
        assert_eq!(responder.phase(), NegotiationPhase::Selecting);
        assert!(responder.get_in_attribute().is_none());
        assert!(responder.get_out_attribute().is_none());
    }

    #[test]
    fn test_responder_skips_malformed_peer_attributes() {
        let responder = SdesControl::new();
        let offer = vec![
            "garbage".to_string(),
            CryptoAttribute::generate(2, A).encode(),
        ];
        assert!(responder.responder_select_attribute(&offer).is_some());
    }

    #[test]
    fn test_full_offer_answer() {
        let initiator = SdesControl::with_suites(vec![A, B]);
        let responder = SdesControl::with_suites(vec![B, A]);

        let offer = initiator.get_initiator_attributes();
        let answer = responder.responder_select_attribute(&offer).unwrap();
        assert!(initiator.initiator_select_attribute(&[answer]));
        assert_eq!(initiator.phase(), NegotiationPhase::Selected);

        // 양측 키가 서로 교차해야 함
        assert_eq!(initiator.get_out_attribute(), responder.get_in_attribute());
        assert_eq!(initiator.get_in_attribute(), responder.get_out_attribute());
        assert_eq!(initiator.get_out_attribute().unwrap().crypto_suite, B);
    }

    #[test]
    fn test_initiator_no_overlap() {
        let initiator = SdesControl::with_suites(vec![A]);
        initiator.get_initiator_attributes();

        let answer = CryptoAttribute::generate(1, C).encode();
        assert!(!initiator.initiator_select_attribute(&[answer]));

        assert_eq!(initiator.phase(), NegotiationPhase::Offered);
        assert!(initiator.get_in_attribute().is_none());
        assert!(initiator.get_out_attribute().is_none());
        assert!(!initiator.get_secure_communication_status());
    }

    #[test]
    fn test_selection_is_fixed_once_made() {
        let initiator = SdesControl::new();
        let responder = SdesControl::new();

        let offer = initiator.get_initiator_attributes();
        let answer = responder.responder_select_attribute(&offer).unwrap();
        assert!(initiator.initiator_select_attribute(&[answer.clone()]));

        let selected_out = initiator.get_out_attribute();
        assert_eq!(initiator.get_initiator_attributes(), offer);
        assert!(initiator.initiator_select_attribute(&[CryptoAttribute::generate(1, A).encode()]));
        assert_eq!(initiator.get_out_attribute(), selected_out);

        let new_offer = SdesControl::new().get_initiator_attributes();
        assert_eq!(responder.responder_select_attribute(&new_offer), Some(answer));
    }

    #[test]
    fn test_renegotiate_after_failure() {
        let initiator = SdesControl::with_suites(vec![A]);
        let first = initiator.get_initiator_attributes();
        assert!(!initiator.initiator_select_attribute(&[CryptoAttribute::generate(1, B).encode()]));

        let second = initiator.get_initiator_attributes();
        assert_eq!(initiator.phase(), NegotiationPhase::Offered);
        assert_ne!(first, second);
    }

    #[test]
    fn test_transform_engine_lifecycle() {
        let initiator = SdesControl::new();
        let responder = SdesControl::new();
        assert!(!responder.get_secure_communication_status());

        let engine = responder.get_transform_engine();
        assert!(Arc::ptr_eq(&engine, &responder.get_transform_engine()));
        assert!(responder.get_secure_communication_status());
        assert!(!engine.is_ready());
        assert!(engine.inbound_policy().is_none());

        let offer = initiator.get_initiator_attributes();
        responder.responder_select_attribute(&offer).unwrap();
        assert!(engine.is_ready());

        let inbound = engine.inbound_policy().unwrap();
        let offered: CryptoAttribute = offer[0].parse().unwrap();
        assert_eq!(inbound.master_key, offered.key_params[0].master_key);
        assert_eq!(inbound.auth_tag_length, 10);
        assert_eq!(inbound.cipher, SrtpCipher::AesCm);
        assert!(engine.outbound_policy().is_some());

        responder.cleanup();
        assert!(!responder.get_secure_communication_status());
        assert!(responder.get_in_attribute().is_some());
    }

    #[test]
    fn test_selection_alone_does_not_activate_security() {
        let initiator = SdesControl::new();
        let responder = SdesControl::new();
        let offer = initiator.get_initiator_attributes();
        let answer = responder.responder_select_attribute(&offer).unwrap();
        assert!(initiator.initiator_select_attribute(&[answer]));

        assert!(!initiator.get_secure_communication_status());
        assert!(!responder.get_secure_communication_status());
    }
}
