//! RFC4585 RTCP 피드백 공통 헤더
//!
//! ```text
//!  0                   1                   2                   3
//!  0 1 2 3 4 5 6 7 8 9 0 1 2 3 4 5 6 7 8 9 0 1 2 3 4 5 6 7 8 9 0 1
//! +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
//! |V=2|P|   FMT   |       PT      |          length               |
//! +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
//! |                  SSRC of packet sender                        |
//! +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
//! |                  SSRC of media source                         |
//! +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
//! ```

use std::net::SocketAddr;

use bytes::{Buf, BufMut};
use serde::{Deserialize, Serialize};

use crate::output::ConnectorOutputStream;
use crate::transport::PacketTransport;
use crate::{Error, Result};

/// 공통 헤더 길이 (바이트)
pub const FEEDBACK_HEADER_LEN: usize = 12;

/// RTPFB (전송 계층 피드백)
pub const PT_TRANSPORT_LAYER_FEEDBACK: u8 = 205;

/// PSFB (페이로드별 피드백)
pub const PT_PAYLOAD_SPECIFIC_FEEDBACK: u8 = 206;

/// RTPFB: Generic NACK
pub const FMT_GENERIC_NACK: u8 = 1;

/// PSFB: Picture Loss Indication
pub const FMT_PLI: u8 = 1;

/// PSFB: Full Intra Request
pub const FMT_FIR: u8 = 4;

const RTCP_VERSION: u8 = 2;
const FMT_MASK: u8 = 0x1F;

/// 길이 필드: 32비트 워드 수 - 1
const HEADER_LENGTH_WORDS: u16 = (FEEDBACK_HEADER_LEN / 4 - 1) as u16;

/// 수신 RTCP 패킷에서 추출한 피드백 이벤트
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct FeedbackEvent {
    /// 하위 5비트
    pub fmt: u8,
    pub payload_type: u8,
}

impl FeedbackEvent {
    /// 12바이트 이상인 패킷에서만 이벤트 생성
    pub fn from_packet(packet: &[u8]) -> Option<Self> {
        if packet.len() < FEEDBACK_HEADER_LEN {
            return None;
        }

        Some(Self {
            fmt: packet[0] & FMT_MASK,
            payload_type: packet[1],
        })
    }
}

/// 송신용 최소 피드백 패킷 (FCI 없음)
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RtcpFeedbackPacket {
    pub fmt: u8,
    pub payload_type: u8,
    pub sender_ssrc: u32,
    pub source_ssrc: u32,
}

impl RtcpFeedbackPacket {
    pub fn new(fmt: u8, payload_type: u8, sender_ssrc: u32, source_ssrc: u32) -> Self {
        Self {
            fmt: fmt & FMT_MASK,
            payload_type,
            sender_ssrc,
            source_ssrc,
        }
    }

    /// Picture Loss Indication
    pub fn pli(sender_ssrc: u32, source_ssrc: u32) -> Self {
        Self::new(FMT_PLI, PT_PAYLOAD_SPECIFIC_FEEDBACK, sender_ssrc, source_ssrc)
    }

    /// 12바이트로 직렬화
    pub fn to_bytes(&self) -> [u8; FEEDBACK_HEADER_LEN] {
        let mut out = [0u8; FEEDBACK_HEADER_LEN];
        self.marshal_to(&mut &mut out[..]);
        out
    }

    /// 버퍼 뒤에 이어서 기록
    pub fn marshal_to<B: BufMut>(&self, buf: &mut B) {
        // V=2, P=0
        buf.put_u8((RTCP_VERSION << 6) | (self.fmt & FMT_MASK));
        buf.put_u8(self.payload_type);
        buf.put_u16(HEADER_LENGTH_WORDS);
        buf.put_u32(self.sender_ssrc);
        buf.put_u32(self.source_ssrc);
    }

    /// 공통 헤더 파싱 (FCI는 무시)
    pub fn unmarshal(mut bytes: &[u8]) -> Result<Self> {
        if bytes.len() < FEEDBACK_HEADER_LEN {
            return Err(Error::InvalidFeedbackPacket(format!(
                "{} 바이트, 최소 {} 필요",
                bytes.len(),
                FEEDBACK_HEADER_LEN
            )));
        }

        let first = bytes.get_u8();
        let version = first >> 6;
        if version != RTCP_VERSION {
            return Err(Error::InvalidFeedbackPacket(format!(
                "버전 {}",
                version
            )));
        }

        let payload_type = bytes.get_u8();
        let _length = bytes.get_u16();
        let sender_ssrc = bytes.get_u32();
        let source_ssrc = bytes.get_u32();

        Ok(Self {
            fmt: first & FMT_MASK,
            payload_type,
            sender_ssrc,
            source_ssrc,
        })
    }

    /// 출력 스트림으로 송신
    pub fn write_to<T: PacketTransport>(
        &self,
        output: &ConnectorOutputStream<T>,
        target: SocketAddr,
    ) -> Result<usize> {
        output.send(&self.to_bytes(), target)
    }

    pub fn event(&self) -> FeedbackEvent {
        FeedbackEvent {
            fmt: self.fmt,
            payload_type: self.payload_type,
        }
    }
}
