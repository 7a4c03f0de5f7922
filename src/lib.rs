//! # media-transport
//!
//! RTP/RTCP 미디어 전송 커넥터와 SDES 키 협상
//!
//! ## 핵심 특징
//! - **커넥터**: 데이터(RTP)/제어(RTCP) 소켓 쌍 위에 입출력 스트림 4개를 지연 생성
//! - **수신 워커**: 스트림마다 전용 스레드가 소켓을 읽고 소비자에게 한 번에 하나씩 넘김
//! - **RTCP 피드백**: 수신한 제어 패킷의 FMT/PT를 등록된 리스너에 통지
//! - **패킷 로깅**: 선택적 외부 로거로 송수신 패킷 기록
//! - **SDES**: RFC4568 crypto 속성 교환으로 SRTP suite/키 선택

pub mod config;
pub mod connector;
pub mod error;
pub mod feedback;
pub mod input;
pub mod logging;
pub mod output;
pub mod packet;
pub mod rtcp;
pub mod sdes;
pub mod transport;

pub use config::Config;
pub use connector::{SocketPair, SocketProvider, TcpConnector, TransportConnector, UdpConnector};
pub use error::{Error, Result};
pub use feedback::{FeedbackEvent, RtcpFeedbackPacket};
pub use input::ConnectorInputStream;
pub use logging::{Direction, PacketLogger, PacketRecord, TracingPacketLogger};
pub use output::ConnectorOutputStream;
pub use packet::RawPacket;
pub use rtcp::{FeedbackListener, RtcpInputStream};
pub use sdes::{CryptoAttribute, CryptoSuite, NegotiationPhase, SdesControl, SrtpTransformEngine};
pub use transport::{Channel, PacketProtocol, PacketTransport, TransportKind};

/// 최대 패킷 크기 (UDP 데이터그램 상한)
pub const MAX_PACKET_SIZE: usize = 65535;

/// 기본 소켓 수신 버퍼 크기 (바이트)
pub const DEFAULT_RECEIVE_BUFFER_SIZE: usize = 65535;
