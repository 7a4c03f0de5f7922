//! 패킷 로깅 훅
//!
//! 수신/송신 패킷을 외부 로거로 전달. 로거 에러는 삼키고 전송 경로를 막지 않음

use std::net::SocketAddr;
use std::sync::Arc;

use tracing::trace;

use crate::transport::{PacketProtocol, TransportKind};

/// 패킷 방향
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    Inbound,
    Outbound,
}

impl Direction {
    pub fn is_sent(&self) -> bool {
        matches!(self, Direction::Outbound)
    }
}

/// 로거로 전달되는 패킷 기록
#[derive(Debug, Clone, Copy)]
pub struct PacketRecord<'a> {
    pub protocol: PacketProtocol,
    pub source: SocketAddr,
    pub destination: SocketAddr,
    pub transport: TransportKind,
    pub direction: Direction,
    /// 패킷의 유효 바이트 범위
    pub payload: &'a [u8],
}

/// 로거 에러 타입 (호출 측에서 무시됨)
pub type LogError = Box<dyn std::error::Error + Send + Sync>;

/// 패킷 로깅 협력자
///
/// 수신 스레드에서 호출되므로 오래 블록하면 안 됨
pub trait PacketLogger: Send + Sync {
    fn log_packet(&self, record: &PacketRecord<'_>) -> Result<(), LogError>;
}

/// tracing trace 이벤트로 기록하는 기본 로거
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingPacketLogger;

impl PacketLogger for TracingPacketLogger {
    fn log_packet(&self, record: &PacketRecord<'_>) -> Result<(), LogError> {
        trace!(
            protocol = ?record.protocol,
            transport = ?record.transport,
            sent = record.direction.is_sent(),
            len = record.payload.len(),
            "{} -> {}",
            record.source,
            record.destination
        );
        Ok(())
    }
}

/// 로거 호출 (에러 무시)
pub(crate) fn dispatch(logger: Option<&Arc<dyn PacketLogger>>, record: PacketRecord<'_>) {
    if let Some(logger) = logger {
        if let Err(e) = logger.log_packet(&record) {
            trace!("패킷 로깅 실패 (무시): {}", e);
        }
    }
}
