//! 커넥터 출력 스트림
//!
//! 호출 스레드에서 패킷 하나를 동기 송신 (내부 버퍼링/배치 없음)

use std::net::SocketAddr;
use std::sync::Arc;

use tracing::warn;

use crate::input::unspecified_addr;
use crate::logging::{self, Direction, PacketLogger, PacketRecord};
use crate::packet::RawPacket;
use crate::transport::{PacketProtocol, PacketTransport};
use crate::{Error, Result};

/// 출력 스트림 (UDP/TCP 공용)
pub struct ConnectorOutputStream<T: PacketTransport> {
    transport: Arc<T>,
    protocol: PacketProtocol,
    logger: Option<Arc<dyn PacketLogger>>,
}

impl<T: PacketTransport> ConnectorOutputStream<T> {
    pub fn new(
        transport: Arc<T>,
        protocol: PacketProtocol,
        logger: Option<Arc<dyn PacketLogger>>,
    ) -> Self {
        Self {
            transport,
            protocol,
            logger,
        }
    }

    /// 소켓 유효 여부
    ///
    /// false면 이 스트림으로는 더 이상 송신 불가 (재시도 무의미)
    pub fn is_socket_valid(&self) -> bool {
        self.transport.is_valid()
    }

    /// 패킷 하나 송신
    ///
    /// UDP: target으로 데이터그램 하나. TCP: 연결된 상대에게 그대로 기록 (target 무시)
    pub fn send(&self, payload: &[u8], target: SocketAddr) -> Result<usize> {
        if !self.transport.is_valid() {
            return Err(Error::SocketInvalid);
        }

        let sent = self.transport.send_to(payload, target).map_err(|e| {
            warn!("{:?} 송신 실패 ({}): {}", self.protocol, target, e);
            Error::Io(e)
        })?;

        // 멀티플렉싱 소켓은 상위에서 이미 로깅함
        if !self.transport.logs_upstream() {
            logging::dispatch(
                self.logger.as_ref(),
                PacketRecord {
                    protocol: self.protocol,
                    source: self.transport.local_addr().unwrap_or(unspecified_addr()),
                    destination: self.transport.peer_addr().unwrap_or(target),
                    transport: T::KIND,
                    direction: Direction::Outbound,
                    payload,
                },
            );
        }

        Ok(sent)
    }

    /// RawPacket의 유효 범위 송신
    pub fn send_packet(&self, packet: &RawPacket, target: SocketAddr) -> Result<usize> {
        self.send(packet.payload(), target)
    }

    pub fn protocol(&self) -> PacketProtocol {
        self.protocol
    }

    pub fn local_addr(&self) -> Option<SocketAddr> {
        self.transport.local_addr()
    }
}
