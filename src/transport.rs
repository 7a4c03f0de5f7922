//! 전송 방식별 소켓 기능
//!
//! UDP/TCP 차이를 `PacketTransport` 하나로 감싸고 입출력 스트림은 이를 조합해서 사용

use std::io::{self, ErrorKind, Read, Write};
use std::net::{Shutdown, SocketAddr, TcpStream, UdpSocket};
use std::sync::atomic::{AtomicBool, Ordering};

use serde::{Deserialize, Serialize};
use socket2::SockRef;
use tracing::{debug, warn};

use crate::packet::RawPacket;
use crate::Config;

/// 전송 방식
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum TransportKind {
    Udp,
    Tcp,
}

/// 소켓 쌍 중 어느 쪽인지
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Channel {
    /// RTP 미디어
    Data,
    /// RTCP 제어/피드백
    Control,
}

impl Channel {
    pub fn protocol(&self) -> PacketProtocol {
        match self {
            Channel::Data => PacketProtocol::Rtp,
            Channel::Control => PacketProtocol::Rtcp,
        }
    }
}

/// 로깅용 프로토콜 이름
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum PacketProtocol {
    Rtp,
    Rtcp,
}

/// 전송 소켓 기능
///
/// 하나의 소켓을 입력/출력 스트림이 공유하므로 `&self`로 동작해야 함
pub trait PacketTransport: Send + Sync + 'static {
    /// 외부에서 전달받는 소켓 타입
    type Socket: Send + 'static;

    const KIND: TransportKind;

    /// 소켓을 감싸서 전송 객체 생성
    ///
    /// `logs_upstream`: 소켓 소유자가 이미 패킷 로깅을 하는 경우 (멀티플렉싱 소켓)
    fn open(socket: Self::Socket, config: &Config, logs_upstream: bool) -> io::Result<Self>
    where
        Self: Sized;

    /// 패킷 하나 수신, 송신자 주소 반환
    ///
    /// UDP는 버퍼를 가득 채운 데이터그램을 잘린 것으로 보고 InvalidData로 버림.
    /// 최대 패킷 크기보다 1바이트 큰 버퍼를 넘겨야 함
    fn receive_into(&self, packet: &mut RawPacket) -> io::Result<SocketAddr>;

    /// 패킷 하나 송신
    fn send_to(&self, payload: &[u8], target: SocketAddr) -> io::Result<usize>;

    fn is_valid(&self) -> bool;

    /// 소켓 닫기 (블록된 수신을 깨움, 여러 번 호출 가능)
    fn close(&self);

    fn local_addr(&self) -> Option<SocketAddr>;

    fn peer_addr(&self) -> Option<SocketAddr> {
        None
    }

    /// 재시도할 수 있는 수신 에러인지
    fn is_transient(&self, err: &io::Error) -> bool;

    fn logs_upstream(&self) -> bool {
        false
    }
}

fn closed_error() -> io::Error {
    io::Error::new(ErrorKind::NotConnected, "socket closed")
}

fn truncated_error(max_size: usize) -> io::Error {
    io::Error::new(
        ErrorKind::InvalidData,
        format!("datagram larger than {} bytes", max_size),
    )
}

fn set_received(packet: &mut RawPacket, len: usize) -> io::Result<()> {
    packet
        .set_range(0, len)
        .map_err(|e| io::Error::new(ErrorKind::InvalidData, e))
}

/// UDP 데이터그램 소켓
#[derive(Debug)]
pub struct UdpTransport {
    socket: UdpSocket,
    local_addr: Option<SocketAddr>,
    receive_buffer_size: usize,
    buffer_tuned: AtomicBool,
    closed: AtomicBool,
    logs_upstream: bool,
}

impl PacketTransport for UdpTransport {
    type Socket = UdpSocket;

    const KIND: TransportKind = TransportKind::Udp;

    fn open(socket: UdpSocket, config: &Config, logs_upstream: bool) -> io::Result<Self> {
        // close 플래그를 주기적으로 확인하기 위한 타임아웃
        socket.set_read_timeout(Some(config.receive_poll_interval()))?;
        let local_addr = socket.local_addr().ok();

        Ok(Self {
            socket,
            local_addr,
            receive_buffer_size: config.udp_receive_buffer_size,
            buffer_tuned: AtomicBool::new(false),
            closed: AtomicBool::new(false),
            logs_upstream,
        })
    }

    fn receive_into(&self, packet: &mut RawPacket) -> io::Result<SocketAddr> {
        if self.closed.load(Ordering::Acquire) {
            return Err(closed_error());
        }

        // 첫 수신 시 커널 버퍼 확대 (best-effort)
        if !self.buffer_tuned.swap(true, Ordering::AcqRel) {
            if let Err(e) = SockRef::from(&self.socket).set_recv_buffer_size(self.receive_buffer_size) {
                debug!("UDP 수신 버퍼 크기 설정 실패 (무시): {}", e);
            }
        }

        let capacity = packet.capacity();
        let (len, from) = self.socket.recv_from(packet.receive_buffer_mut())?;

        // 버퍼를 가득 채운 데이터그램은 잘렸을 수 있으므로 넘기지 않고 버림
        if len >= capacity {
            warn!(
                "UDP 데이터그램이 최대 크기({} 바이트)를 넘어 버림",
                capacity.saturating_sub(1)
            );
            return Err(truncated_error(capacity.saturating_sub(1)));
        }

        set_received(packet, len)?;
        Ok(from)
    }

    fn send_to(&self, payload: &[u8], target: SocketAddr) -> io::Result<usize> {
        if self.closed.load(Ordering::Acquire) {
            return Err(closed_error());
        }
        self.socket.send_to(payload, target)
    }

    fn is_valid(&self) -> bool {
        !self.closed.load(Ordering::Acquire)
    }

    fn close(&self) {
        if self.closed.swap(true, Ordering::AcqRel) {
            return;
        }
        // 리눅스에서는 블록된 recv_from을 즉시 깨움, 그 외에는 read timeout으로 빠져나옴
        let _ = SockRef::from(&self.socket).shutdown(Shutdown::Both);
    }

    fn local_addr(&self) -> Option<SocketAddr> {
        self.local_addr
    }

    fn is_transient(&self, err: &io::Error) -> bool {
        matches!(
            err.kind(),
            ErrorKind::WouldBlock
                | ErrorKind::TimedOut
                | ErrorKind::Interrupted
                | ErrorKind::ConnectionRefused
                | ErrorKind::ConnectionReset
                // 잘린 데이터그램: 해당 패킷만 버림
                | ErrorKind::InvalidData
        )
    }

    fn logs_upstream(&self) -> bool {
        self.logs_upstream
    }
}

/// TCP 스트림 소켓
///
/// 한계: read 한 번을 패킷 하나로 간주함. TCP는 메시지 경계가 없으므로
/// 분할/병합된 read는 잘못된 패킷 경계로 전달됨 (길이 프레이밍 없음)
#[derive(Debug)]
pub struct TcpTransport {
    stream: TcpStream,
    local_addr: Option<SocketAddr>,
    peer_addr: Option<SocketAddr>,
    closed: AtomicBool,
    logs_upstream: bool,
}

impl PacketTransport for TcpTransport {
    type Socket = TcpStream;

    const KIND: TransportKind = TransportKind::Tcp;

    fn open(stream: TcpStream, config: &Config, logs_upstream: bool) -> io::Result<Self> {
        if let Err(e) = SockRef::from(&stream).set_recv_buffer_size(config.tcp_receive_buffer_size) {
            debug!("TCP 수신 버퍼 크기 설정 실패 (무시): {}", e);
        }
        stream.set_read_timeout(Some(config.receive_poll_interval()))?;

        Ok(Self {
            local_addr: stream.local_addr().ok(),
            peer_addr: stream.peer_addr().ok(),
            stream,
            closed: AtomicBool::new(false),
            logs_upstream,
        })
    }

    fn receive_into(&self, packet: &mut RawPacket) -> io::Result<SocketAddr> {
        if self.closed.load(Ordering::Acquire) {
            return Err(closed_error());
        }

        let len = (&self.stream).read(packet.receive_buffer_mut())?;
        if len == 0 {
            return Err(io::Error::new(
                ErrorKind::UnexpectedEof,
                "TCP read returned no data",
            ));
        }
        set_received(packet, len)?;

        self.peer_addr
            .ok_or_else(|| io::Error::new(ErrorKind::NotConnected, "no peer address"))
    }

    /// target은 인터페이스 대칭용, 실제 목적지는 연결된 상대
    fn send_to(&self, payload: &[u8], _target: SocketAddr) -> io::Result<usize> {
        if self.closed.load(Ordering::Acquire) {
            return Err(closed_error());
        }
        (&self.stream).write_all(payload)?;
        Ok(payload.len())
    }

    fn is_valid(&self) -> bool {
        !self.closed.load(Ordering::Acquire)
    }

    fn close(&self) {
        if self.closed.swap(true, Ordering::AcqRel) {
            return;
        }
        let _ = self.stream.shutdown(Shutdown::Both);
    }

    fn local_addr(&self) -> Option<SocketAddr> {
        self.local_addr
    }

    fn peer_addr(&self) -> Option<SocketAddr> {
        self.peer_addr
    }

    fn is_transient(&self, err: &io::Error) -> bool {
        matches!(
            err.kind(),
            ErrorKind::WouldBlock | ErrorKind::TimedOut | ErrorKind::Interrupted
        )
    }

    fn logs_upstream(&self) -> bool {
        self.logs_upstream
    }
}
