//! 커넥터 입력 스트림
//!
//! - 소켓당 전용 수신 스레드
//! - 수신 스레드 → 소비자 단일 슬롯 핸드오프 (crossbeam bounded 채널)
//! - close()로 수신 대기와 read 대기를 모두 깨움

use std::net::{Ipv4Addr, SocketAddr};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;

use bytes::{Bytes, BytesMut};
use crossbeam_channel::{bounded, select, Receiver, Select, Sender};
use parking_lot::Mutex;
use tracing::{debug, warn};

use crate::logging::{self, Direction, PacketLogger, PacketRecord};
use crate::packet::{copy_packet, validate_range, RawPacket};
use crate::transport::{PacketProtocol, PacketTransport};
use crate::{Config, Error, Result};

/// 스트림 상태
#[derive(Debug, Clone, PartialEq, Eq)]
enum StreamStatus {
    Open,
    /// 수신 스레드가 전송 에러로 종료됨
    Failed(String),
    Closed,
}

/// 수신 스레드와 공유하는 상태
#[derive(Debug)]
struct StreamState {
    status: Mutex<StreamStatus>,
}

impl StreamState {
    fn new(status: StreamStatus) -> Self {
        Self {
            status: Mutex::new(status),
        }
    }

    fn is_closed(&self) -> bool {
        *self.status.lock() == StreamStatus::Closed
    }

    fn fail(&self, reason: String) {
        let mut status = self.status.lock();
        if *status == StreamStatus::Open {
            *status = StreamStatus::Failed(reason);
        }
    }
}

/// 수신 스레드 컨텍스트
struct ReceiveWorker<T: PacketTransport> {
    transport: Arc<T>,
    state: Arc<StreamState>,
    packets: Sender<Bytes>,
    shutdown: Receiver<()>,
    logger: Option<Arc<dyn PacketLogger>>,
    protocol: PacketProtocol,
    packet_size: usize,
}

impl<T: PacketTransport> ReceiveWorker<T> {
    fn run(self) {
        // UDP 잘림 감지용 여유 1바이트
        let mut packet = RawPacket::with_capacity(self.packet_size + 1);
        // 핸드오프용 버퍼, 넘긴 패킷이 모두 소비되면 reserve가 같은 할당을 재사용
        let mut staging = BytesMut::with_capacity(self.packet_size.saturating_mul(2));

        loop {
            if self.state.is_closed() {
                break;
            }

            match self.transport.receive_into(&mut packet) {
                Ok(remote) => {
                    // close 이후에는 로깅/전달하지 않음
                    if self.state.is_closed() {
                        break;
                    }

                    self.log_received(remote, packet.payload());

                    staging.reserve(packet.length());
                    staging.extend_from_slice(packet.payload());
                    let data = staging.split().freeze();
                    select! {
                        send(self.packets, data) -> res => {
                            if res.is_err() {
                                break;
                            }
                        }
                        recv(self.shutdown) -> _ => break,
                    }
                }
                Err(e) if self.transport.is_transient(&e) => continue,
                Err(e) => {
                    if !self.state.is_closed() {
                        warn!("{:?} 수신 에러, 수신 스레드 종료: {}", self.protocol, e);
                        self.state.fail(e.to_string());
                    }
                    break;
                }
            }
        }

        debug!("{:?} 수신 스레드 종료", self.protocol);
    }

    fn log_received(&self, remote: SocketAddr, payload: &[u8]) {
        logging::dispatch(
            self.logger.as_ref(),
            PacketRecord {
                protocol: self.protocol,
                source: remote,
                destination: self.transport.local_addr().unwrap_or(unspecified_addr()),
                transport: T::KIND,
                direction: Direction::Inbound,
                payload,
            },
        );
    }
}

pub(crate) fn unspecified_addr() -> SocketAddr {
    SocketAddr::from((Ipv4Addr::UNSPECIFIED, 0))
}

/// 입력 스트림 (UDP/TCP 공용)
pub struct ConnectorInputStream<T: PacketTransport> {
    transport: Arc<T>,
    state: Arc<StreamState>,
    protocol: PacketProtocol,
    config: Config,

    /// 핸드오프 수신단
    packets: Receiver<Bytes>,

    /// BufferTooSmall로 돌려보낸 패킷 (다음 read에서 재사용)
    /// 패킷을 꺼내는 동안 잠겨 소비자를 한 명으로 제한
    pending: Mutex<Option<Bytes>>,

    /// drop하면 shutdown 채널이 끊어져 대기 중인 양쪽이 깨어남
    shutdown_tx: Mutex<Option<Sender<()>>>,
    shutdown_rx: Receiver<()>,

    worker: Mutex<Option<JoinHandle<()>>>,
}

impl<T: PacketTransport> ConnectorInputStream<T> {
    /// 스트림 생성 및 수신 스레드 시작
    ///
    /// 소켓이 이미 유효하지 않으면 스레드 없이 닫힌 상태로 생성
    pub fn start(
        transport: Arc<T>,
        protocol: PacketProtocol,
        config: Config,
        logger: Option<Arc<dyn PacketLogger>>,
    ) -> Result<Self> {
        let (packets_tx, packets_rx) = bounded(config.handoff_capacity());
        let (shutdown_tx, shutdown_rx) = bounded::<()>(0);

        let valid = transport.is_valid();
        let state = Arc::new(StreamState::new(if valid {
            StreamStatus::Open
        } else {
            StreamStatus::Closed
        }));

        let worker = if valid {
            let worker = ReceiveWorker {
                transport: transport.clone(),
                state: state.clone(),
                packets: packets_tx,
                shutdown: shutdown_rx.clone(),
                logger,
                protocol,
                packet_size: config.receive_packet_size,
            };
            let handle = thread::Builder::new()
                .name(format!("{:?}-{:?}-recv", T::KIND, protocol).to_lowercase())
                .spawn(move || worker.run())?;

            debug!(
                "{:?}/{:?} 입력 스트림 시작: {:?}",
                protocol,
                T::KIND,
                transport.local_addr()
            );
            Some(handle)
        } else {
            warn!("{:?} 입력 스트림: 유효하지 않은 소켓, 수신 스레드 없음", protocol);
            None
        };

        Ok(Self {
            transport,
            state,
            protocol,
            config,
            packets: packets_rx,
            pending: Mutex::new(None),
            shutdown_tx: Mutex::new(if valid { Some(shutdown_tx) } else { None }),
            shutdown_rx,
            worker: Mutex::new(worker),
        })
    }

    /// 수신된 패킷 하나를 buffer[offset..offset + length]로 복사
    ///
    /// 설정된 read 타임아웃(기본: 무기한)까지 대기
    pub fn read(&self, buffer: &mut [u8], offset: usize, length: usize) -> Result<usize> {
        self.read_inspect(buffer, offset, length, self.config.read_timeout(), |_| {})
    }

    /// 타임아웃 지정 read
    pub fn read_timeout(
        &self,
        buffer: &mut [u8],
        offset: usize,
        length: usize,
        timeout: Duration,
    ) -> Result<usize> {
        self.read_inspect(buffer, offset, length, Some(timeout), |_| {})
    }

    /// 패킷을 꺼내 크기 확인 후 inspect 호출, 그 다음 복사
    ///
    /// 버퍼가 작으면 패킷은 pending으로 남고 inspect는 호출되지 않음.
    /// inspect는 pending 잠금 밖에서 호출됨
    pub(crate) fn read_inspect<F>(
        &self,
        buffer: &mut [u8],
        offset: usize,
        length: usize,
        timeout: Option<Duration>,
        inspect: F,
    ) -> Result<usize>
    where
        F: FnOnce(&[u8]),
    {
        validate_range(buffer.len(), offset, length)?;
        if self.state.is_closed() {
            return Err(Error::StreamClosed);
        }

        let mut pending = self.pending.lock();
        let packet = match pending.take() {
            Some(packet) => packet,
            None => self.next_packet(timeout)?,
        };

        if length < packet.len() {
            let required = packet.len();
            *pending = Some(packet);
            return Err(Error::BufferTooSmall {
                required,
                available: length,
            });
        }

        // 통지 중 같은 스트림을 다시 read할 수 있도록 먼저 해제
        drop(pending);

        inspect(&packet[..]);
        copy_packet(&packet[..], buffer, offset, length)
    }

    fn next_packet(&self, timeout: Option<Duration>) -> Result<Bytes> {
        if self.state.is_closed() {
            return Err(Error::StreamClosed);
        }

        let mut sel = Select::new();
        let packets_idx = sel.recv(&self.packets);
        let shutdown_idx = sel.recv(&self.shutdown_rx);

        let oper = match timeout {
            Some(timeout) => sel.select_timeout(timeout).map_err(|_| Error::ReadTimeout)?,
            None => sel.select(),
        };

        match oper.index() {
            i if i == packets_idx => match oper.recv(&self.packets) {
                Ok(packet) if !self.state.is_closed() => Ok(packet),
                Ok(_) => Err(Error::StreamClosed),
                Err(_) => Err(self.terminal_error()),
            },
            i if i == shutdown_idx => {
                let _ = oper.recv(&self.shutdown_rx);
                Err(Error::StreamClosed)
            }
            _ => Err(Error::StreamClosed),
        }
    }

    /// 핸드오프가 끊긴 후 돌려줄 에러
    fn terminal_error(&self) -> Error {
        match &*self.state.status.lock() {
            StreamStatus::Failed(reason) => Error::ReceiveFailed(reason.clone()),
            _ => Error::StreamClosed,
        }
    }

    /// 스트림 닫기 (멱등, 어느 스레드에서나 호출 가능)
    pub fn close(&self) {
        {
            let mut status = self.state.status.lock();
            if *status == StreamStatus::Closed {
                return;
            }
            *status = StreamStatus::Closed;
            self.transport.close();
        }

        self.shutdown_tx.lock().take();

        if let Some(handle) = self.worker.lock().take() {
            // 로거 콜백 등 수신 스레드 자신이 close한 경우 join 불가
            if handle.thread().id() != thread::current().id() {
                let _ = handle.join();
            }
        }

        debug!("{:?}/{:?} 입력 스트림 닫힘", self.protocol, T::KIND);
    }

    pub fn is_closed(&self) -> bool {
        self.state.is_closed()
    }

    pub fn protocol(&self) -> PacketProtocol {
        self.protocol
    }

    pub fn local_addr(&self) -> Option<SocketAddr> {
        self.transport.local_addr()
    }
}

impl<T: PacketTransport> Drop for ConnectorInputStream<T> {
    fn drop(&mut self) {
        self.close();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::logging::tests::RecordingLogger;
    use crate::transport::{TcpTransport, UdpTransport};
    use std::net::{TcpListener, TcpStream, UdpSocket};
    use std::time::Instant;

    const WAIT: Duration = Duration::from_secs(5);

    fn udp_stream(
        logger: Option<Arc<dyn PacketLogger>>,
    ) -> (ConnectorInputStream<UdpTransport>, UdpSocket) {
        udp_stream_with(Config::low_latency(), logger)
    }

    fn udp_stream_with(
        config: Config,
        logger: Option<Arc<dyn PacketLogger>>,
    ) -> (ConnectorInputStream<UdpTransport>, UdpSocket) {
        let socket = UdpSocket::bind("127.0.0.1:0").unwrap();
        let transport = Arc::new(UdpTransport::open(socket, &config, false).unwrap());
        let stream =
            ConnectorInputStream::start(transport, PacketProtocol::Rtp, config, logger).unwrap();
        let peer = UdpSocket::bind("127.0.0.1:0").unwrap();
        (stream, peer)
    }

    #[test]
    fn test_read_returns_packets_in_order() {
        let (stream, peer) = udp_stream(None);
        let target = stream.local_addr().unwrap();

        for i in 0..5u8 {
            peer.send_to(&[i; 20], target).unwrap();
        }

        let mut buf = [0u8; 128];
        for i in 0..5u8 {
            let n = stream.read_timeout(&mut buf, 0, 128, WAIT).unwrap();
            assert_eq!(n, 20);
            assert!(buf[..n].iter().all(|&b| b == i));
        }
    }

    #[test]
    fn test_consecutive_packets_keep_contents() {
        let (stream, peer) = udp_stream(None);
        let target = stream.local_addr().unwrap();

        let sender = thread::spawn(move || {
            for i in 1..=40u8 {
                peer.send_to(&vec![i; i as usize * 7], target).unwrap();
                thread::sleep(Duration::from_millis(1));
            }
        });

        let mut buf = [0u8; 512];
        for i in 1..=40u8 {
            let n = stream.read_timeout(&mut buf, 0, 512, WAIT).unwrap();
            assert_eq!(n, i as usize * 7);
            assert!(buf[..n].iter().all(|&b| b == i), "packet {} corrupted", i);
        }
        sender.join().unwrap();
    }

    #[test]
    fn test_oversized_datagram_is_dropped_not_truncated() {
        let config = Config {
            receive_packet_size: 100,
            ..Config::low_latency()
        };
        let (stream, peer) = udp_stream_with(config, None);
        let target = stream.local_addr().unwrap();

        peer.send_to(&[0xEE; 300], target).unwrap();
        peer.send_to(&[0x11; 100], target).unwrap();
        peer.send_to(&[0x22; 50], target).unwrap();

        let mut buf = [0u8; 1500];
        let n = stream.read_timeout(&mut buf, 0, 1500, WAIT).unwrap();
        assert_eq!(n, 100);
        assert!(buf[..n].iter().all(|&b| b == 0x11));

        let n = stream.read_timeout(&mut buf, 0, 1500, WAIT).unwrap();
        assert_eq!(n, 50);
        assert!(!stream.is_closed());
    }

    #[test]
    fn test_buffer_too_small_keeps_packet_pending() {
        let (stream, peer) = udp_stream(None);
        peer.send_to(&[3u8; 100], stream.local_addr().unwrap()).unwrap();

        let mut buf = [0u8; 200];
        match stream.read_timeout(&mut buf, 0, 50, WAIT) {
            Err(Error::BufferTooSmall { required, available }) => {
                assert_eq!(required, 100);
                assert_eq!(available, 50);
            }
            other => panic!("unexpected result: {:?}", other),
        }
        assert!(buf.iter().all(|&b| b == 0));

        let n = stream.read_timeout(&mut buf, 10, 190, WAIT).unwrap();
        assert_eq!(n, 100);
        assert!(buf[10..110].iter().all(|&b| b == 3));
    }

    #[test]
    fn test_read_times_out_without_packets() {
        let (stream, _peer) = udp_stream(None);
        let mut buf = [0u8; 16];
        assert!(matches!(
            stream.read_timeout(&mut buf, 0, 16, Duration::from_millis(50)),
            Err(Error::ReadTimeout)
        ));
    }

    #[test]
    fn test_close_unblocks_pending_read() {
        let (stream, _peer) = udp_stream(None);
        let stream = Arc::new(stream);

        let reader = {
            let stream = stream.clone();
            thread::spawn(move || {
                let mut buf = [0u8; 16];
                stream.read(&mut buf, 0, 16)
            })
        };

        thread::sleep(Duration::from_millis(50));
        let started = Instant::now();
        stream.close();

        let result = reader.join().unwrap();
        assert!(matches!(result, Err(Error::StreamClosed)));
        assert!(started.elapsed() < WAIT);
    }

    #[test]
    fn test_reads_after_close_fail_and_stop_logging() {
        let logger = Arc::new(RecordingLogger::default());
        let (stream, peer) = udp_stream(Some(logger.clone()));
        let target = stream.local_addr().unwrap();

        peer.send_to(&[1u8; 12], target).unwrap();
        let mut buf = [0u8; 64];
        stream.read_timeout(&mut buf, 0, 64, WAIT).unwrap();
        assert_eq!(logger.records.lock().len(), 1);

        stream.close();
        stream.close();
        assert!(stream.is_closed());

        let _ = peer.send_to(&[2u8; 12], target);
        thread::sleep(Duration::from_millis(50));

        for _ in 0..3 {
            assert!(matches!(stream.read(&mut buf, 0, 64), Err(Error::StreamClosed)));
        }
        assert_eq!(logger.records.lock().len(), 1);
        assert_eq!(logger.records.lock()[0].1, Direction::Inbound);
    }

    #[test]
    fn test_invalid_transport_starts_closed() {
        let config = Config::low_latency();
        let socket = UdpSocket::bind("127.0.0.1:0").unwrap();
        let transport = Arc::new(UdpTransport::open(socket, &config, false).unwrap());
        transport.close();

        let stream =
            ConnectorInputStream::start(transport, PacketProtocol::Rtp, config, None).unwrap();
        assert!(stream.is_closed());

        let mut buf = [0u8; 8];
        assert!(matches!(stream.read(&mut buf, 0, 8), Err(Error::StreamClosed)));
    }

    #[test]
    fn test_tcp_peer_shutdown_reports_receive_failed() {
        let config = Config::low_latency();
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let client = TcpStream::connect(listener.local_addr().unwrap()).unwrap();
        let (server, _) = listener.accept().unwrap();

        let transport = Arc::new(TcpTransport::open(server, &config, false).unwrap());
        let stream =
            ConnectorInputStream::start(transport, PacketProtocol::Rtp, config, None).unwrap();

        drop(client);

        let mut buf = [0u8; 64];
        match stream.read_timeout(&mut buf, 0, 64, WAIT) {
            Err(Error::ReceiveFailed(_)) => {}
            other => panic!("unexpected result: {:?}", other),
        }
    }
}
