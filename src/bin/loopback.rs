//! 미디어 전송 루프백 데모
//!
//! 로컬 커넥터 두 개를 연결해 RTP 패킷과 RTCP PLI를 주고받고,
//! 이어서 SDES offer/answer로 SRTP suite를 협상
//!
//! 사용법:
//!   cargo run --release --bin media-loopback -- [OPTIONS]
//!
//! 예시:
//!   # UDP 기본 (10 패킷, 172 바이트)
//!   cargo run --release --bin media-loopback
//!
//!   # TCP, 100 패킷
//!   cargo run --release --bin media-loopback -- --tcp --count 100

use std::net::{SocketAddr, TcpListener, TcpStream, UdpSocket};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use tracing::info;
use tracing_subscriber::{EnvFilter, FmtSubscriber};

use media_transport::feedback::RtcpFeedbackPacket;
use media_transport::{
    Config, FeedbackEvent, FeedbackListener, PacketTransport, SdesControl, TcpConnector,
    TracingPacketLogger, TransportConnector, UdpConnector, MAX_PACKET_SIZE,
};

/// 데모 설정
struct LoopbackConfig {
    count: usize,
    size: usize,
    tcp: bool,
}

impl Default for LoopbackConfig {
    fn default() -> Self {
        Self {
            count: 10,
            // RTP 헤더 12 + 20ms G.711 페이로드 160
            size: 172,
            tcp: false,
        }
    }
}

fn parse_number(value: Option<&String>, name: &str) -> usize {
    match value.and_then(|v| v.parse().ok()) {
        Some(n) => n,
        None => {
            eprintln!("{}: 유효한 숫자 필요", name);
            std::process::exit(2);
        }
    }
}

fn parse_args() -> LoopbackConfig {
    let args: Vec<String> = std::env::args().collect();
    let mut config = LoopbackConfig::default();

    let mut i = 1;
    while i < args.len() {
        match args[i].as_str() {
            "--count" | "-c" => {
                config.count = parse_number(args.get(i + 1), "--count");
                i += 1;
            }
            "--size" | "-s" => {
                config.size = parse_number(args.get(i + 1), "--size").clamp(1, MAX_PACKET_SIZE);
                i += 1;
            }
            "--tcp" => {
                config.tcp = true;
            }
            "--help" | "-h" => {
                println!(
                    r#"media-loopback - RTP/RTCP 커넥터 루프백 데모

로컬 커넥터 두 개 사이에서
- RTP 패킷 송수신
- RTCP PLI 피드백 통지
- SDES offer/answer 협상

사용법:
  cargo run --release --bin media-loopback -- [OPTIONS]

옵션:
  -c, --count <N>        보낼 RTP 패킷 수 (기본: 10)
  -s, --size <BYTES>     RTP 패킷 크기 (기본: 172)
  --tcp                  UDP 대신 TCP 소켓 사용
  -h, --help             이 도움말 출력

로그 레벨은 RUST_LOG로 지정 (기본: info, 패킷 기록은 trace)
"#
                );
                std::process::exit(0);
            }
            _ => {}
        }
        i += 1;
    }

    config
}

/// 로컬 TCP 연결 한 쌍 (connect 측, accept 측)
fn tcp_pair() -> std::io::Result<(TcpStream, TcpStream)> {
    let listener = TcpListener::bind("127.0.0.1:0")?;
    let client = TcpStream::connect(listener.local_addr()?)?;
    let (server, _) = listener.accept()?;
    Ok((client, server))
}

/// RTP 헤더 흉내 (V=2, PT=0, seq, timestamp, ssrc)
fn fake_rtp(seq: u16, size: usize, ssrc: u32) -> Vec<u8> {
    let mut packet = vec![0u8; size];
    let header = [
        0x80,
        0x00,
        (seq >> 8) as u8,
        seq as u8,
        0,
        0,
        0,
        0,
        (ssrc >> 24) as u8,
        (ssrc >> 16) as u8,
        (ssrc >> 8) as u8,
        ssrc as u8,
    ];
    let n = header.len().min(size);
    packet[..n].copy_from_slice(&header[..n]);
    packet
}

fn run_media<T: PacketTransport>(
    local: &TransportConnector<T>,
    remote: &TransportConnector<T>,
    data_target: SocketAddr,
    control_target: SocketAddr,
    config: &LoopbackConfig,
) -> Result<(), Box<dyn std::error::Error>> {
    const SSRC: u32 = 0x1234_5678;
    const PEER_SSRC: u32 = 0x9ABC_DEF0;
    let timeout = Duration::from_secs(2);

    let rtp_out = local.create_data_output_stream()?;
    let rtp_in = remote.create_data_input_stream()?;
    let rtcp_out = remote.create_control_output_stream()?;
    let rtcp_in = local.create_control_input_stream()?;

    let feedback = Arc::new(AtomicUsize::new(0));
    let counter = feedback.clone();
    let listener: Arc<dyn FeedbackListener> = Arc::new(move |event: &FeedbackEvent| {
        info!("피드백 수신: fmt={}, pt={}", event.fmt, event.payload_type);
        counter.fetch_add(1, Ordering::Relaxed);
    });
    rtcp_in.add_listener(listener);

    let start = Instant::now();
    let mut buffer = vec![0u8; MAX_PACKET_SIZE];
    let len = buffer.len();
    let mut received = 0usize;
    let mut bytes = 0usize;

    for seq in 0..config.count {
        let packet = fake_rtp(seq as u16, config.size, SSRC);
        rtp_out.send(&packet, data_target)?;

        let n = rtp_in.read_timeout(&mut buffer, 0, len, timeout)?;
        received += 1;
        bytes += n;
    }

    let pli = RtcpFeedbackPacket::pli(PEER_SSRC, SSRC);
    pli.write_to(&rtcp_out, control_target)?;
    let n = rtcp_in.read_timeout(&mut buffer, 0, len, timeout)?;

    let elapsed = start.elapsed();
    println!();
    println!("═══════════════════════════════════════");
    println!("  전송 방식:   {:?}", local.kind());
    println!("  RTP 송신:    {} 패킷", config.count);
    println!("  RTP 수신:    {} 패킷 ({} 바이트)", received, bytes);
    println!("  RTCP 수신:   {} 바이트", n);
    println!("  피드백 통지: {}", feedback.load(Ordering::Relaxed));
    println!("  소요 시간:   {:.2?}", elapsed);
    println!("═══════════════════════════════════════");

    local.close();
    remote.close();
    Ok(())
}

fn run_sdes() -> Result<(), Box<dyn std::error::Error>> {
    let initiator = SdesControl::new();
    let responder = SdesControl::new();

    let offer = initiator.get_initiator_attributes();
    for attribute in &offer {
        info!("offer: a=crypto:{}", attribute);
    }

    let answer = responder
        .responder_select_attribute(&offer)
        .ok_or("응답 측에서 일치하는 suite 없음")?;
    info!("answer: a=crypto:{}", answer);

    if !initiator.initiator_select_attribute(&[answer]) {
        return Err("제안 측에서 응답 속성 선택 실패".into());
    }

    let engine = initiator.get_transform_engine();
    let outbound = engine.outbound_policy().ok_or("송신 정책 없음")?;
    println!("  SDES 선택:   {}", outbound.crypto_suite);
    println!(
        "  보안 활성:   initiator={}, responder={}",
        initiator.get_secure_communication_status(),
        responder.get_secure_communication_status()
    );

    initiator.cleanup();
    Ok(())
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    // 로깅 설정
    let subscriber = FmtSubscriber::builder()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .finish();
    tracing::subscriber::set_global_default(subscriber)?;

    let config = parse_args();
    let transport_config = Config::low_latency();
    let logger = Arc::new(TracingPacketLogger);

    info!("media-loopback starting...");
    info!(
        "packets: {}, size: {}, transport: {}",
        config.count,
        config.size,
        if config.tcp { "tcp" } else { "udp" }
    );

    if config.tcp {
        let (local_data, remote_data) = tcp_pair()?;
        let (local_control, remote_control) = tcp_pair()?;
        let data_target = remote_data.local_addr()?;
        let control_target = local_control.local_addr()?;

        let local = TcpConnector::tcp(local_data, local_control, transport_config.clone())
            .with_logger(logger.clone());
        let remote =
            TcpConnector::tcp(remote_data, remote_control, transport_config).with_logger(logger);
        run_media(&local, &remote, data_target, control_target, &config)?;
    } else {
        let local_data = UdpSocket::bind("127.0.0.1:0")?;
        let local_control = UdpSocket::bind("127.0.0.1:0")?;
        let remote_data = UdpSocket::bind("127.0.0.1:0")?;
        let remote_control = UdpSocket::bind("127.0.0.1:0")?;
        let data_target = remote_data.local_addr()?;
        let control_target = local_control.local_addr()?;

        let local = UdpConnector::udp(local_data, local_control, transport_config.clone())
            .with_logger(logger.clone());
        let remote =
            UdpConnector::udp(remote_data, remote_control, transport_config).with_logger(logger);
        run_media(&local, &remote, data_target, control_target, &config)?;
    }

    run_sdes()?;
    Ok(())
}
