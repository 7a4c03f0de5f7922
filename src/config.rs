//! 전송 계층 설정

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::{DEFAULT_RECEIVE_BUFFER_SIZE, MAX_PACKET_SIZE};

/// 커넥터/스트림 설정
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Config {
    /// 수신 가능한 최대 패킷 크기 (바이트)
    /// 이보다 큰 UDP 데이터그램은 잘라서 넘기지 않고 버림
    pub receive_packet_size: usize,

    /// UDP 소켓 커널 수신 버퍼 크기
    /// 첫 수신 시 설정 (실패해도 무시)
    pub udp_receive_buffer_size: usize,

    /// TCP 소켓 커널 수신 버퍼 크기
    /// 생성 시 설정 (실패해도 무시)
    pub tcp_receive_buffer_size: usize,

    /// 수신 대기 주기 (밀리초)
    /// close() 이후 수신 스레드가 종료되기까지의 상한
    pub receive_poll_interval_ms: u64,

    /// 수신 스레드 → 소비자 핸드오프 슬롯 수
    /// 1이면 단일 슬롯
    pub handoff_capacity: usize,

    /// read() 대기 타임아웃 (밀리초)
    /// 0이면 패킷 도착 또는 close()까지 대기
    pub read_timeout_ms: u64,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            receive_packet_size: MAX_PACKET_SIZE,
            udp_receive_buffer_size: DEFAULT_RECEIVE_BUFFER_SIZE,
            tcp_receive_buffer_size: DEFAULT_RECEIVE_BUFFER_SIZE,
            receive_poll_interval_ms: 100,
            handoff_capacity: 1,
            read_timeout_ms: 0,
        }
    }
}

impl Config {
    /// 새 설정 생성
    pub fn new() -> Self {
        Self::default()
    }

    /// 수신 대기 주기
    pub fn receive_poll_interval(&self) -> Duration {
        Duration::from_millis(self.receive_poll_interval_ms.max(1))
    }

    /// read() 타임아웃 (None이면 무기한)
    pub fn read_timeout(&self) -> Option<Duration> {
        match self.read_timeout_ms {
            0 => None,
            ms => Some(Duration::from_millis(ms)),
        }
    }

    /// 핸드오프 채널 용량 (최소 1)
    pub fn handoff_capacity(&self) -> usize {
        self.handoff_capacity.max(1)
    }

    /// 저지연 설정 (빠른 종료, 단일 슬롯)
    pub fn low_latency() -> Self {
        Self {
            receive_poll_interval_ms: 20,
            handoff_capacity: 1,
            ..Self::default()
        }
    }

    /// 고처리량 설정 (큰 커널 버퍼, 여유 있는 핸드오프)
    pub fn high_throughput() -> Self {
        Self {
            udp_receive_buffer_size: 1024 * 1024,  // 1MB
            tcp_receive_buffer_size: 1024 * 1024,
            receive_poll_interval_ms: 200,
            handoff_capacity: 64,
            ..Self::default()
        }
    }
}
