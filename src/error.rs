//! 에러 타입 정의

use thiserror::Error;

use crate::transport::Channel;

/// 미디어 전송 계층 에러 타입
#[derive(Error, Debug)]
pub enum Error {
    #[error("IO 에러: {0}")]
    Io(#[from] std::io::Error),

    /// 호출자가 더 큰 버퍼로 재시도하면 복구 가능
    #[error("버퍼 부족: 최소 {required} 바이트 필요 (제공: {available})")]
    BufferTooSmall { required: usize, available: usize },

    #[error("유효하지 않은 범위: offset={offset}, length={length}, capacity={capacity}")]
    InvalidRange {
        offset: usize,
        length: usize,
        capacity: usize,
    },

    #[error("수신 실패: {0}")]
    ReceiveFailed(String),

    #[error("소켓 준비 실패 ({channel:?}): {source}")]
    IoSetup {
        channel: Channel,
        #[source]
        source: std::io::Error,
    },

    #[error("스트림 종료")]
    StreamClosed,

    #[error("읽기 타임아웃")]
    ReadTimeout,

    #[error("유효하지 않은 소켓")]
    SocketInvalid,

    #[error("유효하지 않은 crypto 속성: {0}")]
    InvalidAttribute(String),

    #[error("잘못된 RTCP 피드백 패킷: {0}")]
    InvalidFeedbackPacket(String),
}

/// Result 타입 별칭
pub type Result<T> = std::result::Result<T, Error>;
