//! 패킷 버퍼
//!
//! buffer + offset + length 형태의 바이트 범위 뷰
//! 수신 경로에서 재할당 없이 내용을 덮어씀

use bytes::BytesMut;

use crate::{Error, Result};

/// 원시 패킷 (RTP/RTCP 구분 없음)
///
/// 불변식: `offset + length <= capacity`
#[derive(Debug, Clone)]
pub struct RawPacket {
    buffer: BytesMut,
    offset: usize,
    length: usize,
}

impl RawPacket {
    /// 지정 크기의 빈 패킷 생성
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            buffer: BytesMut::zeroed(capacity),
            offset: 0,
            length: 0,
        }
    }

    /// 바이트 복사로 패킷 생성
    pub fn from_slice(bytes: &[u8]) -> Self {
        Self {
            buffer: BytesMut::from(bytes),
            offset: 0,
            length: bytes.len(),
        }
    }

    pub fn offset(&self) -> usize {
        self.offset
    }

    pub fn length(&self) -> usize {
        self.length
    }

    pub fn capacity(&self) -> usize {
        self.buffer.len()
    }

    pub fn is_empty(&self) -> bool {
        self.length == 0
    }

    /// 유효 바이트
    pub fn payload(&self) -> &[u8] {
        &self.buffer[self.offset..self.offset + self.length]
    }

    /// 유효 범위 변경
    pub fn set_range(&mut self, offset: usize, length: usize) -> Result<()> {
        match offset.checked_add(length) {
            Some(end) if end <= self.buffer.len() => {
                self.offset = offset;
                self.length = length;
                Ok(())
            }
            _ => Err(Error::InvalidRange {
                offset,
                length,
                capacity: self.buffer.len(),
            }),
        }
    }

    /// 수신용 전체 버퍼 (수신 후 set_range로 길이 확정)
    pub fn receive_buffer_mut(&mut self) -> &mut [u8] {
        self.offset = 0;
        self.length = 0;
        &mut self.buffer[..]
    }

    /// 패킷 내용을 dst[offset..offset + len]으로 복사
    ///
    /// len이 패킷 길이보다 작으면 BufferTooSmall, 부분 복사 없음
    pub fn read_into(&self, dst: &mut [u8], offset: usize, len: usize) -> Result<usize> {
        copy_packet(self.payload(), dst, offset, len)
    }

    /// 내용 덮어쓰기 (offset 0부터)
    pub fn write(&mut self, bytes: &[u8]) -> Result<()> {
        if bytes.len() > self.buffer.len() {
            return Err(Error::BufferTooSmall {
                required: bytes.len(),
                available: self.buffer.len(),
            });
        }

        self.buffer[..bytes.len()].copy_from_slice(bytes);
        self.offset = 0;
        self.length = bytes.len();
        Ok(())
    }
}

/// 수신 패킷을 호출자 버퍼로 복사 (입력 스트림 공용)
pub(crate) fn copy_packet(packet: &[u8], dst: &mut [u8], offset: usize, len: usize) -> Result<usize> {
    validate_range(dst.len(), offset, len)?;

    if len < packet.len() {
        return Err(Error::BufferTooSmall {
            required: packet.len(),
            available: len,
        });
    }

    dst[offset..offset + packet.len()].copy_from_slice(packet);
    Ok(packet.len())
}

pub(crate) fn validate_range(capacity: usize, offset: usize, length: usize) -> Result<()> {
    match offset.checked_add(length) {
        Some(end) if end <= capacity => Ok(()),
        _ => Err(Error::InvalidRange {
            offset,
            length,
            capacity,
        }),
    }
}
