//! RTCP 입력 스트림
//!
//! 기본 입력 스트림에 피드백 헤더 파싱과 리스너 통지를 추가

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use parking_lot::RwLock;
use tracing::trace;

use crate::feedback::FeedbackEvent;
use crate::input::ConnectorInputStream;
use crate::logging::PacketLogger;
use crate::transport::{PacketProtocol, PacketTransport};
use crate::{Config, Result};

/// RTCP 피드백 리스너
///
/// read 호출 스레드에서 동기 호출됨
pub trait FeedbackListener: Send + Sync {
    fn on_feedback(&self, event: &FeedbackEvent);
}

impl<F> FeedbackListener for F
where
    F: Fn(&FeedbackEvent) + Send + Sync,
{
    fn on_feedback(&self, event: &FeedbackEvent) {
        self(event)
    }
}

/// 리스너 목록 (copy-on-write)
///
/// 순회는 스냅샷에서 하므로 통지 중 등록/해제해도 안전
#[derive(Default)]
pub struct ListenerSet {
    listeners: RwLock<Arc<Vec<Arc<dyn FeedbackListener>>>>,
}

fn same_listener(a: &Arc<dyn FeedbackListener>, b: &Arc<dyn FeedbackListener>) -> bool {
    Arc::as_ptr(a) as *const () == Arc::as_ptr(b) as *const ()
}

impl ListenerSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// 등록 (이미 있으면 false)
    pub fn add(&self, listener: Arc<dyn FeedbackListener>) -> bool {
        let mut guard = self.listeners.write();
        if guard.iter().any(|l| same_listener(l, &listener)) {
            return false;
        }

        let mut next = Vec::with_capacity(guard.len() + 1);
        next.extend(guard.iter().cloned());
        next.push(listener);
        *guard = Arc::new(next);
        true
    }

    /// 해제 (포인터 동일성 기준, 없으면 false)
    pub fn remove(&self, listener: &Arc<dyn FeedbackListener>) -> bool {
        let mut guard = self.listeners.write();
        if !guard.iter().any(|l| same_listener(l, listener)) {
            return false;
        }

        let next: Vec<_> = guard
            .iter()
            .filter(|l| !same_listener(l, listener))
            .cloned()
            .collect();
        *guard = Arc::new(next);
        true
    }

    pub fn len(&self) -> usize {
        self.listeners.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.listeners.read().is_empty()
    }

    /// 현재 목록 스냅샷
    pub fn snapshot(&self) -> Arc<Vec<Arc<dyn FeedbackListener>>> {
        self.listeners.read().clone()
    }

    /// 등록 순서대로 통지
    pub fn notify(&self, event: &FeedbackEvent) {
        for listener in self.snapshot().iter() {
            listener.on_feedback(event);
        }
    }
}

/// RTCP 입력 스트림
pub struct RtcpInputStream<T: PacketTransport> {
    inner: ConnectorInputStream<T>,
    listeners: ListenerSet,
    read_timeout: Option<Duration>,
}

impl<T: PacketTransport> RtcpInputStream<T> {
    pub fn start(
        transport: Arc<T>,
        config: Config,
        logger: Option<Arc<dyn PacketLogger>>,
    ) -> Result<Self> {
        let read_timeout = config.read_timeout();
        let inner = ConnectorInputStream::start(transport, PacketProtocol::Rtcp, config, logger)?;

        Ok(Self {
            inner,
            listeners: ListenerSet::new(),
            read_timeout,
        })
    }

    pub fn add_listener(&self, listener: Arc<dyn FeedbackListener>) -> bool {
        self.listeners.add(listener)
    }

    pub fn remove_listener(&self, listener: &Arc<dyn FeedbackListener>) -> bool {
        self.listeners.remove(listener)
    }

    pub fn listener_count(&self) -> usize {
        self.listeners.len()
    }

    /// RTCP 패킷 하나 읽기
    ///
    /// 12바이트 이상이면 리스너 통지가 복사보다 먼저 일어남.
    /// 버퍼가 작으면 BufferTooSmall, 통지/복사 없음
    pub fn read(&self, buffer: &mut [u8], offset: usize, length: usize) -> Result<usize> {
        self.read_with(buffer, offset, length, self.read_timeout)
    }

    pub fn read_timeout(
        &self,
        buffer: &mut [u8],
        offset: usize,
        length: usize,
        timeout: Duration,
    ) -> Result<usize> {
        self.read_with(buffer, offset, length, Some(timeout))
    }

    fn read_with(
        &self,
        buffer: &mut [u8],
        offset: usize,
        length: usize,
        timeout: Option<Duration>,
    ) -> Result<usize> {
        self.inner
            .read_inspect(buffer, offset, length, timeout, |packet| {
                if let Some(event) = FeedbackEvent::from_packet(packet) {
                    trace!(
                        "RTCP 피드백: fmt={}, pt={}",
                        event.fmt,
                        event.payload_type
                    );
                    self.listeners.notify(&event);
                }
            })
    }

    pub fn close(&self) {
        self.inner.close();
    }

    pub fn is_closed(&self) -> bool {
        self.inner.is_closed()
    }

    pub fn local_addr(&self) -> Option<SocketAddr> {
        self.inner.local_addr()
    }
}
