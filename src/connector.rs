//! 전송 커넥터
//!
//! 데이터(RTP)/제어(RTCP) 소켓 쌍을 소유하고 네 개의 스트림을 지연 생성

use std::io::{self, ErrorKind};
use std::net::{TcpStream, UdpSocket};
use std::sync::Arc;

use parking_lot::Mutex;
use tracing::{debug, info};

use crate::input::ConnectorInputStream;
use crate::logging::PacketLogger;
use crate::output::ConnectorOutputStream;
use crate::rtcp::RtcpInputStream;
use crate::transport::{Channel, PacketTransport, TcpTransport, TransportKind, UdpTransport};
use crate::{Config, Error, Result};

/// 소켓 공급 협력자 (ICE/시그널링 측에서 구현)
pub trait SocketProvider<S>: Send + Sync {
    /// 채널에 해당하는 소켓 반환
    fn resolve(&self, channel: Channel) -> io::Result<S>;

    /// 소켓 소유자가 이미 패킷 로깅을 하는지 (멀티플렉싱 소켓)
    fn logs_upstream(&self, _channel: Channel) -> bool {
        false
    }
}

/// 연결이 확립된 데이터/제어 소켓 쌍
///
/// 각 소켓은 한 번만 넘겨줌 (독점 소유)
pub struct SocketPair<S> {
    data: Mutex<Option<S>>,
    control: Mutex<Option<S>>,
    multiplexed: bool,
}

impl<S> SocketPair<S> {
    pub fn new(data: S, control: S) -> Self {
        Self {
            data: Mutex::new(Some(data)),
            control: Mutex::new(Some(control)),
            multiplexed: false,
        }
    }

    /// 소켓이 상위에서 로깅하는 멀티플렉싱 소켓임을 표시
    pub fn multiplexed(mut self) -> Self {
        self.multiplexed = true;
        self
    }
}

impl<S: Send> SocketProvider<S> for SocketPair<S> {
    fn resolve(&self, channel: Channel) -> io::Result<S> {
        let slot = match channel {
            Channel::Data => &self.data,
            Channel::Control => &self.control,
        };

        slot.lock().take().ok_or_else(|| {
            io::Error::new(
                ErrorKind::NotFound,
                format!("{:?} socket already taken", channel),
            )
        })
    }

    fn logs_upstream(&self, _channel: Channel) -> bool {
        self.multiplexed
    }
}

/// 채널별 캐시
struct ChannelSlots<T: PacketTransport> {
    transport: Option<Arc<T>>,
    output: Option<Arc<ConnectorOutputStream<T>>>,
}

impl<T: PacketTransport> Default for ChannelSlots<T> {
    fn default() -> Self {
        Self {
            transport: None,
            output: None,
        }
    }
}

/// 전송 커넥터
pub struct TransportConnector<T: PacketTransport> {
    provider: Box<dyn SocketProvider<T::Socket>>,
    config: Config,
    logger: Option<Arc<dyn PacketLogger>>,

    data: Mutex<ChannelSlots<T>>,
    control: Mutex<ChannelSlots<T>>,
    data_input: Mutex<Option<Arc<ConnectorInputStream<T>>>>,
    control_input: Mutex<Option<Arc<RtcpInputStream<T>>>>,
}

/// UDP 커넥터
pub type UdpConnector = TransportConnector<UdpTransport>;

/// TCP 커넥터
pub type TcpConnector = TransportConnector<TcpTransport>;

impl<T: PacketTransport> TransportConnector<T> {
    pub fn new<P>(provider: P, config: Config) -> Self
    where
        P: SocketProvider<T::Socket> + 'static,
    {
        Self {
            provider: Box::new(provider),
            config,
            logger: None,
            data: Mutex::new(ChannelSlots::default()),
            control: Mutex::new(ChannelSlots::default()),
            data_input: Mutex::new(None),
            control_input: Mutex::new(None),
        }
    }

    /// 패킷 로거 주입
    pub fn with_logger(mut self, logger: Arc<dyn PacketLogger>) -> Self {
        self.logger = Some(logger);
        self
    }

    pub fn kind(&self) -> TransportKind {
        T::KIND
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    fn slots(&self, channel: Channel) -> &Mutex<ChannelSlots<T>> {
        match channel {
            Channel::Data => &self.data,
            Channel::Control => &self.control,
        }
    }

    /// 소켓 지연 해석 (첫 호출에서 해석 후 캐시)
    fn transport(&self, channel: Channel) -> Result<Arc<T>> {
        let mut slots = self.slots(channel).lock();
        if let Some(transport) = &slots.transport {
            return Ok(transport.clone());
        }

        let setup_error = |source| Error::IoSetup { channel, source };
        let socket = self.provider.resolve(channel).map_err(setup_error)?;
        let transport = T::open(socket, &self.config, self.provider.logs_upstream(channel))
            .map_err(setup_error)?;
        let transport = Arc::new(transport);

        info!(
            "{:?} {:?} 소켓 준비: {:?}",
            T::KIND,
            channel,
            transport.local_addr()
        );
        slots.transport = Some(transport.clone());
        Ok(transport)
    }

    fn output_stream(&self, channel: Channel) -> Result<Arc<ConnectorOutputStream<T>>> {
        let transport = self.transport(channel)?;
        let mut slots = self.slots(channel).lock();
        let stream = slots.output.get_or_insert_with(|| {
            Arc::new(ConnectorOutputStream::new(
                transport,
                channel.protocol(),
                self.logger.clone(),
            ))
        });
        Ok(stream.clone())
    }

    /// RTP 입력 스트림
    pub fn create_data_input_stream(&self) -> Result<Arc<ConnectorInputStream<T>>> {
        let mut cached = self.data_input.lock();
        if let Some(stream) = &*cached {
            return Ok(stream.clone());
        }

        let transport = self.transport(Channel::Data)?;
        let stream = Arc::new(ConnectorInputStream::start(
            transport,
            Channel::Data.protocol(),
            self.config.clone(),
            self.logger.clone(),
        )?);
        *cached = Some(stream.clone());
        Ok(stream)
    }

    /// RTP 출력 스트림
    pub fn create_data_output_stream(&self) -> Result<Arc<ConnectorOutputStream<T>>> {
        self.output_stream(Channel::Data)
    }

    /// RTCP 입력 스트림 (피드백 파싱 포함)
    pub fn create_control_input_stream(&self) -> Result<Arc<RtcpInputStream<T>>> {
        let mut cached = self.control_input.lock();
        if let Some(stream) = &*cached {
            return Ok(stream.clone());
        }

        let transport = self.transport(Channel::Control)?;
        let stream = Arc::new(RtcpInputStream::start(
            transport,
            self.config.clone(),
            self.logger.clone(),
        )?);
        *cached = Some(stream.clone());
        Ok(stream)
    }

    /// RTCP 출력 스트림
    pub fn create_control_output_stream(&self) -> Result<Arc<ConnectorOutputStream<T>>> {
        self.output_stream(Channel::Control)
    }

    /// 지금까지 생성된 스트림과 소켓 모두 닫기
    pub fn close(&self) {
        if let Some(stream) = &*self.data_input.lock() {
            stream.close();
        }
        if let Some(stream) = &*self.control_input.lock() {
            stream.close();
        }
        for channel in [Channel::Data, Channel::Control] {
            if let Some(transport) = &self.slots(channel).lock().transport {
                transport.close();
            }
        }
        debug!("{:?} 커넥터 닫힘", T::KIND);
    }
}

impl UdpConnector {
    /// UDP 소켓 쌍으로 커넥터 생성
    pub fn udp(data: UdpSocket, control: UdpSocket, config: Config) -> Self {
        Self::new(SocketPair::new(data, control), config)
    }
}

impl TcpConnector {
    /// TCP 스트림 쌍으로 커넥터 생성
    pub fn tcp(data: TcpStream, control: TcpStream, config: Config) -> Self {
        Self::new(SocketPair::new(data, control), config)
    }
}
