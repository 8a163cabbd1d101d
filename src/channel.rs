//! 데이터그램 채널 추상화
//!
//! 엔진의 유일한 대기 지점은 `wait_readable`이다. 모든 수신은 이 검사 뒤에만
//! 수행되므로 유휴 시간에 busy-spin 하지 않는다.

use std::net::SocketAddr;
use std::time::Duration;

use tokio::net::UdpSocket;

use crate::packet::{Packet, PacketError};
use crate::Result;

/// 수신 버퍼 크기 (최대 데이터그램보다 크게 잡아 초과 패킷도 길이 불일치로 잡힘)
pub const RECV_BUFFER_SIZE: usize = 2048;

/// 비신뢰·비순서 데이터그램 채널
#[allow(async_fn_in_trait)]
pub trait Channel {
    /// 최대 `timeout` 동안 대기, 수신 가능하면 true
    async fn wait_readable(&self, timeout: Duration) -> Result<bool>;

    async fn send_datagram(&self, datagram: &[u8], peer: SocketAddr) -> Result<()>;

    /// 수신한 실제 바이트 수와 송신자 주소 반환
    async fn receive_datagram(&self, buf: &mut [u8]) -> Result<(usize, SocketAddr)>;
}

impl Channel for UdpSocket {
    /// 수신 큐에 데이터그램이 실제로 있을 때만 true
    ///
    /// `readable()`의 준비 플래그는 직전 `recv_from` 이후에도 남아 있으므로
    /// 큐 맨 앞의 송신자를 peek 해서 확인한다 (데이터그램은 소비하지 않음).
    async fn wait_readable(&self, timeout: Duration) -> Result<bool> {
        match tokio::time::timeout(timeout, self.peek_sender()).await {
            Ok(peeked) => {
                peeked?;
                Ok(true)
            }
            Err(_) => Ok(false),
        }
    }

    async fn send_datagram(&self, datagram: &[u8], peer: SocketAddr) -> Result<()> {
        self.send_to(datagram, peer).await?;
        Ok(())
    }

    async fn receive_datagram(&self, buf: &mut [u8]) -> Result<(usize, SocketAddr)> {
        Ok(self.recv_from(buf).await?)
    }
}

/// 패킷 직렬화 후 전송
pub async fn send_packet<C: Channel>(channel: &C, packet: &Packet, peer: SocketAddr) -> Result<()> {
    let bytes = packet.encode()?;
    channel.send_datagram(&bytes, peer).await
}

/// 데이터그램 하나를 수신해 디코딩
///
/// 길이/체크섬 오류는 바깥 `Result`가 아니라 안쪽 결과로 돌려준다.
/// 호출자는 이를 노이즈로 보고 버린다.
pub async fn recv_packet<C: Channel>(
    channel: &C,
) -> Result<(std::result::Result<Packet, PacketError>, SocketAddr)> {
    let mut buf = [0u8; RECV_BUFFER_SIZE];
    let (len, from) = channel.receive_datagram(&mut buf).await?;
    Ok((Packet::decode(&buf[..len]), from))
}

/// 테스트용 스크립트 채널
///
/// 대기 없이 즉시 응답한다: 큐가 비어 있으면 곧바로 타임아웃으로 처리.
#[cfg(test)]
pub(crate) mod scripted {
    use std::collections::VecDeque;
    use std::io;

    use parking_lot::Mutex;

    use super::*;

    type Responder = Box<dyn FnMut(&Packet) -> Vec<Packet> + Send>;

    pub(crate) struct ScriptedChannel {
        peer: SocketAddr,
        inbound: Mutex<VecDeque<Vec<u8>>>,
        sent: Mutex<Vec<Packet>>,
        responder: Mutex<Option<Responder>>,
        timeouts: Mutex<u32>,
    }

    impl ScriptedChannel {
        pub(crate) fn new(peer: SocketAddr) -> Self {
            Self {
                peer,
                inbound: Mutex::new(VecDeque::new()),
                sent: Mutex::new(Vec::new()),
                responder: Mutex::new(None),
                timeouts: Mutex::new(0),
            }
        }

        /// 보낸 패킷마다 호출되어 응답 패킷을 수신 큐에 넣는 채널
        pub(crate) fn with_responder<F>(peer: SocketAddr, responder: F) -> Self
        where
            F: FnMut(&Packet) -> Vec<Packet> + Send + 'static,
        {
            let channel = Self::new(peer);
            *channel.responder.lock() = Some(Box::new(responder));
            channel
        }

        pub(crate) fn push_packet(&self, packet: &Packet) {
            let bytes = packet.encode().expect("encode scripted packet");
            self.inbound.lock().push_back(bytes.to_vec());
        }

        pub(crate) fn push_raw(&self, datagram: Vec<u8>) {
            self.inbound.lock().push_back(datagram);
        }

        pub(crate) fn sent(&self) -> Vec<Packet> {
            self.sent.lock().clone()
        }

        pub(crate) fn timeouts(&self) -> u32 {
            *self.timeouts.lock()
        }

        pub(crate) fn pending(&self) -> usize {
            self.inbound.lock().len()
        }
    }

    impl Channel for ScriptedChannel {
        async fn wait_readable(&self, _timeout: Duration) -> Result<bool> {
            let ready = !self.inbound.lock().is_empty();
            if !ready {
                *self.timeouts.lock() += 1;
            }
            Ok(ready)
        }

        async fn send_datagram(&self, datagram: &[u8], _peer: SocketAddr) -> Result<()> {
            let packet = Packet::decode(datagram)?;
            let replies = match self.responder.lock().as_mut() {
                Some(responder) => responder(&packet),
                None => Vec::new(),
            };
            self.sent.lock().push(packet);
            for reply in replies {
                self.push_packet(&reply);
            }
            Ok(())
        }

        async fn receive_datagram(&self, buf: &mut [u8]) -> Result<(usize, SocketAddr)> {
            let datagram = self.inbound.lock().pop_front().ok_or_else(|| {
                io::Error::new(io::ErrorKind::WouldBlock, "no scripted datagram")
            })?;
            let len = datagram.len().min(buf.len());
            buf[..len].copy_from_slice(&datagram[..len]);
            Ok((len, self.peer))
        }
    }
}
