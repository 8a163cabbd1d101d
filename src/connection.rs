//! 연결 엔드포인트
//!
//! 핸드쉐이크, 데이터 전송, 종료를 하나의 세션 객체로 묶는다.
//! 윈도우 상태는 각 전송 호출 안에서만 존재하고, 연결은 순번과 통계만 들고 있다.

use std::fmt;
use std::net::SocketAddr;

use tokio::io::{AsyncRead, AsyncWrite};
use tracing::info;

use crate::channel::Channel;
use crate::handshake::{self, Handshake};
use crate::receiver::receive_stream;
use crate::sender::send_stream;
use crate::stats::TransferStats;
use crate::teardown::{close_active, close_passive};
use crate::{Config, Error, Result};

/// 연결에서의 역할
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Role {
    /// 능동 개방, 파일 송신, 능동 종료
    Sender,
    /// 수동 개방, 파일 수신, 수동 종료
    Receiver,
}

/// 연결 상태
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    Established,
    Transferred,
    Closed,
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(self, f)
    }
}

impl fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(self, f)
    }
}

/// 수립된 RTP 연결
pub struct Connection<C: Channel> {
    channel: C,
    peer: SocketAddr,
    role: Role,
    state: ConnectionState,

    /// 다음 사용할 순번 (전송 후에는 FIN 순번)
    next_seq: u32,

    config: Config,
    stats: TransferStats,
}

impl<C: Channel> Connection<C> {
    /// 수동 개방: SYN을 기다려 연결 수립
    pub async fn accept(channel: C, config: Config) -> Result<Self> {
        config.validate()?;
        let Handshake { peer, initial_seq } = handshake::listen(&channel, &config).await?;
        Ok(Self::established(channel, peer, Role::Receiver, initial_seq, config))
    }

    /// 능동 개방: `peer`에 연결
    pub async fn connect(channel: C, peer: SocketAddr, config: Config) -> Result<Self> {
        config.validate()?;
        let Handshake { peer, initial_seq } = handshake::connect(&channel, peer, &config).await?;
        Ok(Self::established(channel, peer, Role::Sender, initial_seq, config))
    }

    pub(crate) fn established(
        channel: C,
        peer: SocketAddr,
        role: Role,
        initial_seq: u32,
        config: Config,
    ) -> Self {
        Self {
            channel,
            peer,
            role,
            state: ConnectionState::Established,
            next_seq: initial_seq,
            config,
            stats: TransferStats::new(),
        }
    }

    pub fn peer(&self) -> SocketAddr {
        self.peer
    }

    pub fn role(&self) -> Role {
        self.role
    }

    pub fn state(&self) -> ConnectionState {
        self.state
    }

    pub fn next_seq(&self) -> u32 {
        self.next_seq
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn stats(&self) -> &TransferStats {
        &self.stats
    }

    pub fn channel(&self) -> &C {
        &self.channel
    }

    /// 소스 전체를 전송, 확인된 바이트 수 반환
    pub async fn send_file<R: AsyncRead + Unpin>(&mut self, source: &mut R) -> Result<u64> {
        self.require(Role::Sender, ConnectionState::Established)?;

        self.next_seq = send_stream(
            &self.channel,
            self.peer,
            self.next_seq,
            source,
            &self.config,
            &mut self.stats,
        )
        .await?;
        self.state = ConnectionState::Transferred;

        Ok(self.stats.total_bytes)
    }

    /// FIN까지 수신해 싱크에 기록, 기록한 바이트 수 반환
    pub async fn receive_file<W: AsyncWrite + Unpin>(&mut self, sink: &mut W) -> Result<u64> {
        self.require(Role::Receiver, ConnectionState::Established)?;

        self.next_seq = receive_stream(
            &self.channel,
            self.peer,
            self.next_seq,
            sink,
            &self.config,
            &mut self.stats,
        )
        .await?;
        self.state = ConnectionState::Transferred;

        Ok(self.stats.total_bytes)
    }

    /// 역할에 맞는 종료 절차 수행
    pub async fn close(&mut self) -> Result<()> {
        self.require(self.role, ConnectionState::Transferred)?;

        match self.role {
            Role::Sender => {
                close_active(&self.channel, self.peer, self.next_seq, self.config.handshake).await?
            }
            Role::Receiver => {
                close_passive(&self.channel, self.peer, self.next_seq, self.config.close).await?
            }
        }
        self.state = ConnectionState::Closed;

        info!("{}: {}", self.role, self.stats.summary());
        Ok(())
    }

    fn require(&self, role: Role, state: ConnectionState) -> Result<()> {
        if self.role != role {
            return Err(Error::InvalidState {
                expected: role.to_string(),
                got: self.role.to_string(),
            });
        }
        if self.state != state {
            return Err(Error::InvalidState {
                expected: state.to_string(),
                got: self.state.to_string(),
            });
        }
        Ok(())
    }
}
