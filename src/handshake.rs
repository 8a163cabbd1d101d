//! 3-way 핸드쉐이크
//!
//! ```text
//! initiator: Idle ─SYN─▶ SynSent ─SYN|ACK─▶ FinalAckSent ─(침묵)─▶ Established
//! listener:  Listening ─SYN─▶ SynAckSent ─ACK─▶ Established
//! ```
//!
//! 어느 단계든 재시도 한도를 넘기면 `Failed`로 끝나며 치명적 에러로 올라간다.

use std::fmt;
use std::net::SocketAddr;

use tracing::{debug, info};

use crate::channel::{recv_packet, Channel};
use crate::error::Stage;
use crate::packet::{Flags, Packet};
use crate::reliable::{send_and_await, send_until_silent, Expect};
use crate::{Config, Error, Result, INITIAL_SEQ};

/// 송신측(능동 개방) 상태
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InitiatorState {
    Idle,
    SynSent,
    FinalAckSent,
    Established,
    Failed,
}

/// 수신측(수동 개방) 상태
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ListenerState {
    Listening,
    SynAckSent,
    Established,
    Failed,
}

impl fmt::Display for InitiatorState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(self, f)
    }
}

impl fmt::Display for ListenerState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(self, f)
    }
}

/// 핸드쉐이크 결과
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Handshake {
    /// 상대 주소
    pub peer: SocketAddr,

    /// 데이터 전송 시작 순번
    pub initial_seq: u32,
}

/// 능동 개방: SYN → SYN|ACK → ACK
pub async fn connect<C: Channel>(
    channel: &C,
    peer: SocketAddr,
    config: &Config,
) -> Result<Handshake> {
    let mut state = InitiatorState::Idle;
    let syn_ack_seq = INITIAL_SEQ.wrapping_add(1);

    let syn = Packet::control(INITIAL_SEQ, Flags::SYN)?;
    enter(&mut state, InitiatorState::SynSent);
    let result = send_and_await(
        channel,
        &syn,
        Expect::new(syn_ack_seq, Flags::SYN | Flags::ACK),
        peer,
        config.handshake,
        Stage::Syn,
    )
    .await;
    if let Err(e) = result {
        enter(&mut state, InitiatorState::Failed);
        return Err(e);
    }
    info!("Sender: first handshake success");

    // 마지막 ACK에는 응답이 없으므로 침묵을 성공으로 본다
    let ack = Packet::control(syn_ack_seq, Flags::ACK)?;
    enter(&mut state, InitiatorState::FinalAckSent);
    let result = send_until_silent(channel, &ack, peer, config.final_ack, Stage::FinalAck).await;
    if let Err(e) = result {
        enter(&mut state, InitiatorState::Failed);
        return Err(e);
    }

    enter(&mut state, InitiatorState::Established);
    info!("Sender: final handshake success");

    Ok(Handshake {
        peer,
        initial_seq: syn_ack_seq,
    })
}

/// 수동 개방: SYN 대기 → SYN|ACK → ACK
pub async fn listen<C: Channel>(channel: &C, config: &Config) -> Result<Handshake> {
    let mut state = ListenerState::Listening;

    let (peer, syn_seq) = match await_syn(channel, config).await {
        Ok(found) => found,
        Err(e) => {
            enter(&mut state, ListenerState::Failed);
            return Err(e);
        }
    };
    info!("Receiver: first handshake success (peer={})", peer);

    let syn_ack_seq = syn_seq.wrapping_add(1);
    let syn_ack = Packet::control(syn_ack_seq, Flags::SYN | Flags::ACK)?;
    enter(&mut state, ListenerState::SynAckSent);

    let result = send_and_await(
        channel,
        &syn_ack,
        Expect::new(syn_ack_seq, Flags::ACK),
        peer,
        config.handshake,
        Stage::SynAck,
    )
    .await;
    let ack = match result {
        Ok(ack) => ack,
        Err(e) => {
            enter(&mut state, ListenerState::Failed);
            return Err(e);
        }
    };

    enter(&mut state, ListenerState::Established);
    info!("Receiver: final handshake success");

    Ok(Handshake {
        peer,
        initial_seq: ack.seq_num(),
    })
}

fn enter<S: fmt::Display + Copy>(state: &mut S, next: S) {
    debug!("handshake: {} -> {}", state, next);
    *state = next;
}

/// SYN 플래그만 가진 유효 패킷을 기다린다
///
/// 타임아웃만 재시도 횟수를 소모하고, 채널 노이즈는 버린 뒤 계속 기다린다.
async fn await_syn<C: Channel>(channel: &C, config: &Config) -> Result<(SocketAddr, u32)> {
    let policy = config.listen;
    let mut attempts = 0;

    while attempts < policy.budget {
        if !channel.wait_readable(policy.timeout).await? {
            attempts += 1;
            continue;
        }

        let (received, from) = recv_packet(channel).await?;
        let packet = match received {
            Ok(packet) => packet,
            Err(e) => {
                debug!("[{}] 패킷 폐기: {}", Stage::Listen, e);
                continue;
            }
        };

        if packet.flags() != Flags::SYN {
            debug!("[{}] 플래그 불일치: {}", Stage::Listen, packet.flags());
            continue;
        }

        return Ok((from, packet.seq_num()));
    }

    Err(Error::RetryExhausted {
        stage: Stage::Listen,
        attempts,
    })
}
