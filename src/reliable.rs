//! 재전송 기반 송신 프리미티브
//!
//! - `send_and_await`: 기대한 응답이 올 때까지 재전송
//! - `send_until_silent`: 타임아웃(상대 침묵)을 성공으로 보는 마지막 단계

use std::net::SocketAddr;

use tracing::debug;

use crate::channel::{recv_packet, send_packet, Channel};
use crate::config::RetryPolicy;
use crate::error::Stage;
use crate::packet::{Flags, Packet};
use crate::{Error, Result};

/// 기다리는 응답 패킷의 조건
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Expect {
    pub seq_num: u32,
    pub flags: Flags,
}

impl Expect {
    pub fn new(seq_num: u32, flags: Flags) -> Self {
        Self { seq_num, flags }
    }

    pub fn matches(&self, packet: &Packet) -> bool {
        packet.flags() == self.flags && packet.seq_num() == self.seq_num
    }
}

/// 패킷을 보내고 기대한 응답을 받을 때까지 재전송
///
/// 타임아웃마다 재시도 횟수를 하나 소모한다. 길이·체크섬·플래그·순번이 맞지 않는
/// 패킷은 횟수 소모 없이 버리고 다시 보낸다.
pub async fn send_and_await<C: Channel>(
    channel: &C,
    packet: &Packet,
    expect: Expect,
    peer: SocketAddr,
    policy: RetryPolicy,
    stage: Stage,
) -> Result<Packet> {
    let mut attempts = 0;

    while attempts < policy.budget {
        send_packet(channel, packet, peer).await?;

        if !channel.wait_readable(policy.timeout).await? {
            attempts += 1;
            continue;
        }

        let (received, _) = recv_packet(channel).await?;
        let reply = match received {
            Ok(reply) => reply,
            Err(e) => {
                debug!("[{}] 패킷 폐기: {}", stage, e);
                continue;
            }
        };

        if reply.flags() != expect.flags {
            debug!(
                "[{}] 플래그 불일치: expected {}, got {}",
                stage,
                expect.flags,
                reply.flags()
            );
            continue;
        }

        if reply.seq_num() != expect.seq_num {
            debug!(
                "[{}] 순번 불일치: expected {}, got {}",
                stage,
                expect.seq_num,
                reply.seq_num()
            );
            continue;
        }

        return Ok(reply);
    }

    Err(Error::RetryExhausted { stage, attempts })
}

/// 응답이 없는 마지막 패킷 전송 (타임아웃 = 성공)
///
/// 보낸 뒤 한 타임아웃 동안 아무것도 들리지 않으면 성공이다. 그 전에 무엇이든
/// 들리면 상대가 아직 재전송 중이라는 뜻이므로 수신한 것을 비우고 다시 보낸다.
pub async fn send_until_silent<C: Channel>(
    channel: &C,
    packet: &Packet,
    peer: SocketAddr,
    policy: RetryPolicy,
    stage: Stage,
) -> Result<()> {
    let mut attempts = 0;

    while attempts < policy.budget {
        send_packet(channel, packet, peer).await?;
        attempts += 1;

        if !channel.wait_readable(policy.timeout).await? {
            return Ok(());
        }

        let (heard, _) = recv_packet(channel).await?;
        match heard {
            Ok(p) => debug!(
                "[{}] 상대 재전송 감지 ({} seq={}), 재전송",
                stage,
                p.flags(),
                p.seq_num()
            ),
            Err(e) => debug!("[{}] 노이즈 수신 ({}), 재전송", stage, e),
        }
    }

    Err(Error::RetryExhausted { stage, attempts })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::channel::scripted::ScriptedChannel;
    use std::time::Duration;

    fn peer() -> SocketAddr {
        "127.0.0.1:9000".parse().unwrap()
    }

    fn policy(budget: u32) -> RetryPolicy {
        RetryPolicy {
            budget,
            timeout: Duration::from_millis(10),
        }
    }

    #[tokio::test]
    async fn test_send_and_await_returns_match() {
        let channel = ScriptedChannel::with_responder(peer(), |p| {
            vec![Packet::control(p.seq_num() + 1, Flags::SYN | Flags::ACK).unwrap()]
        });
        let syn = Packet::control(100, Flags::SYN).unwrap();

        let reply = send_and_await(
            &channel,
            &syn,
            Expect::new(101, Flags::SYN | Flags::ACK),
            peer(),
            policy(3),
            Stage::Syn,
        )
        .await
        .unwrap();

        assert_eq!(reply.seq_num(), 101);
        assert_eq!(channel.sent().len(), 1);
    }

    #[tokio::test]
    async fn test_noise_does_not_consume_budget() {
        let channel = ScriptedChannel::new(peer());
        // 체크섬 오류, 플래그 오류, 순번 오류, 그리고 정상 응답
        let mut corrupted = Packet::control(7, Flags::ACK).unwrap().encode().unwrap().to_vec();
        corrupted[0] ^= 0xFF;
        channel.push_raw(corrupted);
        channel.push_packet(&Packet::control(7, Flags::FIN).unwrap());
        channel.push_packet(&Packet::control(8, Flags::ACK).unwrap());
        channel.push_packet(&Packet::control(7, Flags::ACK).unwrap());

        let packet = Packet::control(7, Flags::SYN | Flags::ACK).unwrap();
        let reply = send_and_await(
            &channel,
            &packet,
            Expect::new(7, Flags::ACK),
            peer(),
            policy(1),
            Stage::SynAck,
        )
        .await
        .unwrap();

        assert_eq!(reply.flags(), Flags::ACK);
        assert_eq!(channel.timeouts(), 0);
        // 버린 패킷마다 한 번씩 재전송
        assert_eq!(channel.sent().len(), 4);
    }

    #[tokio::test]
    async fn test_send_and_await_exhausts() {
        let channel = ScriptedChannel::new(peer());
        let fin = Packet::control(5, Flags::FIN).unwrap();

        let err = send_and_await(
            &channel,
            &fin,
            Expect::new(5, Flags::FIN | Flags::ACK),
            peer(),
            policy(4),
            Stage::Fin,
        )
        .await
        .unwrap_err();

        assert!(matches!(
            err,
            Error::RetryExhausted {
                stage: Stage::Fin,
                attempts: 4
            }
        ));
        assert_eq!(channel.sent().len(), 4);
    }

    #[tokio::test]
    async fn test_send_until_silent_success_on_timeout() {
        let channel = ScriptedChannel::new(peer());
        let ack = Packet::control(11, Flags::ACK).unwrap();

        send_until_silent(&channel, &ack, peer(), policy(5), Stage::FinalAck)
            .await
            .unwrap();
        assert_eq!(channel.sent().len(), 1);
    }

    #[tokio::test]
    async fn test_send_until_silent_resends_while_peer_talks() {
        let channel = ScriptedChannel::new(peer());
        let syn_ack = Packet::control(11, Flags::SYN | Flags::ACK).unwrap();
        channel.push_packet(&syn_ack);
        channel.push_packet(&syn_ack);

        let ack = Packet::control(11, Flags::ACK).unwrap();
        send_until_silent(&channel, &ack, peer(), policy(5), Stage::FinalAck)
            .await
            .unwrap();

        assert_eq!(channel.sent().len(), 3);
        assert_eq!(channel.pending(), 0);
    }

    #[tokio::test]
    async fn test_send_until_silent_exhausts() {
        let channel = ScriptedChannel::with_responder(peer(), |p| {
            vec![Packet::control(p.seq_num(), Flags::FIN).unwrap()]
        });
        let fin_ack = Packet::control(3, Flags::FIN | Flags::ACK).unwrap();

        let err = send_until_silent(&channel, &fin_ack, peer(), policy(3), Stage::FinAck)
            .await
            .unwrap_err();
        assert!(matches!(err, Error::RetryExhausted { attempts: 3, .. }));
    }
}
