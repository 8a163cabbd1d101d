//! 연결 종료
//!
//! - 송신측(능동): FIN → FIN|ACK 대기
//! - 수신측(수동): FIN|ACK 전송 후 침묵하면 종료

use std::net::SocketAddr;

use tracing::info;

use crate::channel::Channel;
use crate::config::RetryPolicy;
use crate::error::Stage;
use crate::packet::{Flags, Packet};
use crate::reliable::{send_and_await, send_until_silent, Expect};
use crate::Result;

/// 송신측 종료: 같은 순번의 FIN|ACK를 받을 때까지 FIN 재전송
pub async fn close_active<C: Channel>(
    channel: &C,
    peer: SocketAddr,
    fin_seq: u32,
    policy: RetryPolicy,
) -> Result<()> {
    let fin = Packet::control(fin_seq, Flags::FIN)?;
    send_and_await(
        channel,
        &fin,
        Expect::new(fin_seq, Flags::FIN | Flags::ACK),
        peer,
        policy,
        Stage::Fin,
    )
    .await?;

    info!("Sender: goodbye success");
    Ok(())
}

/// 수신측 종료: FIN|ACK 전송, 한 타임아웃 동안 조용하면 성공
pub async fn close_passive<C: Channel>(
    channel: &C,
    peer: SocketAddr,
    fin_seq: u32,
    policy: RetryPolicy,
) -> Result<()> {
    let fin_ack = Packet::control(fin_seq, Flags::FIN | Flags::ACK)?;
    send_until_silent(channel, &fin_ack, peer, policy, Stage::FinAck).await?;

    info!("Receiver: goodbye success");
    Ok(())
}
