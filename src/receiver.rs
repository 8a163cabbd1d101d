//! 수신자 (재조립)
//!
//! 윈도우 안의 데이터 패킷을 슬롯에 모아 두었다가 `low`부터 연속된 구간만
//! 순서대로 싱크에 기록한다.

use std::net::SocketAddr;

use bytes::Bytes;
use tokio::io::{AsyncWrite, AsyncWriteExt};
use tracing::{debug, info};

use crate::channel::{recv_packet, send_packet, Channel};
use crate::config::{check_window_size, AckMode};
use crate::error::Stage;
use crate::packet::{Flags, Packet};
use crate::stats::{DiscardReason, TransferStats};
use crate::window::SlotBuffer;
use crate::{Config, Error, Result};

/// 검증된 패킷 하나에 대한 판정
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Verdict {
    /// 버림 (ACK 없음)
    Discard(DiscardReason),

    /// 전송 종료, FIN의 순번
    Fin(u32),

    /// 데이터 수용: 보낼 ACK 순번과 순서대로 확정된 payload
    Data { ack: u32, delivered: Vec<Bytes> },
}

/// 수신 윈도우 상태
///
/// 허용 범위는 `[low, low + window_size - 1]`.
#[derive(Debug)]
pub struct ReceiveWindow {
    mode: AckMode,
    window_size: usize,
    low: u32,
    slots: SlotBuffer,
}

impl ReceiveWindow {
    /// `window_size`가 1..=MAX_WINDOW_SIZE 밖이면 `InvalidConfig`
    pub fn new(first_seq: u32, window_size: usize, mode: AckMode) -> Result<Self> {
        check_window_size(window_size)?;
        Ok(Self {
            mode,
            window_size,
            low: first_seq,
            slots: SlotBuffer::new(window_size),
        })
    }

    /// 다음에 순서대로 기대하는 순번
    pub fn low(&self) -> u32 {
        self.low
    }

    /// 윈도우 상한 (포함)
    pub fn high(&self) -> u32 {
        self.low.wrapping_add(self.window_size as u32 - 1)
    }

    /// 버퍼에 보관 중인 순서 밖 패킷 수
    pub fn buffered(&self) -> usize {
        self.slots.occupied()
    }

    pub fn on_packet(&mut self, packet: Packet) -> Verdict {
        let flags = packet.flags();
        if flags != Flags::NONE && flags != Flags::FIN {
            return Verdict::Discard(DiscardReason::Flags);
        }

        let seq_num = packet.seq_num();
        if seq_num > self.high() {
            return Verdict::Discard(DiscardReason::Sequence);
        }

        if flags == Flags::FIN {
            return Verdict::Fin(seq_num);
        }

        // low보다 작은 순번은 이미 기록한 패킷: 다시 ACK만 보낸다
        if seq_num >= self.low {
            self.slots.put(packet);
        }

        let mut delivered = Vec::new();
        while let Some(ready) = self.slots.take(self.low) {
            delivered.push(ready.payload().clone());
            self.low = self.low.wrapping_add(1);
        }

        let ack = match self.mode {
            AckMode::Cumulative => self.low,
            AckMode::Selective => seq_num,
        };

        Verdict::Data { ack, delivered }
    }
}

/// 파일 데이터 수신
///
/// 유효한 FIN을 받으면 싱크를 flush하고 FIN의 순번을 반환한다.
pub async fn receive_stream<C, W>(
    channel: &C,
    peer: SocketAddr,
    first_seq: u32,
    sink: &mut W,
    config: &Config,
    stats: &mut TransferStats,
) -> Result<u32>
where
    C: Channel,
    W: AsyncWrite + Unpin,
{
    config.validate()?;
    let mut window = ReceiveWindow::new(first_seq, config.window_size, config.ack_mode)?;
    let policy = config.transfer;
    let mut idle = 0;

    while idle < policy.budget {
        if !channel.wait_readable(policy.timeout).await? {
            idle += 1;
            stats.timeouts += 1;
            continue;
        }
        idle = 0;

        let (received, _) = recv_packet(channel).await?;
        let packet = match received {
            Ok(packet) => packet,
            Err(e) => {
                debug!("Receiver: 패킷 폐기: {}", e);
                stats.record_discard(DiscardReason::from(&e));
                continue;
            }
        };
        let seq_num = packet.seq_num();

        match window.on_packet(packet) {
            Verdict::Discard(reason) => {
                debug!(
                    "Receiver: {:?} 불일치로 폐기: seq={}, window=[{}, {}]",
                    reason,
                    seq_num,
                    window.low(),
                    window.high()
                );
                stats.record_discard(reason);
            }
            Verdict::Fin(fin_seq) => {
                sink.flush().await?;
                info!(
                    "Receiver: data transmission success ({} bytes, fin seq {})",
                    stats.total_bytes, fin_seq
                );
                return Ok(fin_seq);
            }
            Verdict::Data { ack, delivered } => {
                stats.packets_received += 1;
                for payload in delivered {
                    sink.write_all(&payload).await?;
                    stats.total_bytes += payload.len() as u64;
                }

                let ack = Packet::control(ack, Flags::ACK)?;
                send_packet(channel, &ack, peer).await?;
                stats.acks_sent += 1;
            }
        }
    }

    // 이미 확정된 데이터는 남긴다
    sink.flush().await?;
    Err(Error::Stalled {
        stage: Stage::DataReceive,
        timeouts: idle,
    })
}
