//! 송신자 (슬라이딩 윈도우)
//!
//! - mode 0: 누적 ACK, 매 패스마다 윈도우 전체 재전송 (Go-Back-N)
//! - mode 1: 개별 ACK, 확인되지 않은 패킷만 재전송 (Selective-Repeat)

use std::net::SocketAddr;
use std::time::Duration;

use bytes::{Bytes, BytesMut};
use tokio::io::{AsyncRead, AsyncReadExt};
use tracing::{debug, info};

use crate::channel::{recv_packet, send_packet, Channel};
use crate::config::{check_window_size, AckMode};
use crate::error::Stage;
use crate::packet::{Flags, Packet};
use crate::stats::{DiscardReason, TransferStats};
use crate::window::SlotBuffer;
use crate::{Config, Error, Result};

/// ACK 처리 결과
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AckOutcome {
    /// 윈도우가 n칸 전진
    Advanced(u32),
    /// 개별 확인만 기록 (앞쪽에 아직 빈칸이 있음)
    Marked,
    /// 윈도우 밖, 중복, 이미 확인된 ACK
    Ignored,
}

/// 송신 윈도우 상태
///
/// `[low, next)`가 전송 중인 패킷. 소켓 I/O는 하지 않는다.
#[derive(Debug)]
pub struct SendWindow {
    mode: AckMode,
    window_size: usize,

    /// 가장 오래된 미확인 순번
    low: u32,

    /// 다음에 사용할 순번 (high + 1)
    next: u32,

    /// 아직 한 번도 보내지 않은 첫 순번
    next_unsent: u32,

    slots: SlotBuffer,

    /// 확인 완료된 payload 바이트
    acked_bytes: u64,
}

impl SendWindow {
    /// `window_size`가 1..=MAX_WINDOW_SIZE 밖이면 `InvalidConfig`
    pub fn new(first_seq: u32, window_size: usize, mode: AckMode) -> Result<Self> {
        check_window_size(window_size)?;
        Ok(Self {
            mode,
            window_size,
            low: first_seq,
            next: first_seq,
            next_unsent: first_seq,
            slots: SlotBuffer::new(window_size),
            acked_bytes: 0,
        })
    }

    pub fn low(&self) -> u32 {
        self.low
    }

    pub fn next_seq(&self) -> u32 {
        self.next
    }

    pub fn in_flight(&self) -> usize {
        self.next.wrapping_sub(self.low) as usize
    }

    pub fn is_empty(&self) -> bool {
        self.low == self.next
    }

    pub fn has_room(&self) -> bool {
        self.in_flight() < self.window_size
    }

    pub fn acked_bytes(&self) -> u64 {
        self.acked_bytes
    }

    fn contains(&self, seq_num: u32) -> bool {
        (seq_num.wrapping_sub(self.low) as usize) < self.in_flight()
    }

    fn in_flight_seqs(&self) -> impl Iterator<Item = u32> {
        let low = self.low;
        (0..self.in_flight() as u32).map(move |i| low.wrapping_add(i))
    }

    /// 새 청크를 윈도우 끝에 추가
    pub fn push(&mut self, payload: Bytes) -> Result<u32> {
        debug_assert!(self.has_room(), "push on a full send window");

        let seq_num = self.next;
        let packet = Packet::build(seq_num, payload, Flags::NONE)?;
        self.slots.put(packet);
        self.next = self.next.wrapping_add(1);
        Ok(seq_num)
    }

    /// 앞쪽의 연속 확인된 슬롯을 비우고 전진
    pub fn slide(&mut self) -> u32 {
        let mut advanced = 0;
        while !self.is_empty() && self.slots.is_marked(self.low) {
            self.release(self.low);
            self.low = self.low.wrapping_add(1);
            advanced += 1;
        }
        advanced
    }

    fn release(&mut self, seq_num: u32) {
        if let Some(packet) = self.slots.take(seq_num) {
            self.acked_bytes += packet.payload_len() as u64;
        }
    }

    /// 이번 패스에 보낼 패킷
    pub fn eligible(&self) -> impl Iterator<Item = &Packet> {
        self.in_flight_seqs()
            .filter(move |&seq| self.mode == AckMode::Cumulative || !self.slots.is_marked(seq))
            .filter_map(move |seq| self.slots.get(seq))
    }

    pub fn is_retransmission(&self, seq_num: u32) -> bool {
        seq_num.wrapping_sub(self.low) < self.next_unsent.wrapping_sub(self.low)
    }

    /// 전송 패스 완료 기록
    pub fn mark_transmitted(&mut self) {
        self.next_unsent = self.next;
    }

    /// ACK 반영
    pub fn on_ack(&mut self, seq_num: u32) -> AckOutcome {
        match self.mode {
            AckMode::Cumulative => {
                // (low, next] 범위의 누적 ACK만 유효
                let distance = seq_num.wrapping_sub(self.low);
                if distance == 0 || distance as usize > self.in_flight() {
                    return AckOutcome::Ignored;
                }
                for i in 0..distance {
                    self.release(self.low.wrapping_add(i));
                }
                self.low = seq_num;
                AckOutcome::Advanced(distance)
            }
            AckMode::Selective => {
                if !self.contains(seq_num) || self.slots.is_marked(seq_num) {
                    return AckOutcome::Ignored;
                }
                self.slots.mark(seq_num);
                match self.slide() {
                    0 => AckOutcome::Marked,
                    n => AckOutcome::Advanced(n),
                }
            }
        }
    }
}

/// 소스에서 청크 하나를 채움 (EOF가 아니면 항상 chunk_size만큼)
async fn read_chunk<R: AsyncRead + Unpin>(source: &mut R, chunk_size: usize) -> Result<Bytes> {
    let mut buf = BytesMut::zeroed(chunk_size);
    let mut filled = 0;

    while filled < chunk_size {
        let n = source.read(&mut buf[filled..]).await?;
        if n == 0 {
            break;
        }
        filled += n;
    }

    buf.truncate(filled);
    Ok(buf.freeze())
}

/// 파일 데이터 전송
///
/// 모든 청크가 확인되면 다음 미사용 순번(FIN에 쓸 순번)을 반환한다.
pub async fn send_stream<C, R>(
    channel: &C,
    peer: SocketAddr,
    first_seq: u32,
    source: &mut R,
    config: &Config,
    stats: &mut TransferStats,
) -> Result<u32>
where
    C: Channel,
    R: AsyncRead + Unpin,
{
    config.validate()?;
    let mut window = SendWindow::new(first_seq, config.window_size, config.ack_mode)?;
    let mut exhausted = false;
    let mut stalls = 0;

    loop {
        window.slide();

        while !exhausted && window.has_room() {
            let chunk = read_chunk(source, config.chunk_size).await?;
            if chunk.is_empty() {
                exhausted = true;
                break;
            }
            window.push(chunk)?;
        }

        if window.is_empty() {
            stats.total_bytes = window.acked_bytes();
            info!(
                "Sender: data transmission success ({} bytes, next seq {})",
                window.acked_bytes(),
                window.next_seq()
            );
            return Ok(window.next_seq());
        }

        for packet in window.eligible() {
            send_packet(channel, packet, peer).await?;
            stats.packets_sent += 1;
            if window.is_retransmission(packet.seq_num()) {
                stats.retransmitted_packets += 1;
            }
        }
        window.mark_transmitted();

        // 첫 ACK는 타임아웃까지 기다리고, 윈도우가 움직인 뒤에는
        // 이미 도착해 있는 ACK만 비운다
        let mut wait = config.transfer.timeout;
        let mut progressed = false;

        loop {
            if !channel.wait_readable(wait).await? {
                if wait > Duration::ZERO {
                    stats.timeouts += 1;
                }
                break;
            }

            let (received, _) = recv_packet(channel).await?;
            let ack = match received {
                Ok(ack) => ack,
                Err(e) => {
                    debug!("Sender: 패킷 폐기: {}", e);
                    stats.record_discard(DiscardReason::from(&e));
                    continue;
                }
            };

            if ack.flags() != Flags::ACK {
                debug!("Sender: 플래그 불일치: {}", ack.flags());
                stats.record_discard(DiscardReason::Flags);
                continue;
            }
            stats.acks_received += 1;

            match window.on_ack(ack.seq_num()) {
                AckOutcome::Advanced(n) => {
                    debug!("Sender: window +{} -> low={}", n, window.low());
                    progressed = true;
                    wait = Duration::ZERO;
                }
                AckOutcome::Marked => {
                    progressed = true;
                }
                AckOutcome::Ignored => {
                    debug!(
                        "Sender: 순번 무시: ack={}, window=[{}, {})",
                        ack.seq_num(),
                        window.low(),
                        window.next_seq()
                    );
                    stats.record_discard(DiscardReason::Sequence);
                }
            }
        }

        if progressed {
            stalls = 0;
        } else {
            stalls += 1;
            if stalls >= config.transfer.budget {
                return Err(Error::Stalled {
                    stage: Stage::DataSend,
                    timeouts: stalls,
                });
            }
        }
    }
}
