//! 전송 통계

use std::time::{Duration, Instant};

use crate::packet::PacketError;

/// 패킷을 버린 이유
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DiscardReason {
    /// 선언 길이와 수신 바이트 수 불일치 (잘림 포함)
    Length,
    /// 체크섬 불일치
    Checksum,
    /// 현재 단계에서 허용하지 않는 플래그
    Flags,
    /// 윈도우 밖 / 기대하지 않은 순번
    Sequence,
}

impl From<&PacketError> for DiscardReason {
    fn from(e: &PacketError) -> Self {
        match e {
            PacketError::ChecksumMismatch { .. } => DiscardReason::Checksum,
            _ => DiscardReason::Length,
        }
    }
}

/// 사유별 폐기 수
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DiscardStats {
    pub length: u64,
    pub checksum: u64,
    pub flags: u64,
    pub sequence: u64,
}

impl DiscardStats {
    pub fn total(&self) -> u64 {
        self.length + self.checksum + self.flags + self.sequence
    }
}

/// 한 연결의 전송 통계
#[derive(Debug, Clone)]
pub struct TransferStats {
    /// 시작 시간
    pub start_time: Instant,

    /// 보낸 데이터 패킷 수 (재전송 포함)
    pub packets_sent: u64,

    /// 재전송한 데이터 패킷 수
    pub retransmitted_packets: u64,

    /// 받은 유효 데이터 패킷 수 (중복 포함)
    pub packets_received: u64,

    /// 받은 ACK 수
    pub acks_received: u64,

    /// 보낸 ACK 수
    pub acks_sent: u64,

    /// 순서대로 확정된 바이트 (송신: 확인 완료, 수신: 싱크에 기록)
    pub total_bytes: u64,

    /// 대기 타임아웃 횟수
    pub timeouts: u64,

    pub discarded: DiscardStats,
}

impl TransferStats {
    pub fn new() -> Self {
        Self {
            start_time: Instant::now(),
            packets_sent: 0,
            retransmitted_packets: 0,
            packets_received: 0,
            acks_received: 0,
            acks_sent: 0,
            total_bytes: 0,
            timeouts: 0,
            discarded: DiscardStats::default(),
        }
    }

    pub fn record_discard(&mut self, reason: DiscardReason) {
        match reason {
            DiscardReason::Length => self.discarded.length += 1,
            DiscardReason::Checksum => self.discarded.checksum += 1,
            DiscardReason::Flags => self.discarded.flags += 1,
            DiscardReason::Sequence => self.discarded.sequence += 1,
        }
    }

    /// 경과 시간
    pub fn elapsed(&self) -> Duration {
        self.start_time.elapsed()
    }

    /// 처리율 (bytes/sec)
    pub fn throughput(&self) -> f64 {
        let elapsed = self.elapsed().as_secs_f64();
        if elapsed == 0.0 {
            return 0.0;
        }
        self.total_bytes as f64 / elapsed
    }

    /// 재전송 비율
    pub fn retransmission_ratio(&self) -> f64 {
        if self.packets_sent == 0 {
            return 0.0;
        }
        self.retransmitted_packets as f64 / self.packets_sent as f64
    }

    /// 통계 요약 문자열
    pub fn summary(&self) -> String {
        format!(
            "Elapsed: {:.2}s | Bytes: {} | Throughput: {:.2} MB/s | Sent: {} (retx {:.1}%) | Recv: {} | ACKs: {}/{} | Timeouts: {} | Discarded: {}",
            self.elapsed().as_secs_f64(),
            self.total_bytes,
            self.throughput() / 1_000_000.0,
            self.packets_sent,
            self.retransmission_ratio() * 100.0,
            self.packets_received,
            self.acks_sent,
            self.acks_received,
            self.timeouts,
            self.discarded.total(),
        )
    }
}

impl Default for TransferStats {
    fn default() -> Self {
        Self::new()
    }
}
