//! 에러 타입 정의

use std::fmt;

use thiserror::Error;

use crate::packet::PacketError;

/// 재시도/타임아웃이 발생한 프로토콜 단계
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    /// 수신측: 첫 SYN 대기
    Listen,
    /// 수신측: SYN|ACK 전송 후 ACK 대기
    SynAck,
    /// 송신측: SYN 전송 후 SYN|ACK 대기
    Syn,
    /// 송신측: 마지막 핸드쉐이크 ACK (침묵 = 성공)
    FinalAck,
    /// 송신측 데이터 전송
    DataSend,
    /// 수신측 데이터 수신
    DataReceive,
    /// 송신측 종료: FIN 전송 후 FIN|ACK 대기
    Fin,
    /// 수신측 종료: FIN|ACK 전송 (침묵 = 성공)
    FinAck,
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Stage::Listen => "listen",
            Stage::SynAck => "syn-ack",
            Stage::Syn => "syn",
            Stage::FinalAck => "final-ack",
            Stage::DataSend => "data-send",
            Stage::DataReceive => "data-receive",
            Stage::Fin => "fin",
            Stage::FinAck => "fin-ack",
        };
        f.write_str(name)
    }
}

/// RTP 프로토콜 에러 타입
#[derive(Error, Debug)]
pub enum Error {
    #[error("IO 에러: {0}")]
    Io(#[from] std::io::Error),

    #[error("패킷 에러: {0}")]
    Packet(#[from] PacketError),

    #[error("재시도 한도 초과: stage={stage}, attempts={attempts}")]
    RetryExhausted { stage: Stage, attempts: u32 },

    #[error("전송 정체: stage={stage}, {timeouts}회 연속 타임아웃")]
    Stalled { stage: Stage, timeouts: u32 },

    #[error("유효하지 않은 설정: {0}")]
    InvalidConfig(String),

    #[error("연결 상태 불일치: expected {expected}, got {got}")]
    InvalidState { expected: String, got: String },
}

/// Result 타입 별칭
pub type Result<T> = std::result::Result<T, Error>;
