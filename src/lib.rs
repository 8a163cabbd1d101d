//! # RTP (Reliable Transfer Protocol)
//!
//! UDP 위의 신뢰성 있는 단방향 파일 전송 프로토콜
//!
//! ## 핵심 특징
//! - **CRC-32 검증**: 헤더 + payload 전체에 대한 체크섬, 손상 패킷은 조용히 폐기
//! - **3-way 핸드쉐이크**: SYN → SYN|ACK → ACK, 마지막 ACK는 침묵을 성공으로 판정
//! - **슬라이딩 윈도우**: mode 0 누적 ACK (Go-Back-N), mode 1 개별 ACK (Selective-Repeat)
//! - **재시도 한도**: 단계별 `RetryPolicy`, 한도 초과는 타입 있는 에러로 반환
//! - **장애 주입**: `LossyChannel`로 손실/손상/중복 재현

pub mod channel;
pub mod config;
pub mod connection;
pub mod error;
pub mod handshake;
pub mod packet;
pub mod receiver;
pub mod reliable;
pub mod sender;
pub mod simulator;
pub mod stats;
pub mod teardown;
pub mod window;

pub use channel::Channel;
pub use config::{AckMode, Config, RetryPolicy};
pub use connection::{Connection, ConnectionState, Role};
pub use error::{Error, Result, Stage};
pub use packet::{Flags, Packet, PacketError, PacketHeader};
pub use receiver::{ReceiveWindow, Verdict};
pub use sender::{AckOutcome, SendWindow};
pub use simulator::{LossyChannel, SimulatorConfig};
pub use stats::TransferStats;

/// 헤더 크기 (seq 4 + length 2 + checksum 4 + flags 1)
pub const HEADER_LEN: usize = 11;

/// 최대 payload 크기 (바이트)
pub const PAYLOAD_MAX: usize = 1461;

/// 최대 윈도우 크기
pub const MAX_WINDOW_SIZE: usize = 20000;

/// 송신측 SYN 순번
pub const INITIAL_SEQ: u32 = 114514;
