//! 프로토콜 설정

use std::fmt;
use std::str::FromStr;
use std::time::Duration;

use crate::{Error, Result, MAX_WINDOW_SIZE, PAYLOAD_MAX};

/// 확인응답 방식 (시작 시 한 번 선택)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum AckMode {
    /// mode 0: 누적 ACK (Go-Back-N)
    #[default]
    Cumulative,
    /// mode 1: 개별 ACK (Selective-Repeat)
    Selective,
}

impl FromStr for AckMode {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim() {
            "0" => Ok(AckMode::Cumulative),
            "1" => Ok(AckMode::Selective),
            other => Err(Error::InvalidConfig(format!(
                "ack mode must be 0 or 1, got {:?}",
                other
            ))),
        }
    }
}

impl fmt::Display for AckMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AckMode::Cumulative => f.write_str("0 (go-back-n)"),
            AckMode::Selective => f.write_str("1 (selective-repeat)"),
        }
    }
}

/// 재시도 정책: 재시도 횟수 한도 + 1회 대기 시간
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub budget: u32,
    pub timeout: Duration,
}

impl RetryPolicy {
    pub const fn new(budget: u32, timeout_ms: u64) -> Self {
        Self {
            budget,
            timeout: Duration::from_millis(timeout_ms),
        }
    }
}

/// RTP 프로토콜 설정
#[derive(Debug, Clone)]
pub struct Config {
    /// 윈도우 크기 (패킷 수)
    pub window_size: usize,

    /// 확인응답 방식
    pub ack_mode: AckMode,

    /// 데이터 청크 크기 (바이트, PAYLOAD_MAX 이하)
    pub chunk_size: usize,

    /// SYN / SYN|ACK / FIN 재전송 정책
    pub handshake: RetryPolicy,

    /// 수신측 첫 SYN 대기
    pub listen: RetryPolicy,

    /// 마지막 핸드쉐이크 ACK 침묵 대기
    pub final_ack: RetryPolicy,

    /// 데이터 전송 ACK 대기 / 정체 한도
    pub transfer: RetryPolicy,

    /// 수신측 FIN|ACK 침묵 대기
    pub close: RetryPolicy,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            window_size: 16,
            ack_mode: AckMode::Cumulative,
            chunk_size: PAYLOAD_MAX,
            handshake: RetryPolicy::new(50_000, 100), // 100ms 간격, 사실상 무제한
            listen: RetryPolicy::new(50, 100),        // 5초
            final_ack: RetryPolicy::new(50, 2000),    // 2초 침묵 = 성공
            transfer: RetryPolicy::new(50, 100),      // 5초 정체 시 종료
            close: RetryPolicy::new(50, 200),         // 200ms 침묵 = 성공
        }
    }
}

impl Config {
    /// 새 설정 생성
    pub fn new(window_size: usize, ack_mode: AckMode) -> Self {
        Self {
            window_size,
            ack_mode,
            ..Self::default()
        }
    }

    pub fn with_window_size(mut self, window_size: usize) -> Self {
        self.window_size = window_size;
        self
    }

    pub fn with_ack_mode(mut self, ack_mode: AckMode) -> Self {
        self.ack_mode = ack_mode;
        self
    }

    pub fn with_chunk_size(mut self, chunk_size: usize) -> Self {
        self.chunk_size = chunk_size;
        self
    }

    /// 로컬 루프백용 설정 (짧은 타임아웃)
    pub fn loopback() -> Self {
        Self {
            handshake: RetryPolicy::new(500, 20),
            listen: RetryPolicy::new(250, 20),
            final_ack: RetryPolicy::new(20, 150),
            transfer: RetryPolicy::new(100, 20),
            close: RetryPolicy::new(20, 100),
            ..Self::default()
        }
    }

    /// 불안정한 네트워크용 설정
    pub fn unstable_network() -> Self {
        Self {
            window_size: 32,
            handshake: RetryPolicy::new(100_000, 250),
            listen: RetryPolicy::new(240, 250),        // 1분
            final_ack: RetryPolicy::new(100, 3000),
            transfer: RetryPolicy::new(120, 250),      // 30초
            close: RetryPolicy::new(100, 500),
            ..Self::default()
        }
    }

    /// 설정 검증
    pub fn validate(&self) -> Result<()> {
        check_window_size(self.window_size)?;

        if self.chunk_size == 0 || self.chunk_size > PAYLOAD_MAX {
            return Err(Error::InvalidConfig(format!(
                "chunk size must be in 1..={}, got {}",
                PAYLOAD_MAX, self.chunk_size
            )));
        }

        for (name, policy) in [
            ("handshake", &self.handshake),
            ("listen", &self.listen),
            ("final_ack", &self.final_ack),
            ("transfer", &self.transfer),
            ("close", &self.close),
        ] {
            if policy.budget == 0 {
                return Err(Error::InvalidConfig(format!("{} retry budget is zero", name)));
            }
        }

        Ok(())
    }
}

/// 윈도우 크기 범위 검사 (1..=MAX_WINDOW_SIZE)
pub(crate) fn check_window_size(window_size: usize) -> Result<()> {
    if window_size == 0 || window_size > MAX_WINDOW_SIZE {
        return Err(Error::InvalidConfig(format!(
            "window size must be in 1..={}, got {}",
            MAX_WINDOW_SIZE, window_size
        )));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_is_valid() {
        assert!(Config::default().validate().is_ok());
        assert!(Config::loopback().validate().is_ok());
        assert!(Config::unstable_network().validate().is_ok());
    }

    #[test]
    fn test_invalid_window() {
        assert!(Config::new(0, AckMode::Cumulative).validate().is_err());
        assert!(Config::new(MAX_WINDOW_SIZE + 1, AckMode::Selective)
            .validate()
            .is_err());
        assert!(Config::new(MAX_WINDOW_SIZE, AckMode::Selective)
            .validate()
            .is_ok());
    }

    #[test]
    fn test_invalid_chunk_size() {
        let config = Config::default().with_chunk_size(PAYLOAD_MAX + 1);
        assert!(config.validate().is_err());
        assert!(Config::default().with_chunk_size(0).validate().is_err());
    }

    #[test]
    fn test_ack_mode_parse() {
        assert_eq!("0".parse::<AckMode>().unwrap(), AckMode::Cumulative);
        assert_eq!("1".parse::<AckMode>().unwrap(), AckMode::Selective);
        assert!("2".parse::<AckMode>().is_err());
        assert!("gbn".parse::<AckMode>().is_err());
    }
}
