//! 손실 네트워크 시뮬레이터
//!
//! 임의의 `Channel`을 감싸 송신 데이터그램을 확률적으로 버리거나, 비트를 뒤집거나,
//! 두 번 보낸다. 시드를 고정하면 같은 순서의 장애가 재현된다.

use std::net::SocketAddr;
use std::time::Duration;

use parking_lot::Mutex;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use tracing::debug;

use crate::channel::Channel;
use crate::{Error, Result};

/// 장애 주입 확률 (각각 0.0 ~ 1.0)
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SimulatorConfig {
    pub loss_rate: f64,
    pub corrupt_rate: f64,
    pub duplicate_rate: f64,
    pub seed: u64,
}

impl Default for SimulatorConfig {
    fn default() -> Self {
        Self {
            loss_rate: 0.0,
            corrupt_rate: 0.0,
            duplicate_rate: 0.0,
            seed: 0,
        }
    }
}

impl SimulatorConfig {
    pub fn is_noop(&self) -> bool {
        self.loss_rate == 0.0 && self.corrupt_rate == 0.0 && self.duplicate_rate == 0.0
    }

    pub fn validate(&self) -> Result<()> {
        for (name, rate) in [
            ("loss", self.loss_rate),
            ("corrupt", self.corrupt_rate),
            ("duplicate", self.duplicate_rate),
        ] {
            if !(0.0..=1.0).contains(&rate) {
                return Err(Error::InvalidConfig(format!(
                    "{} rate must be in 0.0..=1.0, got {}",
                    name, rate
                )));
            }
        }
        Ok(())
    }
}

/// 주입한 장애 수
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FaultCounts {
    pub dropped: u64,
    pub corrupted: u64,
    pub duplicated: u64,
}

/// 송신 경로에 장애를 주입하는 채널
pub struct LossyChannel<C> {
    inner: C,
    config: SimulatorConfig,
    rng: Mutex<StdRng>,
    faults: Mutex<FaultCounts>,
}

impl<C: Channel> LossyChannel<C> {
    pub fn new(inner: C, config: SimulatorConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self {
            inner,
            config,
            rng: Mutex::new(StdRng::seed_from_u64(config.seed)),
            faults: Mutex::new(FaultCounts::default()),
        })
    }

    pub fn inner(&self) -> &C {
        &self.inner
    }

    pub fn faults(&self) -> FaultCounts {
        *self.faults.lock()
    }
}

impl<C: Channel> Channel for LossyChannel<C> {
    async fn wait_readable(&self, timeout: Duration) -> Result<bool> {
        self.inner.wait_readable(timeout).await
    }

    async fn send_datagram(&self, datagram: &[u8], peer: SocketAddr) -> Result<()> {
        // 락은 await 전에 해제
        let (lose, flip, duplicate) = {
            let mut rng = self.rng.lock();
            let lose = rng.gen_bool(self.config.loss_rate);
            let flip = if !datagram.is_empty() && rng.gen_bool(self.config.corrupt_rate) {
                Some(rng.gen_range(0..datagram.len() * 8))
            } else {
                None
            };
            (lose, flip, rng.gen_bool(self.config.duplicate_rate))
        };

        if lose {
            debug!("simulator: drop {} bytes to {}", datagram.len(), peer);
            self.faults.lock().dropped += 1;
            return Ok(());
        }

        let mut bytes = datagram.to_vec();
        if let Some(bit) = flip {
            bytes[bit / 8] ^= 1 << (bit % 8);
            self.faults.lock().corrupted += 1;
        }

        self.inner.send_datagram(&bytes, peer).await?;
        if duplicate {
            self.faults.lock().duplicated += 1;
            self.inner.send_datagram(&bytes, peer).await?;
        }
        Ok(())
    }

    async fn receive_datagram(&self, buf: &mut [u8]) -> Result<(usize, SocketAddr)> {
        self.inner.receive_datagram(buf).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::channel::scripted::ScriptedChannel;
    use crate::channel::send_packet;
    use crate::packet::{Flags, Packet};

    fn peer() -> SocketAddr {
        "127.0.0.1:9100".parse().unwrap()
    }

    #[test]
    fn test_rate_validation() {
        let config = SimulatorConfig {
            loss_rate: 1.5,
            ..SimulatorConfig::default()
        };
        assert!(config.validate().is_err());
        assert!(SimulatorConfig::default().validate().is_ok());
        assert!(SimulatorConfig::default().is_noop());
    }

    #[tokio::test]
    async fn test_full_loss() {
        let config = SimulatorConfig {
            loss_rate: 1.0,
            ..SimulatorConfig::default()
        };
        let channel = LossyChannel::new(ScriptedChannel::new(peer()), config).unwrap();

        for seq in 0..5 {
            send_packet(&channel, &Packet::control(seq, Flags::ACK).unwrap(), peer())
                .await
                .unwrap();
        }
        assert!(channel.inner().sent().is_empty());
        assert_eq!(channel.faults().dropped, 5);
    }

    #[tokio::test]
    async fn test_full_duplication() {
        let config = SimulatorConfig {
            duplicate_rate: 1.0,
            ..SimulatorConfig::default()
        };
        let channel = LossyChannel::new(ScriptedChannel::new(peer()), config).unwrap();

        send_packet(&channel, &Packet::control(3, Flags::FIN).unwrap(), peer())
            .await
            .unwrap();
        let sent = channel.inner().sent();
        assert_eq!(sent.len(), 2);
        assert_eq!(sent[0], sent[1]);
    }

    #[tokio::test]
    async fn test_corruption_fails_checksum() {
        let config = SimulatorConfig {
            corrupt_rate: 1.0,
            seed: 7,
            ..SimulatorConfig::default()
        };
        let channel = LossyChannel::new(ScriptedChannel::new(peer()), config).unwrap();

        // ScriptedChannel은 송신 시 디코딩하므로 손상된 패킷은 에러가 된다
        let result = send_packet(&channel, &Packet::control(3, Flags::ACK).unwrap(), peer()).await;
        assert!(result.is_err());
        assert_eq!(channel.faults().corrupted, 1);
    }
}
