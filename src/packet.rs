//! 패킷 정의 및 코덱
//!
//! 와이어 포맷 (네트워크 바이트 순서):
//!
//! ```text
//! +----------------+----------+----------------+-------+-----------------+
//! | seq_num (4)    | len (2)  | checksum (4)   | flags | payload (len)   |
//! +----------------+----------+----------------+-------+-----------------+
//! ```
//!
//! 체크섬은 checksum 필드를 0으로 둔 헤더 + payload 전체에 대한 CRC-32.
//! 체크섬이 맞지 않는 패킷은 어떤 필드도 해석하지 않고 버린다.

use std::fmt;
use std::ops::BitOr;

use bincode::Options;
use bytes::{Bytes, BytesMut};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::{HEADER_LEN, PAYLOAD_MAX};

/// 패킷 플래그 (SYN / ACK / FIN 비트 집합)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Flags(u8);

impl Flags {
    /// 데이터 패킷
    pub const NONE: Flags = Flags(0);
    pub const SYN: Flags = Flags(0b0001);
    pub const ACK: Flags = Flags(0b0010);
    pub const FIN: Flags = Flags(0b0100);

    pub const fn bits(self) -> u8 {
        self.0
    }

    pub const fn from_bits(bits: u8) -> Self {
        Flags(bits)
    }

    pub const fn contains(self, other: Flags) -> bool {
        self.0 & other.0 == other.0
    }

    pub const fn is_data(self) -> bool {
        self.0 == 0
    }
}

impl BitOr for Flags {
    type Output = Flags;

    fn bitor(self, rhs: Flags) -> Flags {
        Flags(self.0 | rhs.0)
    }
}

impl fmt::Display for Flags {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_data() {
            return f.write_str("DATA");
        }

        let mut names = Vec::with_capacity(3);
        if self.contains(Flags::SYN) {
            names.push("SYN");
        }
        if self.contains(Flags::FIN) {
            names.push("FIN");
        }
        if self.contains(Flags::ACK) {
            names.push("ACK");
        }
        let known = Flags::SYN | Flags::ACK | Flags::FIN;
        if self.0 & !known.0 != 0 {
            return write!(f, "{:#04x}", self.0);
        }
        f.write_str(&names.join("|"))
    }
}

/// 코덱 에러
#[derive(Error, Debug)]
pub enum PacketError {
    #[error("헤더보다 짧은 데이터그램: {len} bytes")]
    Truncated { len: usize },

    #[error("길이 불일치: declared {declared}, received {received}")]
    LengthMismatch { declared: usize, received: usize },

    #[error("체크섬 불일치: expected {expected:08X}, got {got:08X}")]
    ChecksumMismatch { expected: u32, got: u32 },

    #[error("페이로드 크기 초과: {len} > {max}")]
    PayloadTooLarge { len: usize, max: usize },

    #[error("헤더 직렬화 에러: {0}")]
    Codec(#[from] bincode::Error),
}

/// 패킷 헤더 (11 bytes)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PacketHeader {
    /// 데이터: 청크 순번 / 제어: 핸드쉐이크·ACK 토큰
    pub seq_num: u32,

    /// 유효 payload 길이
    pub length: u16,

    /// CRC-32 (계산 시 0으로 취급)
    pub checksum: u32,

    pub flags: Flags,
}

/// 고정 길이, 빅엔디안 헤더 직렬화 옵션
fn wire_options() -> impl Options {
    bincode::DefaultOptions::new()
        .with_big_endian()
        .with_fixint_encoding()
}

fn compute_checksum(header: &PacketHeader, payload: &[u8]) -> Result<u32, PacketError> {
    let zeroed = PacketHeader {
        checksum: 0,
        ..*header
    };
    let header_bytes = wire_options().serialize(&zeroed)?;

    let mut hasher = crc32fast::Hasher::new();
    hasher.update(&header_bytes);
    hasher.update(payload);
    Ok(hasher.finalize())
}

/// 전송 단위 패킷
///
/// payload는 `PAYLOAD_MAX` 이하로 제한되고 `header.length`와 항상 일치한다.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Packet {
    header: PacketHeader,
    payload: Bytes,
}

impl Packet {
    /// 새 패킷 생성 (체크섬 계산 포함)
    pub fn build(seq_num: u32, payload: Bytes, flags: Flags) -> Result<Self, PacketError> {
        if payload.len() > PAYLOAD_MAX {
            return Err(PacketError::PayloadTooLarge {
                len: payload.len(),
                max: PAYLOAD_MAX,
            });
        }

        let mut header = PacketHeader {
            seq_num,
            length: payload.len() as u16,
            checksum: 0,
            flags,
        };
        header.checksum = compute_checksum(&header, &payload)?;

        Ok(Self { header, payload })
    }

    /// payload 없는 제어 패킷
    pub fn control(seq_num: u32, flags: Flags) -> Result<Self, PacketError> {
        Self::build(seq_num, Bytes::new(), flags)
    }

    /// 빈 패킷 (seq=0, flags=0, payload 없음)
    pub fn empty() -> Self {
        Self {
            header: PacketHeader {
                seq_num: 0,
                length: 0,
                // 모든 필드가 0인 헤더의 직렬화 결과는 0 바이트열
                checksum: crc32fast::hash(&[0u8; HEADER_LEN]),
                flags: Flags::NONE,
            },
            payload: Bytes::new(),
        }
    }

    pub fn header(&self) -> &PacketHeader {
        &self.header
    }

    pub fn seq_num(&self) -> u32 {
        self.header.seq_num
    }

    pub fn flags(&self) -> Flags {
        self.header.flags
    }

    pub fn checksum(&self) -> u32 {
        self.header.checksum
    }

    pub fn payload(&self) -> &Bytes {
        &self.payload
    }

    pub fn payload_len(&self) -> usize {
        self.payload.len()
    }

    /// 와이어 상의 전체 크기
    pub fn wire_len(&self) -> usize {
        HEADER_LEN + self.payload.len()
    }

    /// 체크섬 검증
    pub fn verify(&self) -> bool {
        compute_checksum(&self.header, &self.payload)
            .map(|computed| computed == self.header.checksum)
            .unwrap_or(false)
    }

    /// 바이트로 직렬화
    pub fn encode(&self) -> Result<Bytes, PacketError> {
        let header_bytes = wire_options().serialize(&self.header)?;

        let mut buf = BytesMut::with_capacity(self.wire_len());
        buf.extend_from_slice(&header_bytes);
        buf.extend_from_slice(&self.payload);
        Ok(buf.freeze())
    }

    /// 헤더 파싱 + 길이 검사 (체크섬은 검사하지 않음)
    pub fn parse(datagram: &[u8]) -> Result<Self, PacketError> {
        if datagram.len() < HEADER_LEN {
            return Err(PacketError::Truncated {
                len: datagram.len(),
            });
        }

        let header: PacketHeader = wire_options().deserialize(&datagram[..HEADER_LEN])?;
        let declared = HEADER_LEN + header.length as usize;
        if declared != datagram.len() {
            return Err(PacketError::LengthMismatch {
                declared,
                received: datagram.len(),
            });
        }

        Ok(Self {
            header,
            payload: Bytes::copy_from_slice(&datagram[HEADER_LEN..]),
        })
    }

    /// 수신 데이터그램 디코딩 (길이 + 체크섬 검증)
    pub fn decode(datagram: &[u8]) -> Result<Self, PacketError> {
        let packet = Self::parse(datagram)?;
        let computed = compute_checksum(&packet.header, &packet.payload)?;
        if computed != packet.header.checksum {
            return Err(PacketError::ChecksumMismatch {
                expected: packet.header.checksum,
                got: computed,
            });
        }
        Ok(packet)
    }
}

impl Default for Packet {
    fn default() -> Self {
        Self::empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_header_layout() {
        let packet = Packet::build(0x0102_0304, Bytes::from_static(b"xy"), Flags::FIN).unwrap();
        let bytes = packet.encode().unwrap();

        assert_eq!(bytes.len(), HEADER_LEN + 2);
        assert_eq!(&bytes[0..4], &[0x01, 0x02, 0x03, 0x04]);
        assert_eq!(&bytes[4..6], &[0x00, 0x02]);
        assert_eq!(&bytes[6..10], &packet.checksum().to_be_bytes());
        assert_eq!(bytes[10], Flags::FIN.bits());
        assert_eq!(&bytes[11..], b"xy");
    }

    #[test]
    fn test_checksum_is_standard_crc32() {
        let packet = Packet::build(7, Bytes::from_static(b"hello"), Flags::NONE).unwrap();

        let mut image = packet.encode().unwrap().to_vec();
        image[6..10].copy_from_slice(&[0, 0, 0, 0]);
        assert_eq!(crc32fast::hash(&image), packet.checksum());
    }

    #[test]
    fn test_build_verify_decode() {
        for flags in [
            Flags::NONE,
            Flags::SYN,
            Flags::SYN | Flags::ACK,
            Flags::ACK,
            Flags::FIN,
            Flags::FIN | Flags::ACK,
        ] {
            let payload: Vec<u8> = (0..300).map(|i| (i % 251) as u8).collect();
            let packet = Packet::build(114514, Bytes::from(payload.clone()), flags).unwrap();
            assert!(packet.verify());

            let restored = Packet::decode(&packet.encode().unwrap()).unwrap();
            assert_eq!(restored.seq_num(), 114514);
            assert_eq!(restored.flags(), flags);
            assert_eq!(restored.payload_len(), 300);
            assert_eq!(restored.payload().as_ref(), payload.as_slice());
        }
    }

    #[test]
    fn test_single_bit_flip_rejected() {
        let packet = Packet::build(42, Bytes::from_static(b"integrity"), Flags::NONE).unwrap();
        let bytes = packet.encode().unwrap();

        for bit in 0..bytes.len() * 8 {
            let mut corrupted = bytes.to_vec();
            corrupted[bit / 8] ^= 1 << (bit % 8);
            assert!(
                Packet::decode(&corrupted).is_err(),
                "bit {} flip was not detected",
                bit
            );
        }
    }

    #[test]
    fn test_length_mismatch() {
        let packet = Packet::build(1, Bytes::from_static(b"abcd"), Flags::NONE).unwrap();
        let bytes = packet.encode().unwrap();

        let truncated = &bytes[..bytes.len() - 1];
        assert!(matches!(
            Packet::decode(truncated),
            Err(PacketError::LengthMismatch { declared: 15, received: 14 })
        ));

        let mut oversized = bytes.to_vec();
        oversized.push(0);
        assert!(matches!(
            Packet::decode(&oversized),
            Err(PacketError::LengthMismatch { .. })
        ));

        assert!(matches!(
            Packet::decode(&bytes[..5]),
            Err(PacketError::Truncated { len: 5 })
        ));
    }

    #[test]
    fn test_payload_limit() {
        assert!(Packet::build(0, Bytes::from(vec![0u8; PAYLOAD_MAX]), Flags::NONE).is_ok());
        assert!(matches!(
            Packet::build(0, Bytes::from(vec![0u8; PAYLOAD_MAX + 1]), Flags::NONE),
            Err(PacketError::PayloadTooLarge { .. })
        ));
    }

    #[test]
    fn test_empty_packet() {
        let empty = Packet::empty();
        assert!(empty.verify());
        assert_eq!(empty, Packet::control(0, Flags::NONE).unwrap());
    }

    #[test]
    fn test_flags_display() {
        assert_eq!(Flags::NONE.to_string(), "DATA");
        assert_eq!((Flags::SYN | Flags::ACK).to_string(), "SYN|ACK");
        assert_eq!((Flags::FIN | Flags::ACK).to_string(), "FIN|ACK");
        assert_eq!(Flags::from_bits(0x80).to_string(), "0x80");
    }
}
