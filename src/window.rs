//! 슬롯 버퍼
//!
//! 윈도우 크기만큼의 원형 슬롯 + 병렬 마커 배열. 인덱스는 `seq % window_size`.
//! - 송신측: 미확인 패킷 보관, 마커 = 개별 ACK 수신 여부
//! - 수신측: 순서가 어긋난 패킷 보관, 슬롯 점유 = 수신 여부

use crate::packet::Packet;

#[derive(Debug)]
pub struct SlotBuffer {
    slots: Vec<Option<Packet>>,
    marks: Vec<bool>,
}

impl SlotBuffer {
    /// `window_size`는 0이 아니어야 한다 (호출자가 검증)
    pub(crate) fn new(window_size: usize) -> Self {
        Self {
            slots: vec![None; window_size],
            marks: vec![false; window_size],
        }
    }

    pub fn window_size(&self) -> usize {
        self.slots.len()
    }

    #[inline]
    fn index(&self, seq_num: u32) -> usize {
        seq_num as usize % self.slots.len()
    }

    /// 슬롯에 패킷 저장 (같은 순번이면 덮어씀)
    pub fn put(&mut self, packet: Packet) {
        let idx = self.index(packet.seq_num());
        self.slots[idx] = Some(packet);
    }

    /// `seq_num`의 패킷이 슬롯에 있으면 반환
    pub fn get(&self, seq_num: u32) -> Option<&Packet> {
        self.slots[self.index(seq_num)]
            .as_ref()
            .filter(|p| p.seq_num() == seq_num)
    }

    pub fn is_filled(&self, seq_num: u32) -> bool {
        self.get(seq_num).is_some()
    }

    pub fn mark(&mut self, seq_num: u32) {
        let idx = self.index(seq_num);
        self.marks[idx] = true;
    }

    pub fn is_marked(&self, seq_num: u32) -> bool {
        self.marks[self.index(seq_num)]
    }

    /// 슬롯 비우기 (패킷 반환, 마커 초기화)
    pub fn take(&mut self, seq_num: u32) -> Option<Packet> {
        let idx = self.index(seq_num);
        if !self.is_filled(seq_num) {
            return None;
        }
        self.marks[idx] = false;
        self.slots[idx].take()
    }

    /// 점유 중인 슬롯 수
    pub fn occupied(&self) -> usize {
        self.slots.iter().filter(|s| s.is_some()).count()
    }
}
