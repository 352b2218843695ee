//! キャリブレーション結果の永続化ブロック
//!
//! Hallテーブルとモーターパラメータを固定長の32bitワード列として保存します。
//! フラッシュへの書き込み自体は外部（firmware）が行います。

use crate::foc::{HallSector, HallTable, MotorParameters};

/// キャリブレーションデータのマジックナンバー（"FOC1"のASCII）
pub const CALIBRATION_MAGIC: u32 = 0x3143_4F46;

/// 現在のブロックバージョン
pub const CALIBRATION_VERSION: u32 = 1;

/// ブロックのワード数
pub const CALIBRATION_WORDS: usize = 18;

const HALL_WORDS_START: usize = 2;
const RESISTANCE_WORD: usize = 14;
const INDUCTANCE_WORD: usize = 15;
const FLUX_WORD: usize = 16;
const CRC_WORD: usize = CALIBRATION_WORDS - 1;

/// 永続化ブロックの検証エラー
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum StorageError {
    /// マジックナンバー不一致（未書き込みページを含む）
    InvalidMagic,

    /// バージョン不一致
    VersionMismatch,

    /// CRC検証エラー
    CrcMismatch,

    /// ワード数不足
    InvalidSize,
}

/// ワード列のチェックサム計算器
///
/// firmwareではSTM32のCRCペリフェラル、ホストでは [`SoftCrc32`] を使います。
pub trait WordChecksum {
    fn checksum(&mut self, words: &[u32]) -> u32;
}

/// CRC-32（IEEE 802.3）テーブル
const CRC32_TABLE: [u32; 256] = {
    let mut table = [0u32; 256];
    let mut i = 0;
    while i < 256 {
        let mut crc = i as u32;
        let mut j = 0;
        while j < 8 {
            if crc & 1 != 0 {
                crc = (crc >> 1) ^ 0xEDB8_8320;
            } else {
                crc >>= 1;
            }
            j += 1;
        }
        table[i] = crc;
        i += 1;
    }
    table
};

/// ソフトウェアCRC-32（リトルエンディアンでワードを供給）
#[derive(Debug, Default, Clone, Copy)]
pub struct SoftCrc32;

impl WordChecksum for SoftCrc32 {
    fn checksum(&mut self, words: &[u32]) -> u32 {
        let mut crc = 0xFFFF_FFFF_u32;
        for word in words {
            for byte in word.to_le_bytes() {
                let index = ((crc ^ byte as u32) & 0xFF) as usize;
                crc = (crc >> 8) ^ CRC32_TABLE[index];
            }
        }
        !crc
    }
}

/// 永続化されるキャリブレーション結果
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct StoredCalibration {
    pub hall_table: HallTable,
    pub motor: MotorParameters,
}

impl StoredCalibration {
    pub const fn new(hall_table: HallTable, motor: MotorParameters) -> Self {
        Self { hall_table, motor }
    }

    /// CRCを除くワード列を生成
    fn payload(&self) -> [u32; CALIBRATION_WORDS] {
        let mut words = [0u32; CALIBRATION_WORDS];
        words[0] = CALIBRATION_MAGIC;
        words[1] = CALIBRATION_VERSION;

        for (i, sector) in self.hall_table.sectors.iter().enumerate() {
            let base = HALL_WORDS_START + i * 2;
            words[base] = sector.start as u32 | (sector.end as u32) << 16;
            words[base + 1] = sector.center as u32 | (sector.width as u32) << 16;
        }

        words[RESISTANCE_WORD] = self.motor.resistance.to_bits();
        words[INDUCTANCE_WORD] = self.motor.inductance.to_bits();
        words[FLUX_WORD] = self.motor.flux_linkage.to_bits();
        words
    }

    /// CRC32チェックサムを計算
    pub fn calculate_crc<C: WordChecksum>(&self, crc: &mut C) -> u32 {
        let words = self.payload();
        crc.checksum(&words[..CRC_WORD])
    }

    /// フラッシュ書き込み用のワード列（CRCを末尾に付加）
    pub fn to_words<C: WordChecksum>(&self, crc: &mut C) -> [u32; CALIBRATION_WORDS] {
        let mut words = self.payload();
        words[CRC_WORD] = crc.checksum(&words[..CRC_WORD]);
        words
    }

    /// ワード列から復元（ヘッダとCRCを検証）
    pub fn from_words<C: WordChecksum>(words: &[u32], crc: &mut C) -> Result<Self, StorageError> {
        if words.len() < CALIBRATION_WORDS {
            return Err(StorageError::InvalidSize);
        }
        if words[0] != CALIBRATION_MAGIC {
            return Err(StorageError::InvalidMagic);
        }
        if words[1] != CALIBRATION_VERSION {
            return Err(StorageError::VersionMismatch);
        }
        if crc.checksum(&words[..CRC_WORD]) != words[CRC_WORD] {
            return Err(StorageError::CrcMismatch);
        }

        let mut hall_table = HallTable::empty();
        for (i, sector) in hall_table.sectors.iter_mut().enumerate() {
            let base = HALL_WORDS_START + i * 2;
            *sector = HallSector {
                start: words[base] as u16,
                end: (words[base] >> 16) as u16,
                center: words[base + 1] as u16,
                width: (words[base + 1] >> 16) as u16,
            };
        }

        let motor = MotorParameters {
            resistance: f32::from_bits(words[RESISTANCE_WORD]),
            inductance: f32::from_bits(words[INDUCTANCE_WORD]),
            flux_linkage: f32::from_bits(words[FLUX_WORD]),
        };

        Ok(Self { hall_table, motor })
    }
}

// コンパイル時サイズチェック（2KBページ以内）
const _: () = {
    const SIZE: usize = CALIBRATION_WORDS * core::mem::size_of::<u32>();
    const MAX_SIZE: usize = 2048;
    assert!(SIZE <= MAX_SIZE, "calibration block exceeds flash page size");
};
