//! フラッシュメモリベースのEEPROM実装
//!
//! STM32G431VBの最終フラッシュページ（ページ63）にキャリブレーション結果を保存

use embassy_stm32::{crc::Crc, flash::Flash, mode::Blocking};
use g4_foc::config::{StorageError, StoredCalibration, WordChecksum, CALIBRATION_WORDS};

/// STM32G431VBのフラッシュページサイズ（2KB）
pub const FLASH_PAGE_SIZE: u32 = 2048;

/// 最終ページ番号（ページ63、0ベース）
pub const LAST_PAGE_NUMBER: u8 = 63;

/// 最終ページのフラッシュ先頭からのオフセット（128KB - 2KB）
pub const LAST_PAGE_OFFSET: u32 = 0x0001_F800;

/// 最終ページの絶対アドレス（ログ表示用）
pub const LAST_PAGE_START: u32 = 0x0800_0000 + LAST_PAGE_OFFSET;

const BLOCK_BYTES: usize = CALIBRATION_WORDS * 4;

/// EEPROM操作のエラー型
#[derive(Debug, Clone, Copy)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum EepromError {
    /// フラッシュ書き込みエラー
    FlashWriteError,

    /// フラッシュ消去エラー
    FlashEraseError,

    /// フラッシュ読み取りエラー
    FlashReadError,

    /// 保存ブロックの検証エラー
    InvalidBlock(StorageError),
}

/// CRCペリフェラルによるワードチェックサム
pub struct HardwareCrc<'a>(pub &'a mut Crc<'static>);

impl WordChecksum for HardwareCrc<'_> {
    fn checksum(&mut self, words: &[u32]) -> u32 {
        self.0.reset();
        self.0.feed_words(words)
    }
}

/// フラッシュメモリからキャリブレーション結果を読み込む
///
/// # Returns
/// * `Ok(StoredCalibration)` - 読み込み成功
/// * `Err(EepromError)` - 読み込み失敗（未書き込み、CRCエラーなど）
pub fn read_calibration(
    flash: &mut Flash<'static, Blocking>,
    crc: &mut Crc<'static>,
) -> Result<StoredCalibration, EepromError> {
    info!("Reading calibration from flash at 0x{:08X}", LAST_PAGE_START);

    let mut buffer = [0u8; BLOCK_BYTES];
    flash
        .blocking_read(LAST_PAGE_OFFSET, &mut buffer)
        .map_err(|e| {
            error!("Flash read failed: {:?}", e);
            EepromError::FlashReadError
        })?;

    let mut words = [0u32; CALIBRATION_WORDS];
    for (word, bytes) in words.iter_mut().zip(buffer.chunks_exact(4)) {
        *word = u32::from_le_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]);
    }

    StoredCalibration::from_words(&words, &mut HardwareCrc(crc)).map_err(|e| {
        warn!("Stored calibration rejected: {:?}", e);
        EepromError::InvalidBlock(e)
    })
}

/// フラッシュメモリにキャリブレーション結果を書き込む
pub fn write_calibration(
    flash: &mut Flash<'static, Blocking>,
    crc: &mut Crc<'static>,
    calibration: &StoredCalibration,
) -> Result<(), EepromError> {
    info!("Writing calibration to flash at 0x{:08X}", LAST_PAGE_START);

    let words = calibration.to_words(&mut HardwareCrc(crc));
    let mut buffer = [0u8; BLOCK_BYTES];
    for (bytes, word) in buffer.chunks_exact_mut(4).zip(words.iter()) {
        bytes.copy_from_slice(&word.to_le_bytes());
    }

    info!("Erasing flash page {}", LAST_PAGE_NUMBER);
    flash
        .blocking_erase(LAST_PAGE_OFFSET, LAST_PAGE_OFFSET + FLASH_PAGE_SIZE)
        .map_err(|e| {
            error!("Flash erase failed: {:?}", e);
            EepromError::FlashEraseError
        })?;

    flash
        .blocking_write(LAST_PAGE_OFFSET, &buffer)
        .map_err(|e| {
            error!("Flash write failed: {:?}", e);
            EepromError::FlashWriteError
        })?;

    info!("Calibration saved (CRC 0x{:08X})", words[CALIBRATION_WORDS - 1]);
    Ok(())
}

// G4は8バイト単位で書き込む
const _: () = assert!(BLOCK_BYTES % 8 == 0, "calibration block must be double-word aligned");
