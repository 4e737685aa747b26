pub mod keys;

use chrono::{DateTime, Local};
use crystal_capture_common::frame::{Frame, PixelFormat};
use image::codecs::png::PngEncoder;
use image::{ExtendedColorType, ImageEncoder};
use std::fs::{File, OpenOptions};
use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};
use tracing::debug;

use keys::{capture_file_name, capture_stem};

/// Upper bound on same-second suffixes before giving up.
const MAX_NAME_ATTEMPTS: u32 = 1000;

/// Writes accepted frames as PNG files named after their capture time.
#[derive(Debug, Clone, Default)]
pub struct FrameStore;

impl FrameStore {
    pub fn new() -> Self {
        Self
    }

    /// Persist `frame` into `directory`, creating the directory if needed.
    ///
    /// The file is claimed with `create_new`, so an existing capture is never
    /// overwritten: a second frame within the same second gets a numbered
    /// suffix instead. On failure no partial file is left behind.
    pub fn save(
        &self,
        frame: &Frame,
        directory: &Path,
        captured_at: DateTime<Local>,
    ) -> Result<PathBuf, StoreError> {
        ensure_dir(directory)?;

        let png = encode_png(frame)?;
        let stem = capture_stem(&captured_at);
        let (path, mut file) = claim_file(directory, &stem)?;

        let written = file.write_all(&png).and_then(|()| file.sync_all());
        drop(file);
        if let Err(source) = written {
            let _ = std::fs::remove_file(&path);
            return Err(StoreError::Write { path, source });
        }

        debug!(path = %path.display(), bytes = png.len(), "frame written");
        Ok(path)
    }
}

fn ensure_dir(directory: &Path) -> Result<(), StoreError> {
    match std::fs::create_dir_all(directory) {
        Ok(()) => Ok(()),
        // Lost a creation race to another process.
        Err(e) if e.kind() == ErrorKind::AlreadyExists && directory.is_dir() => Ok(()),
        Err(source) => Err(StoreError::CreateDir {
            path: directory.to_path_buf(),
            source,
        }),
    }
}

fn claim_file(directory: &Path, stem: &str) -> Result<(PathBuf, File), StoreError> {
    for attempt in 0..MAX_NAME_ATTEMPTS {
        let path = directory.join(capture_file_name(stem, attempt));
        match OpenOptions::new().write(true).create_new(true).open(&path) {
            Ok(file) => {
                if attempt > 0 {
                    debug!(path = %path.display(), attempt, "capture name taken, using suffix");
                }
                return Ok((path, file));
            }
            Err(e) if e.kind() == ErrorKind::AlreadyExists => continue,
            Err(source) => return Err(StoreError::Write { path, source }),
        }
    }
    Err(StoreError::NamesExhausted {
        directory: directory.to_path_buf(),
        stem: stem.to_string(),
    })
}

fn encode_png(frame: &Frame) -> Result<Vec<u8>, StoreError> {
    let color = match frame.format() {
        PixelFormat::Gray8 => ExtendedColorType::L8,
        PixelFormat::Rgb8 => ExtendedColorType::Rgb8,
    };
    let mut buf = Vec::new();
    PngEncoder::new(&mut buf).write_image(frame.samples(), frame.width(), frame.height(), color)?;
    Ok(buf)
}

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("failed to create directory {path}: {source}")]
    CreateDir {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("failed to write {path}: {source}")]
    Write {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("failed to encode frame: {0}")]
    Encode(#[from] image::ImageError),
    #[error("no free file name for {stem} in {directory}")]
    NamesExhausted { directory: PathBuf, stem: String },
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn at(secs: u32) -> DateTime<Local> {
        Local.with_ymd_and_hms(2026, 2, 18, 9, 30, secs).single().unwrap()
    }

    #[test]
    fn creates_missing_directory_and_writes_png() {
        let root = tempfile::tempdir().unwrap();
        let dir = root.path().join("nested/captures");
        let frame = Frame::filled(4, 4, PixelFormat::Gray8, 7).unwrap();

        let path = FrameStore::new().save(&frame, &dir, at(0)).unwrap();

        assert_eq!(path, dir.join("2026-02-18_09-30-00.png"));
        let decoded = image::open(&path).unwrap().into_luma8();
        assert_eq!(decoded.dimensions(), (4, 4));
        assert!(decoded.pixels().all(|p| p.0[0] == 7));
    }

    #[test]
    fn rgb_frames_round_trip_losslessly() {
        let dir = tempfile::tempdir().unwrap();
        let samples: Vec<u8> = (0..2 * 2 * 3).map(|i| i as u8 * 20).collect();
        let frame = Frame::new(2, 2, PixelFormat::Rgb8, samples.clone()).unwrap();

        let path = FrameStore::new().save(&frame, dir.path(), at(1)).unwrap();

        assert_eq!(image::open(&path).unwrap().into_rgb8().into_raw(), samples);
    }

    #[test]
    fn same_second_saves_do_not_overwrite() {
        let dir = tempfile::tempdir().unwrap();
        let store = FrameStore::new();
        let first = store
            .save(&Frame::filled(2, 2, PixelFormat::Gray8, 1).unwrap(), dir.path(), at(5))
            .unwrap();
        let second = store
            .save(&Frame::filled(2, 2, PixelFormat::Gray8, 2).unwrap(), dir.path(), at(5))
            .unwrap();

        assert_ne!(first, second);
        assert_eq!(second, dir.path().join("2026-02-18_09-30-05_001.png"));
        assert!(image::open(&first).unwrap().into_luma8().pixels().all(|p| p.0[0] == 1));
        assert!(image::open(&second).unwrap().into_luma8().pixels().all(|p| p.0[0] == 2));
    }

    #[test]
    fn existing_directory_is_fine() {
        let dir = tempfile::tempdir().unwrap();
        ensure_dir(dir.path()).unwrap();
        ensure_dir(dir.path()).unwrap();
    }

    #[test]
    fn directory_path_occupied_by_file_fails_loudly() {
        let root = tempfile::tempdir().unwrap();
        let blocker = root.path().join("captures");
        std::fs::write(&blocker, b"not a directory").unwrap();

        let err = FrameStore::new()
            .save(&Frame::filled(2, 2, PixelFormat::Gray8, 0).unwrap(), &blocker, at(0))
            .unwrap_err();
        assert!(matches!(err, StoreError::CreateDir { .. }));
    }
}
