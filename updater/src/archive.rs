//! 패키지 압축 해제: zip / 7z / tar.gz / tar
//!
//! 형식은 확장자가 아니라 매직 바이트로 판별한다. rar 는 지원하지 않는다.

use std::fs::File;
use std::io::{BufReader, Read};
use std::path::{Component, Path};

use crate::error::UpdaterError;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ArchiveFormat {
    Zip,
    SevenZip,
    TarGz,
    Tar,
}

const SEVEN_ZIP_MAGIC: [u8; 6] = [0x37, 0x7a, 0xbc, 0xaf, 0x27, 0x1c];

/// 파일 앞부분으로 형식 판별
pub fn detect_format(path: &Path) -> Result<Option<ArchiveFormat>, UpdaterError> {
    let mut file = File::open(path).map_err(|e| UpdaterError::io("open archive", path, e))?;
    let mut header = [0u8; 512];
    let mut filled = 0;
    while filled < header.len() {
        let n = file
            .read(&mut header[filled..])
            .map_err(|e| UpdaterError::io("read archive", path, e))?;
        if n == 0 {
            break;
        }
        filled += n;
    }
    let header = &header[..filled];

    if header.starts_with(b"PK\x03\x04") || header.starts_with(b"PK\x05\x06") {
        return Ok(Some(ArchiveFormat::Zip));
    }
    if header.starts_with(&SEVEN_ZIP_MAGIC) {
        return Ok(Some(ArchiveFormat::SevenZip));
    }
    if header.starts_with(&[0x1f, 0x8b]) {
        return Ok(Some(ArchiveFormat::TarGz));
    }
    if header.len() >= 262 && &header[257..262] == b"ustar" {
        return Ok(Some(ArchiveFormat::Tar));
    }
    Ok(None)
}

/// `archive`를 `dest`에 풀기. `dest`가 없으면 생성
pub fn extract_archive(archive: &Path, dest: &Path) -> Result<(), UpdaterError> {
    let format = detect_format(archive)?.ok_or_else(|| UpdaterError::ExtractionFailed {
        archive: archive.display().to_string(),
        message: "unrecognized archive format".to_string(),
    })?;

    std::fs::create_dir_all(dest).map_err(|e| UpdaterError::io("create dir", dest, e))?;
    tracing::info!(
        "[Archive] Extracting {} ({:?}) -> {}",
        archive.display(),
        format,
        dest.display()
    );

    let result = match format {
        ArchiveFormat::Zip => extract_zip(archive, dest),
        ArchiveFormat::SevenZip => extract_7z(archive, dest),
        ArchiveFormat::TarGz => open_reader(archive).and_then(|file| {
            extract_tar(flate2::read::GzDecoder::new(file), dest)
        }),
        ArchiveFormat::Tar => open_reader(archive).and_then(|file| extract_tar(file, dest)),
    };

    result.map_err(|message| UpdaterError::ExtractionFailed {
        archive: archive.display().to_string(),
        message,
    })
}

fn open_reader(path: &Path) -> Result<BufReader<File>, String> {
    let file = File::open(path).map_err(|e| e.to_string())?;
    Ok(BufReader::new(file))
}

fn extract_zip(archive_path: &Path, dest: &Path) -> Result<(), String> {
    let file = File::open(archive_path).map_err(|e| e.to_string())?;
    let mut archive = zip::ZipArchive::new(BufReader::new(file)).map_err(|e| e.to_string())?;

    for i in 0..archive.len() {
        let mut entry = archive.by_index(i).map_err(|e| e.to_string())?;

        // zip-slip 방지: 대상 밖으로 나가는 항목은 건너뜀
        let Some(relative) = entry.enclosed_name().map(|p| p.to_path_buf()) else {
            tracing::warn!("[Archive] Skipping unsafe entry '{}'", entry.name());
            continue;
        };
        let out_path = dest.join(&relative);

        if entry.is_dir() {
            std::fs::create_dir_all(&out_path).map_err(|e| e.to_string())?;
            continue;
        }

        if let Some(parent) = out_path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| e.to_string())?;
        }
        let mut outfile = File::create(&out_path).map_err(|e| e.to_string())?;
        std::io::copy(&mut entry, &mut outfile)
            .map_err(|e| format!("{}: {}", relative.display(), e))?;

        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            if let Some(mode) = entry.unix_mode() {
                std::fs::set_permissions(&out_path, std::fs::Permissions::from_mode(mode))
                    .map_err(|e| e.to_string())?;
            }
        }
    }

    Ok(())
}

fn extract_7z(archive_path: &Path, dest: &Path) -> Result<(), String> {
    sevenz_rust::decompress_file_with_extract_fn(archive_path, dest, |entry, reader, out_path| {
        let safe = Path::new(entry.name())
            .components()
            .all(|c| matches!(c, Component::Normal(_) | Component::CurDir));
        if !safe {
            tracing::warn!("[Archive] Skipping unsafe entry '{}'", entry.name());
            return Ok(true);
        }
        sevenz_rust::default_entry_extract_fn(entry, reader, out_path)
    })
    .map_err(|e| e.to_string())
}

fn extract_tar<R: Read>(reader: R, dest: &Path) -> Result<(), String> {
    let mut archive = tar::Archive::new(reader);
    archive.set_preserve_permissions(true);
    // unpack 은 '..' 및 절대 경로 항목을 스스로 거부한다
    archive.unpack(dest).map_err(|e| e.to_string())
}
