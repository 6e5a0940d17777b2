use std::fs::File;
use std::io::{BufReader, Read};
use std::path::Path;

use super::natural::natural_cmp;
use super::targets;
use crate::common::errors::ArchiveError;
use crate::duplicates::hasher;

/// Largest member size a header may declare before the archive is rejected
pub const MAX_MEMBER_BYTES: u64 = 512 * 1024 * 1024;

/// Upper bound on the buffer reserved up front for one member
const MAX_MEMBER_PREALLOC: u64 = 16 * 1024 * 1024;

/// An image inside an archive container
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VirtualImageRef {
    pub member: String,
    pub size_bytes: u64,
    pub fingerprint: String,
}

/// Access to archive containers. Once listed, members are treated exactly
/// like files on disk; the engine only needs their bytes.
pub trait ArchiveSource: Send + Sync {
    /// Whether `path` is a container this source can open
    fn is_archive(&self, path: &Path) -> bool;

    /// Image members in natural order, fingerprinted
    fn list_images(&self, archive: &Path) -> Result<Vec<VirtualImageRef>, ArchiveError>;

    /// Raw bytes of one member
    fn read_member(&self, archive: &Path, member: &str) -> Result<Vec<u8>, ArchiveError>;
}

/// `.zip` / `.cbz` containers via the `zip` crate
#[derive(Debug, Clone, Copy, Default)]
pub struct ZipArchiveSource;

impl ZipArchiveSource {
    fn open(path: &Path) -> Result<zip::ZipArchive<BufReader<File>>, ArchiveError> {
        let file = File::open(path)?;
        zip::ZipArchive::new(BufReader::new(file)).map_err(map_zip_error)
    }
}

/// Read one member without trusting the size its header declares
fn read_entry<R: Read>(entry: &mut zip::read::ZipFile<'_, R>) -> Result<Vec<u8>, ArchiveError> {
    let declared = entry.size();
    if declared > MAX_MEMBER_BYTES {
        return Err(ArchiveError::Format(format!(
            "member {} declares {} bytes (limit {})",
            entry.name(),
            declared,
            MAX_MEMBER_BYTES
        )));
    }
    let mut bytes = Vec::with_capacity(declared.min(MAX_MEMBER_PREALLOC) as usize);
    entry.by_ref().take(MAX_MEMBER_BYTES + 1).read_to_end(&mut bytes)?;
    if bytes.len() as u64 > MAX_MEMBER_BYTES {
        return Err(ArchiveError::Format(format!(
            "member {} exceeds {} bytes",
            entry.name(),
            MAX_MEMBER_BYTES
        )));
    }
    Ok(bytes)
}

fn map_zip_error(e: zip::result::ZipError) -> ArchiveError {
    match e {
        zip::result::ZipError::Io(io) => ArchiveError::Io(io),
        other => ArchiveError::Format(other.to_string()),
    }
}

impl ArchiveSource for ZipArchiveSource {
    fn is_archive(&self, path: &Path) -> bool {
        path.file_name()
            .map(|n| targets::is_archive(&n.to_string_lossy()))
            .unwrap_or(false)
    }

    fn list_images(&self, archive: &Path) -> Result<Vec<VirtualImageRef>, ArchiveError> {
        let mut zip = Self::open(archive)?;
        let mut images = Vec::new();

        for i in 0..zip.len() {
            let mut entry = zip.by_index(i).map_err(map_zip_error)?;
            if entry.is_dir() {
                continue;
            }
            let name = entry.name().to_string();
            if !targets::is_image(&name) {
                continue;
            }

            let bytes = read_entry(&mut entry)?;
            images.push(VirtualImageRef {
                fingerprint: hasher::fingerprint_bytes(&bytes),
                size_bytes: bytes.len() as u64,
                member: name,
            });
        }

        images.sort_by(|a, b| natural_cmp(&a.member, &b.member));
        Ok(images)
    }

    fn read_member(&self, archive: &Path, member: &str) -> Result<Vec<u8>, ArchiveError> {
        let mut zip = Self::open(archive)?;
        let mut entry = zip.by_name(member).map_err(|e| match e {
            zip::result::ZipError::FileNotFound => ArchiveError::MissingMember(member.to_string()),
            other => map_zip_error(other),
        })?;
        read_entry(&mut entry)
    }
}
