//! Namespace id → on-disk path mapping.
//!
//! An id doubles as the file name unless it contains a character some
//! filesystem would reject, in which case the file is named by the MD5 hex of
//! the id and parked under a `specialCharacter` subdirectory. The meta file
//! sits next to the data file with a `.crc` suffix.

use std::io;
use std::path::{Path, PathBuf};

use md5::{Digest, Md5};

const SPECIAL_CHARACTER_DIR: &str = "specialCharacter";
const SPECIAL_CHARACTERS: &[char] = &['\\', '/', ':', '*', '?', '"', '<', '>', '|'];

fn md5_hex(value: &str) -> String {
    hex::encode(Md5::digest(value.as_bytes()))
}

fn has_special_character(id: &str) -> bool {
    id.contains(SPECIAL_CHARACTERS)
}

/// Resolves the data-file path for `id` under `root`, creating the
/// `specialCharacter` directory when the id needs encoding.
pub(crate) fn data_path(root: &Path, id: &str) -> io::Result<PathBuf> {
    if has_special_character(id) {
        let dir = root.join(SPECIAL_CHARACTER_DIR);
        std::fs::create_dir_all(&dir)?;
        Ok(dir.join(md5_hex(id)))
    } else {
        Ok(root.join(id))
    }
}

/// The meta file lives beside the data file as `<dataPath>.crc`.
pub(crate) fn meta_path(data_path: &Path) -> PathBuf {
    let mut name = data_path.as_os_str().to_os_string();
    name.push(".crc");
    PathBuf::from(name)
}

/// Registry key for one `(root, id)` pair: the resolved data path.
pub(crate) fn registry_key(data_path: &Path) -> String {
    data_path.to_string_lossy().into_owned()
}
