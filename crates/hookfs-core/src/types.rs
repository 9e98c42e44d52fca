//! Core VFS types.
//!
//! These mirror the shapes the host filesystem layer expects back from a
//! mount: a `stat` buffer, permission and glob-type masks, and the verb
//! names handlers are invoked with.

use bitflags::bitflags;
use serde::Serialize;
use strum::{AsRefStr, Display, EnumString};

use crate::value::Value;

/// File type bits of `Stat::mode`.
pub const S_IFMT: u32 = 0o170000;
/// Directory.
pub const S_IFDIR: u32 = 0o040000;
/// Regular file.
pub const S_IFREG: u32 = 0o100000;

/// File type enumeration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum FileType {
    /// Regular file.
    File,
    /// Directory.
    Directory,
}

impl FileType {
    /// Returns true if this is a regular file.
    pub fn is_file(&self) -> bool {
        matches!(self, FileType::File)
    }

    /// Returns true if this is a directory.
    pub fn is_dir(&self) -> bool {
        matches!(self, FileType::Directory)
    }

    /// Mode bits contributed by this type.
    pub fn mode_bits(&self) -> u32 {
        match self {
            FileType::File => S_IFREG,
            FileType::Directory => S_IFDIR,
        }
    }
}

/// Result of a `stat` call.
///
/// Handlers report fields by name; anything not reported stays zero.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct Stat {
    pub dev: u64,
    pub ino: u64,
    /// Permission bits combined with the type bits from `type`.
    pub mode: u32,
    pub nlink: u64,
    pub uid: u32,
    pub gid: u32,
    pub size: u64,
    pub atime: i64,
    pub mtime: i64,
    pub ctime: i64,
}

impl Stat {
    /// Decode a flat `name value name value ...` list.
    ///
    /// `type` ORs `directory`/`file` into `mode`; other type names and
    /// unknown field names are ignored. Pairs are applied from the end, so
    /// when a scalar field repeats the first occurrence wins.
    pub fn from_fields(fields: Vec<Value>) -> Result<Self, String> {
        if fields.len() % 2 != 0 {
            return Err(format!(
                "stat result must have an even number of elements, got {}",
                fields.len()
            ));
        }

        let mut stat = Stat::default();
        for pair in fields.chunks_exact(2).rev() {
            let (name, value) = (pair[0].to_string(), &pair[1]);
            match name.as_str() {
                "dev" => stat.dev = field(&name, value)?,
                "ino" => stat.ino = field(&name, value)?,
                "mode" => stat.mode |= field::<u32>(&name, value)?,
                "nlink" => stat.nlink = field(&name, value)?,
                "uid" => stat.uid = field(&name, value)?,
                "gid" => stat.gid = field(&name, value)?,
                "size" => stat.size = field(&name, value)?,
                "atime" => stat.atime = field(&name, value)?,
                "mtime" => stat.mtime = field(&name, value)?,
                "ctime" => stat.ctime = field(&name, value)?,
                "type" => match value.to_string().as_str() {
                    "directory" => stat.mode |= S_IFDIR,
                    "file" => stat.mode |= S_IFREG,
                    _ => {}
                },
                _ => {}
            }
        }
        Ok(stat)
    }

    /// File type from the mode bits, if it is one we model.
    pub fn file_type(&self) -> Option<FileType> {
        match self.mode & S_IFMT {
            S_IFDIR => Some(FileType::Directory),
            S_IFREG => Some(FileType::File),
            _ => None,
        }
    }

    /// Returns true if the type bits mark a directory.
    pub fn is_dir(&self) -> bool {
        self.file_type().is_some_and(|t| t.is_dir())
    }

    /// Returns true if the type bits mark a regular file.
    pub fn is_file(&self) -> bool {
        self.file_type().is_some_and(|t| t.is_file())
    }

    /// Permission bits without the type.
    pub fn perm(&self) -> u32 {
        self.mode & !S_IFMT
    }
}

fn field<T: TryFrom<i64>>(name: &str, value: &Value) -> Result<T, String> {
    let raw = value
        .as_int()
        .ok_or_else(|| format!("expected integer for stat field \"{name}\" but got \"{value}\""))?;
    T::try_from(raw).map_err(|_| format!("stat field \"{name}\" out of range: {raw}"))
}

/// Filesystem verbs a handler is invoked with.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Display, AsRefStr, EnumString)]
#[strum(serialize_all = "lowercase")]
pub enum Verb {
    Stat,
    Access,
    Open,
    MatchInDirectory,
    DeleteFile,
    CreateDirectory,
    RemoveDirectory,
    FileAttributes,
    Utime,
}

bitflags! {
    /// Permission mask for `access`. Empty means existence only.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
    pub struct AccessMode: u32 {
        const EXECUTE = 1;
        const WRITE = 2;
        const READ = 4;
    }
}

bitflags! {
    /// Type filter for `matchindirectory`, as a glob `-types` mask.
    /// Empty means no filter.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
    pub struct GlobTypes: u32 {
        const BLOCK = 1 << 0;
        const CHAR = 1 << 1;
        const DIR = 1 << 2;
        const PIPE = 1 << 3;
        const FILE = 1 << 4;
        const LINK = 1 << 5;
        const SOCK = 1 << 6;
        /// Only the mount point itself.
        const MOUNT = 1 << 7;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::str::FromStr;

    fn fields(items: &[(&str, Value)]) -> Vec<Value> {
        items
            .iter()
            .flat_map(|(k, v)| [Value::from(*k), v.clone()])
            .collect()
    }

    #[test]
    fn test_stat_file_fields() {
        let stat = Stat::from_fields(fields(&[
            ("type", "file".into()),
            ("size", 42i64.into()),
            ("mtime", 1000i64.into()),
        ]))
        .unwrap();
        assert_eq!(stat.size, 42);
        assert_eq!(stat.mtime, 1000);
        assert!(stat.is_file());
        assert!(!stat.is_dir());
    }

    #[test]
    fn test_stat_mode_combines_with_type() {
        let stat = Stat::from_fields(fields(&[
            ("mode", 0o755i64.into()),
            ("type", "directory".into()),
        ]))
        .unwrap();
        assert!(stat.is_dir());
        assert_eq!(stat.perm(), 0o755);
        assert_eq!(stat.mode, S_IFDIR | 0o755);
    }

    #[test]
    fn test_stat_odd_length_rejected() {
        let err = Stat::from_fields(vec!["type".into(), "file".into(), "size".into()]).unwrap_err();
        assert!(err.contains("even"));
    }

    #[test]
    fn test_stat_bad_integer_rejected() {
        let err = Stat::from_fields(fields(&[("size", "huge".into())])).unwrap_err();
        assert!(err.contains("size"));
        assert!(Stat::from_fields(fields(&[("uid", (-1i64).into())])).is_err());
    }

    #[test]
    fn test_stat_ignores_unknown() {
        let stat = Stat::from_fields(fields(&[
            ("colour", "blue".into()),
            ("type", "fifo".into()),
        ]))
        .unwrap();
        assert_eq!(stat, Stat::default());
        assert!(stat.file_type().is_none());
    }

    #[test]
    fn test_stat_first_occurrence_wins() {
        let stat =
            Stat::from_fields(fields(&[("size", 1i64.into()), ("size", 2i64.into())])).unwrap();
        assert_eq!(stat.size, 1);
    }

    #[test]
    fn test_verb_names() {
        assert_eq!(Verb::MatchInDirectory.as_ref(), "matchindirectory");
        assert_eq!(Verb::FileAttributes.to_string(), "fileattributes");
        assert_eq!(Verb::from_str("removedirectory").unwrap(), Verb::RemoveDirectory);
    }

    #[test]
    fn test_masks() {
        let mode = AccessMode::READ | AccessMode::WRITE;
        assert_eq!(mode.bits(), 6);
        let types = GlobTypes::DIR | GlobTypes::FILE;
        assert!(types.contains(GlobTypes::DIR));
        assert!(!types.contains(GlobTypes::MOUNT));
        assert_eq!(GlobTypes::from_bits_truncate(0x1ff).bits(), 0xff);
        assert_eq!(AccessMode::from_bits_truncate(0o17), AccessMode::all());
    }
}
