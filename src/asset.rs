// src/asset.rs

//! Asset lists: the ordered plist directives describing a package's
//! filesystem effects
//!
//! Order is semantically significant: `@cwd`, `@mode`, `@owner`, and
//! `@group` directives modify the interpretation of the file entries that
//! follow them. The integer codes are the stub-database on-disk encoding and
//! must stay stable across releases.

use std::io::{BufRead, BufReader, Read};

use crate::error::{Error, Result};

/// One plist directive kind.
///
/// The discriminants are the `type` column values in the `assets` table of
/// both the live and stub databases.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(i32)]
pub enum AssetType {
    Invalid = 0,
    File = 1,
    Cwd = 2,
    Chmod = 3,
    Chown = 4,
    Chgrp = 5,
    Comment = 6,
    Ignore = 7,
    Name = 8,
    Exec = 9,
    UnExec = 10,
    Src = 11,
    PkgDep = 13,
    Conflicts = 14,
    Mtree = 15,
    DirRm = 16,
    DirRmTry = 17,
    IgnoreInst = 18,
    BuildOption = 19,
    Origin = 20,
    DepOrigin = 21,
    NoInst = 22,
    Display = 23,
    Dir = 24,
    Sample = 25,
    Shell = 26,
    PreExec = 27,
    PreUnExec = 28,
    PostExec = 29,
    PostUnExec = 30,
    FileOwnerMode = 31,
    DirOwnerMode = 32,
    SampleOwnerMode = 33,
    Ldconfig = 34,
    LdconfigLinux = 35,
    RmEmpty = 36,
    GlibSchemas = 37,
    Kld = 38,
    DesktopFileUtils = 39,
    Info = 40,
    Touch = 41,
}

impl AssetType {
    /// Decode a stub-database type code.
    pub fn from_code(code: i32) -> Self {
        match code {
            1 => Self::File,
            2 => Self::Cwd,
            3 => Self::Chmod,
            4 => Self::Chown,
            5 => Self::Chgrp,
            6 => Self::Comment,
            7 => Self::Ignore,
            8 => Self::Name,
            9 => Self::Exec,
            10 => Self::UnExec,
            11 => Self::Src,
            13 => Self::PkgDep,
            14 => Self::Conflicts,
            15 => Self::Mtree,
            16 => Self::DirRm,
            17 => Self::DirRmTry,
            18 => Self::IgnoreInst,
            19 => Self::BuildOption,
            20 => Self::Origin,
            21 => Self::DepOrigin,
            22 => Self::NoInst,
            23 => Self::Display,
            24 => Self::Dir,
            25 => Self::Sample,
            26 => Self::Shell,
            27 => Self::PreExec,
            28 => Self::PreUnExec,
            29 => Self::PostExec,
            30 => Self::PostUnExec,
            31 => Self::FileOwnerMode,
            32 => Self::DirOwnerMode,
            33 => Self::SampleOwnerMode,
            34 => Self::Ldconfig,
            35 => Self::LdconfigLinux,
            36 => Self::RmEmpty,
            37 => Self::GlibSchemas,
            38 => Self::Kld,
            39 => Self::DesktopFileUtils,
            40 => Self::Info,
            41 => Self::Touch,
            _ => Self::Invalid,
        }
    }

    pub fn code(&self) -> i32 {
        *self as i32
    }

    /// Entry types backed by a payload entry in the bundle archive.
    pub fn is_materializable(&self) -> bool {
        matches!(
            self,
            Self::File
                | Self::Sample
                | Self::Shell
                | Self::Info
                | Self::FileOwnerMode
                | Self::SampleOwnerMode
        )
    }

    /// Entry types describing directories.
    pub fn is_directory(&self) -> bool {
        matches!(
            self,
            Self::Dir | Self::DirRm | Self::DirRmTry | Self::DirOwnerMode
        )
    }
}

/// One asset entry: a directive plus its payload and optional per-entry
/// ownership overrides.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Asset {
    pub kind: AssetType,
    /// Path, command, or argument depending on `kind`; empty for bare
    /// directives like `@cwd` with no argument.
    pub data: Option<String>,
    /// SHA-256 hex of the payload, for materializable entries
    pub checksum: Option<String>,
    pub owner: Option<String>,
    pub group: Option<String>,
    pub mode: Option<String>,
}

impl Asset {
    pub fn new(kind: AssetType, data: impl Into<String>) -> Self {
        Self {
            kind,
            data: Some(data.into()),
            checksum: None,
            owner: None,
            group: None,
            mode: None,
        }
    }

    pub fn bare(kind: AssetType) -> Self {
        Self {
            kind,
            data: None,
            checksum: None,
            owner: None,
            group: None,
            mode: None,
        }
    }
}

/// Parse an `@keyword(owner,group,mode)` suffix, returning the keyword and
/// the three optional fields.
fn split_owner_mode(word: &str) -> (&str, Option<String>, Option<String>, Option<String>) {
    let Some(open) = word.find('(') else {
        return (word, None, None, None);
    };
    if !word.ends_with(')') {
        return (word, None, None, None);
    }

    let keyword = &word[..open];
    let inner = &word[open + 1..word.len() - 1];
    let mut parts = inner.splitn(3, ',').map(|p| {
        let p = p.trim();
        if p.is_empty() {
            None
        } else {
            Some(p.to_string())
        }
    });

    let owner = parts.next().flatten();
    let group = parts.next().flatten();
    let mode = parts.next().flatten();
    (keyword, owner, group, mode)
}

/// Parse a plist text stream into an ordered asset list.
///
/// Unknown `@` keywords are preserved as comments rather than rejected, so
/// newer bundles degrade gracefully on older installations.
pub fn parse_plist<R: Read>(reader: R) -> Result<Vec<Asset>> {
    let mut assets = Vec::new();

    for line in BufReader::new(reader).lines() {
        let line = line?;
        let line = line.trim_end();
        if line.is_empty() {
            continue;
        }

        if !line.starts_with('@') {
            assets.push(Asset::new(AssetType::File, line));
            continue;
        }

        let (word, rest) = match line.split_once(char::is_whitespace) {
            Some((w, r)) => (w, r.trim()),
            None => (line, ""),
        };

        let (keyword, owner, group, mode) = split_owner_mode(word);

        let mut push = |kind: AssetType| {
            let mut asset = if rest.is_empty() {
                Asset::bare(kind)
            } else {
                Asset::new(kind, rest)
            };
            asset.owner = owner.clone();
            asset.group = group.clone();
            asset.mode = mode.clone();
            assets.push(asset);
        };

        match keyword {
            "@comment" => push(AssetType::Comment),
            "@cwd" | "@cd" => push(AssetType::Cwd),
            "@mode" => push(AssetType::Chmod),
            "@owner" => push(AssetType::Chown),
            "@group" => push(AssetType::Chgrp),
            "@exec" => push(AssetType::Exec),
            "@unexec" => push(AssetType::UnExec),
            "@preexec" => push(AssetType::PreExec),
            "@postexec" => push(AssetType::PostExec),
            "@preunexec" => push(AssetType::PreUnExec),
            "@postunexec" => push(AssetType::PostUnExec),
            "@dir" => {
                if owner.is_some() || group.is_some() || mode.is_some() {
                    push(AssetType::DirOwnerMode)
                } else {
                    push(AssetType::Dir)
                }
            }
            "@dirrm" => push(AssetType::DirRm),
            "@dirrmtry" => push(AssetType::DirRmTry),
            "@rmempty" => push(AssetType::RmEmpty),
            "@sample" => {
                if owner.is_some() || group.is_some() || mode.is_some() {
                    push(AssetType::SampleOwnerMode)
                } else {
                    push(AssetType::Sample)
                }
            }
            "@shell" => push(AssetType::Shell),
            "@info" => push(AssetType::Info),
            "@ldconfig" => push(AssetType::Ldconfig),
            "@ldconfig-linux" => push(AssetType::LdconfigLinux),
            "@glib-schemas" => push(AssetType::GlibSchemas),
            "@kld" => push(AssetType::Kld),
            "@desktop-file-utils" => push(AssetType::DesktopFileUtils),
            "@touch" => push(AssetType::Touch),
            "@ignore" => push(AssetType::Ignore),
            "@ignore_inst" => push(AssetType::IgnoreInst),
            "@option" => push(AssetType::BuildOption),
            "@origin" => push(AssetType::Origin),
            "@deporigin" => push(AssetType::DepOrigin),
            "@pkgdep" => push(AssetType::PkgDep),
            "@conflicts" => push(AssetType::Conflicts),
            "@name" => push(AssetType::Name),
            "@display" => push(AssetType::Display),
            "@mtree" => push(AssetType::Mtree),
            "@noinst" => push(AssetType::NoInst),
            "@srcdir" => push(AssetType::Src),
            "@file" => {
                if owner.is_some() || group.is_some() || mode.is_some() {
                    push(AssetType::FileOwnerMode)
                } else {
                    push(AssetType::File)
                }
            }
            _ => push(AssetType::Comment),
        }
    }

    Ok(assets)
}

/// Split a `@sample` payload into source and optional explicit destination.
///
/// `@sample etc/foo.conf.sample` copies to `etc/foo.conf` when absent;
/// `@sample etc/foo.conf.sample etc/foo.conf` names the destination
/// explicitly.
pub fn sample_paths(data: &str) -> Result<(String, Option<String>)> {
    let mut parts = data.split_whitespace();
    let src = parts
        .next()
        .ok_or_else(|| Error::Fatal("Empty @sample directive".to_string()))?
        .to_string();
    let dst = parts.next().map(|s| s.to_string());
    Ok((src, dst))
}

/// Derive the active-copy path of a sample file when no explicit destination
/// was given: strip the `.sample` suffix (case-insensitive).
pub fn sample_active_path(src: &str) -> Option<String> {
    let lower = src.to_ascii_lowercase();
    lower.rfind(".sample").map(|pos| src[..pos].to_string())
}
