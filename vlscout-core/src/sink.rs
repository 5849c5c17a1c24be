//! Persisted, sorted, deduplicated URL lists, one file per tag.

use crate::error::{Result, ScoutError};
use crate::verdict::Verdict;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeSet, HashMap};
use std::fs;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use tracing::{debug, info};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Tag {
    Ru,
    Global,
    Manual,
}

impl Tag {
    pub const ALL: [Tag; 3] = [Tag::Ru, Tag::Global, Tag::Manual];

    pub fn file_name(&self) -> &'static str {
        match self {
            Tag::Ru => "verified_ru.txt",
            Tag::Global => "verified_global.txt",
            Tag::Manual => "manual_review.txt",
        }
    }

    pub fn for_verdict(verdict: &Verdict) -> Option<Self> {
        match verdict {
            Verdict::Ru => Some(Tag::Ru),
            Verdict::Global => Some(Tag::Global),
            Verdict::Manual => Some(Tag::Manual),
            _ => None,
        }
    }
}

impl FromStr for Tag {
    type Err = ScoutError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_lowercase().as_str() {
            "ru" => Ok(Tag::Ru),
            "global" | "gl" => Ok(Tag::Global),
            "manual" => Ok(Tag::Manual),
            _ => Err(ScoutError::Config(format!("unknown list '{}'", s))),
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MergeStats {
    /// URLs that were not in the list before.
    pub added: usize,
    pub total: usize,
}

pub struct ResultSink {
    dir: PathBuf,
}

impl ResultSink {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn path(&self, tag: Tag) -> PathBuf {
        self.dir.join(tag.file_name())
    }

    /// Current contents of a tag's list; a missing file is an empty list.
    pub fn load(&self, tag: Tag) -> Result<BTreeSet<String>> {
        let path = self.path(tag);
        if !path.exists() {
            return Ok(BTreeSet::new());
        }
        Ok(parse_list(&fs::read_to_string(&path)?))
    }

    /// Union `urls` into the tag's list. Merging the same set twice is a no-op.
    ///
    /// The file is rewritten whenever it differs from its sorted, deduplicated
    /// form, even if nothing was added.
    pub fn merge<I, S>(&self, tag: Tag, urls: I) -> Result<MergeStats>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let path = self.path(tag);
        let on_disk = if path.exists() {
            Some(fs::read_to_string(&path)?)
        } else {
            None
        };
        let mut existing = on_disk.as_deref().map(parse_list).unwrap_or_default();
        let before = existing.len();
        for url in urls {
            let url = url.as_ref().trim();
            if !url.is_empty() {
                existing.insert(url.to_string());
            }
        }

        let stats = MergeStats {
            added: existing.len() - before,
            total: existing.len(),
        };
        let rendered = render(&existing);
        if on_disk.as_deref() != Some(rendered.as_str()) {
            self.write(tag, &rendered)?;
        }
        debug!("{}: +{} ({} total)", tag.file_name(), stats.added, stats.total);
        Ok(stats)
    }

    /// Overwrite a tag's list, keeping the previous file as `<file>.bak`.
    pub fn replace<I, S>(&self, tag: Tag, urls: I) -> Result<MergeStats>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let path = self.path(tag);
        let previous = self.load(tag)?;
        if path.exists() {
            let backup = backup_path(&path);
            fs::copy(&path, &backup)?;
            info!("Backed up {} to {}", path.display(), backup.display());
        }

        let kept: BTreeSet<String> = urls
            .into_iter()
            .map(|u| u.as_ref().trim().to_string())
            .filter(|u| !u.is_empty())
            .collect();
        self.write(tag, &render(&kept))?;

        Ok(MergeStats {
            added: kept.difference(&previous).count(),
            total: kept.len(),
        })
    }

    pub fn merge_all(&self, batches: &HashMap<Tag, Vec<String>>) -> Result<HashMap<Tag, MergeStats>> {
        let mut stats = HashMap::new();
        for tag in Tag::ALL {
            let urls = batches.get(&tag).map(Vec::as_slice).unwrap_or_default();
            stats.insert(tag, self.merge(tag, urls)?);
        }
        Ok(stats)
    }

    fn write(&self, tag: Tag, content: &str) -> Result<()> {
        fs::create_dir_all(&self.dir)?;
        let path = self.path(tag);
        let tmp = path.with_extension("txt.tmp");
        fs::write(&tmp, content)?;
        fs::rename(&tmp, &path)?;
        Ok(())
    }
}

/// One URL per line, sorted, newline-terminated.
fn render(urls: &BTreeSet<String>) -> String {
    let mut content = urls.iter().map(String::as_str).collect::<Vec<_>>().join("\n");
    if !content.is_empty() {
        content.push('\n');
    }
    content
}

fn parse_list(content: &str) -> BTreeSet<String> {
    content
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty() && !line.starts_with('#'))
        .map(str::to_string)
        .collect()
}

fn backup_path(path: &Path) -> PathBuf {
    let mut name = path.as_os_str().to_owned();
    name.push(".bak");
    PathBuf::from(name)
}
