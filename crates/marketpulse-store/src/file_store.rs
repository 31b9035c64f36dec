//! Per-tab JSON persistence.
//!
//! Layout under `<base>/<job>`:
//!
//! ```text
//! raw/posts_<tab>.json        posts + file metadata
//! summary/summary_<tab>.json  summaries + file metadata
//! reports/report.md           rendered report
//! reports/report_data.json    structured report snapshot
//! ```
//!
//! Saves are merge-and-rewrite: load what's on disk, append what's new,
//! rewrite the whole file through a temp-file rename. Posts dedup on content
//! hash, summaries on post id, so re-saving the same batch is a no-op.

use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;

use marketpulse_core::text::safe_filename;
use marketpulse_core::{CrawlReport, DeduplicationIndex, Post, PostSummary};

use crate::error::StoreError;

const POSTS_PREFIX: &str = "posts_";
const SUMMARY_PREFIX: &str = "summary_";
const REPORT_FILENAME: &str = "report.md";
const REPORT_DATA_FILENAME: &str = "report_data.json";

#[derive(Debug, Serialize, Deserialize)]
struct PostsFileMetadata {
    tab: String,
    job_name: String,
    total_posts: usize,
    new_posts_this_save: usize,
    last_updated: DateTime<Utc>,
}

#[derive(Debug, Serialize, Deserialize)]
struct PostsFile {
    metadata: PostsFileMetadata,
    posts: Vec<serde_json::Value>,
}

#[derive(Debug, Serialize, Deserialize)]
struct SummariesFileMetadata {
    tab: String,
    job_name: String,
    total_summaries: usize,
    new_summaries_this_save: usize,
    last_updated: DateTime<Utc>,
}

#[derive(Debug, Serialize, Deserialize)]
struct SummariesFile {
    metadata: SummariesFileMetadata,
    summaries: Vec<serde_json::Value>,
}

/// Job-scoped file store. One global lock serializes every save so
/// concurrent flushers never interleave a merge-and-rewrite.
pub struct FileStore {
    root: PathBuf,
    job_name: String,
    /// Durable dedup index over full content hashes, warmed from disk.
    index: DeduplicationIndex,
    write_lock: Mutex<()>,
}

impl FileStore {
    /// Open (and create) the storage tree for a job.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Io`] if a directory cannot be created.
    pub fn open(base_dir: &Path, job_name: &str) -> Result<Self, StoreError> {
        let root = base_dir.join(job_name);
        for sub in ["raw", "summary", "reports"] {
            let dir = root.join(sub);
            std::fs::create_dir_all(&dir).map_err(|source| StoreError::Io {
                path: dir.clone(),
                source,
            })?;
        }
        tracing::info!(root = %root.display(), "storage initialized");
        Ok(Self {
            root,
            job_name: job_name.to_owned(),
            index: DeduplicationIndex::new(),
            write_lock: Mutex::new(()),
        })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn posts_path(&self, tab: &str) -> PathBuf {
        self.root
            .join("raw")
            .join(format!("{POSTS_PREFIX}{}.json", safe_filename(tab)))
    }

    fn summaries_path(&self, tab: &str) -> PathBuf {
        self.root
            .join("summary")
            .join(format!("{SUMMARY_PREFIX}{}.json", safe_filename(tab)))
    }

    /// Save posts for a tab, merging with whatever is already on disk.
    /// Returns the number of genuinely new posts written.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] if the file cannot be read back, serialized,
    /// or rewritten.
    pub async fn save_posts(&self, tab: &str, posts: &[Post]) -> Result<usize, StoreError> {
        let _guard = self.write_lock.lock().await;

        // Hashes already marked by an earlier successful save need no disk
        // merge at all.
        let fresh: Vec<&Post> = posts
            .iter()
            .filter(|p| !self.index.seen(&p.content_hash()))
            .collect();
        if fresh.is_empty() {
            tracing::debug!(tab, batch = posts.len(), "batch fully known to index");
            return Ok(0);
        }

        let path = self.posts_path(tab);
        let existing = read_values(&path, "posts").await?;
        let mut existing_hashes: HashSet<String> = HashSet::new();
        for value in &existing {
            if let Ok(post) = serde_json::from_value::<Post>(value.clone()) {
                let hash = post.content_hash();
                // Warm the in-memory index from disk so is_duplicate() sees
                // posts persisted by an earlier run over the same directory.
                self.index.mark(&hash);
                existing_hashes.insert(hash);
            }
        }

        let mut merged = existing;
        let mut new_hashes = Vec::new();
        for post in fresh {
            let hash = post.content_hash();
            // existing_hashes also catches duplicates within this batch.
            if !existing_hashes.insert(hash.clone()) {
                continue;
            }
            merged.push(
                serde_json::to_value(post).map_err(|source| StoreError::Serialize {
                    context: format!("post {}", post.id),
                    source,
                })?,
            );
            new_hashes.push(hash);
        }
        let new_count = new_hashes.len();

        let file = PostsFile {
            metadata: PostsFileMetadata {
                tab: tab.to_owned(),
                job_name: self.job_name.clone(),
                total_posts: merged.len(),
                new_posts_this_save: new_count,
                last_updated: Utc::now(),
            },
            posts: merged,
        };
        write_json(&path, &file, "posts file").await?;

        // Mark only after the write lands, so a failed save can be retried
        // without the batch being mistaken for duplicates.
        for hash in &new_hashes {
            self.index.mark(hash);
        }

        tracing::info!(
            tab,
            new_posts = new_count,
            total = file.metadata.total_posts,
            "saved posts"
        );
        Ok(new_count)
    }

    /// Save summaries for a tab, merging by post id. Returns the number of
    /// new summaries written.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] if the file cannot be read back, serialized,
    /// or rewritten.
    pub async fn save_summaries(
        &self,
        tab: &str,
        summaries: &[PostSummary],
    ) -> Result<usize, StoreError> {
        let _guard = self.write_lock.lock().await;
        let path = self.summaries_path(tab);

        let existing = read_values(&path, "summaries").await?;
        let mut existing_ids: HashSet<String> = HashSet::new();
        for value in &existing {
            if let Ok(summary) = serde_json::from_value::<PostSummary>(value.clone()) {
                existing_ids.insert(summary.post_id);
            }
        }

        let mut merged = existing;
        let mut new_count = 0usize;
        for summary in summaries {
            if !existing_ids.insert(summary.post_id.clone()) {
                continue;
            }
            merged.push(
                serde_json::to_value(summary).map_err(|source| StoreError::Serialize {
                    context: format!("summary for post {}", summary.post_id),
                    source,
                })?,
            );
            new_count += 1;
        }

        let file = SummariesFile {
            metadata: SummariesFileMetadata {
                tab: tab.to_owned(),
                job_name: self.job_name.clone(),
                total_summaries: merged.len(),
                new_summaries_this_save: new_count,
                last_updated: Utc::now(),
            },
            summaries: merged,
        };
        write_json(&path, &file, "summaries file").await?;

        tracing::info!(
            tab,
            new_summaries = new_count,
            total = file.metadata.total_summaries,
            "saved summaries"
        );
        Ok(new_count)
    }

    /// Load a tab's posts. Missing file yields an empty vec; malformed
    /// records are logged and skipped.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Io`] if the file exists but cannot be read.
    pub async fn load_posts(&self, tab: &str) -> Result<Vec<Post>, StoreError> {
        let values = read_values(&self.posts_path(tab), "posts").await?;
        Ok(parse_records(values, "post"))
    }

    /// Load a tab's summaries. Same lenient policy as [`Self::load_posts`].
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Io`] if the file exists but cannot be read.
    pub async fn load_summaries(&self, tab: &str) -> Result<Vec<PostSummary>, StoreError> {
        let values = read_values(&self.summaries_path(tab), "summaries").await?;
        Ok(parse_records(values, "summary"))
    }

    /// Load every tab's posts, keyed by the tab name recorded in each file's
    /// metadata.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Io`] if the raw directory cannot be listed.
    pub async fn load_all_posts(&self) -> Result<HashMap<String, Vec<Post>>, StoreError> {
        let mut all = HashMap::new();
        for path in list_json_files(&self.root.join("raw"), POSTS_PREFIX).await? {
            if let Some(tab) = read_tab_name(&path).await {
                let values = read_values(&path, "posts").await?;
                all.insert(tab, parse_records(values, "post"));
            }
        }
        Ok(all)
    }

    /// Load every tab's summaries, keyed by tab name.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Io`] if the summary directory cannot be listed.
    pub async fn load_all_summaries(&self) -> Result<HashMap<String, Vec<PostSummary>>, StoreError> {
        let mut all = HashMap::new();
        for path in list_json_files(&self.root.join("summary"), SUMMARY_PREFIX).await? {
            if let Some(tab) = read_tab_name(&path).await {
                let values = read_values(&path, "summaries").await?;
                all.insert(tab, parse_records(values, "summary"));
            }
        }
        Ok(all)
    }

    /// Whether this content hash was already persisted during this process's
    /// lifetime.
    #[must_use]
    pub fn is_duplicate(&self, content_hash: &str) -> bool {
        self.index.seen(content_hash)
    }

    /// Write the rendered markdown report. Returns its path.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Io`] on write failure.
    pub async fn save_report(&self, content: &str) -> Result<PathBuf, StoreError> {
        let path = self.root.join("reports").join(REPORT_FILENAME);
        tokio::fs::write(&path, content)
            .await
            .map_err(|source| StoreError::Io {
                path: path.clone(),
                source,
            })?;
        tracing::info!(path = %path.display(), "report saved");
        Ok(path)
    }

    /// Write the structured report snapshot as JSON. Returns its path.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] on serialization or write failure.
    pub async fn save_report_snapshot(&self, report: &CrawlReport) -> Result<PathBuf, StoreError> {
        let path = self.root.join("reports").join(REPORT_DATA_FILENAME);
        write_json(&path, report, "report snapshot").await?;
        tracing::info!(path = %path.display(), "report snapshot saved");
        Ok(path)
    }
}

fn parse_records<T: serde::de::DeserializeOwned>(
    values: Vec<serde_json::Value>,
    kind: &str,
) -> Vec<T> {
    let mut records = Vec::with_capacity(values.len());
    for value in values {
        match serde_json::from_value::<T>(value) {
            Ok(record) => records.push(record),
            Err(e) => tracing::warn!(kind, error = %e, "skipping malformed record"),
        }
    }
    records
}

/// Read the record array under `key` from a store file. Missing file or
/// unparseable JSON yields an empty vec (the next save rewrites the file).
async fn read_values(path: &Path, key: &str) -> Result<Vec<serde_json::Value>, StoreError> {
    match tokio::fs::read_to_string(path).await {
        Ok(content) => match serde_json::from_str::<serde_json::Value>(&content) {
            Ok(mut root) => Ok(root
                .get_mut(key)
                .and_then(|v| v.as_array_mut())
                .map(std::mem::take)
                .unwrap_or_default()),
            Err(e) => {
                tracing::warn!(path = %path.display(), error = %e, "unreadable store file, treating as empty");
                Ok(Vec::new())
            }
        },
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(Vec::new()),
        Err(source) => Err(StoreError::Io {
            path: path.to_path_buf(),
            source,
        }),
    }
}

/// Serialize to pretty JSON and rename into place so readers never observe a
/// half-written file.
async fn write_json<T: Serialize>(path: &Path, value: &T, context: &str) -> Result<(), StoreError> {
    let json = serde_json::to_vec_pretty(value).map_err(|source| StoreError::Serialize {
        context: context.to_owned(),
        source,
    })?;
    let tmp = path.with_extension("json.tmp");
    tokio::fs::write(&tmp, &json)
        .await
        .map_err(|source| StoreError::Io {
            path: tmp.clone(),
            source,
        })?;
    tokio::fs::rename(&tmp, path)
        .await
        .map_err(|source| StoreError::Io {
            path: path.to_path_buf(),
            source,
        })
}

async fn list_json_files(dir: &Path, prefix: &str) -> Result<Vec<PathBuf>, StoreError> {
    let mut entries = tokio::fs::read_dir(dir)
        .await
        .map_err(|source| StoreError::Io {
            path: dir.to_path_buf(),
            source,
        })?;
    let mut paths = Vec::new();
    while let Some(entry) = entries.next_entry().await.map_err(|source| StoreError::Io {
        path: dir.to_path_buf(),
        source,
    })? {
        let name = entry.file_name();
        let name = name.to_string_lossy();
        if name.starts_with(prefix) && name.ends_with(".json") {
            paths.push(entry.path());
        }
    }
    paths.sort();
    Ok(paths)
}

/// The tab name recorded in a store file's metadata. Filenames are not
/// reversible (safe_filename is lossy), so the metadata is authoritative.
async fn read_tab_name(path: &Path) -> Option<String> {
    let content = tokio::fs::read_to_string(path).await.ok()?;
    let root: serde_json::Value = serde_json::from_str(&content).ok()?;
    root.get("metadata")?
        .get("tab")?
        .as_str()
        .map(str::to_owned)
}
