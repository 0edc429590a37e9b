use std::fs::Metadata;
use std::io::{self, ErrorKind};
use std::path::{Path, PathBuf};
use std::time::UNIX_EPOCH;

use anyhow::Context;
use log::debug;

use crate::common::CameraId;



#[derive(Clone, Copy)]
#[derive(Debug, PartialEq, Eq)]
pub enum MediaKind {
	Snapshot,
	Movie,
}

impl MediaKind {
	fn dir_name(self) -> &'static str {
		match self {
			MediaKind::Snapshot => "snapshots",
			MediaKind::Movie => "movies",
		}
	}
}

#[derive(Clone)]
#[derive(Debug, PartialEq, Eq)]
#[derive(Serialize)]
pub struct MediaEntry {
	pub name: String,
	pub size: u64,
	/// Seconds since the Unix epoch.
	pub modified: u64,
}

/// Recorded snapshots and movies, per camera.
#[rocket::async_trait]
pub trait MediaStore: Send + Sync {
	/// Files of one kind for a camera, oldest first.
	async fn list(&self, camera_id: CameraId, kind: MediaKind) -> anyhow::Result<Vec<MediaEntry>>;

	/// Path of a named file, or `None` if the camera has no such file.
	/// `filename` must already be a plain file name (see [`is_plain_file_name`]).
	async fn locate(&self, camera_id: CameraId, kind: MediaKind, filename: &str) -> anyhow::Result<Option<PathBuf>>;
}

/// True for a bare, visible file name: no separators, no `..`, no leading dot.
pub fn is_plain_file_name(name: &str) -> bool {
	!name.is_empty()
		&& !name.starts_with('.')
		&& !name.contains(['/', '\\'])
		&& Path::new(name).file_name().map_or(false, |file_name| file_name == name)
}


/// Media laid out as `<root>/<camera id>/snapshots/` and `<root>/<camera id>/movies/`.
pub struct DirMediaStore {
	root: PathBuf,
}

impl DirMediaStore {
	pub fn new<P: Into<PathBuf>>(root: P) -> Self {
		Self { root: root.into() }
	}

	fn dir(&self, camera_id: CameraId, kind: MediaKind) -> PathBuf {
		self.root.join(camera_id.to_string()).join(kind.dir_name())
	}
}

/// Listing entry for a directory member, `None` for anything that is not (or no longer) a regular file.
fn media_entry(name: String, metadata: io::Result<Metadata>, path: &Path) -> anyhow::Result<Option<MediaEntry>> {
	let metadata = match metadata {
		Ok(metadata) => metadata,
		// Removed since read_dir saw it
		Err(err) if err.kind() == ErrorKind::NotFound => return Ok(None),
		Err(err) => {
			return Err(err).with_context(|| format!("Failed to stat {}", path.display()));
		},
	};
	if !metadata.is_file() {
		return Ok(None);
	}
	let modified = metadata.modified()
		.ok()
		.and_then(|time| time.duration_since(UNIX_EPOCH).ok())
		.map_or(0, |elapsed| elapsed.as_secs());
	Ok(Some(MediaEntry {
		name,
		size: metadata.len(),
		modified,
	}))
}

#[rocket::async_trait]
impl MediaStore for DirMediaStore {
	async fn list(&self, camera_id: CameraId, kind: MediaKind) -> anyhow::Result<Vec<MediaEntry>> {
		let dir = self.dir(camera_id, kind);
		let mut read_dir = match tokio::fs::read_dir(&dir).await {
			Ok(read_dir) => read_dir,
			Err(err) if err.kind() == ErrorKind::NotFound => {
				debug!("No media directory {}", dir.display());
				return Ok(Vec::new());
			},
			Err(err) => {
				return Err(err).with_context(|| format!("Failed to read {}", dir.display()));
			},
		};

		let mut entries = Vec::new();
		while let Some(entry) = read_dir.next_entry().await? {
			let name = match entry.file_name().into_string() {
				Ok(name) => name,
				// Not addressable through a URL segment anyway
				Err(_) => continue,
			};
			if name.starts_with('.') {
				continue;
			}
			if let Some(found) = media_entry(name, entry.metadata().await, &entry.path())? {
				entries.push(found);
			}
		}

		entries.sort_by(|a, b| a.modified.cmp(&b.modified).then_with(|| a.name.cmp(&b.name)));
		Ok(entries)
	}

	async fn locate(&self, camera_id: CameraId, kind: MediaKind, filename: &str) -> anyhow::Result<Option<PathBuf>> {
		let path = self.dir(camera_id, kind).join(filename);
		match tokio::fs::metadata(&path).await {
			Ok(metadata) if metadata.is_file() => Ok(Some(path)),
			Ok(_) => Ok(None),
			Err(err) if err.kind() == ErrorKind::NotFound => Ok(None),
			Err(err) => Err(err).with_context(|| format!("Failed to stat {}", path.display())),
		}
	}
}
