use std::collections::BTreeMap;
use std::fs::File;
use std::io::{BufReader, ErrorKind, Read};
use std::path::{Path, PathBuf};

use anyhow::Context;
use tokio::io::AsyncWriteExt;
use tokio::sync::RwLock;

use log::{debug, info, warn};
use serde_json::json;

use crate::common::{CameraId, ConfigMap};



/// Durable access to the main config and the per-camera configs.
///
/// Implementations own their own consistency; callers never cache what they read.
#[rocket::async_trait]
pub trait ConfigStore: Send + Sync {
	async fn main_config(&self) -> anyhow::Result<ConfigMap>;
	async fn set_main_config(&self, config: ConfigMap) -> anyhow::Result<()>;

	/// Identifiers of all configured cameras, ascending.
	async fn camera_ids(&self) -> anyhow::Result<Vec<CameraId>>;
	/// `None` if the camera is not configured.
	async fn camera_config(&self, id: CameraId) -> anyhow::Result<Option<ConfigMap>>;
	/// Replaces the camera's config wholesale. `false` if the camera is not configured.
	async fn set_camera_config(&self, id: CameraId, config: ConfigMap) -> anyhow::Result<bool>;

	/// Creates a camera for `device`, returning its freshly assigned identifier and initial config.
	async fn add_camera(&self, device: &str) -> anyhow::Result<(CameraId, ConfigMap)>;
	/// Removing an identifier that is not present does nothing and answers `false`.
	async fn remove_camera(&self, id: CameraId) -> anyhow::Result<bool>;
}


#[derive(Default)]
#[derive(Debug, Clone)]
#[derive(Serialize, Deserialize)]
struct ConfigDocument {
	#[serde(default)]
	main: ConfigMap,
	#[serde(default)]
	cameras: BTreeMap<CameraId, ConfigMap>,
}

/// Config store persisted as a single YAML document.
pub struct YamlConfigStore {
	path: PathBuf,
	// tokio's RwLock so readers don't block each other, and a waiting writer holds off new readers.
	// Writers keep the lock across the file write, so mutations are serialized.
	document: RwLock<ConfigDocument>,
}

impl YamlConfigStore {
	/// Loads the document at `path`. A missing file starts an empty store; it is created on the first write.
	pub fn open<P: AsRef<Path>>(path: P) -> anyhow::Result<Self> {
		let path = path.as_ref().to_path_buf();
		let document = read_document(&path)?;
		info!("Loaded {} camera(s) from {}", document.cameras.len(), path.display());
		Ok(Self {
			path,
			document: RwLock::new(document),
		})
	}
}

fn read_document(path: &Path) -> anyhow::Result<ConfigDocument> {
	match File::open(path) {
		Ok(file) => {
			let mut contents = String::new();
			BufReader::new(file).read_to_string(&mut contents)
				.with_context(|| format!("Failed to read config file {}", path.display()))?;
			if contents.trim().is_empty() {
				return Ok(ConfigDocument::default());
			}
			serde_yaml::from_str(&contents)
				.with_context(|| format!("Failed to parse config file {}", path.display()))
		},
		Err(err) if err.kind() == ErrorKind::NotFound => {
			// First time running (before config file is created) we should encounter this, so not necessarily an error
			warn!("Config file {} does not exist yet; starting empty", path.display());
			Ok(ConfigDocument::default())
		},
		Err(err) => {
			Err(err).with_context(|| format!("Failed to open config file {}", path.display()))
		},
	}
}

async fn write_document(path: &Path, document: &ConfigDocument) -> anyhow::Result<()> {
	if let Some(parent) = path.parent() {
		if !parent.as_os_str().is_empty() {
			tokio::fs::create_dir_all(parent).await
				.with_context(|| format!("Failed to create directory {}", parent.display()))?;
		}
	}

	let yaml = serde_yaml::to_string(document)?;
	let file = tokio::fs::File::create(path).await
		.with_context(|| format!("Failed to create config file {}", path.display()))?;
	let mut writer = tokio::io::BufWriter::new(file);
	writer.write_all(yaml.as_bytes()).await?;
	writer.flush().await?;
	debug!("Wrote config file {}", path.display());
	Ok(())
}

fn next_camera_id(cameras: &BTreeMap<CameraId, ConfigMap>) -> CameraId {
	// Keys are ordered, so the last one is the highest
	cameras.keys().next_back().map_or(1, |highest_id| highest_id + 1)
}

fn initial_camera_config(id: CameraId, device: &str) -> ConfigMap {
	let mut config = ConfigMap::new();
	config.insert("@name".to_string(), json!(format!("Camera {}", id)));
	config.insert("@enabled".to_string(), json!(true));
	config.insert("@proto".to_string(), json!("v4l2"));
	config.insert("videodevice".to_string(), json!(device));
	config.insert("width".to_string(), json!(352));
	config.insert("height".to_string(), json!(288));
	config.insert("framerate".to_string(), json!(2));
	config
}

#[rocket::async_trait]
impl ConfigStore for YamlConfigStore {
	async fn main_config(&self) -> anyhow::Result<ConfigMap> {
		Ok(self.document.read().await.main.clone())
	}

	async fn set_main_config(&self, config: ConfigMap) -> anyhow::Result<()> {
		let mut document = self.document.write().await;
		let mut updated = document.clone();
		updated.main = config;
		write_document(&self.path, &updated).await?;
		*document = updated;
		Ok(())
	}

	async fn camera_ids(&self) -> anyhow::Result<Vec<CameraId>> {
		Ok(self.document.read().await.cameras.keys().copied().collect())
	}

	async fn camera_config(&self, id: CameraId) -> anyhow::Result<Option<ConfigMap>> {
		Ok(self.document.read().await.cameras.get(&id).cloned())
	}

	async fn set_camera_config(&self, id: CameraId, config: ConfigMap) -> anyhow::Result<bool> {
		let mut document = self.document.write().await;
		if !document.cameras.contains_key(&id) {
			return Ok(false);
		}
		let mut updated = document.clone();
		updated.cameras.insert(id, config);
		write_document(&self.path, &updated).await?;
		*document = updated;
		Ok(true)
	}

	async fn add_camera(&self, device: &str) -> anyhow::Result<(CameraId, ConfigMap)> {
		let mut document = self.document.write().await;
		let id = next_camera_id(&document.cameras);
		let config = initial_camera_config(id, device);
		let mut updated = document.clone();
		updated.cameras.insert(id, config.clone());
		write_document(&self.path, &updated).await?;
		*document = updated;
		info!("Added camera {} for device {}", id, device);
		Ok((id, config))
	}

	async fn remove_camera(&self, id: CameraId) -> anyhow::Result<bool> {
		let mut document = self.document.write().await;
		if !document.cameras.contains_key(&id) {
			return Ok(false);
		}
		let mut updated = document.clone();
		updated.cameras.remove(&id);
		write_document(&self.path, &updated).await?;
		*document = updated;
		info!("Removed camera {}", id);
		Ok(true)
	}
}



#[cfg(test)]
mod tests {
	use super::*;
	use tempfile::tempdir;

	fn block_on<F: std::future::Future>(future: F) -> F::Output {
		rocket::tokio::runtime::Builder::new_current_thread()
			.enable_all()
			.build()
			.unwrap()
			.block_on(future)
	}

	#[test]
	fn missing_file_starts_empty() {
		let dir = tempdir().unwrap();
		let store = YamlConfigStore::open(dir.path().join("config.yaml")).unwrap();
		block_on(async {
			assert!(store.camera_ids().await.unwrap().is_empty());
			assert!(store.main_config().await.unwrap().is_empty());
		});
	}

	#[test]
	fn ids_are_assigned_past_the_highest() {
		let dir = tempdir().unwrap();
		let store = YamlConfigStore::open(dir.path().join("config.yaml")).unwrap();
		block_on(async {
			let (first, config) = store.add_camera("/dev/video0").await.unwrap();
			let (second, _) = store.add_camera("/dev/video1").await.unwrap();
			assert_eq!((first, second), (1, 2));
			assert_eq!(config.get("videodevice"), Some(&json!("/dev/video0")));
			assert!(!config.contains_key("@id"));

			assert!(store.remove_camera(first).await.unwrap());
			let (third, _) = store.add_camera("/dev/video2").await.unwrap();
			assert_eq!(third, 3);
			assert_eq!(store.camera_ids().await.unwrap(), vec![2, 3]);
		});
	}

	#[test]
	fn removing_absent_camera_is_a_no_op() {
		let dir = tempdir().unwrap();
		let path = dir.path().join("config.yaml");
		let store = YamlConfigStore::open(&path).unwrap();
		block_on(async {
			assert!(!store.remove_camera(9).await.unwrap());
		});
		// Nothing changed, so nothing was written
		assert!(!path.exists());
	}

	#[test]
	fn changes_survive_reopen() {
		let dir = tempdir().unwrap();
		let path = dir.path().join("nested").join("config.yaml");
		let mut main = ConfigMap::new();
		main.insert("@admin_username".to_string(), json!("admin"));

		let store = YamlConfigStore::open(&path).unwrap();
		let id = block_on(async {
			store.set_main_config(main.clone()).await.unwrap();
			let (id, _) = store.add_camera("/dev/video0").await.unwrap();
			let mut camera = ConfigMap::new();
			camera.insert("width".to_string(), json!(640));
			camera.insert("motion".to_string(), json!({"threshold": 1500, "masks": [1, 2]}));
			assert!(store.set_camera_config(id, camera).await.unwrap());
			id
		});

		let reopened = YamlConfigStore::open(&path).unwrap();
		block_on(async {
			assert_eq!(reopened.main_config().await.unwrap(), main);
			let camera = reopened.camera_config(id).await.unwrap().unwrap();
			assert_eq!(camera.get("width"), Some(&json!(640)));
			assert_eq!(camera.get("motion"), Some(&json!({"threshold": 1500, "masks": [1, 2]})));
			assert!(!camera.contains_key("videodevice"));
		});
	}

	#[test]
	fn absent_camera_is_reported_not_raised() {
		let dir = tempdir().unwrap();
		let path = dir.path().join("config.yaml");
		let store = YamlConfigStore::open(&path).unwrap();
		block_on(async {
			assert_eq!(store.camera_config(4).await.unwrap(), None);
			assert!(!store.set_camera_config(4, ConfigMap::new()).await.unwrap());
			assert!(store.camera_ids().await.unwrap().is_empty());
		});
		assert!(!path.exists());
	}

	#[test]
	fn unparsable_file_is_an_error() {
		let dir = tempdir().unwrap();
		let path = dir.path().join("config.yaml");
		std::fs::write(&path, "cameras: [not, a, map").unwrap();
		assert!(YamlConfigStore::open(&path).is_err());
	}

	#[test]
	fn empty_file_is_an_empty_store() {
		let dir = tempdir().unwrap();
		let path = dir.path().join("config.yaml");
		std::fs::write(&path, "").unwrap();
		let store = YamlConfigStore::open(&path).unwrap();
		block_on(async {
			assert!(store.camera_ids().await.unwrap().is_empty());
		});
	}
}
