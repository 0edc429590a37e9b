use std::sync::Arc;

use rocket::data::{Data, Limits};
use rocket::form::Form;
use rocket::fs::NamedFile;
use rocket::http::{RawStr, Status};
use rocket::response::content::RawHtml;
use rocket::serde::json::{json, Json, Value};
use rocket::{Request, State};

use log::{debug, error};

use crate::common::{with_id, CameraId, ConfigMap, ConfigRead, ConfigWrite, MovieOp, SnapshotOp};
use crate::config_store::ConfigStore;
use crate::error::{ApiError, ApiResult};
use crate::media::{is_plain_file_name, MediaKind, MediaStore};
use crate::templates::TemplateRenderer;



type Store = State<Arc<dyn ConfigStore>>;
type Media = State<Arc<dyn MediaStore>>;
type Templates = State<Arc<dyn TemplateRenderer>>;

/// Body of a successful write: `add` echoes the new camera, the others answer with an empty 200.
#[derive(Responder)]
pub enum WriteResponse {
	Created(Json<ConfigMap>),
	Done(()),
}

#[derive(Responder)]
pub enum MediaResponse {
	File(NamedFile),
	Listing(Json<Value>),
}

#[derive(FromForm)]
struct AddCameraForm {
	device: String,
}


#[get("/")]
async fn index(store: &Store, templates: &Templates) -> ApiResult<RawHtml<String>> {
	let camera_count = store.camera_ids().await.map_err(ApiError::Store)?.len();

	let mut context = ConfigMap::new();
	context.insert("version".to_string(), json!(env!("CARGO_PKG_VERSION")));
	context.insert("camera_count".to_string(), json!(camera_count));

	let page = templates.render("main.html", &context).await.map_err(ApiError::Render)?;
	Ok(RawHtml(page))
}


#[get("/config/<op>")]
async fn read_main(op: Result<ConfigRead, ApiError>, store: &Store) -> ApiResult<Json<Value>> {
	read_config(store.inner().as_ref(), None, op?).await
}

// Identifier segments are taken raw so the operation token is judged first; see `resolve_camera`.

#[get("/config/<id>/<op>")]
async fn read_camera(id: &str, op: Result<ConfigRead, ApiError>, store: &Store) -> ApiResult<Json<Value>> {
	read_config(store.inner().as_ref(), Some(id), op?).await
}

#[post("/config/<op>?<device>", data = "<data>")]
async fn write_main(op: Result<ConfigWrite, ApiError>, device: Option<String>, data: Data<'_>, limits: &Limits, store: &Store) -> ApiResult<WriteResponse> {
	let op = op?;
	let body = read_body(data, limits).await?;
	write_config(store.inner().as_ref(), None, op, device, &body).await
}

#[post("/config/<id>/<op>?<device>", data = "<data>")]
async fn write_camera(id: &str, op: Result<ConfigWrite, ApiError>, device: Option<String>, data: Data<'_>, limits: &Limits, store: &Store) -> ApiResult<WriteResponse> {
	let op = op?;
	let body = read_body(data, limits).await?;
	write_config(store.inner().as_ref(), Some(id), op, device, &body).await
}

/// Reads a write body under the `json` limit, the one Rocket's `Json` guard applies.
async fn read_body(data: Data<'_>, limits: &Limits) -> ApiResult<String> {
	let limit = limits.get("json").unwrap_or(Limits::JSON);
	let body = data.open(limit).into_string().await
		.map_err(|err| ApiError::MalformedPayload(err.to_string()))?;
	if !body.is_complete() {
		return Err(ApiError::PayloadTooLarge(limit));
	}
	Ok(body.into_inner())
}

async fn read_config(store: &dyn ConfigStore, id: Option<&str>, op: ConfigRead) -> ApiResult<Json<Value>> {
	match op {
		ConfigRead::Get => match id {
			Some(segment) => {
				debug!("getting config for camera {}", segment);
				let id = resolve_camera(store, segment).await?;
				let config = store.camera_config(id).await
					.map_err(ApiError::Store)?
					.ok_or_else(|| ApiError::UnknownCamera(segment.to_string()))?;
				Ok(Json(Value::Object(config)))
			},
			None => {
				debug!("getting main config");
				let config = store.main_config().await.map_err(ApiError::Store)?;
				Ok(Json(Value::Object(config)))
			},
		},
		ConfigRead::List => list_cameras(store).await,
	}
}

async fn list_cameras(store: &dyn ConfigStore) -> ApiResult<Json<Value>> {
	debug!("listing cameras");
	let mut cameras = Vec::new();
	for id in store.camera_ids().await.map_err(ApiError::Store)? {
		// Skips cameras removed since the identifiers were read
		if let Some(config) = store.camera_config(id).await.map_err(ApiError::Store)? {
			cameras.push(Value::Object(with_id(config, id)));
		}
	}
	Ok(Json(json!({ "cameras": cameras })))
}

async fn write_config(store: &dyn ConfigStore, id: Option<&str>, op: ConfigWrite, device: Option<String>, body: &str) -> ApiResult<WriteResponse> {
	match op {
		ConfigWrite::Set => {
			let config = parse_config(body)?;
			match id {
				Some(segment) => {
					debug!("setting config for camera {}", segment);
					let id = resolve_camera(store, segment).await?;
					if !store.set_camera_config(id, config).await.map_err(ApiError::Store)? {
						return Err(ApiError::UnknownCamera(segment.to_string()));
					}
				},
				None => {
					debug!("setting main config");
					store.set_main_config(config).await.map_err(ApiError::Store)?;
				},
			}
			Ok(WriteResponse::Done(()))
		},
		ConfigWrite::Add => {
			debug!("adding new camera");
			let device = device
				.or_else(|| Form::<AddCameraForm>::parse_encoded(RawStr::new(body)).ok().map(|form| form.device))
				.ok_or(ApiError::MissingArgument("device"))?;
			let (id, config) = store.add_camera(&device).await.map_err(ApiError::Store)?;
			Ok(WriteResponse::Created(Json(with_id(config, id))))
		},
		ConfigWrite::Rem => {
			let segment = id.ok_or(ApiError::MissingArgument("camera id"))?;
			debug!("removing camera {}", segment);
			let id = resolve_camera(store, segment).await?;
			if !store.remove_camera(id).await.map_err(ApiError::Store)? {
				return Err(ApiError::UnknownCamera(segment.to_string()));
			}
			Ok(WriteResponse::Done(()))
		},
	}
}

/// Accepts any JSON object, with no further validation of its shape.
fn parse_config(body: &str) -> ApiResult<ConfigMap> {
	serde_json::from_str::<ConfigMap>(body).map_err(|err| {
		error!("could not decode json: {}", err);
		ApiError::MalformedPayload(err.to_string())
	})
}

/// Maps a path segment to a configured camera. Segments that are not identifiers name no camera either.
async fn resolve_camera(store: &dyn ConfigStore, segment: &str) -> ApiResult<CameraId> {
	let unknown = || ApiError::UnknownCamera(segment.to_string());
	let id = segment.parse::<CameraId>().map_err(|_| unknown())?;
	let camera_ids = store.camera_ids().await.map_err(ApiError::Store)?;
	if camera_ids.contains(&id) {
		Ok(id)
	} else {
		Err(unknown())
	}
}


// Ranked below the config routes, whose `/config/<id>/<op>` shape these would otherwise collide with.

#[get("/<id>/snapshot/<op>", rank = 2)]
async fn snapshot(id: &str, op: Result<SnapshotOp, ApiError>, store: &Store, media: &Media) -> ApiResult<MediaResponse> {
	snapshot_op(store.inner().as_ref(), media.inner().as_ref(), id, op?, None).await
}

#[get("/<id>/snapshot/<op>/<filename>", rank = 2)]
async fn snapshot_file(id: &str, op: Result<SnapshotOp, ApiError>, filename: &str, store: &Store, media: &Media) -> ApiResult<MediaResponse> {
	snapshot_op(store.inner().as_ref(), media.inner().as_ref(), id, op?, Some(filename)).await
}

#[get("/<id>/movie/<op>", rank = 2)]
async fn movie(id: &str, op: Result<MovieOp, ApiError>, store: &Store, media: &Media) -> ApiResult<MediaResponse> {
	movie_op(store.inner().as_ref(), media.inner().as_ref(), id, op?, None).await
}

#[get("/<id>/movie/<op>/<filename>", rank = 2)]
async fn movie_file(id: &str, op: Result<MovieOp, ApiError>, filename: &str, store: &Store, media: &Media) -> ApiResult<MediaResponse> {
	movie_op(store.inner().as_ref(), media.inner().as_ref(), id, op?, Some(filename)).await
}

async fn snapshot_op(store: &dyn ConfigStore, media: &dyn MediaStore, segment: &str, op: SnapshotOp, filename: Option<&str>) -> ApiResult<MediaResponse> {
	let id = resolve_camera(store, segment).await?;
	match op {
		SnapshotOp::Current => {
			debug!("getting current snapshot for camera {}", id);
			let entries = media.list(id, MediaKind::Snapshot).await.map_err(ApiError::Media)?;
			let latest = entries.last().ok_or_else(|| ApiError::NoSuchFile("current snapshot".to_string()))?;
			download(media, id, MediaKind::Snapshot, &latest.name).await
		},
		SnapshotOp::List => {
			debug!("listing snapshots for camera {}", id);
			let entries = media.list(id, MediaKind::Snapshot).await.map_err(ApiError::Media)?;
			Ok(MediaResponse::Listing(Json(json!({ "snapshots": entries }))))
		},
		SnapshotOp::Download => {
			let filename = filename.ok_or(ApiError::MissingArgument("filename"))?;
			debug!("downloading snapshot {} of camera {}", filename, id);
			download(media, id, MediaKind::Snapshot, filename).await
		},
	}
}

async fn movie_op(store: &dyn ConfigStore, media: &dyn MediaStore, segment: &str, op: MovieOp, filename: Option<&str>) -> ApiResult<MediaResponse> {
	let id = resolve_camera(store, segment).await?;
	match op {
		MovieOp::List => {
			debug!("listing movies for camera {}", id);
			let entries = media.list(id, MediaKind::Movie).await.map_err(ApiError::Media)?;
			Ok(MediaResponse::Listing(Json(json!({ "movies": entries }))))
		},
		MovieOp::Download => {
			let filename = filename.ok_or(ApiError::MissingArgument("filename"))?;
			debug!("downloading movie {} of camera {}", filename, id);
			download(media, id, MediaKind::Movie, filename).await
		},
	}
}

async fn download(media: &dyn MediaStore, id: CameraId, kind: MediaKind, filename: &str) -> ApiResult<MediaResponse> {
	if !is_plain_file_name(filename) {
		return Err(ApiError::InvalidFileName(filename.to_string()));
	}
	let path = media.locate(id, kind, filename).await
		.map_err(ApiError::Media)?
		.ok_or_else(|| ApiError::NoSuchFile(filename.to_string()))?;
	let file = NamedFile::open(&path).await
		.map_err(|err| ApiError::Media(anyhow::Error::new(err).context(format!("Failed to open {}", path.display()))))?;
	Ok(MediaResponse::File(file))
}


#[catch(404)]
fn not_found() -> Value {
	json!({
		"status": "error",
		"reason": "Resource was not found."
	})
}

#[catch(default)]
fn default_catcher(status: Status, _request: &Request) -> Value {
	json!({
		"status": "error",
		"reason": status.reason().unwrap_or("Request failed."),
	})
}



pub fn stage(store: Arc<dyn ConfigStore>, media: Arc<dyn MediaStore>, templates: Arc<dyn TemplateRenderer>) -> rocket::fairing::AdHoc {
	rocket::fairing::AdHoc::on_ignite("Camera console", move |rocket| async move {
		rocket
			.manage(store)
			.manage(media)
			.manage(templates)
			.register("/", catchers![not_found, default_catcher])
			.mount("/", routes![
				index,
				read_main, read_camera, write_main, write_camera,
				snapshot, snapshot_file, movie, movie_file,
			])
	})
}
