use rocket::http::Status;
use rocket::response::{self, Responder};
use rocket::serde::json::{json, Json};
use rocket::Request;

use log::{warn, error};

use rocket::data::ByteUnit;



pub type ApiResult<T> = Result<T, ApiError>;

/// Failures a request can end in. Each maps to one HTTP status; none are retried.
#[derive(Debug, thiserror::Error)]
pub enum ApiError {
	#[error("unknown operation: {0}")]
	UnknownOperation(String),

	/// Holds the path segment as sent, which need not even parse as an identifier.
	#[error("no such camera: {0}")]
	UnknownCamera(String),

	/// Body did not decode to a JSON object. Raised before the store is touched.
	#[error("could not decode json: {0}")]
	MalformedPayload(String),

	#[error("payload larger than {0}")]
	PayloadTooLarge(ByteUnit),

	#[error("missing argument: {0}")]
	MissingArgument(&'static str),

	#[error("invalid file name: {0}")]
	InvalidFileName(String),

	#[error("no such file: {0}")]
	NoSuchFile(String),

	#[error("configuration store failure: {0:#}")]
	Store(anyhow::Error),

	#[error("media store failure: {0:#}")]
	Media(anyhow::Error),

	#[error("template rendering failed: {0:#}")]
	Render(anyhow::Error),
}

impl ApiError {
	pub fn status(&self) -> Status {
		match self {
			ApiError::UnknownOperation(_)
			| ApiError::MalformedPayload(_)
			| ApiError::MissingArgument(_)
			| ApiError::InvalidFileName(_) => Status::BadRequest,
			ApiError::UnknownCamera(_)
			| ApiError::NoSuchFile(_) => Status::NotFound,
			ApiError::PayloadTooLarge(_) => Status::PayloadTooLarge,
			ApiError::Store(_)
			| ApiError::Media(_)
			| ApiError::Render(_) => Status::InternalServerError,
		}
	}
}

impl<'r> Responder<'r, 'static> for ApiError {
	fn respond_to(self, request: &'r Request<'_>) -> response::Result<'static> {
		let status = self.status();
		if status.code >= 500 {
			error!("{} {} failed: {}", request.method(), request.uri(), self);
		} else {
			warn!("{} {} rejected: {}", request.method(), request.uri(), self);
		}

		let body = json!({
			"status": "error",
			"reason": self.to_string(),
		});
		(status, Json(body)).respond_to(request)
	}
}



#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn statuses_follow_taxonomy() {
		assert_eq!(ApiError::UnknownOperation("bogus".into()).status(), Status::BadRequest);
		assert_eq!(ApiError::MalformedPayload("eof".into()).status(), Status::BadRequest);
		assert_eq!(ApiError::UnknownCamera("3".into()).status(), Status::NotFound);
		assert_eq!(ApiError::PayloadTooLarge(rocket::data::Limits::JSON).status(), Status::PayloadTooLarge);
		assert_eq!(ApiError::Store(anyhow::anyhow!("disk full")).status(), Status::InternalServerError);
	}

	#[test]
	fn messages_are_human_readable() {
		assert_eq!(ApiError::UnknownCamera("42".into()).to_string(), "no such camera: 42");
		assert_eq!(ApiError::MissingArgument("device").to_string(), "missing argument: device");
	}
}
