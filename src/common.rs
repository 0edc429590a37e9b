use rocket::request::FromParam;

use crate::error::ApiError;



pub type CameraId = u64;
pub type ConfigMap = serde_json::Map<String, serde_json::Value>;

/// Name of the view-only field carrying a camera's identifier in responses.
pub const ID_FIELD: &str = "@id";

pub fn with_id(mut config: ConfigMap, id: CameraId) -> ConfigMap {
	config.insert(ID_FIELD.to_string(), id.into());
	config
}


// Operation tokens, one closed set per resource group and verb.
// Handlers take `Result<Op, ApiError>` so an unrecognised token becomes a 400 rather than a routing miss.

#[derive(Clone, Copy)]
#[derive(Debug, PartialEq, Eq)]
pub enum ConfigRead {
	Get,
	List,
}

#[derive(Clone, Copy)]
#[derive(Debug, PartialEq, Eq)]
pub enum ConfigWrite {
	Set,
	Add,
	Rem,
}

#[derive(Clone, Copy)]
#[derive(Debug, PartialEq, Eq)]
pub enum SnapshotOp {
	Current,
	List,
	Download,
}

#[derive(Clone, Copy)]
#[derive(Debug, PartialEq, Eq)]
pub enum MovieOp {
	List,
	Download,
}

impl<'a> FromParam<'a> for ConfigRead {
	type Error = ApiError;

	fn from_param(param: &'a str) -> Result<Self, Self::Error> {
		match param {
			"get" => Ok(ConfigRead::Get),
			"list" => Ok(ConfigRead::List),
			other => Err(ApiError::UnknownOperation(other.to_string())),
		}
	}
}

impl<'a> FromParam<'a> for ConfigWrite {
	type Error = ApiError;

	fn from_param(param: &'a str) -> Result<Self, Self::Error> {
		match param {
			"set" => Ok(ConfigWrite::Set),
			"add" => Ok(ConfigWrite::Add),
			"rem" => Ok(ConfigWrite::Rem),
			other => Err(ApiError::UnknownOperation(other.to_string())),
		}
	}
}

impl<'a> FromParam<'a> for SnapshotOp {
	type Error = ApiError;

	fn from_param(param: &'a str) -> Result<Self, Self::Error> {
		match param {
			"current" => Ok(SnapshotOp::Current),
			"list" => Ok(SnapshotOp::List),
			"download" => Ok(SnapshotOp::Download),
			other => Err(ApiError::UnknownOperation(other.to_string())),
		}
	}
}

impl<'a> FromParam<'a> for MovieOp {
	type Error = ApiError;

	fn from_param(param: &'a str) -> Result<Self, Self::Error> {
		match param {
			"list" => Ok(MovieOp::List),
			"download" => Ok(MovieOp::Download),
			other => Err(ApiError::UnknownOperation(other.to_string())),
		}
	}
}



#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn tokens_are_scoped_to_their_verb() {
		assert_eq!(ConfigRead::from_param("list").unwrap(), ConfigRead::List);
		assert!(ConfigRead::from_param("set").is_err());
		assert_eq!(ConfigWrite::from_param("rem").unwrap(), ConfigWrite::Rem);
		assert!(ConfigWrite::from_param("get").is_err());
	}

	#[test]
	fn movies_have_no_current() {
		assert_eq!(SnapshotOp::from_param("current").unwrap(), SnapshotOp::Current);
		match MovieOp::from_param("current") {
			Err(ApiError::UnknownOperation(token)) => assert_eq!(token, "current"),
			other => panic!("unexpected {:?}", other),
		}
	}

	#[test]
	fn with_id_adds_view_field() {
		let mut config = ConfigMap::new();
		config.insert("width".to_string(), 640.into());
		let viewed = with_id(config, 7);
		assert_eq!(viewed.get(ID_FIELD), Some(&serde_json::Value::from(7)));
		assert_eq!(viewed.get("width"), Some(&serde_json::Value::from(640)));
	}
}
