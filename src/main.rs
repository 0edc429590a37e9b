#[macro_use] extern crate rocket;
#[macro_use] extern crate serde_derive;

use std::sync::Arc;

use anyhow::Context;
use clap::{Command, Arg, ArgAction};
use log::info;

use crate::config_store::YamlConfigStore;
use crate::media::DirMediaStore;
use crate::templates::DirTemplates;

mod common;
mod config_store;
mod error;
mod media;
mod rest_api;
mod templates;



fn cli() -> Command {
	Command::new("camera-console")
		.version(env!("CARGO_PKG_VERSION"))
		.about("Web console for camera configuration, snapshots and movies.")
		.arg(
			Arg::new("config")
				.short('c')
				.long("config")
				.value_name("FILE")
				.default_value("/var/lib/camera-console/config.yaml")
				.action(ArgAction::Set)
				.help("YAML file holding the main and per-camera configuration")
		)
		.arg(
			Arg::new("media-dir")
				.short('m')
				.long("media-dir")
				.value_name("DIR")
				.default_value("/var/lib/camera-console/media")
				.action(ArgAction::Set)
				.help("Directory with per-camera snapshots/ and movies/")
		)
		.arg(
			Arg::new("templates-dir")
				.short('t')
				.long("templates-dir")
				.value_name("DIR")
				.default_value("templates")
				.action(ArgAction::Set)
				.help("Directory with HTML templates")
		)
		.arg(
			Arg::new("debug")
				.short('d')
				.long("debug")
				.action(ArgAction::SetTrue)
				.help("Enable debug logging")
		)
}

fn path_arg<'a>(matches: &'a clap::ArgMatches, name: &str) -> &'a str {
	// All path arguments carry defaults
	matches.get_one::<String>(name).map(|v| v.as_str()).unwrap_or_default()
}


#[rocket::main]
async fn main() -> anyhow::Result<()> {
	let matches = cli().get_matches();

	let config_file = path_arg(&matches, "config");
	let media_dir = path_arg(&matches, "media-dir");
	let templates_dir = path_arg(&matches, "templates-dir");

	// Rocket owns the logger (installed by rocket::custom); --debug only raises its level
	let mut figment = rocket::Config::figment();
	if matches.get_flag("debug") {
		figment = figment.merge(("log_level", "debug"));
	}

	let rocket = rocket::custom(figment);

	let store = YamlConfigStore::open(config_file)
		.with_context(|| format!("Failed to open configuration store {}", config_file))?;
	info!("Serving media from {} and templates from {}", media_dir, templates_dir);

	rocket
		.attach(rest_api::stage(
			Arc::new(store),
			Arc::new(DirMediaStore::new(media_dir)),
			Arc::new(DirTemplates::new(templates_dir)),
		))
		.launch()
		.await?;

	anyhow::Ok(())
}


#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn cli_defaults() {
		let matches = cli().try_get_matches_from(["camera-console"]).unwrap();
		assert_eq!(path_arg(&matches, "config"), "/var/lib/camera-console/config.yaml");
		assert_eq!(path_arg(&matches, "templates-dir"), "templates");
		assert!(!matches.get_flag("debug"));
	}

	#[test]
	fn cli_overrides() {
		let matches = cli()
			.try_get_matches_from(["camera-console", "-c", "/tmp/c.yaml", "--media-dir", "/srv/media", "-d"])
			.unwrap();
		assert_eq!(path_arg(&matches, "config"), "/tmp/c.yaml");
		assert_eq!(path_arg(&matches, "media-dir"), "/srv/media");
		assert!(matches.get_flag("debug"));
	}
}
