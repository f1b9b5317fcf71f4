pub mod backend;
pub mod cli;
pub mod config;
pub mod datetime;
pub mod geometry;
pub mod pending;
pub mod preview;
pub mod scenario;
pub mod schedule;
pub mod session;
pub mod target;
pub mod task;
pub mod zone;

use std::ffi::OsString;

use anyhow::Context;
use clap::Parser;
use tracing::{
  debug,
  info
};

pub use backend::{
  MemoryBackend,
  TaskBackend
};
pub use config::Settings;
pub use preview::{
  PreviewBroadcast,
  PreviewSink
};
pub use schedule::ScheduleState;
pub use session::DragEngine;
pub use target::{
  DropTarget,
  resolve
};
pub use zone::{
  DropZone,
  ZoneRegistry
};

#[tracing::instrument(skip_all)]
pub fn run(
  raw_args: Vec<OsString>
) -> anyhow::Result<()> {
  let cli =
    cli::GlobalCli::parse_from(raw_args);

  cli::init_tracing(
    cli.verbose,
    cli.quiet
  )?;

  info!(
    verbose = cli.verbose,
    quiet = cli.quiet,
    "starting planboard CLI"
  );

  let mut settings = Settings::load(
    cli.config.as_deref()
  )?;
  settings
    .apply_overrides(
      cli
        .rc_overrides
        .into_iter()
        .map(|kv| (kv.key, kv.value))
    )
    .context(
      "invalid --rc override"
    )?;
  debug!(?settings, "resolved settings");

  match cli.command {
    | cli::Command::Replay {
      scenario,
      pretty
    } => {
      let loaded =
        scenario::Scenario::load(
          &scenario
        )?;
      let report =
        loaded.replay(settings)?;
      let out = if pretty {
        serde_json::to_string_pretty(
          &report
        )?
      } else {
        serde_json::to_string(&report)?
      };
      println!("{out}");
    }
    | cli::Command::Resolve {
      scenario,
      x,
      y,
      task
    } => {
      let loaded =
        scenario::Scenario::load(
          &scenario
        )?;
      let registry = loaded.registry()?;
      let target = resolve(
        &registry,
        geometry::Point::new(x, y),
        task.as_deref(),
        &settings
      );
      println!(
        "{}",
        serde_json::to_string(&target)?
      );
    }
  }

  info!("done");
  Ok(())
}
