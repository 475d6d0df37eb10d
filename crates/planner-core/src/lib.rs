pub mod cli;
pub mod commands;
pub mod config;
pub mod datastore;
pub mod datetime;
pub mod gesture;
pub mod hit;
pub mod history;
pub mod layout;
pub mod rank;
pub mod render;
pub mod replay;
pub mod scheduler;
pub mod task;
pub mod undo;

use std::ffi::OsString;

use anyhow::Context;
use chrono::Utc;
use clap::Parser;
use tracing::{
  debug,
  info
};

#[tracing::instrument(skip_all)]
pub fn run(
  raw_args: Vec<OsString>
) -> anyhow::Result<()> {
  let pre =
    cli::preprocess_args(&raw_args)?;
  let cli = cli::GlobalCli::parse_from(
    pre.cleaned_args
  );

  cli::init_tracing(
    cli.verbose,
    cli.quiet
  )?;

  info!(
    verbose = cli.verbose,
    quiet = cli.quiet,
    "starting planner CLI"
  );
  debug!(overrides = ?pre.rc_overrides, "preprocessed rc overrides");

  let mut cfg = config::Config::load(
    cli.plannerrc.as_deref()
  )?;
  cfg.apply_overrides(
    pre.rc_overrides.into_iter().chain(
      cli
        .rc_overrides
        .into_iter()
        .map(|kv| (kv.key, kv.value))
    )
  );
  config::GeometryConfig::from_config(
    &cfg
  )
  .context("invalid geometry settings")?;

  let data_dir =
    config::resolve_data_dir(
      &cfg,
      cli.data.as_deref()
    )
    .context(
      "failed to resolve data \
       directory"
    )?;

  let store =
    datastore::DataStore::open(
      &data_dir
    )
    .with_context(|| {
      format!(
        "failed to open datastore at \
         {}",
        data_dir.display()
      )
    })?;
  let tasks = store.load_tasks()?;

  let tz = datetime::project_timezone();
  let today = Utc::now()
    .with_timezone(&tz)
    .date_naive();
  debug!(timezone = %tz, %today, tasks = tasks.len(), "loaded tasks");

  let mut scheduler =
    scheduler::Scheduler::new(
      tasks,
      tz,
      cfg.default_list(),
      store.clone(),
      store
    );
  let mut renderer =
    render::Renderer::new(&cfg)?;

  commands::dispatch(
    cli.command,
    &mut scheduler,
    &cfg,
    &mut renderer,
    today
  )?;

  info!("done");
  Ok(())
}
