//! Runs a job on a background task and streams what happens back over a channel.
//!
//! The caller owns every piece of output; the worker only sends [`Event`]s.

use crate::api::{Credentials, WarzoneClient};
use std::path::PathBuf;
use tokio::sync::mpsc;
use tracing::debug;
use wzmap_engine::{MapFile, PipelineError};
use wzmap_protocol::endpoints;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Job {
    /// Fetch a game's map and save it.
    Download { game_id: u64, out: PathBuf },
    /// Upload a previously saved map onto `map_id`.
    Upload { map_id: u64, file: PathBuf },
    /// Fetch, build and upload in one go.
    Duplicate {
        game_id: u64,
        map_id: u64,
        save: Option<PathBuf>,
    },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Progress {
    Fetching { game_id: u64 },
    Saved { path: PathBuf },
    Loaded { path: PathBuf },
    Planned {
        territories: usize,
        bonuses: usize,
        commands: usize,
    },
    Uploading { map_id: u64, commands: usize },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outcome {
    Downloaded {
        path: PathBuf,
    },
    Uploaded {
        map_id: u64,
        commands: usize,
        preview_url: String,
    },
}

#[derive(Debug)]
pub enum Event {
    Progress(Progress),
    Finished(Result<Outcome, PipelineError>),
}

#[derive(Debug, Clone)]
pub struct Controller {
    client: WarzoneClient,
    credentials: Credentials,
}

impl Controller {
    pub fn new(client: WarzoneClient, credentials: Credentials) -> Self {
        Self {
            client,
            credentials,
        }
    }

    /// Starts `job` and returns the event stream. The last event is always
    /// [`Event::Finished`]; there is no way to stop a job once it is running.
    pub fn spawn(&self, job: Job) -> mpsc::UnboundedReceiver<Event> {
        let (tx, rx) = mpsc::unbounded_channel();
        let this = self.clone();
        tokio::spawn(async move {
            let result = this.run(job, &tx).await;
            let _ = tx.send(Event::Finished(result));
        });
        rx
    }

    async fn run(
        &self,
        job: Job,
        tx: &mpsc::UnboundedSender<Event>,
    ) -> Result<Outcome, PipelineError> {
        debug!(?job, "job started");
        let progress = |p: Progress| {
            let _ = tx.send(Event::Progress(p));
        };

        match job {
            Job::Download { game_id, out } => {
                progress(Progress::Fetching { game_id });
                let map = self.client.fetch_map(game_id, &self.credentials).await?;
                MapFile::new(&out).save(&map)?;
                progress(Progress::Saved { path: out.clone() });
                Ok(Outcome::Downloaded { path: out })
            }
            Job::Upload { map_id, file } => {
                let map = MapFile::new(&file).load()?;
                progress(Progress::Loaded { path: file });
                self.upload(map_id, &map, &progress).await
            }
            Job::Duplicate {
                game_id,
                map_id,
                save,
            } => {
                progress(Progress::Fetching { game_id });
                let map = self.client.fetch_map(game_id, &self.credentials).await?;
                if let Some(path) = save {
                    MapFile::new(&path).save(&map)?;
                    progress(Progress::Saved { path });
                }
                self.upload(map_id, &map, &progress).await
            }
        }
    }

    async fn upload(
        &self,
        map_id: u64,
        map: &serde_json::Value,
        progress: &impl Fn(Progress),
    ) -> Result<Outcome, PipelineError> {
        let plan = wzmap_engine::plan(map)?;
        let commands = plan.commands.len();
        progress(Progress::Planned {
            territories: plan.territories,
            bonuses: plan.bonuses,
            commands,
        });

        progress(Progress::Uploading { map_id, commands });
        self.client
            .upload(map_id, &self.credentials, plan.commands)
            .await?;
        Ok(Outcome::Uploaded {
            map_id,
            commands,
            preview_url: endpoints::preview_url(self.client.base_url(), map_id),
        })
    }
}

/// Drains `events` until the job finishes, handing progress to `on_progress`.
pub async fn wait(
    mut events: mpsc::UnboundedReceiver<Event>,
    mut on_progress: impl FnMut(&Progress),
) -> Option<Result<Outcome, PipelineError>> {
    while let Some(event) = events.recv().await {
        match event {
            Event::Progress(p) => on_progress(&p),
            Event::Finished(result) => return Some(result),
        }
    }
    None
}
