//! Frame recorder, best-replay store and ghost playback.
//!
//! The recorder samples the local player's pose once per fixed step with
//! millisecond timestamps on the simulation clock. Sealed recordings are
//! offered to [`BestReplays`], which keeps the fastest run per level and
//! persists the table as JSON. A [`GhostPlayback`] replays a stored run in a
//! loop.

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use bevy::ecs::query::QuerySingleError;
use bevy::prelude::*;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::backend::CharacterPhysicsBackend;
use crate::intent::LocalPlayer;
use crate::ledger::SimulationClock;
use crate::locomotion::LocomotionState;
use crate::look::LookAngles;

/// Error raised when persisting the replay store.
#[derive(Debug, Error)]
pub enum ReplayStoreError {
    #[error("failed to access replay store {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to encode replays: {0}")]
    Json(#[from] serde_json::Error),
}

/// One sampled pose.
#[derive(Reflect, Serialize, Deserialize, Debug, Clone, Copy, PartialEq)]
pub struct ReplayFrame {
    pub position: Vec3,
    pub orientation: Quat,
    /// Milliseconds since the recording started.
    pub timestamp_ms: u64,
}

/// A sealed recording of one run.
#[derive(Reflect, Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct ReplayData {
    pub level_id: String,
    /// Non-empty, timestamps non-decreasing.
    pub frames: Vec<ReplayFrame>,
    /// Timestamp of the last frame.
    pub total_time_ms: u64,
}

#[derive(Debug, Clone, PartialEq)]
struct RecordingSession {
    level_id: String,
    started_at: f64,
    frames: Vec<ReplayFrame>,
}

/// Records the current run.
#[derive(Resource, Debug, Clone, Default)]
pub struct ReplayRecorder {
    session: Option<RecordingSession>,
}

impl ReplayRecorder {
    /// Begin a fresh recording, dropping any unfinished one.
    pub fn start_recording(&mut self, level_id: impl Into<String>, now: f64) {
        self.session = Some(RecordingSession {
            level_id: level_id.into(),
            started_at: now,
            frames: Vec::new(),
        });
    }

    /// Append a pose sampled at `now`. Ignored when not recording.
    pub fn record_frame(&mut self, position: Vec3, orientation: Quat, now: f64) {
        let Some(session) = self.session.as_mut() else {
            return;
        };
        let elapsed_ms = ((now - session.started_at) * 1000.0).round().max(0.0) as u64;
        let floor = session.frames.last().map_or(0, |f| f.timestamp_ms);
        session.frames.push(ReplayFrame {
            position,
            orientation,
            timestamp_ms: elapsed_ms.max(floor),
        });
    }

    /// Seal the current recording.
    ///
    /// Returns `None` if nothing was being recorded or no frame was captured.
    pub fn stop_recording(&mut self) -> Option<ReplayData> {
        let session = self.session.take()?;
        let total_time_ms = session.frames.last()?.timestamp_ms;
        Some(ReplayData {
            level_id: session.level_id,
            frames: session.frames,
            total_time_ms,
        })
    }

    #[inline]
    pub fn is_recording(&self) -> bool {
        self.session.is_some()
    }

    pub fn frame_count(&self) -> usize {
        self.session.as_ref().map_or(0, |s| s.frames.len())
    }

    /// Level of the active recording.
    pub fn level_id(&self) -> Option<&str> {
        self.session.as_ref().map(|s| s.level_id.as_str())
    }
}

/// Fastest replay per level.
#[derive(Resource, Debug, Clone, Default, PartialEq)]
pub struct BestReplays {
    replays: HashMap<String, ReplayData>,
}

impl BestReplays {
    /// Keep `replay` if it is the first or strictly faster than the stored one.
    pub fn save_replay(&mut self, replay: ReplayData) -> bool {
        if replay.frames.is_empty() {
            return false;
        }
        let faster = self
            .replays
            .get(&replay.level_id)
            .is_none_or(|existing| replay.total_time_ms < existing.total_time_ms);
        if faster {
            self.replays.insert(replay.level_id.clone(), replay);
        }
        faster
    }

    pub fn load_best(&self, level_id: &str) -> Option<&ReplayData> {
        self.replays.get(level_id)
    }

    pub fn clear(&mut self, level_id: &str) {
        self.replays.remove(level_id);
    }

    pub fn len(&self) -> usize {
        self.replays.len()
    }

    pub fn is_empty(&self) -> bool {
        self.replays.is_empty()
    }

    /// Decode a JSON table. Entries without frames are dropped.
    pub fn from_json(text: &str) -> Result<Self, ReplayStoreError> {
        let mut replays: HashMap<String, ReplayData> = serde_json::from_str(text)?;
        replays.retain(|_, replay| !replay.frames.is_empty());
        Ok(Self { replays })
    }

    pub fn to_json(&self) -> Result<String, ReplayStoreError> {
        Ok(serde_json::to_string(&self.replays)?)
    }

    /// Load the table from `path`.
    ///
    /// A missing file is an empty store. A corrupt file is logged and treated
    /// as an empty store.
    pub fn load_from_path(path: impl AsRef<Path>) -> Self {
        let path = path.as_ref();
        let text = match std::fs::read_to_string(path) {
            Ok(text) => text,
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => return Self::default(),
            Err(err) => {
                warn!("Failed to read replays from {}: {err}", path.display());
                return Self::default();
            }
        };
        match Self::from_json(&text) {
            Ok(store) => {
                debug!("Loaded {} best replays from {}", store.len(), path.display());
                store
            }
            Err(err) => {
                warn!("Ignoring corrupt replay store {}: {err}", path.display());
                Self::default()
            }
        }
    }

    /// Write the table to `path`.
    pub fn persist(&self, path: impl AsRef<Path>) -> Result<(), ReplayStoreError> {
        let path = path.as_ref();
        let json = self.to_json()?;
        std::fs::write(path, json).map_err(|source| ReplayStoreError::Io {
            path: path.display().to_string(),
            source,
        })
    }
}

/// Where [`BestReplays`] is persisted. Without it the store is memory-only.
#[derive(Resource, Debug, Clone, PartialEq, Eq)]
pub struct ReplayPersistence {
    pub path: PathBuf,
}

impl ReplayPersistence {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }
}

/// Load persisted replays at startup.
pub fn load_best_replays(persistence: Option<Res<ReplayPersistence>>, mut best: ResMut<BestReplays>) {
    if let Some(persistence) = persistence {
        *best = BestReplays::load_from_path(&persistence.path);
    }
}

/// Sample the local player's pose into the active recording.
pub fn record_replay_frames<B: CharacterPhysicsBackend>(world: &mut World) {
    if !world
        .get_resource::<ReplayRecorder>()
        .is_some_and(ReplayRecorder::is_recording)
    {
        return;
    }

    let (entity, look) = match world
        .query_filtered::<(Entity, Option<&LookAngles>), (With<LocomotionState>, With<LocalPlayer>)>()
        .single(world)
    {
        Ok((entity, look)) => (entity, look.copied().unwrap_or_default()),
        Err(QuerySingleError::MultipleEntities(_)) => {
            warn_once!("Several LocalPlayer controllers; replay recording is paused");
            return;
        }
        Err(_) => return,
    };
    if !B::has_body(world, entity) {
        return;
    }

    let position = B::get_position(world, entity);
    let now = world
        .get_resource::<SimulationClock>()
        .map_or(0.0, SimulationClock::elapsed);

    if let Some(mut recorder) = world.get_resource_mut::<ReplayRecorder>() {
        recorder.record_frame(position, look.orientation(), now);
    }
}

/// Plays a replay back in a loop on the entity's transform.
#[derive(Component, Debug, Clone, PartialEq)]
pub struct GhostPlayback {
    pub replay: ReplayData,
    /// Playback clock in milliseconds.
    pub clock_ms: f64,
}

impl GhostPlayback {
    pub fn new(replay: ReplayData) -> Self {
        Self {
            replay,
            clock_ms: 0.0,
        }
    }

    /// Pose of `replay` at `clock_ms`, wrapping around its duration.
    ///
    /// Single-frame and zero-length replays hold the first frame. Returns
    /// `None` only for a replay without frames.
    pub fn sample(replay: &ReplayData, clock_ms: f64) -> Option<(Vec3, Quat)> {
        let first = replay.frames.first()?;
        if replay.frames.len() == 1 || replay.total_time_ms == 0 {
            return Some((first.position, first.orientation));
        }

        let t = clock_ms.rem_euclid(replay.total_time_ms as f64);
        // First frame strictly after t; frames are sorted by timestamp
        let next = replay
            .frames
            .partition_point(|f| (f.timestamp_ms as f64) <= t)
            .clamp(1, replay.frames.len() - 1);
        let (a, b) = (&replay.frames[next - 1], &replay.frames[next]);

        let span = b.timestamp_ms.saturating_sub(a.timestamp_ms) as f64;
        let s = if span > 0.0 {
            ((t - a.timestamp_ms as f64) / span).clamp(0.0, 1.0) as f32
        } else {
            0.0
        };
        Some((
            a.position.lerp(b.position, s),
            a.orientation.slerp(b.orientation, s),
        ))
    }

    /// Pose at the current playback clock.
    pub fn current(&self) -> Option<(Vec3, Quat)> {
        Self::sample(&self.replay, self.clock_ms)
    }
}

/// Advance ghosts by frame time and move them to their sampled pose.
pub fn drive_ghosts(time: Res<Time>, mut q_ghosts: Query<(&mut GhostPlayback, &mut Transform)>) {
    let delta_ms = time.delta_secs_f64() * 1000.0;
    for (mut ghost, mut transform) in &mut q_ghosts {
        ghost.clock_ms += delta_ms;
        if let Some((position, orientation)) = ghost.current() {
            transform.translation = position;
            transform.rotation = orientation;
        }
    }
}
