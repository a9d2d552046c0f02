//! Level start, goal detection and completion.

use bevy::ecs::query::QuerySingleError;
use bevy::prelude::*;

use crate::backend::CharacterPhysicsBackend;
use crate::intent::{LocalPlayer, LocomotionInput};
use crate::ledger::SimulationClock;
use crate::locomotion::LocomotionState;
use crate::replay::{BestReplays, ReplayData, ReplayPersistence, ReplayRecorder};

/// Sphere the local player must enter to finish the current level.
#[derive(Resource, Reflect, Debug, Clone, PartialEq)]
#[reflect(Resource)]
pub struct GoalZone {
    pub level_id: String,
    pub center: Vec3,
    pub radius: f32,
}

impl GoalZone {
    pub const DEFAULT_RADIUS: f32 = 2.5;

    pub fn new(level_id: impl Into<String>, center: Vec3) -> Self {
        Self {
            level_id: level_id.into(),
            center,
            radius: Self::DEFAULT_RADIUS,
        }
    }

    pub fn with_radius(mut self, radius: f32) -> Self {
        self.radius = radius;
        self
    }

    #[inline]
    pub fn contains(&self, position: Vec3) -> bool {
        position.distance(self.center) < self.radius
    }
}

/// Progress through the current level.
#[derive(Resource, Reflect, Debug, Clone, Copy, Default, PartialEq)]
#[reflect(Resource)]
pub struct LevelProgress {
    /// Simulation time the level started at.
    pub started_at: f64,
    pub completed: bool,
}

/// Request to (re)start a level.
#[derive(Event, Debug, Clone, PartialEq)]
pub struct StartLevel(pub GoalZone);

/// Request to leave the current level.
#[derive(Event, Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct UnloadLevel;

/// Sent once when the local player reaches the goal.
#[derive(Event, Debug, Clone, PartialEq)]
pub struct LevelCompleted {
    pub level_id: String,
    /// Seconds since the level started.
    pub elapsed: f64,
    /// The run replaced the stored best replay.
    pub new_best: bool,
}

/// Start `zone`'s level: rewind the clock, reset every controller and begin recording.
pub fn begin_level(world: &mut World, zone: GoalZone) {
    world
        .get_resource_or_insert_with(SimulationClock::default)
        .reset();

    let mut q_controllers = world.query::<(&mut LocomotionState, Option<&mut LocomotionInput>)>();
    for (mut state, input) in q_controllers.iter_mut(world) {
        state.reset();
        if let Some(mut input) = input {
            input.clear();
        }
    }

    world
        .get_resource_or_insert_with(ReplayRecorder::default)
        .start_recording(zone.level_id.clone(), 0.0);
    world.insert_resource(LevelProgress::default());

    info!("Level {} started", zone.level_id);
    world.insert_resource(zone);
}

/// Leave the current level.
///
/// An unfinished recording is sealed and offered to [`BestReplays`] like a
/// completed one, so it is kept only if it beats the stored best.
pub fn unload_level(world: &mut World) {
    let replay = world
        .get_resource_mut::<ReplayRecorder>()
        .and_then(|mut recorder| recorder.stop_recording());
    if let Some(replay) = replay {
        let level_id = replay.level_id.clone();
        let total_time_ms = replay.total_time_ms;
        if offer_replay(world, replay) {
            info!("Kept unfinished run of {level_id} as new best ({total_time_ms} ms)");
        } else {
            debug!("Dropped unfinished run of {level_id} ({total_time_ms} ms)");
        }
    }
    world.remove_resource::<GoalZone>();
    world.remove_resource::<LevelProgress>();
}

/// Apply pending [`UnloadLevel`] and [`StartLevel`] requests, unloads first.
pub fn handle_level_requests(world: &mut World) {
    let unload = world
        .get_resource_mut::<Events<UnloadLevel>>()
        .is_some_and(|mut events| events.drain().count() > 0);
    let start = world
        .get_resource_mut::<Events<StartLevel>>()
        .and_then(|mut events| events.drain().last());

    if unload {
        unload_level(world);
    }
    if let Some(StartLevel(zone)) = start {
        begin_level(world, zone);
    }
}

/// Complete the level when the local player enters the goal zone.
///
/// Seals the recording and offers it to [`BestReplays`]; a new best is written
/// to [`ReplayPersistence`] when configured.
pub fn check_goal<B: CharacterPhysicsBackend>(world: &mut World) {
    let Some(zone) = world.get_resource::<GoalZone>().cloned() else {
        return;
    };
    let Some(progress) = world.get_resource::<LevelProgress>().copied() else {
        return;
    };
    if progress.completed {
        return;
    }

    let entity = match world
        .query_filtered::<Entity, (With<LocomotionState>, With<LocalPlayer>)>()
        .single(world)
    {
        Ok(entity) => entity,
        Err(QuerySingleError::MultipleEntities(_)) => {
            warn_once!("Several LocalPlayer controllers; goal detection is disabled");
            return;
        }
        Err(_) => return,
    };
    if !B::has_body(world, entity) || !zone.contains(B::get_position(world, entity)) {
        return;
    }

    let now = world
        .get_resource::<SimulationClock>()
        .map_or(0.0, SimulationClock::elapsed);
    let elapsed = now - progress.started_at;
    world.insert_resource(LevelProgress {
        completed: true,
        ..progress
    });

    let replay = world
        .get_resource_mut::<ReplayRecorder>()
        .and_then(|mut recorder| recorder.stop_recording());
    let new_best = replay.is_some_and(|replay| offer_replay(world, replay));

    info!(
        "Level {} completed in {:.3}s{}",
        zone.level_id,
        elapsed,
        if new_best { " (new best)" } else { "" }
    );
    world.send_event(LevelCompleted {
        level_id: zone.level_id,
        elapsed,
        new_best,
    });
}

/// Offer a sealed run to [`BestReplays`], writing a new best to
/// [`ReplayPersistence`] when configured. Returns whether the run was kept.
fn offer_replay(world: &mut World, replay: ReplayData) -> bool {
    let level_id = replay.level_id.clone();
    let new_best = world
        .get_resource_or_insert_with(BestReplays::default)
        .save_replay(replay);

    if new_best {
        if let (Some(persistence), Some(best)) = (
            world.get_resource::<ReplayPersistence>(),
            world.get_resource::<BestReplays>(),
        ) {
            if let Err(err) = best.persist(&persistence.path) {
                warn!("Failed to save best replay for {level_id}: {err}");
            }
        }
    }
    new_best
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::mock::{MockBackend, MockBody};
    use crate::ledger::Deadline;
    use crate::state::MovementMode;

    fn create_test_app() -> App {
        let mut app = App::new();
        app.add_event::<LevelCompleted>();
        app.add_event::<StartLevel>();
        app.add_event::<UnloadLevel>();
        app.init_resource::<SimulationClock>();
        app.init_resource::<ReplayRecorder>();
        app.init_resource::<BestReplays>();
        app.add_systems(Update, (handle_level_requests, check_goal::<MockBackend>).chain());
        app
    }

    fn spawn_player(app: &mut App, position: Vec3) -> Entity {
        app.world_mut()
            .spawn((
                Transform::from_translation(position),
                MockBody::default(),
                LocomotionState::default(),
                LocomotionInput::default(),
                LocalPlayer,
            ))
            .id()
    }

    fn completions(app: &App) -> Vec<LevelCompleted> {
        let events = app.world().resource::<Events<LevelCompleted>>();
        let mut cursor = events.get_cursor();
        cursor.read(events).cloned().collect()
    }

    fn record(app: &mut App, seconds: f64) {
        let mut recorder = app.world_mut().resource_mut::<ReplayRecorder>();
        recorder.record_frame(Vec3::ZERO, Quat::IDENTITY, 0.0);
        recorder.record_frame(Vec3::ONE, Quat::IDENTITY, seconds);
    }

    fn advance_clock(app: &mut App, seconds: f32) {
        let mut clock = app.world_mut().resource_mut::<SimulationClock>();
        for _ in 0..(seconds * 60.0).round() as u32 {
            clock.advance(1.0 / 60.0);
        }
    }

    // ==================== Level Start Tests ====================

    #[test]
    fn begin_level_resets_clock_state_and_recorder() {
        let mut app = create_test_app();
        let entity = spawn_player(&mut app, Vec3::ZERO);

        advance_clock(&mut app, 2.0);
        {
            let mut state = app.world_mut().get_mut::<LocomotionState>(entity).unwrap();
            state.mode = MovementMode::Grounded;
            state.jump_count = 2;
            state.dashing_until = Some(Deadline::after(0.0, 0.2));
        }

        begin_level(app.world_mut(), GoalZone::new("level-1", Vec3::new(0.0, 0.0, -50.0)));

        let world = app.world();
        assert_eq!(world.resource::<SimulationClock>().elapsed(), 0.0);
        assert_eq!(
            world.get::<LocomotionState>(entity).unwrap(),
            &LocomotionState::default()
        );
        assert_eq!(world.resource::<ReplayRecorder>().level_id(), Some("level-1"));
        assert_eq!(world.resource::<GoalZone>().radius, GoalZone::DEFAULT_RADIUS);
        assert!(!world.resource::<LevelProgress>().completed);
    }

    #[test]
    fn start_request_is_handled() {
        let mut app = create_test_app();
        spawn_player(&mut app, Vec3::ZERO);

        app.world_mut()
            .send_event(StartLevel(GoalZone::new("level-2", Vec3::new(0.0, 0.0, -50.0))));
        app.update();

        assert_eq!(app.world().resource::<GoalZone>().level_id, "level-2");
        assert!(app.world().resource::<ReplayRecorder>().is_recording());
    }

    // ==================== Goal Tests ====================

    #[test]
    fn reaching_goal_completes_once_and_stores_replay() {
        let mut app = create_test_app();
        let entity = spawn_player(&mut app, Vec3::ZERO);
        begin_level(app.world_mut(), GoalZone::new("level-1", Vec3::new(0.0, 0.0, -10.0)));

        // Far from the goal
        app.update();
        assert!(completions(&app).is_empty());

        advance_clock(&mut app, 3.0);
        record(&mut app, 3.0);
        app.world_mut()
            .get_mut::<Transform>(entity)
            .unwrap()
            .translation = Vec3::new(0.0, 0.0, -8.0);
        app.update();
        app.update();

        let sent = completions(&app);
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].level_id, "level-1");
        assert!((sent[0].elapsed - 3.0).abs() < 1e-6);
        assert!(sent[0].new_best);

        assert!(app.world().resource::<LevelProgress>().completed);
        assert!(!app.world().resource::<ReplayRecorder>().is_recording());
        let best = app.world().resource::<BestReplays>();
        assert_eq!(best.load_best("level-1").unwrap().total_time_ms, 3000);
    }

    #[test]
    fn slower_run_keeps_previous_best() {
        let mut app = create_test_app();
        let entity = spawn_player(&mut app, Vec3::ZERO);
        let zone = GoalZone::new("level-1", Vec3::new(0.0, 0.0, -10.0));

        for seconds in [2.0, 4.0] {
            app.world_mut()
                .get_mut::<Transform>(entity)
                .unwrap()
                .translation = Vec3::ZERO;
            begin_level(app.world_mut(), zone.clone());
            advance_clock(&mut app, seconds);
            record(&mut app, f64::from(seconds));
            app.world_mut()
                .get_mut::<Transform>(entity)
                .unwrap()
                .translation = zone.center;
            app.update();
        }

        let sent = completions(&app);
        assert_eq!(sent.len(), 2);
        assert!(sent[0].new_best);
        assert!(!sent[1].new_best);
        let best = app.world().resource::<BestReplays>();
        assert_eq!(best.load_best("level-1").unwrap().total_time_ms, 2000);
    }

    #[test]
    fn new_best_is_persisted() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("replays.json");

        let mut app = create_test_app();
        app.insert_resource(ReplayPersistence::new(&path));
        let entity = spawn_player(&mut app, Vec3::ZERO);
        begin_level(app.world_mut(), GoalZone::new("level-1", Vec3::ZERO).with_radius(1.0));
        record(&mut app, 1.5);
        app.world_mut()
            .get_mut::<Transform>(entity)
            .unwrap()
            .translation = Vec3::new(0.5, 0.0, 0.0);
        app.update();

        let stored = BestReplays::load_from_path(&path);
        assert_eq!(stored.load_best("level-1").unwrap().total_time_ms, 1500);
    }

    #[test]
    fn several_local_players_never_complete() {
        let mut app = create_test_app();
        spawn_player(&mut app, Vec3::ZERO);
        spawn_player(&mut app, Vec3::ZERO);
        begin_level(app.world_mut(), GoalZone::new("level-1", Vec3::ZERO));
        record(&mut app, 1.0);
        app.update();

        assert!(completions(&app).is_empty());
        assert!(!app.world().resource::<LevelProgress>().completed);
        assert!(app.world().resource::<ReplayRecorder>().is_recording());
    }

    #[test]
    fn completion_without_frames_stores_nothing() {
        let mut app = create_test_app();
        spawn_player(&mut app, Vec3::ZERO);
        begin_level(app.world_mut(), GoalZone::new("level-1", Vec3::ZERO));
        app.update();

        let sent = completions(&app);
        assert_eq!(sent.len(), 1);
        assert!(!sent[0].new_best);
        assert!(app.world().resource::<BestReplays>().is_empty());
    }

    // ==================== Unload Tests ====================

    #[test]
    fn unload_keeps_recording_only_if_faster() {
        let mut app = create_test_app();
        spawn_player(&mut app, Vec3::ZERO);
        let zone = GoalZone::new("level-1", Vec3::new(0.0, 0.0, -50.0));

        begin_level(app.world_mut(), zone.clone());
        record(&mut app, 1.0);
        app.world_mut().send_event(UnloadLevel);
        app.update();

        assert!(!app.world().resource::<ReplayRecorder>().is_recording());
        assert!(app.world().get_resource::<GoalZone>().is_none());
        assert!(app.world().get_resource::<LevelProgress>().is_none());
        let best = app.world().resource::<BestReplays>();
        assert_eq!(best.load_best("level-1").unwrap().total_time_ms, 1000);

        // A slower abandoned run leaves the best alone
        begin_level(app.world_mut(), zone);
        record(&mut app, 2.0);
        unload_level(app.world_mut());

        let best = app.world().resource::<BestReplays>();
        assert_eq!(best.load_best("level-1").unwrap().total_time_ms, 1000);
        assert!(completions(&app).is_empty());
    }

    #[test]
    fn unload_persists_new_best() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("replays.json");

        let mut app = create_test_app();
        app.insert_resource(ReplayPersistence::new(&path));
        spawn_player(&mut app, Vec3::ZERO);
        begin_level(app.world_mut(), GoalZone::new("level-1", Vec3::new(0.0, 0.0, -50.0)));
        record(&mut app, 0.5);
        unload_level(app.world_mut());

        let stored = BestReplays::load_from_path(&path);
        assert_eq!(stored.load_best("level-1").unwrap().total_time_ms, 500);
    }

    #[test]
    fn unload_without_recording_is_harmless() {
        let mut app = create_test_app();
        unload_level(app.world_mut());

        assert!(app.world().resource::<BestReplays>().is_empty());
        assert!(app.world().get_resource::<GoalZone>().is_none());
    }
}
