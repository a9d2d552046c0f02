//! Locomotion state machine.
//!
//! One call to [`LocomotionState::step`] per fixed step turns sensor readings,
//! the latched input and the timing ledger into writes on the rigid body:
//! velocity, forces, impulses, gravity scale, damping and collider height.
//!
//! The step is a pure function of its inputs and the previous state; it never
//! reads wall-clock time, so replays of the same input reproduce the same run.

use bevy::prelude::*;

use crate::backend::KinematicBody;
use crate::config::LocomotionConfig;
use crate::intent::InputSnapshot;
use crate::ledger::{Deadline, TimingLedger};
use crate::look::LookAngles;
use crate::sensor::{horizontal, SensorReadings};
use crate::state::MovementMode;

/// Which jump rule fired.
#[derive(Reflect, Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum JumpKind {
    /// From the ground.
    Ground,
    /// Shortly after walking off a ledge.
    Coyote,
    /// Off the wall being run on.
    Wall,
    /// Second jump in the air.
    Double,
}

/// Discrete transition raised by a locomotion step.
#[derive(Reflect, Debug, Clone, Copy, PartialEq)]
pub enum LocomotionEvent {
    Landed,
    Jumped(JumpKind),
    WallRunStarted,
    WallRunEnded,
    SlideStarted,
    SlideEnded,
    DashStarted { airborne: bool },
    DashEnded,
}

/// Everything a step reads besides the state itself.
#[derive(Debug, Clone, Copy)]
pub struct StepContext<'a> {
    /// Simulation time at this step.
    pub now: f64,
    /// Fixed timestep.
    pub dt: f32,
    pub config: &'a LocomotionConfig,
    pub input: InputSnapshot,
    pub look: LookAngles,
    pub readings: SensorReadings,
}

/// Output of one step.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct StepReport {
    pub events: Vec<LocomotionEvent>,
}

impl StepReport {
    /// Whether `event` was raised this step.
    pub fn contains(&self, event: LocomotionEvent) -> bool {
        self.events.contains(&event)
    }
}

/// Per-character locomotion state.
#[derive(Component, Reflect, Debug, Clone, PartialEq)]
#[reflect(Component)]
pub struct LocomotionState {
    pub mode: MovementMode,
    /// Set while the dash flag is raised.
    pub dashing_until: Option<Deadline>,
    /// Jumps since last landing, 0..=2.
    pub jump_count: u8,
    pub double_jump_available: bool,
    pub air_dash_available: bool,
    pub ledger: TimingLedger,
    /// The collider currently has the slide height.
    pub collider_reduced: bool,
    /// The body currently has the wall-run gravity scale.
    pub gravity_reduced: bool,
}

impl Default for LocomotionState {
    fn default() -> Self {
        Self {
            mode: MovementMode::Airborne,
            dashing_until: None,
            jump_count: 0,
            double_jump_available: true,
            air_dash_available: true,
            ledger: TimingLedger::default(),
            collider_reduced: false,
            gravity_reduced: false,
        }
    }
}

impl LocomotionState {
    /// Grounded or sliding.
    #[inline]
    pub fn is_grounded(&self) -> bool {
        matches!(self.mode, MovementMode::Grounded | MovementMode::Sliding { .. })
    }

    #[inline]
    pub fn is_dashing(&self) -> bool {
        self.dashing_until.is_some()
    }

    /// Distance from the body centre to the feet for the current collider.
    pub fn half_extent(&self, config: &LocomotionConfig) -> f32 {
        if self.collider_reduced {
            config.half_extent(config.slide_height)
        } else {
            config.half_extent(config.normal_height)
        }
    }

    /// Forget timers and mode for a level restart.
    ///
    /// A reduced collider and the wall-run gravity scale are restored on the
    /// next step.
    pub fn reset(&mut self) {
        *self = Self {
            collider_reduced: self.collider_reduced,
            gravity_reduced: self.gravity_reduced,
            ..Self::default()
        };
    }

    /// Advance the state machine by one fixed step.
    pub fn step(&mut self, ctx: &StepContext, body: &mut impl KinematicBody) -> StepReport {
        let config = ctx.config;
        let now = ctx.now;
        let mut events = Vec::new();

        // Deadlines
        if self.dashing_until.is_some_and(|until| until.expired(now)) {
            self.dashing_until = None;
            events.push(LocomotionEvent::DashEnded);
        }
        if let MovementMode::Sliding { until, .. } = self.mode {
            if until.expired(now) {
                self.end_slide(MovementMode::Grounded, config, body, &mut events);
            } else if !ctx.readings.grounded {
                self.end_slide(MovementMode::Airborne, config, body, &mut events);
            }
        }
        if self.collider_reduced && !self.mode.is_sliding() {
            self.restore_collider(config, body);
        }
        if self.gravity_reduced && !self.mode.is_wall_running() {
            self.restore_gravity(body);
        }

        let mut velocity = body.linear_velocity();

        // Ground check. The probe still reaches the floor right after a jump,
        // so a fresh upward jump counts as airborne.
        let taking_off =
            self.ledger.jumped_within(now, config.jump_min_interval) && velocity.y > 0.0;
        let grounded = ctx.readings.grounded && !taking_off;
        let was_grounded = self.is_grounded();

        if grounded {
            self.jump_count = 0;
            self.double_jump_available = true;
            self.air_dash_available = true;
            if self.mode.is_wall_running() {
                events.push(LocomotionEvent::WallRunEnded);
            }
            if !self.mode.is_sliding() {
                self.mode = MovementMode::Grounded;
            }
            self.restore_gravity(body);
            self.ledger.mark_grounded(now);
            if !was_grounded {
                events.push(LocomotionEvent::Landed);
            }
        } else {
            match self.mode {
                MovementMode::Grounded => self.mode = MovementMode::Airborne,
                MovementMode::Sliding { .. } => {
                    self.end_slide(MovementMode::Airborne, config, body, &mut events)
                }
                _ => {}
            }
        }

        // Wall-run
        if !grounded && !self.mode.is_sliding() {
            let speed = horizontal(velocity).length();
            let wall = ctx.readings.wall.filter(|wall| {
                wall.normal.y.abs() < config.wall_angle_threshold && speed > config.wall_min_speed
            });

            match wall {
                Some(wall) => {
                    if !self.mode.is_wall_running() {
                        events.push(LocomotionEvent::WallRunStarted);
                    }
                    self.mode = MovementMode::WallRunning(wall);
                    body.set_gravity_scale(config.wall_run_gravity_scale);
                    self.gravity_reduced = true;
                    body.apply_force(wall.normal * config.wall_push_force);

                    let target = wall.tangent(ctx.look.forward()) * config.wall_run_speed;
                    let blend = (config.wall_run_acceleration * ctx.dt).min(1.0);
                    let along = horizontal(velocity).lerp(target, blend);
                    velocity.x = along.x;
                    velocity.z = along.z;
                }
                None if self.mode.is_wall_running() => {
                    self.mode = MovementMode::Airborne;
                    self.restore_gravity(body);
                    events.push(LocomotionEvent::WallRunEnded);
                }
                None => {}
            }
        }

        // Slide trigger
        let flat = horizontal(velocity);
        if ctx.input.dash
            && grounded
            && !self.mode.is_sliding()
            && self.ledger.can_slide(now, config.slide_cooldown)
            && flat.length() > config.slide_min_speed
        {
            self.mode = MovementMode::Sliding {
                until: Deadline::after(now, config.slide_duration),
                direction: flat.normalize_or_zero(),
            };
            self.ledger.mark_slide(now);
            self.reduce_collider(config, body);
            events.push(LocomotionEvent::SlideStarted);
        }

        // Movement
        let flat = horizontal(velocity);
        let next = if let MovementMode::Sliding { direction, .. } = self.mode {
            direction * flat.length().max(config.slide_speed)
        } else {
            let wish = ctx.look.movement_direction(&ctx.input);
            if wish != Vec3::ZERO {
                let target_speed = if ctx.input.is_running() {
                    config.run_speed
                } else {
                    config.movement_speed
                };
                let (acceleration, control) = if grounded {
                    (config.acceleration, 1.0)
                } else {
                    (config.air_acceleration, config.air_control)
                };
                let factor = (acceleration * control * ctx.dt).min(1.0);
                flat.lerp(wish * target_speed, factor)
            } else if grounded {
                flat * (1.0 - (config.deceleration * ctx.dt).min(1.0))
            } else {
                flat
            }
        };
        velocity.x = next.x;
        velocity.z = next.z;

        // Jump
        if ctx.input.jump_pressed {
            self.ledger.request_jump(now);
        }
        if self.ledger.is_jump_buffered(now, config.jump_buffer_window) {
            if let Some(kind) = self
                .select_jump(grounded, now, config)
                .filter(|_| self.ledger.jump_debounced(now, config.jump_min_interval))
            {
                self.perform_jump(kind, &mut velocity, config, body, &mut events);
                self.ledger.mark_jump(now);
                self.ledger.consume_jump_buffer();
                events.push(LocomotionEvent::Jumped(kind));
            }
        }

        body.set_linear_velocity(velocity);

        // Dash
        if ctx.input.dash
            && !self.mode.is_sliding()
            && self.ledger.can_dash(now, config.dash_cooldown)
            && (grounded || self.air_dash_available)
        {
            let force = if grounded {
                config.dash_force
            } else {
                config.air_dash_force
            };
            body.apply_impulse(ctx.look.forward() * force);
            if !grounded {
                self.air_dash_available = false;
            }
            self.dashing_until = Some(Deadline::after(now, config.dash_duration));
            self.ledger.mark_dash(now);
            events.push(LocomotionEvent::DashStarted {
                airborne: !grounded,
            });
        }

        body.set_linear_damping(config.friction_for(self.mode.kind()));

        StepReport { events }
    }

    fn select_jump(&self, grounded: bool, now: f64, config: &LocomotionConfig) -> Option<JumpKind> {
        if grounded {
            Some(JumpKind::Ground)
        } else if self.jump_count == 0 && self.ledger.can_coyote_jump(now, config.coyote_time) {
            Some(JumpKind::Coyote)
        } else if self.mode.is_wall_running() {
            Some(JumpKind::Wall)
        } else if self.jump_count == 1 && self.double_jump_available {
            Some(JumpKind::Double)
        } else {
            None
        }
    }

    fn perform_jump(
        &mut self,
        kind: JumpKind,
        velocity: &mut Vec3,
        config: &LocomotionConfig,
        body: &mut impl KinematicBody,
        events: &mut Vec<LocomotionEvent>,
    ) {
        match kind {
            JumpKind::Ground | JumpKind::Coyote => {
                if self.mode.is_sliding() {
                    self.end_slide(MovementMode::Grounded, config, body, events);
                }
                velocity.y = config.jump_force;
                self.jump_count = 1;
            }
            JumpKind::Wall => {
                let normal = self.mode.wall().map_or(Vec3::ZERO, |wall| wall.normal);
                let launch = (normal * config.wall_jump_normal_blend + Vec3::Y).normalize()
                    * config.wall_run_jump_force;
                velocity.x += launch.x;
                velocity.y = launch.y;
                velocity.z += launch.z;

                self.mode = MovementMode::Airborne;
                self.restore_gravity(body);
                events.push(LocomotionEvent::WallRunEnded);
                self.jump_count = 1;
                self.double_jump_available = true;
            }
            JumpKind::Double => {
                velocity.y = config.double_jump_force;
                self.jump_count = 2;
                self.double_jump_available = false;
            }
        }
    }

    fn end_slide(
        &mut self,
        next: MovementMode,
        config: &LocomotionConfig,
        body: &mut impl KinematicBody,
        events: &mut Vec<LocomotionEvent>,
    ) {
        self.mode = next;
        if self.collider_reduced {
            self.restore_collider(config, body);
        }
        events.push(LocomotionEvent::SlideEnded);
    }

    /// Shrink the collider, lowering the body so the feet stay in place.
    fn reduce_collider(&mut self, config: &LocomotionConfig, body: &mut impl KinematicBody) {
        if self.collider_reduced {
            return;
        }
        let drop = config.half_extent(config.normal_height) - config.half_extent(config.slide_height);
        body.set_collider_height(config.slide_height);
        body.set_position(body.position() - Vec3::Y * drop);
        self.collider_reduced = true;
    }

    fn restore_collider(&mut self, config: &LocomotionConfig, body: &mut impl KinematicBody) {
        let lift = config.half_extent(config.normal_height) - config.half_extent(config.slide_height);
        body.set_collider_height(config.normal_height);
        body.set_position(body.position() + Vec3::Y * lift);
        self.collider_reduced = false;
    }

    fn restore_gravity(&mut self, body: &mut impl KinematicBody) {
        body.set_gravity_scale(1.0);
        self.gravity_reduced = false;
    }
}


#[cfg(test)]
mod tests {
    use super::testing::*;
    use super::*;
    use crate::sensor::fake::PlaneWorld;

    fn hspeed(v: Vec3) -> f32 {
        horizontal(v).length()
    }

    // ==================== Scenario Tests ====================

    #[test]
    fn free_fall_settles_on_ground() {
        let config = LocomotionConfig::default();
        let mut sim = Sim::new(config, PlaneWorld::floor(0.0), Vec3::new(0.0, 5.0, 0.0));

        sim.run(120);

        assert_eq!(sim.state.mode, MovementMode::Grounded);
        assert_eq!(sim.state.jump_count, 0);
        assert_eq!(sim.body.gravity_scale, 1.0);
        assert_eq!(sim.body.damping, config.ground_friction);
        assert_eq!(sim.count(LocomotionEvent::Landed), 1);
        assert!(sim.feet_height().abs() < 0.05);
    }

    #[test]
    fn forward_run_converges_to_target_speed() {
        let config = LocomotionConfig::default().with_speeds(12.0, 12.0);
        let mut sim = Sim::on_floor(config);
        sim.input.forward = true;

        sim.run(15);

        let speed = hspeed(sim.commanded_velocity);
        assert!((speed - 12.0).abs() < 0.1, "speed {speed}");
        // Facing -Z at yaw 0
        assert!(sim.commanded_velocity.z < 0.0);
        assert!(sim.commanded_velocity.x.abs() < 1e-4);
    }

    #[test]
    fn forward_only_selects_run_speed() {
        let config = LocomotionConfig::default();
        let mut sim = Sim::on_floor(config);
        sim.input.forward = true;
        sim.run(30);
        assert!((hspeed(sim.commanded_velocity) - config.run_speed).abs() < 0.1);

        // Strafing alone walks
        let mut sim = Sim::on_floor(config);
        sim.input.left = true;
        sim.run(30);
        assert!((hspeed(sim.commanded_velocity) - config.movement_speed).abs() < 0.1);
    }

    #[test]
    fn releasing_input_decelerates_on_ground() {
        let config = LocomotionConfig::default();
        let mut sim = Sim::on_floor(config);
        sim.input.forward = true;
        sim.run(30);

        sim.input.forward = false;
        sim.run(10);
        assert!(hspeed(sim.commanded_velocity) < 0.01);
    }

    #[test]
    fn dash_applies_impulse_and_respects_cooldown() {
        let config = LocomotionConfig::default().with_slide_min_speed(1000.0);
        let mut sim = Sim::on_floor(config);
        sim.run(5);

        sim.input.dash = true;
        let report = sim.step();

        assert!(report.contains(LocomotionEvent::DashStarted { airborne: false }));
        assert!((hspeed(sim.commanded_velocity) - config.dash_force).abs() < 0.01);
        assert!(sim.state.is_dashing());

        // Holding dash through the cooldown does nothing more
        let steps_in_cooldown = (config.dash_cooldown / DT) as usize - 1;
        sim.run(steps_in_cooldown);
        assert_eq!(sim.body.impulses.len(), 1);
        assert_eq!(sim.count(LocomotionEvent::DashStarted { airborne: false }), 1);

        // Once the cooldown has elapsed the held input dashes again
        sim.run(3);
        assert_eq!(sim.count(LocomotionEvent::DashStarted { airborne: false }), 2);
    }

    #[test]
    fn dash_spam_fires_once_per_cooldown() {
        let config = LocomotionConfig::default().with_slide_min_speed(1000.0);
        let mut sim = Sim::on_floor(config);
        sim.run(2);

        // Toggle dash every step for just under one cooldown
        for i in 0..28 {
            sim.input.dash = i % 2 == 0;
            sim.step();
        }
        assert_eq!(sim.count(LocomotionEvent::DashStarted { airborne: false }), 1);
    }

    #[test]
    fn dash_flag_clears_after_duration() {
        let config = LocomotionConfig::default().with_slide_min_speed(1000.0);
        let mut sim = Sim::on_floor(config);
        sim.run(2);
        sim.input.dash = true;
        sim.step();
        sim.input.dash = false;

        sim.run((config.dash_duration / DT) as usize + 2);
        assert!(!sim.state.is_dashing());
        assert_eq!(sim.count(LocomotionEvent::DashEnded), 1);
    }

    #[test]
    fn air_dash_is_consumed_until_landing() {
        let config = LocomotionConfig::default().with_dash_cooldown(0.05);
        let mut sim = Sim::new(config, PlaneWorld::floor(0.0), Vec3::new(0.0, 20.0, 0.0));

        sim.input.dash = true;
        let report = sim.step();
        assert!(report.contains(LocomotionEvent::DashStarted { airborne: true }));
        assert!(!sim.state.air_dash_available);
        assert!((sim.body.impulses[0].length() - config.air_dash_force).abs() < 1e-4);

        // Cooldown elapses but no air dash is left
        sim.run(10);
        assert_eq!(sim.body.impulses.len(), 1);

        sim.input.dash = false;
        sim.run_until(300, |s| s.state.mode == MovementMode::Grounded);
        assert!(sim.state.air_dash_available);
    }

    #[test]
    fn stale_jump_buffer_never_fires() {
        let config = LocomotionConfig::default();
        let mut sim = Sim::new(config, PlaneWorld::floor(0.0), Vec3::new(0.0, 3.0, 0.0));

        // Pressed high in the air with nothing to jump from
        sim.input.jump = true;
        sim.step();
        assert!(sim.state.ledger.jump_buffered.is_some());

        let landed = sim.run_until(200, |s| s.state.mode == MovementMode::Grounded);
        assert!(landed);
        sim.run(10);

        assert!(sim.events.iter().all(|e| !matches!(e, LocomotionEvent::Jumped(_))));
        assert_eq!(sim.state.jump_count, 0);
    }

    #[test]
    fn buffered_jump_fires_on_landing() {
        let config = LocomotionConfig::default();
        let mut sim = Sim::new(config, PlaneWorld::floor(0.0), Vec3::new(0.0, 3.0, 0.0));

        // Fall until the feet are just above the floor, then press
        assert!(sim.run_until(200, |s| s.feet_height() < 0.4));
        sim.input.jump = true;
        sim.step();
        assert!(!sim.readings.grounded);
        assert!(sim.events.iter().all(|e| !matches!(e, LocomotionEvent::Jumped(_))));

        sim.run(6);
        assert_eq!(sim.count(LocomotionEvent::Jumped(JumpKind::Ground)), 1);
        assert_eq!(sim.state.jump_count, 1);
    }

    #[test]
    fn ground_jump_leaves_the_ground() {
        let config = LocomotionConfig::default();
        let mut sim = Sim::on_floor(config);
        sim.run(3);

        sim.input.jump = true;
        let report = sim.step();
        assert!(report.contains(LocomotionEvent::Jumped(JumpKind::Ground)));
        assert!((sim.commanded_velocity.y - config.jump_force).abs() < 1e-5);

        sim.run(3);
        assert_eq!(sim.state.mode, MovementMode::Airborne);
        assert_eq!(sim.state.jump_count, 1);
        // Holding jump does not re-trigger
        assert_eq!(sim.count(LocomotionEvent::Jumped(JumpKind::Ground)), 1);
    }

    #[test]
    fn double_jump_then_no_third() {
        let config = LocomotionConfig::default();
        let mut sim = Sim::on_floor(config);
        sim.run(3);

        sim.input.jump = true;
        sim.step();
        sim.input.jump = false;
        sim.run(18);

        sim.input.jump = true;
        let report = sim.step();
        assert!(report.contains(LocomotionEvent::Jumped(JumpKind::Double)));
        assert_eq!(sim.state.jump_count, 2);
        assert!(!sim.state.double_jump_available);
        assert!((sim.commanded_velocity.y - config.double_jump_force).abs() < 1e-5);

        sim.input.jump = false;
        sim.run(18);
        sim.input.jump = true;
        sim.step();
        assert_eq!(sim.state.mode, MovementMode::Airborne);
        assert_eq!(sim.state.jump_count, 2);
        assert_eq!(
            sim.events
                .iter()
                .filter(|e| matches!(e, LocomotionEvent::Jumped(_)))
                .count(),
            2
        );
    }

    #[test]
    fn double_jump_respects_min_interval() {
        let config = LocomotionConfig::default();
        let mut sim = Sim::on_floor(config);
        sim.run(3);

        sim.input.jump = true;
        sim.step();
        sim.input.jump = false;
        sim.run(2);

        // Pressed well inside the interval: buffered, then expires
        sim.input.jump = true;
        sim.step();
        sim.run(8);
        assert_eq!(sim.count(LocomotionEvent::Jumped(JumpKind::Double)), 0);
        assert_eq!(sim.state.jump_count, 1);
    }

    #[test]
    fn coyote_jump_after_leaving_ledge() {
        let config = LocomotionConfig::default();
        let mut sim = Sim::on_floor(config);
        sim.run(3);
        assert_eq!(sim.state.mode, MovementMode::Grounded);

        // Walk off: the floor disappears
        sim.world.planes.clear();
        sim.run(4);
        assert_eq!(sim.state.mode, MovementMode::Airborne);

        sim.input.jump = true;
        let report = sim.step();
        assert!(report.contains(LocomotionEvent::Jumped(JumpKind::Coyote)));
        assert!((sim.commanded_velocity.y - config.jump_force).abs() < 1e-5);
        assert_eq!(sim.state.jump_count, 1);
    }

    #[test]
    fn no_coyote_jump_after_window() {
        let config = LocomotionConfig::default();
        let mut sim = Sim::on_floor(config);
        sim.run(3);

        sim.world.planes.clear();
        sim.run(15);

        sim.input.jump = true;
        sim.run(3);
        assert!(sim.events.iter().all(|e| !matches!(e, LocomotionEvent::Jumped(_))));
        assert_eq!(sim.state.jump_count, 0);
    }

    // ==================== Wall-run Tests ====================

    fn wall_sim() -> Sim {
        let config = LocomotionConfig::default();
        // Wall on the right (x = 0.5), no floor
        let world = PlaneWorld::default().with_plane(Vec3::NEG_X, Vec3::new(0.5, 0.0, 0.0));
        let mut sim = Sim::new(config, world, Vec3::new(0.0, 5.0, 0.0));
        sim.body.velocity = Vec3::new(0.0, 0.0, -8.0);
        sim
    }

    #[test]
    fn fast_airborne_character_wall_runs() {
        let mut sim = wall_sim();
        let report = sim.step();

        assert!(report.contains(LocomotionEvent::WallRunStarted));
        assert!(sim.state.mode.is_wall_running());
        assert_eq!(sim.body.gravity_scale, sim.config.wall_run_gravity_scale);
        assert_eq!(sim.body.damping, sim.config.wall_run_friction);
        // Accelerating along the wall toward wall_run_speed
        assert!(hspeed(sim.commanded_velocity) > 8.0);
        assert!(sim.commanded_velocity.x.abs() < 1e-4);
    }

    #[test]
    fn slow_character_does_not_wall_run() {
        let mut sim = wall_sim();
        sim.body.velocity = Vec3::new(0.0, 0.0, -3.0);
        sim.step();
        assert_eq!(sim.state.mode, MovementMode::Airborne);
        assert_eq!(sim.body.gravity_scale, 1.0);
    }

    #[test]
    fn losing_the_wall_restores_gravity() {
        let mut sim = wall_sim();
        sim.step();
        assert!(sim.state.mode.is_wall_running());

        sim.world.planes.clear();
        let report = sim.step();
        assert!(report.contains(LocomotionEvent::WallRunEnded));
        assert_eq!(sim.state.mode, MovementMode::Airborne);
        assert_eq!(sim.body.gravity_scale, 1.0);
    }

    #[test]
    fn wall_jump_pushes_off_and_restores_double_jump() {
        let mut sim = wall_sim();
        sim.step();
        sim.state.double_jump_available = false;

        sim.input.jump = true;
        let report = sim.step();

        assert!(report.contains(LocomotionEvent::Jumped(JumpKind::Wall)));
        assert!(report.contains(LocomotionEvent::WallRunEnded));
        assert_eq!(sim.state.mode, MovementMode::Airborne);
        assert_eq!(sim.state.jump_count, 1);
        assert!(sim.state.double_jump_available);
        assert_eq!(sim.body.gravity_scale, 1.0);

        let launch = (Vec3::NEG_X * 0.5 + Vec3::Y).normalize() * sim.config.wall_run_jump_force;
        assert!((sim.commanded_velocity.y - launch.y).abs() < 1e-4);
        // Pushed away from the wall
        assert!(sim.commanded_velocity.x < -1.0);
    }

    // ==================== Slide Tests ====================

    #[test]
    fn slide_lowers_collider_and_ends_after_duration() {
        let config = LocomotionConfig::default();
        let mut sim = Sim::on_floor(config);
        sim.input.forward = true;
        sim.run(30);

        sim.input.dash = true;
        let report = sim.step();
        sim.input.dash = false;

        assert!(report.contains(LocomotionEvent::SlideStarted));
        assert!(sim.state.mode.is_sliding());
        assert!(sim.state.collider_reduced);
        assert_eq!(sim.body.collider_height, config.slide_height);
        assert!(hspeed(sim.commanded_velocity) >= config.slide_speed - 1e-3);
        // Sliding blocks the dash on the same press
        assert!(!report.contains(LocomotionEvent::DashStarted { airborne: false }));

        // Still grounded with the smaller collider
        sim.run(5);
        assert!(sim.state.mode.is_sliding());
        assert!(sim.readings.grounded);
        assert_eq!(sim.body.damping, config.slide_friction);

        sim.run((config.slide_duration / DT) as usize);
        assert_eq!(sim.count(LocomotionEvent::SlideEnded), 1);
        assert_eq!(sim.state.mode, MovementMode::Grounded);
        assert!(!sim.state.collider_reduced);
        assert_eq!(sim.body.collider_height, config.normal_height);
        assert!(sim.feet_height().abs() < 0.05);
    }

    #[test]
    fn slow_character_cannot_slide() {
        let config = LocomotionConfig::default();
        let mut sim = Sim::on_floor(config);
        sim.run(2);

        sim.input.dash = true;
        let report = sim.step();
        assert!(!report.contains(LocomotionEvent::SlideStarted));
        // Dashes instead
        assert!(report.contains(LocomotionEvent::DashStarted { airborne: false }));
    }

    #[test]
    fn jumping_out_of_a_slide_restores_collider() {
        let config = LocomotionConfig::default();
        let mut sim = Sim::on_floor(config);
        sim.input.forward = true;
        sim.run(30);
        sim.input.dash = true;
        sim.step();
        sim.input.dash = false;
        assert!(sim.state.mode.is_sliding());

        sim.input.jump = true;
        let report = sim.step();
        assert!(report.contains(LocomotionEvent::Jumped(JumpKind::Ground)));
        assert!(report.contains(LocomotionEvent::SlideEnded));
        assert!(!sim.state.collider_reduced);
        assert_eq!(sim.body.collider_height, config.normal_height);
    }

    // ==================== Invariant Tests ====================

    #[test]
    fn mode_invariants_hold_under_varied_input() {
        let config = LocomotionConfig::default();
        let world = PlaneWorld::floor(0.0).with_plane(Vec3::NEG_X, Vec3::new(3.0, 0.0, 0.0));
        let mut sim = Sim::new(config, world, Vec3::new(0.0, 2.0, 0.0));

        let mut seed: u32 = 0x2545_f491;
        for _ in 0..1200 {
            seed = seed.wrapping_mul(1_664_525).wrapping_add(1_013_904_223);
            let bits = seed >> 16;
            sim.input.forward = bits & 1 != 0;
            sim.input.backward = bits & 2 != 0 && bits & 4 != 0;
            sim.input.left = bits & 8 != 0;
            sim.input.right = bits & 16 != 0;
            sim.input.jump = bits & 32 != 0;
            sim.input.dash = bits & 64 != 0 && bits & 128 != 0;
            sim.look.yaw += ((bits >> 8) & 7) as f32 * 0.01 - 0.035;

            let report = sim.step();

            assert!(sim.state.jump_count <= 2);
            match sim.state.mode {
                MovementMode::Sliding { .. } => {
                    assert!(sim.readings.grounded);
                    assert!(sim.state.collider_reduced);
                }
                MovementMode::WallRunning(wall) => {
                    assert!(wall.normal.y.abs() < config.wall_angle_threshold);
                    assert!(!sim.state.collider_reduced);
                }
                MovementMode::Grounded => {
                    assert!(sim.readings.grounded);
                    assert!(!sim.state.collider_reduced);
                }
                MovementMode::Airborne => assert!(!sim.state.collider_reduced),
            }
            let jumped = report
                .events
                .iter()
                .any(|e| matches!(e, LocomotionEvent::Jumped(_)));
            if report.contains(LocomotionEvent::Landed) && !jumped {
                assert_eq!(sim.state.jump_count, 0);
            }
        }
    }

    #[test]
    fn reset_returns_to_airborne_and_restores_collider() {
        let config = LocomotionConfig::default();
        let mut sim = Sim::on_floor(config);
        sim.input.forward = true;
        sim.run(30);
        sim.input.dash = true;
        sim.step();
        sim.input = Default::default();
        assert!(sim.state.collider_reduced);

        sim.state.reset();
        assert_eq!(sim.state.mode, MovementMode::Airborne);
        assert!(sim.state.ledger.last_slide.is_none());

        sim.step();
        assert!(!sim.state.collider_reduced);
        assert_eq!(sim.body.collider_height, config.normal_height);
    }

    #[test]
    fn reset_while_wall_running_restores_gravity() {
        let mut sim = wall_sim();
        sim.step();
        assert!(sim.state.mode.is_wall_running());
        assert!(sim.state.gravity_reduced);

        sim.state.reset();
        assert_eq!(sim.state.mode, MovementMode::Airborne);
        // Respawned away from the wall, still in the air
        sim.world = PlaneWorld::default();
        sim.run(30);

        assert_eq!(sim.state.mode, MovementMode::Airborne);
        assert!(!sim.state.gravity_reduced);
        assert_eq!(sim.body.gravity_scale, 1.0);
    }
}
