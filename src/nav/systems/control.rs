use bevy::prelude::*;

use crate::nav::components::*;
use crate::nav::resources::{NavClock, SurfaceFrames};

/// What following should do this tick at `distance` from the target.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FollowAction {
    Cancel,
    Hold,
    Approach,
}

pub fn follow_action(follow: &NavFollow, distance: f32) -> FollowAction {
    if follow.max_distance > 0.0 && distance > follow.max_distance {
        FollowAction::Cancel
    } else if distance < follow.min_distance {
        FollowAction::Hold
    } else {
        FollowAction::Approach
    }
}

/// Apply pending stop requests.
///
/// Requests and follows are cancelled right away. Agents in the middle of a
/// jump keep their stop tag until they are back on the ground; falling agents
/// have nothing left to stop.
pub fn stop_agents(
    mut commands: Commands,
    mut agents: Query<(Entity, &mut NavAgent, Has<NavJumping>, Has<NavNeedsSurface>, Has<NavFalling>), With<NavStop>>,
) {
    for (entity, mut agent, jumping, needs_surface, falling) in &mut agents {
        let mut entity_commands = commands.entity(entity);
        entity_commands.remove::<(DestinationRequest, NavFollow)>();

        if jumping || needs_surface {
            continue;
        }
        if falling {
            entity_commands.remove::<NavStop>();
            continue;
        }
        agent.clear_destination();
        entity_commands.remove::<(NavStop, NavWalking, NavPlanning, PathBuffer)>();
    }
}

/// Re-issue destinations toward each follower's target.
pub fn follow_agents(
    mut commands: Commands,
    followers: Query<(Entity, &NavFollow, &NavAgent, &Transform), (Without<NavStop>, Without<NavProblem>)>,
    targets: Query<(&NavAgent, &Transform)>,
    frames: Res<SurfaceFrames>,
    clock: Res<NavClock>,
) {
    for (entity, follow, agent, transform) in &followers {
        let Ok((target, target_transform)) = targets.get(follow.target) else {
            debug!("{:?} lost its follow target {:?}", entity, follow.target);
            commands.entity(entity).remove::<NavFollow>();
            continue;
        };

        let position = frames.to_world(agent.surface, transform.translation);
        let target_position = frames.to_world(target.surface, target_transform.translation);
        match follow_action(follow, position.distance(target_position)) {
            FollowAction::Cancel => {
                commands.entity(entity).remove::<NavFollow>();
            }
            FollowAction::Hold => {}
            FollowAction::Approach => {
                let ground = frames.to_world(target.surface, target_transform.translation - target.offset);
                commands.entity(entity).insert(DestinationRequest {
                    world_point: ground,
                    teleport: false,
                    tolerance: follow.tolerance,
                    custom_lerp: follow.custom_lerp,
                    issued_seconds: clock.elapsed_seconds,
                });
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn follow(min_distance: f32, max_distance: f32) -> NavFollow {
        NavFollow {
            target: Entity::from_bits(5),
            min_distance,
            max_distance,
            tolerance: 0.5,
            custom_lerp: false,
        }
    }

    fn control_app() -> App {
        let mut app = App::new();
        app.init_resource::<SurfaceFrames>();
        app.init_resource::<NavClock>();
        app.add_systems(Update, (stop_agents, follow_agents).chain());
        app
    }

    #[test]
    fn test_follow_action_thresholds() {
        assert_eq!(follow_action(&follow(2.0, 10.0), 11.0), FollowAction::Cancel);
        assert_eq!(follow_action(&follow(2.0, 10.0), 1.0), FollowAction::Hold);
        assert_eq!(follow_action(&follow(2.0, 10.0), 5.0), FollowAction::Approach);
        assert_eq!(follow_action(&follow(2.0, 0.0), 500.0), FollowAction::Approach);
    }

    #[test]
    fn test_stop_keeps_jump_intact() {
        let mut app = control_app();
        let agent = app
            .world_mut()
            .spawn((
                NavAgent {
                    destination_surface: Some(Entity::from_bits(9)),
                    ..Default::default()
                },
                NavJumping,
                JumpBuffer(Vec3::X),
                NavStop,
            ))
            .id();

        app.update();

        let world = app.world();
        assert!(world.get::<NavJumping>(agent).is_some());
        assert!(world.get::<JumpBuffer>(agent).is_some());
        assert!(world.get::<NavStop>(agent).is_some());
        assert!(world.get::<NavAgent>(agent).unwrap().has_destination());
    }

    #[test]
    fn test_stop_clears_walking_agent() {
        let mut app = control_app();
        let agent = app
            .world_mut()
            .spawn((
                NavAgent {
                    destination_surface: Some(Entity::from_bits(9)),
                    ..Default::default()
                },
                NavWalking,
                PathBuffer::from_path([Vec3::Z]),
                NavStop,
            ))
            .id();

        app.update();

        let world = app.world();
        assert!(world.get::<NavWalking>(agent).is_none());
        assert!(world.get::<PathBuffer>(agent).is_none());
        assert!(world.get::<NavStop>(agent).is_none());
        assert!(!world.get::<NavAgent>(agent).unwrap().has_destination());
    }

    #[test]
    fn test_follow_issues_request_toward_target_ground() {
        let mut app = control_app();
        let target = app
            .world_mut()
            .spawn((NavAgent::default(), Transform::from_xyz(6.0, 1.0, 0.0)))
            .id();
        let follower = app
            .world_mut()
            .spawn((
                NavAgent::default(),
                NavFollow {
                    target,
                    tolerance: 1.25,
                    custom_lerp: true,
                    ..follow(1.0, 20.0)
                },
            ))
            .id();

        app.update();

        let request = app.world().get::<DestinationRequest>(follower).unwrap();
        assert_eq!(request.world_point, Vec3::new(6.0, 0.0, 0.0));
        assert_eq!(request.tolerance, 1.25);
        assert!(request.custom_lerp);
        assert!(!request.teleport);
    }

    #[test]
    fn test_follow_cancels_when_target_is_gone() {
        let mut app = control_app();
        let target = app.world_mut().spawn(NavAgent::default()).id();
        let follower = app
            .world_mut()
            .spawn((NavAgent::default(), NavFollow { target, ..follow(1.0, 20.0) }))
            .id();
        app.world_mut().despawn(target);

        app.update();

        assert!(app.world().get::<NavFollow>(follower).is_none());
        assert!(app.world().get::<DestinationRequest>(follower).is_none());
    }
}
