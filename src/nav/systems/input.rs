use bevy::prelude::*;

use crate::nav::components::*;
use crate::nav::events::{ClearNavProblem, FollowAgent, SetDestination, StopAgent};
use crate::nav::resources::NavClock;

/// Turn destination messages into pending [`DestinationRequest`]s.
///
/// A newer request for the same agent replaces one that is still pending.
pub fn process_destination_requests(
    mut commands: Commands,
    mut requests: MessageReader<SetDestination>,
    agents: Query<(), With<NavAgent>>,
    clock: Res<NavClock>,
) {
    for request in requests.read() {
        if !agents.contains(request.agent) {
            debug!("Destination for {:?} ignored: not a navigation agent", request.agent);
            continue;
        }
        commands.entity(request.agent).insert(DestinationRequest {
            world_point: request.world_point,
            teleport: request.teleport,
            tolerance: request.tolerance,
            custom_lerp: request.custom_lerp,
            issued_seconds: clock.elapsed_seconds,
        });
    }
}

pub fn process_stop_requests(
    mut commands: Commands,
    mut requests: MessageReader<StopAgent>,
    agents: Query<(), With<NavAgent>>,
) {
    for request in requests.read() {
        if agents.contains(request.agent) {
            commands.entity(request.agent).insert(NavStop);
        }
    }
}

pub fn process_follow_requests(
    mut commands: Commands,
    mut requests: MessageReader<FollowAgent>,
    agents: Query<(), With<NavAgent>>,
) {
    for request in requests.read() {
        if request.agent == request.target {
            debug!("{:?} cannot follow itself", request.agent);
            continue;
        }
        if !agents.contains(request.agent) || !agents.contains(request.target) {
            debug!("Follow {:?} -> {:?} ignored: both must be navigation agents", request.agent, request.target);
            continue;
        }
        commands.entity(request.agent).insert(NavFollow {
            target: request.target,
            min_distance: request.min_distance,
            max_distance: request.max_distance,
            tolerance: request.tolerance,
            custom_lerp: request.custom_lerp,
        });
    }
}

pub fn process_problem_clears(
    mut commands: Commands,
    mut requests: MessageReader<ClearNavProblem>,
    agents: Query<(), (With<NavAgent>, With<NavProblem>)>,
) {
    for request in requests.read() {
        if agents.contains(request.agent) {
            commands.entity(request.agent).remove::<NavProblem>();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn input_app() -> App {
        let mut app = App::new();
        app.init_resource::<NavClock>();
        app.add_message::<SetDestination>();
        app.add_message::<FollowAgent>();
        app.add_systems(Update, (process_destination_requests, process_follow_requests));
        app
    }

    #[test]
    fn test_latest_destination_replaces_pending_one() {
        let mut app = input_app();
        let agent = app.world_mut().spawn(NavAgent::default()).id();

        app.world_mut()
            .write_message(SetDestination::new(agent, Vec3::new(1.0, 0.0, 0.0)));
        app.update();
        app.world_mut().resource_mut::<NavClock>().elapsed_seconds = 0.25;
        app.world_mut()
            .write_message(SetDestination::new(agent, Vec3::new(9.0, 0.0, 0.0)));
        app.update();

        let request = app.world().get::<DestinationRequest>(agent).unwrap();
        assert_eq!(request.world_point, Vec3::new(9.0, 0.0, 0.0));
        assert_eq!(request.issued_seconds, 0.25);
    }

    #[test]
    fn test_requests_for_non_agents_are_ignored() {
        let mut app = input_app();
        let bystander = app.world_mut().spawn(Transform::default()).id();
        let agent = app.world_mut().spawn(NavAgent::default()).id();

        app.world_mut()
            .write_message(SetDestination::new(bystander, Vec3::ONE));
        app.world_mut().write_message(FollowAgent {
            agent,
            target: agent,
            min_distance: 1.0,
            max_distance: 10.0,
            tolerance: 0.5,
            custom_lerp: false,
        });
        app.update();

        assert!(app.world().get::<DestinationRequest>(bystander).is_none());
        assert!(app.world().get::<NavFollow>(agent).is_none());
    }
}
