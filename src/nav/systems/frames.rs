use bevy::math::Affine3A;
use bevy::prelude::*;
use rustc_hash::FxHashMap;

use crate::nav::components::{NavBasis, NavSurface};
use crate::nav::config::NavConfig;
use crate::nav::resources::{NavClock, SurfaceFrames, MAX_FRAME_DEPTH};

/// Advance navigation time by one fixed step. Runs first every tick.
pub fn advance_clock(mut clock: ResMut<NavClock>, config: Res<NavConfig>) {
    clock.advance(config.tick_rate);
}

/// Compose every surface and basis transform through its parent chain.
pub fn rebuild_surface_frames(
    mut frames: ResMut<SurfaceFrames>,
    query: Query<(Entity, &Transform, Option<&NavBasis>, Option<&NavSurface>), Or<(With<NavBasis>, With<NavSurface>)>>,
) {
    let locals: FxHashMap<Entity, (Affine3A, Option<Entity>)> = query
        .iter()
        .map(|(entity, transform, basis, surface)| {
            let parent = surface.and_then(|s| s.basis).or(basis.and_then(|b| b.parent));
            (entity, (transform.compute_affine(), parent))
        })
        .collect();

    frames.clear();
    for (&entity, &(local, parent)) in &locals {
        frames.insert(entity, compose_chain(entity, local, parent, &locals));
    }
}

fn compose_chain(
    entity: Entity,
    local: Affine3A,
    mut parent: Option<Entity>,
    locals: &FxHashMap<Entity, (Affine3A, Option<Entity>)>,
) -> Affine3A {
    let mut to_world = local;
    let mut depth = 0;
    while let Some(next) = parent {
        if depth >= MAX_FRAME_DEPTH {
            warn!("Basis chain of {:?} is longer than {} links; treating it as rooted at the world", entity, MAX_FRAME_DEPTH);
            return local;
        }
        // A parent that is not a frame (or was despawned) ends the chain at the world.
        let Some(&(parent_local, grandparent)) = locals.get(&next) else {
            break;
        };
        to_world = parent_local * to_world;
        parent = grandparent;
        depth += 1;
    }
    to_world
}
