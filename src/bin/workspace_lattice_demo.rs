// Workspace lattice planning for a floating gripper around a wall
//
// RUST_LOG=debug shows lattice and heuristic diagnostics.

use std::cmp::Reverse;
use std::collections::{BinaryHeap, HashMap, HashSet};
use std::rc::Rc;

use tracing::{info, warn};

use rust_arm_planning::collision::{
    CollisionGroupConfig, CollisionLinkConfig, CollisionModel, CollisionModelConfig,
    CollisionObject, CollisionSphereConfig, CollisionSpace, GroupKind, ObjectOperation, Shape,
};
use rust_arm_planning::common::{pose_from_xyz_rpy, GoalConstraint, PlanningSpace, StateId};
use rust_arm_planning::heuristic::{HeuristicConfig, MultiFrameBfsHeuristic};
use rust_arm_planning::lattice::{WorkspaceLattice, WorkspaceLatticeConfig};
use rust_arm_planning::robot::{ChainRobotModel, JointKind, JointSpec, RobotDescription};
use rust_arm_planning::utils::OccupancyGrid;
use rust_arm_planning::{PlanningError, PlanningResult};

const HEURISTIC_WEIGHT: i32 = 3;
const MAX_EXPANSIONS: usize = 20_000;

fn floating_gripper() -> RobotDescription {
    let mut robot = RobotDescription::new("floating_gripper", "world");
    let prismatic = JointKind::Prismatic { lower: 0.0, upper: 2.0 };
    robot
        .add_joint(JointSpec::new("x", "world", "x_link", prismatic).with_axis([1.0, 0.0, 0.0]))
        .add_joint(JointSpec::new("y", "x_link", "y_link", prismatic).with_axis([0.0, 1.0, 0.0]))
        .add_joint(JointSpec::new("z", "y_link", "z_link", prismatic).with_axis([0.0, 0.0, 1.0]))
        .add_joint(JointSpec::new("yaw", "z_link", "yaw_link", JointKind::Continuous))
        .add_joint(
            JointSpec::new("pitch", "yaw_link", "pitch_link", JointKind::Revolute { lower: -1.5, upper: 1.5 })
                .with_axis([0.0, 1.0, 0.0]),
        )
        .add_joint(
            JointSpec::new("roll", "pitch_link", "roll_link", JointKind::Continuous).with_axis([1.0, 0.0, 0.0]),
        )
        .add_joint(
            JointSpec::new("wrist", "roll_link", "gripper", JointKind::Revolute { lower: -3.0, upper: 3.0 })
                .with_axis([1.0, 0.0, 0.0]),
        );
    robot
}

fn gripper_spheres() -> CollisionModelConfig {
    CollisionModelConfig {
        collision_spheres: vec![
            CollisionSphereConfig::new("palm", [0.0; 3], 0.05, 0),
            CollisionSphereConfig::new("fingers", [0.08, 0.0, 0.0], 0.03, 1),
        ],
        collision_groups: vec![CollisionGroupConfig {
            name: "gripper".to_string(),
            root_name: "world".to_string(),
            tip_name: "gripper".to_string(),
            kind: GroupKind::Spheres,
            links: vec![CollisionLinkConfig {
                name: "gripper".to_string(),
                spheres: vec!["palm".to_string(), "fingers".to_string()],
            }],
        }],
        allowed_collisions: vec![],
    }
}

/// Weighted A* over a planning space. Returns the state ids from start to goal.
fn weighted_astar(space: &mut dyn PlanningSpace) -> PlanningResult<Vec<StateId>> {
    let start = space
        .start_state_id()
        .ok_or_else(|| PlanningError::unsupported("no start state"))?;
    let goal = space
        .goal_state_id()
        .ok_or_else(|| PlanningError::unsupported("no goal"))?;

    let mut g: HashMap<StateId, i32> = HashMap::from([(start, 0)]);
    let mut parent: HashMap<StateId, StateId> = HashMap::new();
    let mut closed: HashSet<StateId> = HashSet::new();
    let mut open = BinaryHeap::new();
    open.push(Reverse((space.goal_heuristic(start), start)));

    while let Some(Reverse((_, id))) = open.pop() {
        if !closed.insert(id) {
            continue;
        }
        if id == goal {
            let mut path = vec![goal];
            let mut current = goal;
            while let Some(&p) = parent.get(&current) {
                path.push(p);
                current = p;
            }
            path.reverse();
            info!("goal reached after {} expansions", closed.len());
            return Ok(path);
        }
        if closed.len() > MAX_EXPANSIONS {
            break;
        }

        let g_id = g.get(&id).copied().unwrap_or(i32::MAX);
        for succ in space.get_succs(id)? {
            let tentative = g_id.saturating_add(succ.cost);
            if tentative < g.get(&succ.id).copied().unwrap_or(i32::MAX) {
                g.insert(succ.id, tentative);
                parent.insert(succ.id, id);
                let h = space.goal_heuristic(succ.id).saturating_mul(HEURISTIC_WEIGHT);
                open.push(Reverse((tentative.saturating_add(h), succ.id)));
            }
        }
    }

    warn!("search exhausted after {} expansions", closed.len());
    Err(PlanningError::PathExtraction("no path found".to_string()))
}

fn main() -> PlanningResult<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let description = floating_gripper();
    let robot = Rc::new(ChainRobotModel::new(&description, "world", "gripper", &["wrist"])?);
    let planning_joints: Vec<String> = ["x", "y", "z", "yaw", "pitch", "roll", "wrist"]
        .iter()
        .map(|s| s.to_string())
        .collect();

    let grid = OccupancyGrid::new([40, 40, 40], 0.05, nalgebra::Point3::origin(), 0.4)?;
    let model = CollisionModel::init(description, &gripper_spheres())?;
    let mut space = CollisionSpace::new(grid, model, "gripper", &planning_joints)?;
    space.set_padding(0.01);

    let wall = CollisionObject::new("wall", "map", ObjectOperation::Add).with_shape(
        Shape::Box { size: [0.1, 1.2, 2.0] },
        pose_from_xyz_rpy([1.0, 0.6, 1.0], [0.0; 3]),
    );
    space.process_collision_object(&wall)?;
    info!("{} collision objects", space.collision_object_names().len());

    let heuristic = MultiFrameBfsHeuristic::new(
        space.grid(),
        robot.clone(),
        HeuristicConfig {
            cost_per_cell: 10,
            ..Default::default()
        },
    );
    let config = WorkspaceLatticeConfig {
        position_resolution: [0.05; 3],
        orientation_bins: [36; 3],
        redundant_resolution: vec![0.1745],
        primitives: Vec::new(),
        unit_cost: 10,
    };
    let mut lattice = WorkspaceLattice::new(robot, space, config)?.with_heuristic(Box::new(heuristic));

    let start = vec![0.5, 0.5, 1.0, 0.0, 0.0, 0.0, 0.0];
    lattice.set_start(&start)?;
    let goal_pose = pose_from_xyz_rpy([1.5, 0.5, 1.0], [0.0; 3]);
    lattice.set_goal(GoalConstraint::new(goal_pose, [0.03, 0.03, 0.03, 0.1, 0.1, 0.1]))?;

    let ids = weighted_astar(&mut lattice)?;
    let path = lattice.extract_path(&ids)?;
    info!("path with {} waypoints, {} states discovered", path.len(), lattice.state_count());
    for q in &path {
        info!("{:?}", q.iter().map(|v| format!("{:.3}", v)).collect::<Vec<_>>());
    }
    Ok(())
}
