pub mod frame;
pub mod landmark;

pub use frame::{
    list_pose_files, load_pose_dir, load_pose_file, save_pose_file, ArmJoints, PoseFrame,
    ResolvedArm,
};
pub use landmark::{Landmark, LandmarkName};
